pub mod akshare;
pub mod alpha_vantage;
pub mod registry;
pub mod util;
pub mod yahoo_finance;

pub use registry::{create, create_by_name};
