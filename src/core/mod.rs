//! Core business logic abstractions

pub mod config;
pub mod error;
pub mod fetcher;
pub mod log;
pub mod manager;
#[cfg(test)]
pub(crate) mod mock;
pub mod quote;
pub mod source;

// Re-export main types for cleaner imports
pub use error::{ProviderError, RegistryError};
pub use fetcher::{BatchReport, FetchAllReport, Fetcher};
pub use manager::SourceManager;
pub use quote::{Entity, EntityKind, Market, Quote};
pub use source::{DataSourceType, QuoteSource};
