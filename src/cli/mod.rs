pub mod add;
pub mod db;
pub mod fetch;
pub mod select;
pub mod setup;
pub mod show;
pub mod sources;
pub mod ui;
