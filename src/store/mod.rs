pub mod sqlite;

pub use sqlite::{Database, Store};

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Result of an insert-if-absent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row for the same entity and date already existed; nothing changed.
    Skipped,
}

/// A stored price, NAV or rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: Decimal,
}
