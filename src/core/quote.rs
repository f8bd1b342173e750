//! Quotes, entities and market tags

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    Sh,
    Sz,
    Bj,
    Us,
    Hk,
    /// Off-exchange (open-ended) funds.
    Of,
    Unknown,
}

impl Market {
    /// Markets always served by the domestic adapter.
    pub fn is_domestic(&self) -> bool {
        matches!(self, Market::Sh | Market::Sz | Market::Bj | Market::Of)
    }

    /// Classifies a bare security code by its shape.
    pub fn infer_from_code(code: &str) -> Market {
        let code = code.trim();
        let all_digits = !code.is_empty() && code.chars().all(|c| c.is_ascii_digit());

        if all_digits && code.len() == 6 {
            return match code.as_bytes()[0] {
                b'6' | b'9' | b'5' => Market::Sh,
                b'0' | b'2' | b'3' => Market::Sz,
                b'4' => Market::Bj,
                b'8' => Market::Of,
                _ => Market::Unknown,
            };
        }
        if (1..=5).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Market::Us;
        }
        if all_digits && code.len() == 5 {
            return Market::Hk;
        }
        Market::Unknown
    }
}

impl Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Market::Sh => "SH",
                Market::Sz => "SZ",
                Market::Bj => "BJ",
                Market::Us => "US",
                Market::Hk => "HK",
                Market::Of => "OF",
                Market::Unknown => "UNKNOWN",
            }
        )
    }
}

impl FromStr for Market {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SH" => Ok(Market::Sh),
            "SZ" => Ok(Market::Sz),
            "BJ" => Ok(Market::Bj),
            "US" => Ok(Market::Us),
            "HK" => Ok(Market::Hk),
            "OF" => Ok(Market::Of),
            "UNKNOWN" => Ok(Market::Unknown),
            _ => Err(anyhow!("Invalid market code: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Stock,
    Fund,
    Currency,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                EntityKind::Stock => "stock",
                EntityKind::Fund => "fund",
                EntityKind::Currency => "currency",
            }
        )
    }
}

/// A tracked stock, fund or foreign currency balance.
///
/// Currencies carry their ISO code in `code` and have no market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub id: i64,
    pub kind: EntityKind,
    pub code: String,
    pub name: String,
    pub market: Option<Market>,
}

impl Entity {
    pub fn label(&self) -> String {
        match (&self.market, self.name.is_empty()) {
            (Some(market), false) => format!("{}({}) [{}]", self.name, self.code, market),
            (Some(market), true) => format!("{} [{}]", self.code, market),
            (None, false) => format!("{}({})", self.name, self.code),
            (None, true) => self.code.clone(),
        }
    }
}

/// A single fetched observation: a close price, a NAV or an exchange rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub value: Decimal,
    pub as_of: NaiveDate,
    pub code: String,
}

impl Quote {
    pub fn new(code: &str, value: Decimal, as_of: NaiveDate) -> Self {
        Quote {
            value,
            as_of,
            code: code.to_string(),
        }
    }
}

/// Converts a vendor float into a decimal rounded to `places`.
pub fn round_value(value: f64, places: u32) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value).map(|d| fixed_scale(d, places))
}

/// Parses a vendor decimal string and rounds it to `places`.
pub fn round_str(value: &str, places: u32) -> Option<Decimal> {
    Decimal::from_str(value.trim())
        .ok()
        .map(|d| fixed_scale(d, places))
}

// Same scale for every vendor, so stored text reads "7.1000" and never "7.1".
fn fixed_scale(value: Decimal, places: u32) -> Decimal {
    let mut rounded = value.round_dp(places);
    rounded.rescale(places);
    rounded
}

/// Parses the date part of a vendor timestamp ("2024-03-01", "2024-03-01 16:00:00",
/// "20240301").
pub fn parse_vendor_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw.get(..8).unwrap_or(raw), "%Y%m%d"))
        .ok()
}
