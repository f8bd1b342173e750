//! Data source abstractions

use crate::core::error::RegistryError;
use crate::core::quote::{Market, Quote};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceType {
    Akshare,
    Yfinance,
    AlphaVantage,
}

impl DataSourceType {
    /// Registration order, which is also the exchange rate fall-through order.
    pub const ALL: [DataSourceType; 3] = [
        DataSourceType::Akshare,
        DataSourceType::Yfinance,
        DataSourceType::AlphaVantage,
    ];
}

impl Display for DataSourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                DataSourceType::Akshare => "akshare",
                DataSourceType::Yfinance => "yfinance",
                DataSourceType::AlphaVantage => "alpha_vantage",
            }
        )
    }
}

impl FromStr for DataSourceType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "akshare" => Ok(DataSourceType::Akshare),
            "yfinance" | "yahoo" => Ok(DataSourceType::Yfinance),
            "alpha_vantage" | "alphavantage" => Ok(DataSourceType::AlphaVantage),
            _ => Err(RegistryError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// One external data vendor.
///
/// Lookups fail soft: any transport, parse or vendor error is logged by the
/// adapter and surfaces as `None`. A returned quote always carries both a value
/// and a date.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn name(&self) -> &str;

    fn source_type(&self) -> DataSourceType;

    fn supported_markets(&self) -> &[Market];

    fn supports(&self, market: Market) -> bool {
        self.supported_markets().contains(&market)
    }

    async fn stock_price(&self, code: &str, market: Market) -> Option<Quote>;

    /// `market` is optional; adapters decide domestic or foreign handling when absent.
    async fn fund_nav(&self, code: &str, market: Option<Market>) -> Option<Quote>;

    /// Rate of one unit of `currency` in CNY.
    async fn exchange_rate(&self, currency: &str) -> Option<Quote>;
}
