//! Builds adapters from their type tag.

use crate::core::config::AppConfig;
use crate::core::error::RegistryError;
use crate::core::source::{DataSourceType, QuoteSource};
use crate::providers::akshare::AkshareSource;
use crate::providers::alpha_vantage::AlphaVantageSource;
use crate::providers::yahoo_finance::YahooFinanceSource;
use std::str::FromStr;
use std::sync::Arc;

pub fn create(source_type: DataSourceType, config: &AppConfig) -> Result<Arc<dyn QuoteSource>, RegistryError> {
    let construction = |e: reqwest::Error| RegistryError::Construction {
        provider: source_type.to_string(),
        message: e.to_string(),
    };
    let providers = &config.providers;
    Ok(match source_type {
        DataSourceType::Akshare => {
            Arc::new(AkshareSource::new(&providers.akshare, &config.fetch).map_err(construction)?)
        }
        DataSourceType::Yfinance => {
            Arc::new(YahooFinanceSource::new(&providers.yahoo, &config.fetch).map_err(construction)?)
        }
        DataSourceType::AlphaVantage => Arc::new(
            AlphaVantageSource::new(&providers.alpha_vantage, &config.fetch).map_err(construction)?,
        ),
    })
}

/// Resolves a user supplied name such as `"yahoo"` before building it.
pub fn create_by_name(name: &str, config: &AppConfig) -> Result<Arc<dyn QuoteSource>, RegistryError> {
    create(DataSourceType::from_str(name)?, config)
}
