//! Routes lookups to the adapter responsible for each market.

use crate::core::config::AppConfig;
use crate::core::error::RegistryError;
use crate::core::quote::{Market, Quote};
use crate::core::source::{DataSourceType, QuoteSource};
use crate::providers::registry;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One row of the `sources` listing.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub name: String,
    pub source_type: DataSourceType,
    pub markets: Vec<Market>,
    pub us_preferred: bool,
}

/// Registered adapters plus the US routing preference.
///
/// The preference is set through [`SourceManager::set_us_source`] while the
/// manager is still exclusively owned; once shared behind an `Arc` for a fetch
/// run it can no longer change.
pub struct SourceManager {
    sources: Vec<Arc<dyn QuoteSource>>,
    default_source: DataSourceType,
    us_source: Option<DataSourceType>,
}

impl SourceManager {
    /// Builds every known adapter. The domestic adapter is mandatory; the
    /// others are dropped with a warning when they cannot be constructed.
    pub fn new(config: &AppConfig) -> Result<Self, RegistryError> {
        let mut sources = Vec::with_capacity(DataSourceType::ALL.len());
        for source_type in DataSourceType::ALL {
            match registry::create(source_type, config) {
                Ok(source) => {
                    debug!("Registered data source {}", source.name());
                    sources.push(source);
                }
                Err(e) if source_type == DataSourceType::Akshare => return Err(e),
                Err(e) => warn!("Data source {} unavailable: {}", source_type, e),
            }
        }
        Ok(Self::with_sources(sources, config.data_source))
    }

    /// Uses the given adapters in the order supplied.
    pub fn with_sources(sources: Vec<Arc<dyn QuoteSource>>, default_source: DataSourceType) -> Self {
        SourceManager {
            sources,
            default_source,
            us_source: None,
        }
    }

    pub fn source(&self, source_type: DataSourceType) -> Option<Arc<dyn QuoteSource>> {
        self.sources
            .iter()
            .find(|s| s.source_type() == source_type)
            .cloned()
    }

    /// Registered adapters, optionally only those serving `market`.
    pub fn available_sources(&self, market: Option<Market>) -> Vec<Arc<dyn QuoteSource>> {
        self.sources
            .iter()
            .filter(|s| market.is_none_or(|m| s.supports(m)))
            .cloned()
            .collect()
    }

    pub fn set_us_source(&mut self, source_type: DataSourceType) -> Result<(), RegistryError> {
        let source = self
            .source(source_type)
            .ok_or_else(|| RegistryError::Unavailable(source_type.to_string()))?;
        if !source.supports(Market::Us) {
            return Err(RegistryError::MarketUnsupported {
                provider: source_type.to_string(),
                market: Market::Us.to_string(),
            });
        }
        info!("US stocks will be fetched from {}", source.name());
        self.us_source = Some(source_type);
        Ok(())
    }

    pub fn us_source(&self) -> Option<DataSourceType> {
        self.us_source
    }

    pub fn source_info(&self) -> Vec<SourceInfo> {
        let us_route = self.us_route().map(|s| s.source_type());
        self.sources
            .iter()
            .map(|s| SourceInfo {
                name: s.name().to_string(),
                source_type: s.source_type(),
                markets: s.supported_markets().to_vec(),
                us_preferred: us_route == Some(s.source_type()),
            })
            .collect()
    }

    pub fn infer_market(code: &str) -> Market {
        Market::infer_from_code(code)
    }

    /// The adapter responsible for `market`, which always supports it.
    pub fn route_for_market(&self, market: Market) -> Option<Arc<dyn QuoteSource>> {
        let routed = match market {
            m if m.is_domestic() => self.source(DataSourceType::Akshare),
            Market::Us => self.us_route(),
            _ => {
                warn!("No data source handles market {}", market);
                return None;
            }
        };
        match routed {
            Some(source) if source.supports(market) => Some(source),
            Some(source) => {
                warn!("{} does not support market {}", source.name(), market);
                None
            }
            None => {
                warn!("No data source registered for market {}", market);
                None
            }
        }
    }

    fn us_route(&self) -> Option<Arc<dyn QuoteSource>> {
        if let Some(preferred) = self.us_source {
            return self.source(preferred);
        }
        let fallback = self
            .source(self.default_source)
            .filter(|s| s.supports(Market::Us))
            .or_else(|| self.sources.iter().find(|s| s.supports(Market::Us)).cloned());
        if let Some(source) = &fallback {
            warn!(
                "No US data source selected, using {}",
                source.source_type()
            );
        }
        fallback
    }

    pub async fn stock_price(&self, code: &str, market: Market) -> Option<Quote> {
        let source = self.route_for_market(market)?;
        source.stock_price(code, market).await
    }

    /// Funds without a market are classified by their code; anything not
    /// recognisably foreign is treated as a domestic fund.
    pub async fn fund_nav(&self, code: &str, market: Option<Market>) -> Option<Quote> {
        let market = market.unwrap_or_else(|| Self::infer_market(code));
        let (route, hint) = match market {
            Market::Us | Market::Hk => (market, Some(market)),
            Market::Unknown => (Market::Of, None),
            m => (Market::Of, Some(m)),
        };
        let source = self.route_for_market(route)?;
        source.fund_nav(code, hint).await
    }

    /// Rate of one unit of `currency` in CNY. The domestic adapter is asked
    /// first, then the rest in registration order.
    pub async fn exchange_rate(&self, currency: &str) -> Option<Quote> {
        let ordered = self
            .source(DataSourceType::Akshare)
            .into_iter()
            .chain(
                self.sources
                    .iter()
                    .filter(|s| s.source_type() != DataSourceType::Akshare)
                    .cloned(),
            );

        for source in ordered {
            if let Some(quote) = source.exchange_rate(currency).await {
                debug!("{} rate from {}", currency, source.name());
                return Some(quote);
            }
            debug!("{} has no rate for {}, trying next source", source.name(), currency);
        }
        warn!("No data source could provide a rate for {}", currency);
        None
    }
}
