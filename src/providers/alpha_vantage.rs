use crate::core::config::{AlphaVantageProviderConfig, FetchConfig};
use crate::core::error::ProviderError;
use crate::core::quote::{Market, Quote, parse_vendor_date, round_str};
use crate::core::source::{DataSourceType, QuoteSource};
use crate::providers::util::{Throttle, client_builder, get_text};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

const PROVIDER: &str = "ALPHA_VANTAGE";
const SUPPORTED_MARKETS: [Market; 1] = [Market::Us];

/// Alpha Vantage daily series and currency exchange endpoints.
///
/// Requires an API key; without one every lookup is absent and no request is
/// made. The free tier has no fund NAV coverage.
pub struct AlphaVantageSource {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    throttle: Throttle,
    decimal_places: u32,
}

impl AlphaVantageSource {
    pub fn new(config: &AlphaVantageProviderConfig, fetch: &FetchConfig) -> Result<Self, reqwest::Error> {
        let api_key = config.resolve_api_key();
        if api_key.is_none() {
            warn!(
                "No Alpha Vantage API key configured (set {} or providers.alpha_vantage.api_key)",
                config.api_key_env
            );
        }
        Ok(AlphaVantageSource {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            client: client_builder(fetch.timeout()).build()?,
            throttle: Throttle::new(fetch.request_throttle()),
            decimal_places: fetch.decimal_places,
        })
    }
}

/// Fields shared by every response when the call itself was refused.
#[derive(Deserialize, Debug, Default)]
struct Refusal {
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

impl Refusal {
    fn into_error(self, context: &str) -> Option<ProviderError> {
        if let Some(message) = self.note.or(self.information) {
            return Some(ProviderError::RateLimited {
                provider: PROVIDER.to_string(),
                message,
            });
        }
        self.error_message
            .map(|message| ProviderError::NotFound(format!("{context}: {message}")))
    }
}

#[derive(Deserialize, Debug)]
struct DailySeriesResponse {
    #[serde(flatten)]
    refusal: Refusal,
    #[serde(rename = "Time Series (Daily)")]
    series: Option<BTreeMap<String, DailyBar>>,
}

#[derive(Deserialize, Debug)]
struct DailyBar {
    #[serde(rename = "4. close")]
    close: String,
}

#[derive(Deserialize, Debug)]
struct ExchangeRateResponse {
    #[serde(flatten)]
    refusal: Refusal,
    #[serde(rename = "Realtime Currency Exchange Rate")]
    rate: Option<ExchangeRate>,
}

#[derive(Deserialize, Debug)]
struct ExchangeRate {
    #[serde(rename = "5. Exchange Rate")]
    rate: String,
    #[serde(rename = "6. Last Refreshed")]
    last_refreshed: String,
}

impl AlphaVantageSource {
    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredential("Alpha Vantage API key".to_string()))
    }

    async fn query(&self, api_key: &str, params: &[(&str, &str)], context: &str) -> Result<String, ProviderError> {
        self.throttle.wait().await;
        let params = params.iter().copied().chain([("apikey", api_key)]);
        let url = reqwest::Url::parse_with_params(&format!("{}/query", self.base_url), params)
            .map_err(|e| ProviderError::Parse(format!("Invalid query URL for {context}: {e}")))?;
        get_text(&self.client, PROVIDER, url, context).await
    }

    async fn daily_close(&self, api_key: &str, symbol: &str) -> Result<Option<Quote>, ProviderError> {
        let text = self
            .query(
                api_key,
                &[("function", "TIME_SERIES_DAILY"), ("symbol", symbol)],
                symbol,
            )
            .await?;
        let response: DailySeriesResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderError::Parse(format!("Failed to parse daily series for {symbol}: {e}"))
        })?;
        if let Some(err) = response.refusal.into_error(symbol) {
            return Err(err);
        }

        // ISO dates sort lexically, so the last key is the latest session.
        Ok(response
            .series
            .as_ref()
            .and_then(|series| series.iter().next_back())
            .and_then(|(date, bar)| {
                let value = round_str(&bar.close, self.decimal_places)?;
                Some(Quote::new(symbol, value, parse_vendor_date(date)?))
            }))
    }

    async fn currency_rate(&self, api_key: &str, currency: &str) -> Result<Option<Quote>, ProviderError> {
        let text = self
            .query(
                api_key,
                &[
                    ("function", "CURRENCY_EXCHANGE_RATE"),
                    ("from_currency", currency),
                    ("to_currency", "CNY"),
                ],
                currency,
            )
            .await?;
        let response: ExchangeRateResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderError::Parse(format!("Failed to parse exchange rate for {currency}: {e}"))
        })?;
        if let Some(err) = response.refusal.into_error(currency) {
            return Err(err);
        }

        Ok(response.rate.and_then(|rate| {
            let value = round_str(&rate.rate, self.decimal_places)?;
            Some(Quote::new(currency, value, parse_vendor_date(&rate.last_refreshed)?))
        }))
    }

    fn log_outcome(&self, code: &str, result: Result<Option<Quote>, ProviderError>) -> Option<Quote> {
        match result {
            Ok(Some(quote)) => {
                info!("Fetched {} value {} on {}", code, quote.value, quote.as_of);
                Some(quote)
            }
            Ok(None) => {
                warn!("Alpha Vantage returned no data for {}", code);
                None
            }
            Err(e) => {
                warn!("Alpha Vantage lookup for {} failed: {}", code, e);
                None
            }
        }
    }
}

#[async_trait]
impl QuoteSource for AlphaVantageSource {
    fn name(&self) -> &str {
        "Alpha Vantage (US equities, exchange rates)"
    }

    fn source_type(&self) -> DataSourceType {
        DataSourceType::AlphaVantage
    }

    fn supported_markets(&self) -> &[Market] {
        &SUPPORTED_MARKETS
    }

    async fn stock_price(&self, code: &str, market: Market) -> Option<Quote> {
        let symbol = code.trim().to_uppercase();
        let result = if market != Market::Us {
            Err(ProviderError::Unsupported(format!("{market} stock prices")))
        } else {
            match self.api_key() {
                Ok(api_key) => self.daily_close(api_key, &symbol).await,
                Err(e) => Err(e),
            }
        };
        self.log_outcome(&symbol, result)
    }

    async fn fund_nav(&self, code: &str, _market: Option<Market>) -> Option<Quote> {
        self.log_outcome(code, Err(ProviderError::Unsupported("fund NAVs".to_string())))
    }

    async fn exchange_rate(&self, currency: &str) -> Option<Quote> {
        let currency = currency.trim().to_uppercase();
        let result = match self.api_key() {
            Ok(api_key) => self.currency_rate(api_key, &currency).await,
            Err(e) => Err(e),
        };
        self.log_outcome(&currency, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RetryClass;
    use chrono::NaiveDate;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_source(uri: &str, api_key: Option<&str>) -> AlphaVantageSource {
        let config = AlphaVantageProviderConfig {
            base_url: uri.to_string(),
            api_key_env: "HOLDINGS_TEST_UNSET_AV_KEY".to_string(),
            api_key: api_key.map(str::to_string),
        };
        let fetch = FetchConfig {
            request_throttle_seconds: 0.0,
            ..FetchConfig::default()
        };
        AlphaVantageSource::new(&config, &fetch).unwrap()
    }

    #[tokio::test]
    async fn test_daily_series_uses_latest_date() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("function", "TIME_SERIES_DAILY"))
            .and(query_param("symbol", "IBM"))
            .and(query_param("apikey", "demo"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{
                    "Meta Data": {"2. Symbol": "IBM"},
                    "Time Series (Daily)": {
                        "2024-02-29": {"1. open": "185.00", "4. close": "185.0300"},
                        "2024-03-01": {"1. open": "185.49", "4. close": "191.2800"},
                        "2024-02-28": {"1. open": "184.00", "4. close": "185.3000"}
                    }
                }"#,
            ))
            .mount(&server)
            .await;

        let source = test_source(&server.uri(), Some("demo"));
        let quote = source.stock_price("ibm", Market::Us).await.unwrap();
        assert_eq!(quote.code, "IBM");
        assert_eq!(quote.value.to_string(), "191.2800");
        assert_eq!(quote.as_of, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[tokio::test]
    async fn test_rate_limit_note_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let source = test_source(&server.uri(), Some("demo"));
        assert!(source.stock_price("IBM", Market::Us).await.is_none());
    }

    #[test]
    fn test_refusal_mapping() {
        let note = Refusal {
            note: Some("slow down".to_string()),
            ..Refusal::default()
        };
        assert!(matches!(note.into_error("IBM"), Some(ProviderError::RateLimited { .. })));

        let unknown = Refusal {
            error_message: Some("Invalid API call".to_string()),
            ..Refusal::default()
        };
        assert!(matches!(unknown.into_error("ZZZZ"), Some(ProviderError::NotFound(_))));

        assert!(Refusal::default().into_error("IBM").is_none());
    }

    #[tokio::test]
    async fn test_missing_api_key_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let source = test_source(&server.uri(), None);
        let missing = source.api_key().unwrap_err();
        assert!(matches!(missing, ProviderError::MissingCredential(_)));
        assert_eq!(missing.retry_class(), RetryClass::Never);
        assert!(source.stock_price("IBM", Market::Us).await.is_none());
        assert!(source.exchange_rate("USD").await.is_none());
    }

    #[tokio::test]
    async fn test_exchange_rate_to_cny() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("function", "CURRENCY_EXCHANGE_RATE"))
            .and(query_param("from_currency", "USD"))
            .and(query_param("to_currency", "CNY"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"Realtime Currency Exchange Rate": {
                    "1. From_Currency Code": "USD",
                    "3. To_Currency Code": "CNY",
                    "5. Exchange Rate": "7.19876000",
                    "6. Last Refreshed": "2024-03-01 08:15:01",
                    "7. Time Zone": "UTC"
                }}"#,
            ))
            .mount(&server)
            .await;

        let source = test_source(&server.uri(), Some("demo"));
        let quote = source.exchange_rate("usd").await.unwrap();
        assert_eq!(quote.code, "USD");
        assert_eq!(quote.value.to_string(), "7.1988");
        assert_eq!(quote.as_of, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[tokio::test]
    async fn test_no_fund_coverage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let source = test_source(&server.uri(), Some("demo"));
        assert_eq!(source.api_key().unwrap(), "demo");
        assert!(source.fund_nav("QQQ", Some(Market::Us)).await.is_none());
        assert!(source.stock_price("600519", Market::Sh).await.is_none());
        assert!(!source.supports(Market::Sh));
    }
}
