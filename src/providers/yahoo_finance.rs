use crate::core::config::{FetchConfig, YahooProviderConfig};
use crate::core::error::ProviderError;
use crate::core::quote::{Market, Quote, round_value};
use crate::core::source::{DataSourceType, QuoteSource};
use crate::providers::util::{RetryPolicy, Throttle, client_builder, get_text, with_backoff};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

const PROVIDER: &str = "YFINANCE";
const SUPPORTED_MARKETS: [Market; 1] = [Market::Us];

/// Yahoo Finance chart API. Rate limited, so every call is throttled and
/// rate-limit responses are retried with backoff.
pub struct YahooFinanceSource {
    base_url: String,
    client: reqwest::Client,
    throttle: Throttle,
    retry: RetryPolicy,
    decimal_places: u32,
}

impl YahooFinanceSource {
    pub fn new(config: &YahooProviderConfig, fetch: &FetchConfig) -> Result<Self, reqwest::Error> {
        Ok(YahooFinanceSource {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: client_builder(fetch.timeout()).build()?,
            throttle: Throttle::new(fetch.request_throttle()),
            retry: RetryPolicy {
                max_attempts: fetch.max_retries,
                delay: fetch.retry_delay(),
            },
            decimal_places: fetch.decimal_places,
        })
    }
}

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
    error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<IndicatorQuote>,
}

#[derive(Deserialize, Debug)]
struct IndicatorQuote {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    #[serde(default)]
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug, Default)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds, used to date each bar locally.
    #[serde(alias = "gmtoffset", default)]
    gmt_offset: i64,
}

/// Latest non-null close in the chart with the exchange-local date of its bar.
fn latest_close(item: &ChartItem) -> Option<(f64, NaiveDate)> {
    let timestamps = item.timestamp.as_ref()?;
    let closes = item
        .indicators
        .as_ref()
        .and_then(|inds| inds.quote.first())
        .and_then(|q| q.close.as_ref())?;

    timestamps
        .iter()
        .zip(closes.iter())
        .rev()
        .find_map(|(ts, close)| {
            let close = (*close)?;
            let date = DateTime::from_timestamp(ts + item.meta.gmt_offset, 0)?.date_naive();
            Some((close, date))
        })
}

impl YahooFinanceSource {
    async fn fetch_chart(&self, symbol: &str, range: &str) -> Result<Option<Quote>, ProviderError> {
        self.throttle.wait().await;

        let url = reqwest::Url::parse_with_params(
            &format!("{}/v8/finance/chart/{}", self.base_url, symbol),
            &[("interval", "1d"), ("range", range)],
        )
        .map_err(|e| ProviderError::Parse(format!("Invalid chart URL for {symbol}: {e}")))?;

        let text = get_text(&self.client, PROVIDER, url, symbol).await?;
        let data: YahooChartResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Parse(format!("Failed to parse chart for {symbol}: {e}")))?;

        if let Some(error) = data.chart.error {
            let description = error.description.unwrap_or_default();
            return Err(match error.code.as_str() {
                "Not Found" => ProviderError::NotFound(format!("{symbol}: {description}")),
                "Too Many Requests" => ProviderError::RateLimited {
                    provider: PROVIDER.to_string(),
                    message: description,
                },
                _ => ProviderError::Parse(format!("{symbol}: {} {description}", error.code)),
            });
        }

        let quote = data
            .chart
            .result
            .as_ref()
            .and_then(|items| items.first())
            .and_then(latest_close)
            .and_then(|(close, date)| {
                round_value(close, self.decimal_places).map(|value| Quote::new(symbol, value, date))
            });
        Ok(quote)
    }

    /// Latest close for a US security or currency pair; widens to a year of
    /// history when the last month has no closes.
    #[instrument(name = "YahooQuoteFetch", skip(self), fields(symbol = %symbol))]
    async fn latest_quote(&self, symbol: &str) -> Option<Quote> {
        let result = with_backoff(
            || async move {
                if let Some(quote) = self.fetch_chart(symbol, "1mo").await? {
                    return Ok(Some(quote));
                }
                debug!("No closes in the last month for {}, widening to 1y", symbol);
                self.fetch_chart(symbol, "1y").await
            },
            self.retry,
        )
        .await;

        match result {
            Ok(Some(quote)) => {
                info!(value = %quote.value, as_of = %quote.as_of, "Fetched {} from Yahoo", symbol);
                Some(quote)
            }
            Ok(None) => {
                warn!("No price history found for {}", symbol);
                None
            }
            Err(ProviderError::NotFound(e)) => {
                warn!("{} does not exist on Yahoo: {}", symbol, e);
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch {} from Yahoo", symbol);
                None
            }
        }
    }
}

#[async_trait]
impl QuoteSource for YahooFinanceSource {
    fn name(&self) -> &str {
        "YFinance (US equities and ETFs)"
    }

    fn source_type(&self) -> DataSourceType {
        DataSourceType::Yfinance
    }

    fn supported_markets(&self) -> &[Market] {
        &SUPPORTED_MARKETS
    }

    async fn stock_price(&self, code: &str, market: Market) -> Option<Quote> {
        if market != Market::Us {
            warn!("YFinance only serves US stocks, not market {}", market);
            return None;
        }
        self.latest_quote(&code.trim().to_uppercase()).await
    }

    async fn fund_nav(&self, code: &str, market: Option<Market>) -> Option<Quote> {
        let market = market.unwrap_or_else(|| Market::infer_from_code(code));
        if market != Market::Us {
            warn!("YFinance only serves US funds, not market {}", market);
            return None;
        }
        // US funds here are ETFs quoted like equities
        self.latest_quote(&code.trim().to_uppercase()).await
    }

    async fn exchange_rate(&self, currency: &str) -> Option<Quote> {
        let currency = currency.trim().to_uppercase();
        let symbol = format!("{currency}CNY=X");
        self.latest_quote(&symbol)
            .await
            .map(|quote| Quote::new(&currency, quote.value, quote.as_of))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // 2024-03-01 14:30:00 UTC and 2024-02-29 14:30:00 UTC
    const TS_MAR_1: i64 = 1_709_303_400;
    const TS_FEB_29: i64 = 1_709_217_000;

    fn chart_body(closes: &str) -> String {
        format!(
            r#"{{
                "chart": {{
                    "result": [{{
                        "meta": {{ "currency": "USD", "gmtoffset": -18000 }},
                        "timestamp": [{TS_FEB_29}, {TS_MAR_1}],
                        "indicators": {{ "quote": [{{ "close": {closes} }}] }}
                    }}],
                    "error": null
                }}
            }}"#
        )
    }

    fn test_source(uri: &str) -> YahooFinanceSource {
        let fetch = FetchConfig {
            request_throttle_seconds: 0.0,
            retry_delay_seconds: 0.0,
            max_retries: 3,
            ..FetchConfig::default()
        };
        YahooFinanceSource::new(
            &YahooProviderConfig {
                base_url: uri.to_string(),
            },
            &fetch,
        )
        .unwrap()
    }

    pub async fn create_mock_server(symbol: &str, mock_response: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        let request_path = format!("/v8/finance/chart/{symbol}");

        Mock::given(method("GET"))
            .and(path(request_path))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        mock_server
    }

    #[tokio::test]
    async fn test_successful_price_fetch() {
        let mock_server = create_mock_server("AAPL", &chart_body("[178.1, 179.66789]")).await;
        let source = test_source(&mock_server.uri());

        let quote = source.stock_price("aapl", Market::Us).await.unwrap();
        assert_eq!(quote.code, "AAPL");
        assert_eq!(quote.value, Decimal::from_str("179.6679").unwrap());
        assert_eq!(quote.as_of, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[tokio::test]
    async fn test_latest_null_close_is_skipped() {
        let mock_server = create_mock_server("QQQ", &chart_body("[440.5, null]")).await;
        let source = test_source(&mock_server.uri());

        let quote = source.fund_nav("QQQ", Some(Market::Us)).await.unwrap();
        assert_eq!(quote.value, Decimal::from_str("440.5000").unwrap());
        assert_eq!(quote.as_of, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[tokio::test]
    async fn test_empty_month_widens_to_year() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/VTI"))
            .and(query_param("range", "1mo"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"chart": {"result": [{"meta": {}, "timestamp": null}], "error": null}}"#,
            ))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/VTI"))
            .and(query_param("range", "1y"))
            .respond_with(ResponseTemplate::new(200).set_body_string(chart_body("[250.0, 251.25]")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let source = test_source(&mock_server.uri());
        let quote = source.stock_price("VTI", Market::Us).await.unwrap();
        assert_eq!(quote.value, Decimal::from_str("251.2500").unwrap());
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/MSFT"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/MSFT"))
            .respond_with(ResponseTemplate::new(200).set_body_string(chart_body("[400.0, 410.0]")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let source = test_source(&mock_server.uri());
        let quote = source.stock_price("MSFT", Market::Us).await.unwrap();
        assert_eq!(quote.value, Decimal::from_str("410.0000").unwrap());
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_retries() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/MSFT"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&mock_server)
            .await;

        let source = test_source(&mock_server.uri());
        assert!(source.stock_price("MSFT", Market::Us).await.is_none());
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/ZZZZ"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#,
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let source = test_source(&mock_server.uri());
        assert!(source.stock_price("ZZZZ", Market::Us).await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_response_is_absent() {
        let mock_server = create_mock_server("AAPL", r#"{"chart": {"results": []}}"#).await;
        let source = test_source(&mock_server.uri());
        assert!(source.stock_price("AAPL", Market::Us).await.is_none());
    }

    #[tokio::test]
    async fn test_non_us_markets_are_rejected_without_requests() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&mock_server)
            .await;

        let source = test_source(&mock_server.uri());
        assert!(source.stock_price("600519", Market::Sh).await.is_none());
        assert!(source.fund_nav("000001", None).await.is_none());
    }

    #[tokio::test]
    async fn test_successful_rate_fetch() {
        let mock_server = create_mock_server("USDCNY=X", &chart_body("[7.1, 7.12346]")).await;
        let source = test_source(&mock_server.uri());

        let quote = source.exchange_rate("usd").await.unwrap();
        assert_eq!(quote.code, "USD");
        assert_eq!(quote.value, Decimal::from_str("7.1235").unwrap());
    }
}
