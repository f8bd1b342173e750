//! Domestic data source over the Eastmoney and Tencent market data endpoints.
//!
//! Every lookup is a fixed-order chain of methods hitting different endpoints;
//! the first method that yields a dated value wins.

use crate::core::config::{AkshareProviderConfig, FetchConfig};
use crate::core::error::ProviderError;
use crate::core::quote::{Market, Quote, parse_vendor_date, round_str};
use crate::core::source::{DataSourceType, QuoteSource};
use crate::providers::util::{Method, client_builder, first_success, get_text};
use async_trait::async_trait;
use futures::FutureExt;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

const PROVIDER: &str = "AKSHARE";
const SUPPORTED_MARKETS: [Market; 6] = [
    Market::Sh,
    Market::Sz,
    Market::Bj,
    Market::Of,
    Market::Us,
    Market::Hk,
];

pub struct AkshareSource {
    config: AkshareProviderConfig,
    client: reqwest::Client,
    decimal_places: u32,
}

impl AkshareSource {
    pub fn new(config: &AkshareProviderConfig, fetch: &FetchConfig) -> Result<Self, reqwest::Error> {
        // The fund history endpoint rejects requests without an Eastmoney referer.
        let mut headers = HeaderMap::new();
        headers.insert(
            REFERER,
            HeaderValue::from_static("https://fundf10.eastmoney.com/"),
        );
        let client = client_builder(fetch.timeout())
            .default_headers(headers)
            .build()?;

        Ok(AkshareSource {
            config: AkshareProviderConfig {
                eastmoney_url: config.eastmoney_url.trim_end_matches('/').to_string(),
                tencent_url: config.tencent_url.trim_end_matches('/').to_string(),
                fund_url: config.fund_url.trim_end_matches('/').to_string(),
                fund_estimate_url: config.fund_estimate_url.trim_end_matches('/').to_string(),
            },
            client,
            decimal_places: fetch.decimal_places,
        })
    }
}

#[derive(Deserialize, Debug)]
struct KlineResponse {
    data: Option<KlineData>,
}

#[derive(Deserialize, Debug)]
struct KlineData {
    #[serde(default)]
    klines: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct FundHistoryResponse {
    #[serde(rename = "Data")]
    data: Option<FundHistoryData>,
}

#[derive(Deserialize, Debug)]
struct FundHistoryData {
    #[serde(rename = "LSJZList", default)]
    rows: Vec<FundHistoryRow>,
}

#[derive(Deserialize, Debug)]
struct FundHistoryRow {
    #[serde(rename = "FSRQ")]
    date: String,
    #[serde(rename = "DWJZ")]
    nav: String,
}

#[derive(Deserialize, Debug)]
struct FundEstimate {
    jzrq: String,
    dwjz: String,
}

fn parse_url(raw: &str, params: &[(&str, &str)]) -> Result<reqwest::Url, ProviderError> {
    reqwest::Url::parse_with_params(raw, params)
        .map_err(|e| ProviderError::Parse(format!("Invalid URL {raw}: {e}")))
}

/// Strips a `callback({...});` JSONP wrapper.
fn unwrap_jsonp(body: &str) -> Option<&str> {
    let start = body.find('(')?;
    let end = body.rfind(')')?;
    (start < end).then(|| &body[start + 1..end])
}

impl AkshareSource {
    fn quote(&self, code: &str, value: &str, date: &str) -> Option<Quote> {
        let value = round_str(value, self.decimal_places)?;
        let as_of = parse_vendor_date(date)?;
        Some(Quote::new(code, value, as_of))
    }

    /// Daily kline rows are `date,open,close`; the last row is the newest.
    async fn eastmoney_kline(&self, code: &str, secid: &str) -> Result<Option<Quote>, ProviderError> {
        let url = parse_url(
            &format!("{}/api/qt/stock/kline/get", self.config.eastmoney_url),
            &[
                ("secid", secid),
                ("fields1", "f1,f2,f3"),
                ("fields2", "f51,f52,f53"),
                ("klt", "101"),
                ("fqt", "1"),
                ("end", "20500101"),
                ("lmt", "5"),
            ],
        )?;
        let text = get_text(&self.client, PROVIDER, url, secid).await?;
        let response: KlineResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Parse(format!("Failed to parse kline for {secid}: {e}")))?;

        let Some(data) = response.data else {
            return Ok(None);
        };
        Ok(data.klines.last().and_then(|row| {
            let fields: Vec<&str> = row.split(',').collect();
            match fields.as_slice() {
                [date, _open, close, ..] => self.quote(code, close, date),
                _ => None,
            }
        }))
    }

    /// Forward-adjusted daily bars: `[date, open, close, high, low, volume, ...]`.
    async fn tencent_kline(&self, code: &str, symbol: &str) -> Result<Option<Quote>, ProviderError> {
        let param = format!("{symbol},day,,,5,qfq");
        let url = parse_url(
            &format!("{}/appstock/app/fqkline/get", self.config.tencent_url),
            &[("param", param.as_str())],
        )?;
        let text = get_text(&self.client, PROVIDER, url, symbol).await?;
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Parse(format!("Failed to parse kline for {symbol}: {e}")))?;

        let series = &body["data"][symbol];
        let rows = series["qfqday"]
            .as_array()
            .or_else(|| series["day"].as_array());
        Ok(rows.and_then(|rows| rows.last()).and_then(|row| {
            let date = row.get(0)?.as_str()?;
            let close = row.get(2)?.as_str()?;
            self.quote(code, close, date)
        }))
    }

    async fn fund_history(&self, code: &str) -> Result<Option<Quote>, ProviderError> {
        let url = parse_url(
            &format!("{}/f10/lsjz", self.config.fund_url),
            &[("fundCode", code), ("pageIndex", "1"), ("pageSize", "1")],
        )?;
        let text = get_text(&self.client, PROVIDER, url, code).await?;
        let response: FundHistoryResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderError::Parse(format!("Failed to parse fund history for {code}: {e}"))
        })?;

        Ok(response
            .data
            .and_then(|data| data.rows.into_iter().next())
            .and_then(|row| self.quote(code, &row.nav, &row.date)))
    }

    async fn fund_estimate(&self, code: &str) -> Result<Option<Quote>, ProviderError> {
        let raw = format!("{}/js/{}.js", self.config.fund_estimate_url, code);
        let url = reqwest::Url::parse(&raw)
            .map_err(|e| ProviderError::Parse(format!("Invalid URL {raw}: {e}")))?;
        let text = get_text(&self.client, PROVIDER, url, code).await?;
        let Some(json) = unwrap_jsonp(&text) else {
            return Ok(None);
        };
        if json.trim().is_empty() {
            return Ok(None);
        }
        let estimate: FundEstimate = serde_json::from_str(json).map_err(|e| {
            ProviderError::Parse(format!("Failed to parse fund estimate for {code}: {e}"))
        })?;
        Ok(self.quote(code, &estimate.dwjz, &estimate.jzrq))
    }

    async fn a_share_price(&self, code: &str, market: Market) -> Option<Quote> {
        let (secid, symbol) = match market {
            Market::Sh => (format!("1.{code}"), format!("sh{code}")),
            Market::Sz => (format!("0.{code}"), format!("sz{code}")),
            Market::Bj => (format!("0.{code}"), format!("bj{code}")),
            _ => return None,
        };

        let methods: Vec<Method<'_>> = vec![
            ("eastmoney_kline", self.eastmoney_kline(code, &secid).boxed()),
            ("tencent_kline", self.tencent_kline(code, &symbol).boxed()),
        ];
        let quote = first_success(PROVIDER, code, methods).await;
        match &quote {
            Some(q) => info!("Fetched stock {} close {} on {}", code, q.value, q.as_of),
            None => warn!("No method could fetch stock {}", code),
        }
        quote
    }

    async fn us_price(&self, code: &str) -> Option<Quote> {
        let code = code.trim().to_uppercase();
        let nasdaq = format!("105.{code}");
        let nyse = format!("106.{code}");
        let tencent = format!("us{code}");

        let methods: Vec<Method<'_>> = vec![
            ("eastmoney_nasdaq", self.eastmoney_kline(&code, &nasdaq).boxed()),
            ("eastmoney_nyse", self.eastmoney_kline(&code, &nyse).boxed()),
            ("tencent_us", self.tencent_kline(&code, &tencent).boxed()),
        ];
        first_success(PROVIDER, &code, methods).await
    }

    async fn domestic_fund_nav(&self, code: &str) -> Option<Quote> {
        let methods: Vec<Method<'_>> = vec![
            ("fund_history", self.fund_history(code).boxed()),
            ("fund_estimate", self.fund_estimate(code).boxed()),
        ];
        first_success(PROVIDER, code, methods).await
    }
}

#[async_trait]
impl QuoteSource for AkshareSource {
    fn name(&self) -> &str {
        "Akshare (A-shares, US stocks, funds, exchange rates)"
    }

    fn source_type(&self) -> DataSourceType {
        DataSourceType::Akshare
    }

    fn supported_markets(&self) -> &[Market] {
        &SUPPORTED_MARKETS
    }

    async fn stock_price(&self, code: &str, market: Market) -> Option<Quote> {
        match market {
            Market::Sh | Market::Sz | Market::Bj => self.a_share_price(code.trim(), market).await,
            Market::Us => self.us_price(code).await,
            _ => {
                warn!("Akshare has no stock price method for market {}", market);
                None
            }
        }
    }

    async fn fund_nav(&self, code: &str, market: Option<Market>) -> Option<Quote> {
        match market {
            // Foreign funds are ETFs priced through the equity chain
            Some(Market::Us) => self.us_price(code).await,
            _ => self.domestic_fund_nav(code.trim()).await,
        }
    }

    async fn exchange_rate(&self, currency: &str) -> Option<Quote> {
        let currency = currency.trim().to_uppercase();
        let central_parity = format!("120.{currency}CNYC");
        let offshore = format!("133.{currency}CNH");

        let methods: Vec<Method<'_>> = vec![
            (
                "central_parity",
                self.eastmoney_kline(&currency, &central_parity).boxed(),
            ),
            ("offshore", self.eastmoney_kline(&currency, &offshore).boxed()),
        ];
        let quote = first_success(PROVIDER, &currency, methods).await;
        if let Some(q) = &quote {
            info!("Fetched {}/CNY rate {} on {}", currency, q.value, q.as_of);
        }
        quote
    }
}
