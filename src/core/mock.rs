//! In-memory data source for manager and orchestrator tests.

use crate::core::quote::{Market, Quote, parse_vendor_date, round_str};
use crate::core::source::{DataSourceType, QuoteSource};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) struct MockSource {
    name: String,
    source_type: DataSourceType,
    markets: Vec<Market>,
    quotes: HashMap<String, Quote>,
    panics: HashSet<String>,
    calls: AtomicUsize,
}

impl MockSource {
    pub(crate) fn new(source_type: DataSourceType, markets: &[Market]) -> Self {
        MockSource {
            name: format!("Mock {source_type}"),
            source_type,
            markets: markets.to_vec(),
            quotes: HashMap::new(),
            panics: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_quote(mut self, code: &str, value: &str, date: &str) -> Self {
        let quote = Quote::new(
            code,
            round_str(value, 4).unwrap(),
            parse_vendor_date(date).unwrap(),
        );
        self.quotes.insert(code.to_string(), quote);
        self
    }

    pub(crate) fn panicking_on(mut self, code: &str) -> Self {
        self.panics.insert(code.to_string());
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, code: &str) -> Option<Quote> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panics.contains(code) {
            panic!("lookup for {code} blew up");
        }
        self.quotes.get(code).cloned()
    }
}

#[async_trait]
impl QuoteSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> DataSourceType {
        self.source_type
    }

    fn supported_markets(&self) -> &[Market] {
        &self.markets
    }

    async fn stock_price(&self, code: &str, _market: Market) -> Option<Quote> {
        self.lookup(code)
    }

    async fn fund_nav(&self, code: &str, _market: Option<Market>) -> Option<Quote> {
        self.lookup(code)
    }

    async fn exchange_rate(&self, currency: &str) -> Option<Quote> {
        self.lookup(currency)
    }
}
