use crate::error::ProviderError;
use crate::ingest::provider::{normalize_bars, DataSource};
use crate::ingest::types::{FundamentalsRecord, Instrument, PriceBar};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Everything an [`InMemoryDataSource`] serves. Also the on-disk fixture format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketFixture {
    #[serde(default)]
    pub instruments: Vec<Instrument>,
    #[serde(default)]
    pub prices: HashMap<String, Vec<PriceBar>>,
    #[serde(default)]
    pub fundamentals: HashMap<String, FundamentalsRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list_instruments: usize,
    pub price_history: usize,
    pub fundamentals: usize,
}

/// Serves a fixed market from memory and counts every call.
#[derive(Debug, Default)]
pub struct InMemoryDataSource {
    fixture: MarketFixture,
    failures: HashMap<String, ProviderError>,
    list_calls: AtomicUsize,
    price_calls: AtomicUsize,
    fundamentals_calls: AtomicUsize,
}

impl InMemoryDataSource {
    pub fn new(fixture: MarketFixture) -> Self {
        Self {
            fixture,
            ..Self::default()
        }
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        let fixture = serde_json::from_str::<MarketFixture>(&text)
            .with_context(|| format!("fixture {} is not a valid market fixture", path.display()))?;
        Ok(Self::new(fixture))
    }

    /// Every call touching `symbol` fails with `err`.
    pub fn with_failure(mut self, symbol: &str, err: ProviderError) -> Self {
        self.failures.insert(symbol.to_string(), err);
        self
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            list_instruments: self.list_calls.load(Ordering::SeqCst),
            price_history: self.price_calls.load(Ordering::SeqCst),
            fundamentals: self.fundamentals_calls.load(Ordering::SeqCst),
        }
    }

    fn check_failure(&self, symbol: &str) -> Result<(), ProviderError> {
        match self.failures.get(symbol) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl DataSource for InMemoryDataSource {
    fn provider_name(&self) -> &'static str {
        "in_memory"
    }

    async fn list_instruments(&self) -> Result<Vec<Instrument>, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure("*")?;
        Ok(self.fixture.instruments.clone())
    }

    async fn get_price_history(
        &self,
        symbol: &str,
        lookback: usize,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure(symbol)?;
        let bars = self
            .fixture
            .prices
            .get(symbol)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                symbol: symbol.to_string(),
            })?;
        Ok(normalize_bars(bars, lookback))
    }

    async fn get_fundamentals(&self, symbol: &str) -> Result<FundamentalsRecord, ProviderError> {
        self.fundamentals_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure(symbol)?;
        self.fixture
            .fundamentals
            .get(symbol)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                symbol: symbol.to_string(),
            })
    }
}
