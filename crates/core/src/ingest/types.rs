use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::domain::instrument::Instrument;

/// One session of OHLCV. Ordered oldest first wherever a `Vec<PriceBar>` appears.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    #[serde(alias = "date")]
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

/// Fundamentals as the provider reports them. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalsRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    #[serde(default)]
    pub debt_to_equity: Option<f64>,
    #[serde(default)]
    pub total_debt: Option<f64>,
    #[serde(default)]
    pub reserves: Option<f64>,
    #[serde(default)]
    pub share_capital: Option<f64>,
    #[serde(default)]
    pub roe: Option<f64>,
    #[serde(default)]
    pub revenue_growth: Option<f64>,
    /// Crore units.
    #[serde(default)]
    pub market_cap: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentsResponse {
    pub items: Vec<Instrument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistoryResponse {
    pub symbol: String,
    pub bars: Vec<PriceBar>,
}
