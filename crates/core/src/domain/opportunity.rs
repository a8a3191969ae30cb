use crate::domain::instrument::Sector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Signal {
    pub const ALL: [Signal; 5] = [
        Signal::StrongBuy,
        Signal::Buy,
        Signal::Hold,
        Signal::Sell,
        Signal::StrongSell,
    ];

    /// Step function over the composite score. Bands are left-inclusive and
    /// evaluated from the top.
    pub fn for_score(overall_score: f64) -> Self {
        if overall_score >= 80.0 {
            Signal::StrongBuy
        } else if overall_score >= 65.0 {
            Signal::Buy
        } else if overall_score >= 35.0 {
            Signal::Hold
        } else if overall_score >= 20.0 {
            Signal::Sell
        } else {
            Signal::StrongSell
        }
    }

    pub fn confidence(self) -> f64 {
        match self {
            Signal::StrongBuy | Signal::StrongSell => 0.90,
            Signal::Buy | Signal::Sell => 0.70,
            Signal::Hold => 0.50,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Signal::StrongBuy => "STRONG_BUY",
            Signal::Buy => "BUY",
            Signal::Hold => "HOLD",
            Signal::Sell => "SELL",
            Signal::StrongSell => "STRONG_SELL",
        }
    }

    /// Case-insensitive lookup by wire name. `None` for anything else,
    /// including the "all" sentinel (handled by the caller).
    pub fn from_name(s: &str) -> Option<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|sig| sig.as_str() == upper)
    }

    pub fn is_bullish(self) -> bool {
        matches!(self, Signal::StrongBuy | Signal::Buy)
    }

    pub fn is_bearish(self) -> bool {
        matches!(self, Signal::StrongSell | Signal::Sell)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MacdSignal {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovingAverageTrend {
    StrongUptrend,
    Uptrend,
    Neutral,
    Downtrend,
    StrongDowntrend,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TechnicalIndicators {
    pub rsi: f64,
    pub macd_signal: MacdSignal,
    pub moving_avg_trend: MovingAverageTrend,
    pub volume_surge: bool,
}

/// Validated valuation metrics. Every field is present; see
/// [`FundamentalsRecord::validate_and_into_metrics`](crate::ingest::types::FundamentalsRecord).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundamentalMetrics {
    pub pe_ratio: f64,
    pub debt_to_equity: f64,
    /// Percent.
    pub roe: f64,
    /// Percent.
    pub revenue_growth: f64,
    pub market_cap: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityScore {
    pub ticker: String,
    pub name: String,
    pub sector: Sector,
    pub current_price: f64,
    pub market_cap: Option<f64>,
    pub technical: TechnicalIndicators,
    pub fundamentals: FundamentalMetrics,
    pub technical_score: f64,
    pub fundamental_score: f64,
    pub overall_score: f64,
    pub signal: Signal,
    pub confidence: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    pub buy_reasons: Vec<String>,
    pub risk_factors: Vec<String>,
}

/// Per-stage survivor counts of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub universe: usize,
    pub tradeable: usize,
    pub sampled: usize,
    pub segment_passed: usize,
    pub prefilter_passed: usize,
    pub shortlisted: usize,
    pub scored: usize,
    pub skipped: usize,
}

/// One complete scan result. Published whole and never edited in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub scan_id: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub opportunities: Vec<OpportunityScore>,
    pub stats: ScanStats,
}
