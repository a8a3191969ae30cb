use crate::domain::opportunity::{FundamentalMetrics, OpportunityScore, Signal};
use crate::error::{ScanError, ScanResult};
use crate::ingest::types::FundamentalsRecord;
use serde::{Deserialize, Serialize};

/// Sentinel accepted by the signal filter meaning "no filter".
pub const ALL_SIGNALS: &str = "all";

impl FundamentalsRecord {
    /// All four scoring metrics must be present and finite. D/E may be derived
    /// from the balance sheet when the ratio itself is absent; nothing else is
    /// ever substituted.
    pub fn validate_and_into_metrics(&self, symbol: &str) -> ScanResult<FundamentalMetrics> {
        let pe_ratio = finite(self.pe_ratio);
        let debt_to_equity = finite(self.debt_to_equity).or_else(|| self.derived_debt_to_equity());
        let roe = finite(self.roe);
        let revenue_growth = finite(self.revenue_growth);

        match (pe_ratio, debt_to_equity, roe, revenue_growth) {
            (Some(pe_ratio), Some(debt_to_equity), Some(roe), Some(revenue_growth)) => {
                Ok(FundamentalMetrics {
                    pe_ratio,
                    debt_to_equity,
                    roe,
                    revenue_growth,
                    market_cap: finite(self.market_cap),
                })
            }
            _ => {
                let missing: Vec<&str> = [
                    ("pe_ratio", pe_ratio),
                    ("debt_to_equity", debt_to_equity),
                    ("roe", roe),
                    ("revenue_growth", revenue_growth),
                ]
                .into_iter()
                .filter_map(|(k, v)| v.is_none().then_some(k))
                .collect();
                Err(ScanError::data_unavailable(
                    symbol,
                    format!("missing fundamental data ({})", missing.join(", ")),
                ))
            }
        }
    }

    fn derived_debt_to_equity(&self) -> Option<f64> {
        let debt = finite(self.total_debt)?;
        let equity = finite(self.reserves)? + finite(self.share_capital).unwrap_or(0.0);
        (equity > 0.0).then(|| debt / equity)
    }
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

/// Raw list parameters as a caller sends them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuery {
    pub signal: Option<String>,
    pub min_score: Option<f64>,
    pub sector: Option<String>,
    pub limit: Option<usize>,
}

/// Validated form of [`ListQuery`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpportunityFilter {
    pub signal: Option<Signal>,
    pub min_score: Option<f64>,
    sector_lower: Option<String>,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn validate_and_into_filter(self) -> ScanResult<OpportunityFilter> {
        let signal = match self.signal.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) if s.eq_ignore_ascii_case(ALL_SIGNALS) => None,
            Some(s) => Some(Signal::from_name(s).ok_or_else(|| {
                ScanError::InvalidParameter(format!(
                    "unknown signal {s:?}; expected one of STRONG_BUY, BUY, HOLD, SELL, STRONG_SELL or \"all\""
                ))
            })?),
        };

        if let Some(min) = self.min_score {
            if !(0.0..=100.0).contains(&min) {
                return Err(ScanError::InvalidParameter(format!(
                    "min_score must be between 0 and 100 (got {min})"
                )));
            }
        }

        if self.limit == Some(0) {
            return Err(ScanError::InvalidParameter(
                "limit must be >= 1".to_string(),
            ));
        }

        let sector_lower = self
            .sector
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        Ok(OpportunityFilter {
            signal,
            min_score: self.min_score,
            sector_lower,
            limit: self.limit,
        })
    }
}

impl OpportunityFilter {
    pub fn matches(&self, opp: &OpportunityScore) -> bool {
        if let Some(signal) = self.signal {
            if opp.signal != signal {
                return false;
            }
        }
        if let Some(min) = self.min_score {
            if opp.overall_score < min {
                return false;
            }
        }
        if let Some(sector) = &self.sector_lower {
            if !opp.sector.label().to_lowercase().contains(sector.as_str()) {
                return false;
            }
        }
        true
    }
}
