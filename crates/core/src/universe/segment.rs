use crate::config::ScanOptions;
use crate::ingest::types::PriceBar;
use thiserror::Error;

/// Market-cap and liquidity bounds. Caps are in crore units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentBounds {
    pub market_cap_min: f64,
    pub market_cap_max: f64,
    pub min_volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SegmentRejection {
    #[error("market cap {0:.0} cr outside bounds")]
    MarketCapOutOfRange(f64),
    #[error("average volume {0:.0} below minimum")]
    LowVolume(f64),
}

impl SegmentBounds {
    pub fn from_options(opts: &ScanOptions) -> Self {
        Self {
            market_cap_min: opts.market_cap_min,
            market_cap_max: opts.market_cap_max,
            min_volume: opts.min_volume,
        }
    }

    /// Unknown cap or unknown volume never excludes a name.
    pub fn check(
        &self,
        market_cap: Option<f64>,
        avg_volume: Option<f64>,
    ) -> Result<(), SegmentRejection> {
        if let Some(cap) = market_cap {
            if !(self.market_cap_min..=self.market_cap_max).contains(&cap) {
                return Err(SegmentRejection::MarketCapOutOfRange(cap));
            }
        }
        if let Some(vol) = avg_volume {
            if vol < self.min_volume {
                return Err(SegmentRejection::LowVolume(vol));
            }
        }
        Ok(())
    }
}

/// Mean volume over the last `window` bars that carry one.
pub fn average_volume(bars: &[PriceBar], window: usize) -> Option<f64> {
    let start = bars.len().saturating_sub(window);
    let vols: Vec<f64> = bars[start..]
        .iter()
        .filter_map(|b| b.volume)
        .filter(|v| v.is_finite())
        .collect();
    if vols.is_empty() {
        return None;
    }
    Some(vols.iter().sum::<f64>() / vols.len() as f64)
}
