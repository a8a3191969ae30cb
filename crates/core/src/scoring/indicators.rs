use crate::domain::{MacdSignal, MovingAverageTrend, TechnicalIndicators};
use crate::error::{ScanError, ScanResult};
use crate::ingest::types::PriceBar;
use ta::indicators::{MovingAverageConvergenceDivergence, SimpleMovingAverage};
use ta::Next;

pub const RSI_PERIOD: usize = 14;
pub const NEUTRAL_RSI: f64 = 50.0;

const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;

const SHORT_MA: usize = 20;
const LONG_MA: usize = 50;

const VOLUME_AVG_WINDOW: usize = 20;
const VOLUME_SURGE_FACTOR: f64 = 1.5;

/// Indicators over `bars` (oldest first).
pub fn compute(bars: &[PriceBar]) -> ScanResult<TechnicalIndicators> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    Ok(TechnicalIndicators {
        rsi: wilder_rsi(&closes, RSI_PERIOD),
        macd_signal: macd_signal(&closes)?,
        moving_avg_trend: moving_average_trend(&closes)?,
        volume_surge: volume_surge(bars),
    })
}

/// RSI with Wilder smoothing: seeded with the simple mean of the first
/// `period` moves, then `avg = (avg * (period - 1) + move) / period`.
///
/// Neutral (50) with fewer than `period + 1` closes or no movement at all.
pub fn wilder_rsi(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() <= period {
        return NEUTRAL_RSI;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let (seed, rest) = deltas.split_at(period);
    let p = period as f64;

    let mut avg_gain = seed.iter().map(|d| d.max(0.0)).sum::<f64>() / p;
    let mut avg_loss = seed.iter().map(|d| (-d).max(0.0)).sum::<f64>() / p;

    for d in rest {
        avg_gain = (avg_gain * (p - 1.0) + d.max(0.0)) / p;
        avg_loss = (avg_loss * (p - 1.0) + (-d).max(0.0)) / p;
    }

    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { NEUTRAL_RSI } else { 100.0 };
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// 12/26/9 MACD line against its signal line on the last bar.
pub fn macd_signal(closes: &[f64]) -> ScanResult<MacdSignal> {
    if closes.len() < MACD_SLOW {
        return Ok(MacdSignal::Neutral);
    }

    let mut macd = MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL)
        .map_err(|e| ScanError::Internal(format!("macd: {e}")))?;

    let mut last = None;
    for &close in closes {
        last = Some(macd.next(close));
    }

    Ok(match last {
        Some(out) if out.macd > out.signal => MacdSignal::Bullish,
        Some(out) if out.macd < out.signal => MacdSignal::Bearish,
        _ => MacdSignal::Neutral,
    })
}

/// Last close against the 20- and 50-session SMAs. The long average is only
/// consulted once there are enough sessions for it.
pub fn moving_average_trend(closes: &[f64]) -> ScanResult<MovingAverageTrend> {
    let (Some(&price), Some(ma20)) = (closes.last(), last_sma(closes, SHORT_MA)?) else {
        return Ok(MovingAverageTrend::Neutral);
    };
    let ma50 = last_sma(closes, LONG_MA)?;

    let trend = if price > ma20 {
        if ma50.is_some_and(|ma50| ma20 > ma50) {
            MovingAverageTrend::StrongUptrend
        } else {
            MovingAverageTrend::Uptrend
        }
    } else if price < ma20 {
        if ma50.is_some_and(|ma50| ma20 < ma50) {
            MovingAverageTrend::StrongDowntrend
        } else {
            MovingAverageTrend::Downtrend
        }
    } else {
        MovingAverageTrend::Neutral
    };
    Ok(trend)
}

fn last_sma(closes: &[f64], period: usize) -> ScanResult<Option<f64>> {
    if closes.len() < period {
        return Ok(None);
    }
    let mut sma = SimpleMovingAverage::new(period)
        .map_err(|e| ScanError::Internal(format!("sma({period}): {e}")))?;
    let mut last = None;
    for &close in closes {
        last = Some(sma.next(close));
    }
    Ok(last)
}

/// Last session's volume above 1.5x the mean of the 20 sessions before it.
pub fn volume_surge(bars: &[PriceBar]) -> bool {
    if bars.len() < VOLUME_AVG_WINDOW + 1 {
        return false;
    }
    let Some(current) = bars.last().and_then(|b| b.volume) else {
        return false;
    };

    let end = bars.len() - 1;
    let prior: Vec<f64> = bars[end - VOLUME_AVG_WINDOW..end]
        .iter()
        .filter_map(|b| b.volume)
        .collect();
    if prior.is_empty() {
        return false;
    }
    let avg = prior.iter().sum::<f64>() / prior.len() as f64;
    current > avg * VOLUME_SURGE_FACTOR
}
