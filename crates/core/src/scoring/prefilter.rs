use crate::ingest::types::PriceBar;

const PRICE_WEIGHT: f64 = 0.6;
const VOLUME_WEIGHT: f64 = 0.4;

/// Cheap momentum proxy computed before the full indicator pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrefilterScore {
    /// Where the last close sits in the window's low..high range, 0..=1.
    pub price_position: f64,
    /// Mean volume of the recent half over the older half.
    pub volume_strength: f64,
    pub score: f64,
}

impl PrefilterScore {
    pub fn admits(&self, threshold: f64) -> bool {
        self.score >= threshold
    }
}

/// Scores the last `window` bars. `None` when there are no bars at all.
pub fn prefilter_score(bars: &[PriceBar], window: usize) -> Option<PrefilterScore> {
    let bars = &bars[bars.len().saturating_sub(window)..];
    let last = bars.last()?;

    let high = bars.iter().map(|b| b.high.max(b.close)).fold(f64::MIN, f64::max);
    let low = bars.iter().map(|b| b.low.min(b.close)).fold(f64::MAX, f64::min);
    let price_position = if high > low {
        ((last.close - low) / (high - low)).clamp(0.0, 1.0)
    } else {
        0.5
    };

    let (older, recent) = bars.split_at(bars.len() / 2);
    let volume_strength = match (mean_volume(recent), mean_volume(older)) {
        (Some(r), Some(o)) if o > 0.0 => r / o,
        _ => 1.0,
    };

    Some(PrefilterScore {
        price_position,
        volume_strength,
        score: PRICE_WEIGHT * price_position + VOLUME_WEIGHT * volume_strength,
    })
}

fn mean_volume(bars: &[PriceBar]) -> Option<f64> {
    let vols: Vec<f64> = bars.iter().filter_map(|b| b.volume).collect();
    if vols.is_empty() {
        None
    } else {
        Some(vols.iter().sum::<f64>() / vols.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars(closes: &[f64], volumes: &[Option<f64>]) -> Vec<PriceBar> {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&c, &v))| PriceBar {
                timestamp: t0 + Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: v,
            })
            .collect()
    }

    #[test]
    fn close_at_top_with_rising_volume() {
        let closes = [10.0, 11.0, 12.0, 13.0];
        let vols = [Some(100.0), Some(100.0), Some(200.0), Some(200.0)];
        let s = prefilter_score(&bars(&closes, &vols), 30).unwrap();
        assert_eq!(s.price_position, 1.0);
        assert_eq!(s.volume_strength, 2.0);
        assert!((s.score - (0.6 + 0.8)).abs() < 1e-12);
        assert!(s.admits(0.4));
    }

    #[test]
    fn close_at_bottom_with_fading_volume_is_rejected() {
        let closes = [13.0, 12.0, 11.0, 10.0];
        let vols = [Some(200.0), Some(200.0), Some(100.0), Some(100.0)];
        let s = prefilter_score(&bars(&closes, &vols), 30).unwrap();
        assert_eq!(s.price_position, 0.0);
        assert_eq!(s.volume_strength, 0.5);
        assert!((s.score - 0.2).abs() < 1e-12);
        assert!(!s.admits(0.4));
    }

    #[test]
    fn flat_window_and_zero_denominator_are_neutral() {
        let closes = [10.0; 4];
        let vols = [Some(0.0), Some(0.0), Some(50.0), Some(50.0)];
        let s = prefilter_score(&bars(&closes, &vols), 30).unwrap();
        assert_eq!(s.price_position, 0.5);
        assert_eq!(s.volume_strength, 1.0);
        assert!((s.score - 0.7).abs() < 1e-12);

        let none = [None; 4];
        let s = prefilter_score(&bars(&closes, &none), 30).unwrap();
        assert_eq!(s.volume_strength, 1.0);
    }

    #[test]
    fn threshold_is_inclusive() {
        let s = PrefilterScore {
            price_position: 0.0,
            volume_strength: 1.0,
            score: 0.4,
        };
        assert!(s.admits(0.4));
    }

    #[test]
    fn only_the_window_counts() {
        // A spike far outside the window does not set the range.
        let mut closes = vec![1_000.0];
        closes.extend([10.0, 11.0, 12.0, 13.0]);
        let vols = vec![Some(100.0); 5];
        let s = prefilter_score(&bars(&closes, &vols), 4).unwrap();
        assert_eq!(s.price_position, 1.0);
    }

    #[test]
    fn empty_history_has_no_score() {
        assert!(prefilter_score(&[], 30).is_none());
    }
}
