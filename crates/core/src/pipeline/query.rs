use crate::domain::contract::OpportunityFilter;
use crate::domain::{OpportunityScore, Signal};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Highest overall score first, ticker ascending on ties.
pub fn rank(opportunities: &mut [OpportunityScore]) {
    opportunities.sort_by(|a, b| {
        b.overall_score
            .partial_cmp(&a.overall_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
}

/// Filters an already ranked list, keeping its order.
pub fn select(ranked: &[OpportunityScore], filter: &OpportunityFilter) -> Vec<OpportunityScore> {
    ranked
        .iter()
        .filter(|o| filter.matches(o))
        .take(filter.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect()
}

/// Count per signal, every signal present.
pub fn signal_distribution(opportunities: &[OpportunityScore]) -> BTreeMap<Signal, usize> {
    let mut out: BTreeMap<Signal, usize> = Signal::ALL.iter().map(|s| (*s, 0)).collect();
    for o in opportunities {
        *out.entry(o.signal).or_insert(0) += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::contract::ListQuery;
    use crate::domain::{
        FundamentalMetrics, MacdSignal, MovingAverageTrend, Sector, TechnicalIndicators,
    };
    use crate::scoring::{assemble, Subject};

    fn opp(ticker: &str, sector: Sector, rsi: f64, pe: f64) -> OpportunityScore {
        assemble(
            Subject {
                ticker,
                name: ticker,
                sector,
            },
            100.0,
            TechnicalIndicators {
                rsi,
                macd_signal: MacdSignal::Bullish,
                moving_avg_trend: MovingAverageTrend::Uptrend,
                volume_surge: false,
            },
            FundamentalMetrics {
                pe_ratio: pe,
                debt_to_equity: 0.5,
                roe: 12.0,
                revenue_growth: 8.0,
                market_cap: None,
            },
        )
    }

    fn ranked() -> Vec<OpportunityScore> {
        let mut v = vec![
            // 100 / 70 -> 85 STRONG_BUY
            opp("WIPRO", Sector::Technology, 50.0, 15.0),
            opp("TCS", Sector::Technology, 50.0, 15.0),
            // 65 / 50 -> 57.5 HOLD
            opp("SBIN", Sector::Financial, 80.0, 25.0),
            // 100 / 35 -> 67.5 BUY
            opp("CIPLA", Sector::Healthcare, 50.0, 35.0),
        ];
        rank(&mut v);
        v
    }

    fn tickers(v: &[OpportunityScore]) -> Vec<&str> {
        v.iter().map(|o| o.ticker.as_str()).collect()
    }

    #[test]
    fn ranks_by_score_then_ticker() {
        assert_eq!(tickers(&ranked()), vec!["TCS", "WIPRO", "CIPLA", "SBIN"]);
    }

    #[test]
    fn all_sentinel_equals_unfiltered() {
        let r = ranked();
        let all = ListQuery {
            signal: Some("ALL".to_string()),
            ..ListQuery::default()
        }
        .validate_and_into_filter()
        .unwrap();
        let none = ListQuery::default().validate_and_into_filter().unwrap();
        assert_eq!(select(&r, &all), select(&r, &none));
        assert_eq!(select(&r, &none).len(), 4);
    }

    #[test]
    fn filters_compose() {
        let r = ranked();
        let f = ListQuery {
            signal: Some("STRONG_BUY".to_string()),
            sector: Some("tech".to_string()),
            limit: Some(1),
            ..ListQuery::default()
        }
        .validate_and_into_filter()
        .unwrap();
        assert_eq!(tickers(&select(&r, &f)), vec!["TCS"]);

        let f = ListQuery {
            min_score: Some(60.0),
            ..ListQuery::default()
        }
        .validate_and_into_filter()
        .unwrap();
        assert_eq!(tickers(&select(&r, &f)), vec!["TCS", "WIPRO", "CIPLA"]);
    }

    #[test]
    fn distribution_lists_every_signal() {
        let d = signal_distribution(&ranked());
        assert_eq!(d.len(), 5);
        assert_eq!(d[&Signal::StrongBuy], 2);
        assert_eq!(d[&Signal::Buy], 1);
        assert_eq!(d[&Signal::Hold], 1);
        assert_eq!(d[&Signal::Sell], 0);
        assert_eq!(d[&Signal::StrongSell], 0);
    }
}
