use crate::domain::{
    FundamentalMetrics, MacdSignal, MovingAverageTrend, OpportunityScore, Sector, Signal,
    TechnicalIndicators,
};
use crate::error::{ScanError, ScanResult};
use crate::ingest::types::{FundamentalsRecord, PriceBar};
use crate::scoring::indicators;

const BASE_SCORE: f64 = 50.0;

const BULL_TARGET: f64 = 1.15;
const BULL_STOP: f64 = 0.92;
const BEAR_TARGET: f64 = 0.95;
const BEAR_STOP: f64 = 1.05;

/// One scored rule. Positive points explain a buy, negative points a risk.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub points: f64,
    pub reason: String,
}

impl Contribution {
    fn new(points: f64, reason: impl Into<String>) -> Self {
        Self {
            points,
            reason: reason.into(),
        }
    }
}

/// Rules in order: RSI, MACD, moving-average trend, volume.
pub fn technical_contributions(t: &TechnicalIndicators) -> Vec<Contribution> {
    let mut out = Vec::with_capacity(4);
    let rsi = t.rsi;

    if (30.0..=70.0).contains(&rsi) {
        out.push(Contribution::new(20.0, format!("RSI {rsi:.1} in healthy 30-70 range")));
    } else if rsi < 30.0 {
        out.push(Contribution::new(
            15.0,
            format!("RSI {rsi:.1} indicates oversold condition; potential reversal"),
        ));
    } else if rsi > 70.0 {
        out.push(Contribution::new(
            -15.0,
            format!("RSI {rsi:.1} indicates overbought condition; potential correction"),
        ));
    }

    match t.macd_signal {
        MacdSignal::Bullish => out.push(Contribution::new(15.0, "MACD showing bullish momentum")),
        MacdSignal::Bearish => out.push(Contribution::new(-15.0, "MACD showing bearish momentum")),
        MacdSignal::Neutral => {}
    }

    match t.moving_avg_trend {
        MovingAverageTrend::StrongUptrend => out.push(Contribution::new(
            15.0,
            "Strong uptrend: price above a rising 20-day average",
        )),
        MovingAverageTrend::Uptrend => {
            out.push(Contribution::new(15.0, "Price trading above its 20-day average"))
        }
        MovingAverageTrend::StrongDowntrend => out.push(Contribution::new(
            -15.0,
            "Strong downtrend: price below a falling 20-day average",
        )),
        MovingAverageTrend::Downtrend => {
            out.push(Contribution::new(-15.0, "Price trading below its 20-day average"))
        }
        MovingAverageTrend::Neutral => {}
    }

    if t.volume_surge {
        out.push(Contribution::new(
            10.0,
            "Unusual volume surge indicates institutional interest",
        ));
    }

    out
}

/// Rules in order: P/E, ROE, debt/equity, revenue growth.
pub fn fundamental_contributions(f: &FundamentalMetrics) -> Vec<Contribution> {
    let mut out = Vec::with_capacity(4);

    let pe = f.pe_ratio;
    if (10.0..=20.0).contains(&pe) {
        out.push(Contribution::new(20.0, format!("Reasonable valuation at P/E {pe:.1}")));
    } else if pe < 10.0 {
        out.push(Contribution::new(15.0, format!("Attractive valuation with low P/E {pe:.1}")));
    } else if pe > 30.0 {
        out.push(Contribution::new(
            -15.0,
            format!("High valuation at P/E {pe:.1} may limit upside potential"),
        ));
    }

    let roe = f.roe;
    if roe > 20.0 {
        out.push(Contribution::new(
            20.0,
            format!("Strong return on equity ({roe:.1}%) indicates efficient management"),
        ));
    } else if roe >= 15.0 {
        out.push(Contribution::new(10.0, format!("Healthy return on equity ({roe:.1}%)")));
    } else if roe < 10.0 {
        out.push(Contribution::new(-10.0, format!("Weak return on equity ({roe:.1}%)")));
    }

    let de = f.debt_to_equity;
    if de < 0.3 {
        out.push(Contribution::new(15.0, format!("Low leverage (D/E {de:.2})")));
    } else if de > 1.0 {
        out.push(Contribution::new(
            -15.0,
            format!("High debt levels (D/E {de:.2}) may impact financial stability"),
        ));
    }

    let growth = f.revenue_growth;
    if growth > 20.0 {
        out.push(Contribution::new(
            15.0,
            format!("Strong revenue growth trajectory ({growth:.1}%)"),
        ));
    } else if growth >= 10.0 {
        out.push(Contribution::new(10.0, format!("Steady revenue growth ({growth:.1}%)")));
    } else if growth < 5.0 {
        out.push(Contribution::new(
            -10.0,
            format!("Slow revenue growth ({growth:.1}%) may indicate business challenges"),
        ));
    }

    out
}

/// `50 + sum(points)`, clamped to 0..=100.
pub fn sub_score(contributions: &[Contribution]) -> f64 {
    let sum: f64 = contributions.iter().map(|c| c.points).sum();
    (BASE_SCORE + sum).clamp(0.0, 100.0)
}

/// `(target, stop)` for a signal at `price`, rounded to 2 decimals.
pub fn price_levels(signal: Signal, price: f64) -> (f64, f64) {
    let (target, stop) = if signal.is_bullish() {
        (price * BULL_TARGET, price * BULL_STOP)
    } else if signal.is_bearish() {
        (price * BEAR_TARGET, price * BEAR_STOP)
    } else {
        (price, price)
    };
    (round2(target), round2(stop))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Who is being scored.
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    pub ticker: &'a str,
    pub name: &'a str,
    pub sector: Sector,
}

/// Builds the score from already computed inputs. Pure: same inputs, same
/// output, reasons included.
pub fn assemble(
    subject: Subject<'_>,
    current_price: f64,
    technical: TechnicalIndicators,
    fundamentals: FundamentalMetrics,
) -> OpportunityScore {
    let tech = technical_contributions(&technical);
    let fund = fundamental_contributions(&fundamentals);

    let technical_score = sub_score(&tech);
    let fundamental_score = sub_score(&fund);
    let overall_score = (technical_score + fundamental_score) / 2.0;

    let signal = Signal::for_score(overall_score);
    let (target_price, stop_loss) = price_levels(signal, current_price);

    let (buy_reasons, risk_factors) = tech.into_iter().chain(fund).fold(
        (Vec::new(), Vec::new()),
        |(mut buys, mut risks), c| {
            if c.points > 0.0 {
                buys.push(c.reason);
            } else if c.points < 0.0 {
                risks.push(c.reason);
            }
            (buys, risks)
        },
    );

    OpportunityScore {
        ticker: subject.ticker.to_string(),
        name: subject.name.to_string(),
        sector: subject.sector,
        current_price,
        market_cap: fundamentals.market_cap,
        technical,
        fundamentals,
        technical_score,
        fundamental_score,
        overall_score,
        signal,
        confidence: signal.confidence(),
        target_price,
        stop_loss,
        buy_reasons,
        risk_factors,
    }
}

pub const INSUFFICIENT_HISTORY: &str = "insufficient price history";

/// Skip reason for a ticker with fewer than `needed` sessions.
pub fn history_shortfall(have: usize, needed: usize) -> String {
    format!("{INSUFFICIENT_HISTORY} ({have} of {needed} sessions)")
}

/// Full scoring of one ticker from raw provider data.
///
/// Fails with `DataUnavailable` when there are fewer than `min_history_bars`
/// sessions or any fundamental metric is missing. Nothing is ever defaulted.
pub fn score(
    subject: Subject<'_>,
    bars: &[PriceBar],
    record: &FundamentalsRecord,
    min_history_bars: usize,
) -> ScanResult<OpportunityScore> {
    let Some(last) = bars.last().filter(|_| bars.len() >= min_history_bars) else {
        return Err(ScanError::data_unavailable(
            subject.ticker,
            history_shortfall(bars.len(), min_history_bars),
        ));
    };
    let fundamentals = record.validate_and_into_metrics(subject.ticker)?;
    let technical = indicators::compute(bars)?;

    Ok(assemble(subject, last.close, technical, fundamentals))
}
