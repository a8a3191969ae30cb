use oppscan_core::domain::{OpportunityScore, Signal};
use oppscan_core::pipeline::ScanStatus;
use std::collections::BTreeMap;

pub fn print_table(rows: &[OpportunityScore]) {
    if rows.is_empty() {
        println!("no opportunities");
        return;
    }
    println!(
        "{:<4} {:<12} {:<15} {:>10} {:>6} {:>6} {:>6}  {:<11} {:>10} {:>10}",
        "#", "TICKER", "SECTOR", "PRICE", "TECH", "FUND", "SCORE", "SIGNAL", "TARGET", "STOP"
    );
    for (i, o) in rows.iter().enumerate() {
        println!(
            "{:<4} {:<12} {:<15} {:>10.2} {:>6.1} {:>6.1} {:>6.1}  {:<11} {:>10.2} {:>10.2}",
            i + 1,
            o.ticker,
            o.sector.label(),
            o.current_price,
            o.technical_score,
            o.fundamental_score,
            o.overall_score,
            o.signal.as_str(),
            o.target_price,
            o.stop_loss,
        );
    }
}

pub fn print_summary(status: &ScanStatus, distribution: &BTreeMap<Signal, usize>) {
    let s = &status.stats;
    println!();
    println!(
        "universe {} -> tradeable {} -> sampled {} -> segment {} -> prefilter {} -> shortlisted {} -> scored {} (skipped {})",
        s.universe,
        s.tradeable,
        s.sampled,
        s.segment_passed,
        s.prefilter_passed,
        s.shortlisted,
        s.scored,
        s.skipped
    );
    let counts: Vec<String> = distribution
        .iter()
        .map(|(signal, n)| format!("{}={n}", signal.as_str()))
        .collect();
    println!("signals: {}", counts.join(" "));
    if let Some(at) = status.last_scan_time {
        println!("completed at {}", at.to_rfc3339());
    }
}

pub fn print_detail(o: &OpportunityScore) {
    println!("{} ({}) [{}]", o.ticker, o.name, o.sector.label());
    println!("  price        {:.2}", o.current_price);
    if let Some(cap) = o.market_cap {
        println!("  market cap   {cap:.0} cr");
    }
    println!(
        "  scores       technical {:.1}  fundamental {:.1}  overall {:.1}",
        o.technical_score, o.fundamental_score, o.overall_score
    );
    println!(
        "  signal       {} (confidence {:.2})",
        o.signal.as_str(),
        o.confidence
    );
    println!("  target/stop  {:.2} / {:.2}", o.target_price, o.stop_loss);
    println!(
        "  technicals   RSI {:.1}, MACD {:?}, trend {:?}, volume surge {}",
        o.technical.rsi, o.technical.macd_signal, o.technical.moving_avg_trend, o.technical.volume_surge
    );
    let f = &o.fundamentals;
    println!(
        "  fundamentals P/E {:.1}, D/E {:.2}, ROE {:.1}%, growth {:.1}%",
        f.pe_ratio, f.debt_to_equity, f.roe, f.revenue_growth
    );
    for r in &o.buy_reasons {
        println!("  + {r}");
    }
    for r in &o.risk_factors {
        println!("  - {r}");
    }
}
