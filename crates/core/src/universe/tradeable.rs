use crate::domain::instrument::{Instrument, EQUITY_INSTRUMENT_TYPE};

const MIN_SYMBOL_LEN: usize = 3;

// Series markers for trade-to-trade, SME, suspended and restricted segments.
const DENIED_SUFFIXES: &[&str] = &["-BE", "-SM", "-BZ", "-IL", "-BL"];
const DENIED_PREFIXES: &[&str] = &["PP-", "M-"];

/// True when the instrument is a plain, normally traded equity.
pub fn is_tradeable(instrument: &Instrument) -> bool {
    let symbol = instrument.symbol.trim().to_ascii_uppercase();

    instrument
        .instrument_type
        .trim()
        .eq_ignore_ascii_case(EQUITY_INSTRUMENT_TYPE)
        && symbol.chars().count() >= MIN_SYMBOL_LEN
        && !symbol.chars().any(|c| c.is_ascii_digit())
        && !DENIED_SUFFIXES.iter().any(|s| symbol.ends_with(s))
        && !DENIED_PREFIXES.iter().any(|p| symbol.starts_with(p))
}
