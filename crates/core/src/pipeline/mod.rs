pub mod query;
pub mod screener;
pub mod shortlist;
pub mod state;

pub use screener::{ScanPhase, ScanStatus, Screener, StartOutcome, MAX_TICKERS_LIMIT};
pub use state::{ScanFailure, ScanState};
