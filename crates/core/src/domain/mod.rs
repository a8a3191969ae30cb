pub mod contract;
pub mod instrument;
pub mod opportunity;

pub use instrument::{Instrument, Sector};
pub use opportunity::{
    FundamentalMetrics, MacdSignal, MovingAverageTrend, OpportunityScore, ScanSnapshot,
    ScanStats, Signal, TechnicalIndicators,
};
