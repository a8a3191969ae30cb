pub mod indicators;
pub mod prefilter;
pub mod scorer;

pub use prefilter::{prefilter_score, PrefilterScore};
pub use scorer::{assemble, score, Subject};
