//! Narrowing the listed universe down to a diversified candidate pool.

pub mod sampler;
pub mod sector;
pub mod segment;
pub mod tradeable;

use crate::domain::instrument::Instrument;
use crate::domain::Sector;

/// An instrument that survived sampling, tagged with its sector.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub instrument: Instrument,
    pub sector: Sector,
}

pub use sampler::sample_balanced;
pub use sector::classify;
pub use segment::{average_volume, SegmentBounds, SegmentRejection};
pub use tradeable::is_tradeable;
