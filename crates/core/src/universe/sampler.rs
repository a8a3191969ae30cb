use crate::domain::instrument::Instrument;
use crate::domain::Sector;
use crate::universe::sector::classify;
use crate::universe::Candidate;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};

/// Draws up to `target` instruments spread evenly across sectors.
///
/// Every sector present gets `target / sectors` picks from its shuffled
/// bucket. Any shortfall is backfilled from the leftovers one pick per sector
/// per round, with the sector order reshuffled every round, so no sector ends
/// up more than one ahead of another unless its bucket ran dry.
///
/// Duplicate symbols keep their first occurrence.
pub fn sample_balanced<R: Rng + ?Sized>(
    instruments: Vec<Instrument>,
    target: usize,
    rng: &mut R,
) -> Vec<Candidate> {
    if target == 0 {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut buckets: BTreeMap<Sector, Vec<Instrument>> = BTreeMap::new();
    for inst in instruments {
        if !seen.insert(inst.symbol.clone()) {
            continue;
        }
        buckets.entry(classify(&inst.symbol)).or_default().push(inst);
    }
    if buckets.is_empty() {
        return Vec::new();
    }

    let quota = target / buckets.len();
    let mut out = Vec::with_capacity(target);
    let mut leftovers: Vec<(Sector, Vec<Instrument>)> = Vec::with_capacity(buckets.len());

    for (sector, mut bucket) in buckets {
        bucket.shuffle(rng);
        let rest = bucket.split_off(quota.min(bucket.len()));
        out.extend(bucket.into_iter().map(|instrument| Candidate { instrument, sector }));
        if !rest.is_empty() {
            leftovers.push((sector, rest));
        }
    }

    while out.len() < target && !leftovers.is_empty() {
        leftovers.shuffle(rng);
        for (sector, rest) in leftovers.iter_mut() {
            if out.len() >= target {
                break;
            }
            if let Some(instrument) = rest.pop() {
                out.push(Candidate {
                    instrument,
                    sector: *sector,
                });
            }
        }
        leftovers.retain(|(_, rest)| !rest.is_empty());
    }

    tracing::debug!(
        target,
        sampled = out.len(),
        quota,
        "sector-balanced universe sample drawn"
    );
    out
}
