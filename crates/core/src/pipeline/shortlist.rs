use crate::domain::Sector;
use crate::ingest::types::{FundamentalsRecord, PriceBar};
use crate::scoring::PrefilterScore;
use crate::universe::Candidate;
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};

/// A pooled ticker with everything fetched for it and its prefilter result.
#[derive(Debug, Clone)]
pub struct Prefiltered {
    pub candidate: Candidate,
    pub bars: Vec<PriceBar>,
    /// `None` when the provider had nothing; scoring will skip the ticker.
    pub fundamentals: Option<FundamentalsRecord>,
    pub prefilter: PrefilterScore,
}

impl Prefiltered {
    pub fn ticker(&self) -> &str {
        &self.candidate.instrument.symbol
    }

    pub fn sector(&self) -> Sector {
        self.candidate.sector
    }
}

fn by_prefilter(a: &Prefiltered, b: &Prefiltered) -> Ordering {
    b.prefilter
        .score
        .partial_cmp(&a.prefilter.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.ticker().cmp(b.ticker()))
}

/// Picks up to `n` names, taking turns across sectors.
///
/// Within a sector names go best prefilter score first; sectors take their
/// turn in order of their best name. Everything is kept when `n` covers it.
pub fn smart_sample(mut items: Vec<Prefiltered>, n: usize) -> Vec<Prefiltered> {
    if items.len() <= n {
        items.sort_by(by_prefilter);
        return items;
    }

    let mut buckets: BTreeMap<Sector, Vec<Prefiltered>> = BTreeMap::new();
    for item in items {
        buckets.entry(item.sector()).or_default().push(item);
    }

    let mut queues: Vec<VecDeque<Prefiltered>> = buckets
        .into_values()
        .map(|mut v| {
            v.sort_by(by_prefilter);
            VecDeque::from(v)
        })
        .collect();
    // Buckets are never empty, so every queue has a front.
    queues.sort_by(|a, b| match (a.front(), b.front()) {
        (Some(a), Some(b)) => by_prefilter(a, b),
        _ => Ordering::Equal,
    });

    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        let mut progressed = false;
        for q in queues.iter_mut() {
            if out.len() >= n {
                break;
            }
            if let Some(item) = q.pop_front() {
                out.push(item);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    out
}
