use crate::domain::{OpportunityScore, ScanSnapshot};
use crate::pipeline::query::rank;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ScanFailure {
    pub scan_id: Uuid,
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Shared scan state: the single-flight flag, the published snapshot and the
/// outcome and time of the last attempt.
#[derive(Debug, Default)]
pub struct ScanState {
    in_progress: AtomicBool,
    current_scan: RwLock<Option<Uuid>>,
    snapshot: RwLock<Arc<ScanSnapshot>>,
    last_failure: RwLock<Option<ScanFailure>>,
    last_attempt_at: RwLock<Option<DateTime<Utc>>>,
}

/// Held for the lifetime of one scan. Dropping it clears the in-progress
/// flag, whatever way the scan ended.
#[derive(Debug)]
pub struct ScanGuard {
    state: Arc<ScanState>,
    scan_id: Uuid,
}

impl ScanGuard {
    pub fn scan_id(&self) -> Uuid {
        self.scan_id
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.state.in_progress.store(false, Ordering::Release);
    }
}

impl ScanState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `None` when a scan is already running.
    pub fn try_begin(self: &Arc<Self>) -> Option<ScanGuard> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        let scan_id = Uuid::new_v4();
        *self
            .current_scan
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(scan_id);

        Some(ScanGuard {
            state: Arc::clone(self),
            scan_id,
        })
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Id of the running scan, or of the last one started.
    pub fn current_scan(&self) -> Option<Uuid> {
        *self
            .current_scan
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Arc<ScanSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the whole snapshot and clears any recorded failure.
    pub fn publish(&self, mut snapshot: ScanSnapshot) {
        rank(&mut snapshot.opportunities);
        self.mark_attempt(snapshot.completed_at.unwrap_or_else(Utc::now));
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
        *self
            .last_failure
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Swaps in a fresh score for a ticker already in the snapshot. The
    /// current snapshot is copied, never edited. Returns false when the
    /// ticker is not cached.
    pub fn replace_entry(&self, score: OpportunityScore) -> bool {
        let mut slot = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(idx) = slot
            .opportunities
            .iter()
            .position(|o| o.ticker == score.ticker)
        else {
            return false;
        };

        let mut next = ScanSnapshot::clone(&slot);
        next.opportunities[idx] = score;
        rank(&mut next.opportunities);
        *slot = Arc::new(next);
        true
    }

    pub fn record_failure(&self, scan_id: Uuid, message: String) {
        let at = Utc::now();
        self.mark_attempt(at);
        *self
            .last_failure
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(ScanFailure {
            scan_id,
            at,
            message,
        });
    }

    /// When the last scan ended, successfully or not.
    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        *self
            .last_attempt_at
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_attempt(&self, at: DateTime<Utc>) {
        *self
            .last_attempt_at
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(at);
    }

    pub fn last_failure(&self) -> Option<ScanFailure> {
        self.last_failure
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
