//! Memory Consolidation — "What I've internalised"
//!
//! Moves items out of the bounded working tier into long-term memory:
//!   - Overflow: when working memory passes capacity, the least important
//!     items (oldest first among equals) are filed immediately.
//!   - Full pass: every working item is filed in stored order and the tier
//!     is cleared. Runs on demand (forced) or once the tier reaches the
//!     consolidation threshold.
//!
//! These functions only touch the in-memory tiers. Persisting the result is
//! the caller's job (see [`crate::MemoryMesh::consolidate_all`]).

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::memory::{LongTermMemory, MemoryItem, WorkingMemory};

/// Outcome of a full consolidation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidationReport {
    /// Items moved from working into long-term memory.
    pub consolidated: usize,
    /// Whether the pass ran at all (threshold met or forced).
    pub ran: bool,
    /// Whether the follow-up save succeeded.
    pub persisted: bool,
    /// Long-term items dropped by the retention bound.
    pub retention_dropped: usize,
}

impl ConsolidationReport {
    /// Report for a pass that was skipped because the threshold was not met.
    #[must_use]
    pub const fn skipped() -> Self {
        Self {
            consolidated: 0,
            ran: false,
            persisted: false,
            retention_dropped: 0,
        }
    }
}

/// Whether a full pass should run for a working tier of `working_len` items.
#[must_use]
pub fn should_consolidate(working_len: usize, threshold: usize, force: bool) -> bool {
    force || working_len >= threshold
}

/// File one item into long-term memory.
pub fn consolidate_item(long_term: &mut LongTermMemory, item: MemoryItem, now: DateTime<Utc>) {
    debug!(id = %item.id, category = %item.category, "Consolidating memory");
    long_term.file(item, now);
}

/// Spill working memory down to capacity. Returns how many items moved.
pub fn consolidate_overflow(
    working: &mut WorkingMemory,
    long_term: &mut LongTermMemory,
    now: DateTime<Utc>,
) -> usize {
    let evicted = working.take_overflow();
    let count = evicted.len();
    for item in evicted {
        consolidate_item(long_term, item, now);
    }
    count
}

/// File every working item, in stored order, and clear the tier.
/// Returns how many items moved.
pub fn consolidate_working(
    working: &mut WorkingMemory,
    long_term: &mut LongTermMemory,
    now: DateTime<Utc>,
) -> usize {
    let drained = working.drain_all();
    let count = drained.len();
    for item in drained {
        consolidate_item(long_term, item, now);
    }
    count
}

/// Apply the optional long-term bound. Returns how many items were dropped.
pub fn apply_retention(long_term: &mut LongTermMemory, max_long_term: Option<usize>) -> usize {
    let Some(max) = max_long_term else {
        return 0;
    };
    let dropped = long_term.enforce_retention(max);
    if dropped > 0 {
        debug!(dropped, max, "Retention bound applied to long-term memory");
    }
    dropped
}
