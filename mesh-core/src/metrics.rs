//! Runtime Metrics & Instrumentation
//!
//! Lightweight lock-free counters for the memory mesh, readable at runtime
//! and exportable as Prometheus text. Every subsystem also emits `tracing`
//! events; the span names live in [`spans`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// ---------------------------------------------------------------------------
// Counters (lock-free)
// ---------------------------------------------------------------------------

/// Atomic counters for mesh events.
/// Incremented on the hot path, read on export.
#[derive(Debug)]
pub struct MeshCounters {
    /// Items accepted by `store`.
    pub items_stored: AtomicU64,
    /// Items moved from working into long-term memory.
    pub items_consolidated: AtomicU64,
    /// Items pushed out of working memory by overflow.
    pub overflow_evictions: AtomicU64,
    /// Full consolidation passes that actually ran.
    pub consolidation_passes: AtomicU64,
    /// Non-blank retrieval calls.
    pub retrievals: AtomicU64,
    /// Items matched across all retrievals.
    pub retrieval_hits: AtomicU64,
    /// Successful saves.
    pub saves_completed: AtomicU64,
    /// Failed saves.
    pub save_failures: AtomicU64,
    /// Long-term items dropped by the retention bound.
    pub retention_dropped: AtomicU64,
}

impl MeshCounters {
    /// Create a new set of zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items_stored: AtomicU64::new(0),
            items_consolidated: AtomicU64::new(0),
            overflow_evictions: AtomicU64::new(0),
            consolidation_passes: AtomicU64::new(0),
            retrievals: AtomicU64::new(0),
            retrieval_hits: AtomicU64::new(0),
            saves_completed: AtomicU64::new(0),
            save_failures: AtomicU64::new(0),
            retention_dropped: AtomicU64::new(0),
        }
    }

    /// Add `n` to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Increment a counter by one.
    pub fn incr(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            items_stored: self.items_stored.load(Ordering::Relaxed),
            items_consolidated: self.items_consolidated.load(Ordering::Relaxed),
            overflow_evictions: self.overflow_evictions.load(Ordering::Relaxed),
            consolidation_passes: self.consolidation_passes.load(Ordering::Relaxed),
            retrievals: self.retrievals.load(Ordering::Relaxed),
            retrieval_hits: self.retrieval_hits.load(Ordering::Relaxed),
            saves_completed: self.saves_completed.load(Ordering::Relaxed),
            save_failures: self.save_failures.load(Ordering::Relaxed),
            retention_dropped: self.retention_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for MeshCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// Items stored.
    pub items_stored: u64,
    /// Items consolidated.
    pub items_consolidated: u64,
    /// Overflow evictions.
    pub overflow_evictions: u64,
    /// Consolidation passes.
    pub consolidation_passes: u64,
    /// Retrieval calls.
    pub retrievals: u64,
    /// Retrieval hits.
    pub retrieval_hits: u64,
    /// Completed saves.
    pub saves_completed: u64,
    /// Failed saves.
    pub save_failures: u64,
    /// Items dropped by retention.
    pub retention_dropped: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows: [(&str, &str, u64); 9] = [
            ("items_stored", "Memories accepted by store", self.items_stored),
            ("items_consolidated", "Memories moved into long-term tiers", self.items_consolidated),
            ("overflow_evictions", "Working memory overflow evictions", self.overflow_evictions),
            ("consolidation_passes", "Full consolidation passes", self.consolidation_passes),
            ("retrievals", "Retrieval calls", self.retrievals),
            ("retrieval_hits", "Memories matched by retrieval", self.retrieval_hits),
            ("saves_completed", "Save operations completed", self.saves_completed),
            ("save_failures", "Save operations failed", self.save_failures),
            (
                "retention_dropped",
                "Long-term memories dropped by retention",
                self.retention_dropped,
            ),
        ];

        let mut out = String::new();
        for (name, help, value) in rows {
            out.push_str(&format!(
                "# HELP memory_mesh_{name}_total {help}\n\
                 # TYPE memory_mesh_{name}_total counter\n\
                 memory_mesh_{name}_total {value}\n"
            ));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tracing Span Names
// ---------------------------------------------------------------------------

/// Span names used with `tracing::span!`.
pub mod spans {
    /// Storing one item.
    pub const MEMORY_STORE: &str = "mesh::memory::store";
    /// Retrieval.
    pub const MEMORY_RETRIEVE: &str = "mesh::memory::retrieve";
    /// Consolidation pass.
    pub const CONSOLIDATION: &str = "mesh::consolidation";
    /// Persistence save.
    pub const PERSIST_SAVE: &str = "mesh::persist::save";
    /// Persistence load.
    pub const PERSIST_LOAD: &str = "mesh::persist::load";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let c = MeshCounters::new();
        assert_eq!(c.snapshot(), CounterSnapshot::default());
    }

    #[test]
    fn increments_show_in_snapshot() {
        let c = MeshCounters::new();
        MeshCounters::incr(&c.items_stored);
        MeshCounters::incr(&c.items_stored);
        MeshCounters::add(&c.retrieval_hits, 5);
        let snap = c.snapshot();
        assert_eq!(snap.items_stored, 2);
        assert_eq!(snap.retrieval_hits, 5);
        assert_eq!(snap.save_failures, 0);
    }

    #[test]
    fn prometheus_format() {
        let c = MeshCounters::new();
        MeshCounters::add(&c.overflow_evictions, 3);
        let text = c.snapshot().to_prometheus();
        assert!(text.contains("# TYPE memory_mesh_overflow_evictions_total counter"));
        assert!(text.contains("memory_mesh_overflow_evictions_total 3"));
        assert!(text.contains("memory_mesh_items_stored_total 0"));
    }
}
