//! The memory mesh context object.
//!
//! [`MemoryMesh`] owns the tiers, the configuration, the persistence backend
//! and the counters. Build one at startup and share it by `Arc`; every
//! operation takes `&self`.
//!
//! All tier state sits behind a single mutex. Saves snapshot the tiers under
//! the lock and write after releasing it. A second mutex is held from
//! snapshot to finished write, so saves land on disk one at a time and in
//! the order they were captured. Lock order is always write lock, then
//! tier lock.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, span, warn, Level};

use crate::category::{categorize, Category, CategoryHint};
use crate::config::MeshConfig;
use crate::consolidation::{self, ConsolidationReport};
use crate::error::Result;
use crate::memory::{LongTermMemory, MemoryItem, WorkingMemory};
use crate::metrics::{spans, MeshCounters};
use crate::persistence::{MeshSnapshot, Persistence};
use crate::retrieval::{PreparedQuery, RetrievalEngine, ScoredMemory};
use crate::scheduler::{spawn_consolidation_task, ConsolidationHandle};
use crate::types::{MemoryId, Metadata};
use crate::validation::{clamp_importance, validate_content, DEFAULT_IMPORTANCE};

/// Mutable tier state guarded by the mesh lock.
#[derive(Debug)]
struct MeshState {
    working: WorkingMemory,
    long_term: LongTermMemory,
    last_consolidation: DateTime<Utc>,
}

/// Summary counts for dashboards and the bridge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshStats {
    /// Items in working memory.
    pub working_memory_count: usize,
    /// Entries in the episodic log.
    pub episodic_memory_count: usize,
    /// Entries across all semantic buckets.
    pub semantic_memory_count: usize,
    /// Working plus episodic entries.
    pub total_memories: usize,
    /// Entries per semantic bucket.
    pub categories: BTreeMap<Category, usize>,
    /// When the last full consolidation ran (mesh start if none has).
    pub last_consolidation: DateTime<Utc>,
}

/// Tiered working / episodic / semantic memory store.
#[derive(Debug)]
pub struct MemoryMesh {
    config: MeshConfig,
    state: Mutex<MeshState>,
    /// Held across snapshot + write.
    write_lock: Mutex<()>,
    persistence: Persistence,
    retrieval: RetrievalEngine,
    counters: MeshCounters,
}

impl MemoryMesh {
    /// Open a mesh with the backend named in `config.persistence`, loading
    /// any persisted long-term state.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the backend
    /// cannot be opened. Unreadable persisted data is not an error.
    pub fn open(config: MeshConfig) -> Result<Self> {
        config.validate()?;
        let persistence = Persistence::open(&config.persistence)?;
        Ok(Self::with_persistence(config, persistence))
    }

    /// Build a mesh over an explicit persistence layer.
    #[must_use]
    pub fn with_persistence(config: MeshConfig, persistence: Persistence) -> Self {
        let long_term = {
            let _span = span!(Level::DEBUG, spans::PERSIST_LOAD).entered();
            persistence.load().into_long_term()
        };
        info!(
            memory_dir = %config.persistence.memory_dir.display(),
            backend = ?config.persistence.backend,
            long_term = long_term.len(),
            "Memory mesh opened"
        );

        let state = MeshState {
            working: WorkingMemory::new(config.memory.working_capacity),
            long_term,
            last_consolidation: Utc::now(),
        };
        Self {
            retrieval: RetrievalEngine::new(config.retrieval.clone()),
            state: Mutex::new(state),
            write_lock: Mutex::new(()),
            persistence,
            counters: MeshCounters::new(),
            config,
        }
    }

    // ------------------------------------------------------------------
    // Store
    // ------------------------------------------------------------------

    /// Store new content in working memory and return its ID.
    ///
    /// Pushing working memory past capacity immediately consolidates the
    /// least important items into long-term memory.
    ///
    /// # Errors
    /// Returns [`crate::MeshError::InvalidInput`] for empty or oversized
    /// content, or non-finite importance. Nothing else fails a store.
    pub fn store(
        &self,
        content: &str,
        category: impl Into<CategoryHint>,
        importance: f32,
        metadata: Metadata,
    ) -> Result<MemoryId> {
        let _span = span!(Level::DEBUG, spans::MEMORY_STORE).entered();
        validate_content(content, &self.config.memory)?;
        let importance = clamp_importance(importance)?;
        let category = match category.into() {
            CategoryHint::Explicit(c) => c,
            CategoryHint::Auto => categorize(content, &metadata),
        };

        let now = Utc::now();
        let mut state = self.state.lock();
        let id = unique_id(&state, content, &now);
        state
            .working
            .push(MemoryItem::new(id, content, category, importance, metadata, now));
        MeshCounters::incr(&self.counters.items_stored);
        debug!(%id, %category, importance, "Stored memory");

        let state = &mut *state;
        let evicted =
            consolidation::consolidate_overflow(&mut state.working, &mut state.long_term, now);
        if evicted > 0 {
            let dropped = consolidation::apply_retention(
                &mut state.long_term,
                self.config.memory.retention.max_long_term,
            );
            MeshCounters::add(&self.counters.overflow_evictions, evicted as u64);
            MeshCounters::add(&self.counters.items_consolidated, evicted as u64);
            MeshCounters::add(&self.counters.retention_dropped, dropped as u64);
            debug!(evicted, "Working memory overflow consolidated");
        }
        Ok(id)
    }

    /// Store with automatic category, default importance and no metadata.
    ///
    /// # Errors
    /// See [`Self::store`].
    pub fn store_text(&self, content: &str) -> Result<MemoryId> {
        self.store(content, CategoryHint::Auto, DEFAULT_IMPORTANCE, Metadata::new())
    }

    // ------------------------------------------------------------------
    // Retrieve
    // ------------------------------------------------------------------

    /// The `limit` most relevant memories for `query`, best first.
    ///
    /// Every matching item has its access recorded, including matches cut
    /// by `limit`. A blank query matches nothing.
    pub fn retrieve(
        &self,
        query: &str,
        category: Option<Category>,
        limit: usize,
    ) -> Vec<MemoryItem> {
        self.retrieve_scored(query, category, limit)
            .into_iter()
            .map(|s| s.memory)
            .collect()
    }

    /// Like [`Self::retrieve`], with the score and its breakdown.
    pub fn retrieve_scored(
        &self,
        query: &str,
        category: Option<Category>,
        limit: usize,
    ) -> Vec<ScoredMemory> {
        let Some(prepared) = PreparedQuery::new(query) else {
            return Vec::new();
        };
        let _span = span!(Level::DEBUG, spans::MEMORY_RETRIEVE).entered();
        let now = Utc::now();
        let mut guard = self.state.lock();

        let ranked = {
            let state = &*guard;
            let wanted = move |c: Category| category.is_none_or(|want| want == c);
            let candidates = state
                .working
                .iter()
                .filter(move |m| wanted(m.category))
                .chain(state.long_term.episodic().filter(move |m| wanted(m.category)))
                .chain(
                    Category::ALL
                        .into_iter()
                        .filter(move |c| wanted(*c))
                        .flat_map(move |c| state.long_term.semantic(c)),
                );
            self.retrieval.rank(&prepared, candidates, now)
        };

        let state = &mut *guard;
        for hit in &ranked {
            if let Some(m) = state.working.get_mut(hit.id) {
                m.record_access(now);
            } else if let Some(m) = state.long_term.get_mut(hit.id) {
                m.record_access(now);
            }
        }
        MeshCounters::incr(&self.counters.retrievals);
        MeshCounters::add(&self.counters.retrieval_hits, ranked.len() as u64);
        debug!(query = %prepared.lowered(), matches = ranked.len(), limit, "Retrieved memories");

        ranked
            .into_iter()
            .take(limit)
            .filter_map(|hit| {
                let memory = state
                    .working
                    .get(hit.id)
                    .or_else(|| state.long_term.get(hit.id))?
                    .clone();
                Some(ScoredMemory {
                    memory,
                    score: hit.score,
                    breakdown: hit.breakdown,
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Consolidation
    // ------------------------------------------------------------------

    /// Move all of working memory into long-term memory and save.
    ///
    /// Skipped unless `force` is set or working memory holds at least
    /// `memory.consolidation_threshold` items. A failed save is logged and
    /// reported, never rolled back.
    pub fn consolidate_all(&self, force: bool) -> ConsolidationReport {
        let _span = span!(Level::DEBUG, spans::CONSOLIDATION, force).entered();
        let now = Utc::now();
        let _write = self.write_lock.lock();
        let (snapshot, consolidated, dropped) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if !consolidation::should_consolidate(
                state.working.len(),
                self.config.memory.consolidation_threshold,
                force,
            ) {
                return ConsolidationReport::skipped();
            }
            let consolidated =
                consolidation::consolidate_working(&mut state.working, &mut state.long_term, now);
            let dropped = consolidation::apply_retention(
                &mut state.long_term,
                self.config.memory.retention.max_long_term,
            );
            state.last_consolidation = now;
            (MeshSnapshot::capture(&state.long_term), consolidated, dropped)
        };

        MeshCounters::incr(&self.counters.consolidation_passes);
        MeshCounters::add(&self.counters.items_consolidated, consolidated as u64);
        MeshCounters::add(&self.counters.retention_dropped, dropped as u64);
        let persisted = self.persist(&snapshot);
        info!(consolidated, persisted, "Consolidated working memory");

        ConsolidationReport {
            consolidated,
            ran: true,
            persisted,
            retention_dropped: dropped,
        }
    }

    /// Start the background consolidation task if
    /// `consolidation.auto_consolidate` is enabled.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn start_auto_consolidation(self: &Arc<Self>) -> Option<ConsolidationHandle> {
        let cfg = &self.config.consolidation;
        cfg.auto_consolidate.then(|| {
            spawn_consolidation_task(Arc::clone(self), StdDuration::from_secs(cfg.interval_seconds))
        })
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Save the long-term tiers.
    ///
    /// # Errors
    /// Returns the backend error; it is also counted as a failed save.
    pub fn save(&self) -> Result<()> {
        let _write = self.write_lock.lock();
        let snapshot = MeshSnapshot::capture(&self.state.lock().long_term);
        self.save_snapshot(&snapshot)
    }

    fn save_snapshot(&self, snapshot: &MeshSnapshot) -> Result<()> {
        let _span = span!(Level::DEBUG, spans::PERSIST_SAVE).entered();
        match self.persistence.save(snapshot) {
            Ok(()) => {
                MeshCounters::incr(&self.counters.saves_completed);
                Ok(())
            }
            Err(e) => {
                MeshCounters::incr(&self.counters.save_failures);
                Err(e)
            }
        }
    }

    /// Best-effort save: failures are logged, not returned.
    fn persist(&self, snapshot: &MeshSnapshot) -> bool {
        match self.save_snapshot(snapshot) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to save memory mesh; in-memory state kept");
                false
            }
        }
    }

    /// Replace the long-term tiers with what is persisted. Working memory
    /// is left alone.
    pub fn reload(&self) {
        let _write = self.write_lock.lock();
        let long_term = {
            let _span = span!(Level::DEBUG, spans::PERSIST_LOAD).entered();
            self.persistence.load().into_long_term()
        };
        let items = long_term.len();
        self.state.lock().long_term = long_term;
        info!(long_term = items, "Memory mesh reloaded");
    }

    /// Rotate a backup of the persisted documents.
    ///
    /// # Errors
    /// Returns an error if reading the backend or writing the backup fails.
    pub fn backup(&self) -> Result<Option<PathBuf>> {
        let _write = self.write_lock.lock();
        self.persistence.backup()
    }

    /// Whether anything has been persisted yet.
    #[must_use]
    pub fn has_persisted_state(&self) -> bool {
        self.persistence.has_persisted_state()
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Copy of working memory, in stored order.
    #[must_use]
    pub fn working_memory(&self) -> Vec<MemoryItem> {
        self.state.lock().working.iter().cloned().collect()
    }

    /// Episodic entries created within the last `hours`, newest first.
    #[must_use]
    pub fn recent_memories(&self, hours: u32, limit: usize) -> Vec<MemoryItem> {
        let cutoff = Utc::now() - Duration::hours(i64::from(hours));
        let mut recent: Vec<MemoryItem> = self
            .state
            .lock()
            .long_term
            .episodic()
            .filter(|m| m.created_at > cutoff)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit);
        recent
    }

    /// One semantic bucket, most important (then newest) first.
    #[must_use]
    pub fn by_category(&self, category: Category, limit: usize) -> Vec<MemoryItem> {
        let mut items: Vec<MemoryItem> =
            self.state.lock().long_term.semantic(category).cloned().collect();
        items.sort_by(|a, b| {
            b.importance
                .total_cmp(&a.importance)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        items.truncate(limit);
        items
    }

    /// Look up any item by ID.
    #[must_use]
    pub fn get(&self, id: MemoryId) -> Option<MemoryItem> {
        let state = self.state.lock();
        state.working.get(id).or_else(|| state.long_term.get(id)).cloned()
    }

    /// IDs of up to `n` items that have been recalled, most recalled first.
    #[must_use]
    pub fn most_accessed(&self, n: usize) -> Vec<MemoryId> {
        let state = self.state.lock();
        let mut accessed: Vec<(MemoryId, u32)> = state
            .working
            .iter()
            .chain(state.long_term.items())
            .filter(|m| m.access_count > 0)
            .map(|m| (m.id, m.access_count))
            .collect();
        accessed.sort_by(|a, b| b.1.cmp(&a.1));
        accessed.into_iter().take(n).map(|(id, _)| id).collect()
    }

    /// Tier counts.
    #[must_use]
    pub fn stats(&self) -> MeshStats {
        let state = self.state.lock();
        let working = state.working.len();
        let episodic = state.long_term.episodic_len();
        MeshStats {
            working_memory_count: working,
            episodic_memory_count: episodic,
            semantic_memory_count: state.long_term.semantic_len(),
            total_memories: working + episodic,
            categories: state.long_term.category_counts(),
            last_consolidation: state.last_consolidation,
        }
    }

    /// Wipe every tier and all bookkeeping in memory. Call [`Self::save`]
    /// afterwards to clear the persisted copy too.
    pub fn clear_all(&self) {
        let mut state = self.state.lock();
        state.working.clear();
        state.long_term.clear();
        warn!("All memories cleared");
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// Runtime counters.
    #[must_use]
    pub fn counters(&self) -> &MeshCounters {
        &self.counters
    }

    /// Directory holding persisted state.
    #[must_use]
    pub fn memory_dir(&self) -> &Path {
        self.persistence.memory_dir()
    }
}

/// Content-derived ID, re-salted until it is unused in either tier.
fn unique_id(state: &MeshState, content: &str, now: &DateTime<Utc>) -> MemoryId {
    let mut salt = 0u32;
    loop {
        let id = MemoryId::derive_salted(content, now, salt);
        if !state.working.contains(id) && !state.long_term.contains(id) {
            return id;
        }
        salt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open(dir: &Path) -> MemoryMesh {
        MemoryMesh::open(MeshConfig::with_memory_dir(dir)).expect("open mesh")
    }

    #[test]
    fn store_validates_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mesh = open(dir.path());
        assert!(mesh.store_text("   ").is_err());
        assert!(mesh.store("ok", CategoryHint::Auto, f32::NAN, Metadata::new()).is_err());
        assert_eq!(mesh.stats().working_memory_count, 0);

        let id = mesh.store("ok", CategoryHint::Auto, 3.0, Metadata::new()).expect("store");
        assert!((mesh.get(id).expect("stored").importance - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn explicit_category_and_metadata_hints() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mesh = open(dir.path());
        let pinned = mesh
            .store("I love hiking", Category::Events, 0.5, Metadata::new())
            .expect("store");
        assert_eq!(mesh.get(pinned).expect("stored").category, Category::Events);

        let mut meta = Metadata::new();
        meta.insert("speaker".into(), json!("Everett"));
        let spoken = mesh.store("Good morning", CategoryHint::Auto, 0.5, meta).expect("store");
        let item = mesh.get(spoken).expect("stored");
        assert_eq!(item.category, Category::Conversation);
        assert_eq!(item.metadata.get("speaker"), Some(&json!("Everett")));
    }

    #[test]
    fn same_content_in_same_instant_gets_distinct_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mesh = open(dir.path());
        let now = Utc::now();
        let state = mesh.state.lock();
        let first = unique_id(&state, "dup", &now);
        drop(state);
        mesh.state.lock().working.push(MemoryItem::new(
            first,
            "dup",
            Category::Context,
            0.5,
            Metadata::new(),
            now,
        ));
        let second = unique_id(&mesh.state.lock(), "dup", &now);
        assert_ne!(first, second);
    }

    #[test]
    fn by_category_orders_by_importance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mesh = open(dir.path());
        mesh.store("low fact", Category::Learning, 0.2, Metadata::new()).expect("store");
        mesh.store("high fact", Category::Learning, 0.9, Metadata::new()).expect("store");
        mesh.consolidate_all(true);

        let items = mesh.by_category(Category::Learning, 5);
        assert_eq!(items[0].content, "high fact");
        assert_eq!(items[1].content, "low fact");
        assert_eq!(mesh.by_category(Category::Learning, 1).len(), 1);
    }

    #[test]
    fn clear_all_then_save_empties_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mesh = open(dir.path());
        mesh.store_text("something to forget").expect("store");
        mesh.consolidate_all(true);
        mesh.clear_all();
        mesh.save().expect("save");

        let reopened = open(dir.path());
        assert_eq!(reopened.stats().episodic_memory_count, 0);
        assert_eq!(reopened.stats().total_memories, 0);
    }

    #[test]
    fn counters_track_activity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mesh = open(dir.path());
        mesh.store_text("counting python").expect("store");
        mesh.retrieve("python", None, 5);
        mesh.retrieve("  ", None, 5);
        mesh.consolidate_all(true);

        let snap = mesh.counters().snapshot();
        assert_eq!(snap.items_stored, 1);
        assert_eq!(snap.retrievals, 1);
        assert_eq!(snap.retrieval_hits, 1);
        assert_eq!(snap.consolidation_passes, 1);
        assert_eq!(snap.saves_completed, 1);
    }
}
