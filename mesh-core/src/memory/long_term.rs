//! Long-term memory — the episodic log and semantic buckets.
//!
//! Every consolidated item lives exactly once in an append-only arena.
//! The episodic log and the per-category semantic buckets are views: lists
//! of arena slots. On disk the views are written out as full records, so the
//! persisted layout still carries each item in both places.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::category::Category;
use crate::memory::MemoryItem;
use crate::types::MemoryId;

/// Arena of consolidated items plus the episodic and semantic views over it.
#[derive(Debug, Clone, Default)]
pub struct LongTermMemory {
    arena: Vec<MemoryItem>,
    index: HashMap<MemoryId, usize>,
    episodic: Vec<usize>,
    semantic: BTreeMap<Category, Vec<usize>>,
    /// When each item was filed into long-term memory.
    consolidated_at: HashMap<MemoryId, DateTime<Utc>>,
}

impl LongTermMemory {
    /// Create an empty long-term store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// File an item: append it to the episodic log and its semantic bucket,
    /// and stamp its consolidation time.
    ///
    /// An item whose ID is already filed only gains another episodic entry;
    /// it stays in its single semantic bucket.
    pub fn file(&mut self, item: MemoryItem, now: DateTime<Utc>) {
        let id = item.id;
        let slot = match self.index.get(&id) {
            Some(&slot) => slot,
            None => {
                let slot = self.arena.len();
                let category = item.category;
                self.arena.push(item);
                self.index.insert(id, slot);
                self.semantic.entry(category).or_default().push(slot);
                slot
            }
        };
        self.episodic.push(slot);
        self.consolidated_at.insert(id, now);
    }

    /// Number of distinct consolidated items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Whether nothing has been consolidated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Length of the episodic log (counts repeated entries).
    #[must_use]
    pub fn episodic_len(&self) -> usize {
        self.episodic.len()
    }

    /// Total entries across all semantic buckets.
    #[must_use]
    pub fn semantic_len(&self) -> usize {
        self.semantic.values().map(Vec::len).sum()
    }

    /// Items in episodic (consolidation) order.
    pub fn episodic(&self) -> impl Iterator<Item = &MemoryItem> {
        self.episodic.iter().map(|&slot| &self.arena[slot])
    }

    /// Items in one semantic bucket, in filing order.
    pub fn semantic(&self, category: Category) -> impl Iterator<Item = &MemoryItem> {
        self.semantic
            .get(&category)
            .into_iter()
            .flatten()
            .map(|&slot| &self.arena[slot])
    }

    /// Per-category bucket sizes, including empty buckets.
    #[must_use]
    pub fn category_counts(&self) -> BTreeMap<Category, usize> {
        Category::ALL
            .into_iter()
            .map(|c| (c, self.semantic.get(&c).map_or(0, Vec::len)))
            .collect()
    }

    /// Every distinct item, in arena order.
    pub fn items(&self) -> impl Iterator<Item = &MemoryItem> {
        self.arena.iter()
    }

    /// Look up an item by ID.
    #[must_use]
    pub fn get(&self, id: MemoryId) -> Option<&MemoryItem> {
        self.index.get(&id).map(|&slot| &self.arena[slot])
    }

    /// Mutable lookup by ID.
    pub fn get_mut(&mut self, id: MemoryId) -> Option<&mut MemoryItem> {
        let slot = *self.index.get(&id)?;
        Some(&mut self.arena[slot])
    }

    /// Whether an item with this ID has been filed.
    #[must_use]
    pub fn contains(&self, id: MemoryId) -> bool {
        self.index.contains_key(&id)
    }

    /// When the item was filed, if it has been.
    #[must_use]
    pub fn consolidated_at(&self, id: MemoryId) -> Option<DateTime<Utc>> {
        self.consolidated_at.get(&id).copied()
    }

    /// All consolidation timestamps.
    #[must_use]
    pub fn consolidation_times(&self) -> &HashMap<MemoryId, DateTime<Utc>> {
        &self.consolidated_at
    }

    /// Keep at most `max_items` distinct items, dropping the oldest
    /// (least important first among equal timestamps). Returns how many
    /// items were dropped.
    pub fn enforce_retention(&mut self, max_items: usize) -> usize {
        let excess = self.arena.len().saturating_sub(max_items);
        if excess == 0 {
            return 0;
        }

        let mut order: Vec<&MemoryItem> = self.arena.iter().collect();
        order.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.importance.total_cmp(&b.importance))
        });
        let doomed: HashSet<MemoryId> = order[..excess].iter().map(|m| m.id).collect();
        self.remove_all(&doomed);
        excess
    }

    /// Drop the given items from the arena and both views.
    fn remove_all(&mut self, doomed: &HashSet<MemoryId>) {
        let mut remap: HashMap<usize, usize> = HashMap::with_capacity(self.arena.len());
        let mut kept = Vec::with_capacity(self.arena.len().saturating_sub(doomed.len()));
        for (old_slot, item) in std::mem::take(&mut self.arena).into_iter().enumerate() {
            if doomed.contains(&item.id) {
                self.consolidated_at.remove(&item.id);
                continue;
            }
            remap.insert(old_slot, kept.len());
            kept.push(item);
        }

        self.arena = kept;
        self.index = self
            .arena
            .iter()
            .enumerate()
            .map(|(slot, m)| (m.id, slot))
            .collect();
        self.episodic = self
            .episodic
            .iter()
            .filter_map(|slot| remap.get(slot).copied())
            .collect();
        for bucket in self.semantic.values_mut() {
            *bucket = bucket.iter().filter_map(|slot| remap.get(slot).copied()).collect();
        }
    }

    /// Rebuild from persisted views.
    ///
    /// Records are deduplicated by ID into the arena (first occurrence wins).
    /// The episodic order is kept as written; items only the semantic
    /// document lists are appended to the episodic log in the order they
    /// appear. Every item ends up in exactly one semantic bucket: the first
    /// bucket that lists it, or its own category if no bucket does.
    #[must_use]
    pub fn from_views(
        episodic: Vec<MemoryItem>,
        semantic: BTreeMap<Category, Vec<MemoryItem>>,
        consolidated_at: HashMap<MemoryId, DateTime<Utc>>,
    ) -> Self {
        let mut store = Self::new();
        let mut bucketed: HashSet<MemoryId> = HashSet::new();

        for item in episodic {
            let slot = store.intern(item);
            store.episodic.push(slot);
        }
        for (category, items) in semantic {
            for item in items {
                let id = item.id;
                let slot = store.intern(item);
                if bucketed.insert(id) {
                    store.semantic.entry(category).or_default().push(slot);
                }
            }
        }
        let logged: HashSet<usize> = store.episodic.iter().copied().collect();
        for slot in 0..store.arena.len() {
            let (id, category) = (store.arena[slot].id, store.arena[slot].category);
            if bucketed.insert(id) {
                store.semantic.entry(category).or_default().push(slot);
            }
            if !logged.contains(&slot) {
                store.episodic.push(slot);
            }
        }

        store.consolidated_at = consolidated_at
            .into_iter()
            .filter(|(id, _)| store.index.contains_key(id))
            .collect();
        store
    }

    /// Insert into the arena if new; return the item's slot.
    fn intern(&mut self, item: MemoryItem) -> usize {
        if let Some(&slot) = self.index.get(&item.id) {
            return slot;
        }
        let slot = self.arena.len();
        self.index.insert(item.id, slot);
        self.arena.push(item);
        slot
    }

    /// Full episodic records, for persistence.
    #[must_use]
    pub fn episodic_records(&self) -> Vec<MemoryItem> {
        self.episodic().cloned().collect()
    }

    /// Full semantic records keyed by category, for persistence.
    /// Every category is present, even when empty.
    #[must_use]
    pub fn semantic_records(&self) -> BTreeMap<Category, Vec<MemoryItem>> {
        Category::ALL
            .into_iter()
            .map(|c| (c, self.semantic(c).cloned().collect()))
            .collect()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}
