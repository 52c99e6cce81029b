//! Working Memory — "What I'm thinking about now"
//!
//! A small insertion-ordered buffer. When it grows past capacity the
//! least important items (oldest first among equals) spill out for
//! consolidation into long-term memory.

use crate::memory::MemoryItem;
use crate::types::MemoryId;

/// Bounded, insertion-ordered working tier.
#[derive(Debug, Clone)]
pub struct WorkingMemory {
    items: Vec<MemoryItem>,
    capacity: usize,
}

impl WorkingMemory {
    /// Create an empty working tier holding at most `capacity` items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the tier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append a newly stored item. The tier may exceed capacity until
    /// [`Self::take_overflow`] is called.
    pub fn push(&mut self, item: MemoryItem) {
        self.items.push(item);
    }

    /// Items in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryItem> {
        self.items.iter()
    }

    /// Look up an item by ID.
    #[must_use]
    pub fn get(&self, id: MemoryId) -> Option<&MemoryItem> {
        self.items.iter().find(|m| m.id == id)
    }

    /// Mutable lookup by ID.
    pub fn get_mut(&mut self, id: MemoryId) -> Option<&mut MemoryItem> {
        self.items.iter_mut().find(|m| m.id == id)
    }

    /// Whether an item with this ID is held.
    #[must_use]
    pub fn contains(&self, id: MemoryId) -> bool {
        self.get(id).is_some()
    }

    /// Remove the items that put the tier over capacity.
    ///
    /// Victims are chosen by `(importance, created_at)` ascending; ties keep
    /// insertion order. Returned in eviction order.
    pub fn take_overflow(&mut self) -> Vec<MemoryItem> {
        let excess = self.items.len().saturating_sub(self.capacity);
        if excess == 0 {
            return Vec::new();
        }

        let mut order: Vec<usize> = (0..self.items.len()).collect();
        order.sort_by(|&a, &b| {
            let (x, y) = (&self.items[a], &self.items[b]);
            x.importance
                .total_cmp(&y.importance)
                .then_with(|| x.created_at.cmp(&y.created_at))
        });

        let victims: Vec<MemoryId> = order[..excess].iter().map(|&i| self.items[i].id).collect();
        victims
            .into_iter()
            .filter_map(|id| {
                let pos = self.items.iter().position(|m| m.id == id)?;
                Some(self.items.remove(pos))
            })
            .collect()
    }

    /// Remove every item, in insertion order.
    pub fn drain_all(&mut self) -> Vec<MemoryItem> {
        std::mem::take(&mut self.items)
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::types::Metadata;
    use chrono::{Duration, Utc};

    fn make(content: &str, importance: f32, minutes_ago: i64) -> MemoryItem {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        MemoryItem::new(
            MemoryId::derive(content, &at),
            content,
            Category::Context,
            importance,
            Metadata::new(),
            at,
        )
    }

    #[test]
    fn no_overflow_under_capacity() {
        let mut w = WorkingMemory::new(3);
        w.push(make("a", 0.5, 3));
        w.push(make("b", 0.5, 2));
        assert!(w.take_overflow().is_empty());
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn evicts_least_important_then_oldest() {
        let mut w = WorkingMemory::new(2);
        w.push(make("important", 0.9, 10));
        w.push(make("old-low", 0.2, 9));
        w.push(make("new-low", 0.2, 1));
        w.push(make("mid", 0.5, 0));

        let evicted = w.take_overflow();
        let names: Vec<_> = evicted.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(names, vec!["old-low", "new-low"]);
        let kept: Vec<_> = w.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(kept, vec!["important", "mid"]);
    }

    #[test]
    fn drain_preserves_insertion_order() {
        let mut w = WorkingMemory::new(5);
        w.push(make("first", 0.1, 0));
        w.push(make("second", 0.9, 0));
        let drained = w.drain_all();
        assert_eq!(drained[0].content, "first");
        assert_eq!(drained[1].content, "second");
        assert!(w.is_empty());
    }
}
