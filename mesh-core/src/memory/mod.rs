//! Memory items and the tier containers that hold them.
//!
//! - **Working** — "What I'm thinking about now" (bounded, insertion-ordered)
//! - **Long-term** — an append-only arena of consolidated items, viewed as
//!   the **episodic** log (consolidation order) and the **semantic** buckets
//!   (one per [`Category`]).

pub mod long_term;
pub mod working;

pub use long_term::LongTermMemory;
pub use working::WorkingMemory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::types::{MemoryId, Metadata};

/// A single stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Content-derived identifier.
    pub id: MemoryId,
    /// Free-text content.
    pub content: String,
    /// Semantic bucket this item files under.
    pub category: Category,
    /// When the item was stored. Never changes.
    #[serde(rename = "timestamp", with = "crate::types::timestamp")]
    pub created_at: DateTime<Utc>,
    /// How important the item is (0.0 to 1.0).
    pub importance: f32,
    /// Caller-supplied context, carried through unchanged.
    #[serde(default)]
    pub metadata: Metadata,
    /// Number of retrievals that matched this item.
    #[serde(default)]
    pub access_count: u32,
    /// Last time a retrieval matched this item.
    #[serde(rename = "last_access", with = "crate::types::timestamp")]
    pub last_accessed_at: DateTime<Utc>,
}

impl MemoryItem {
    /// Create a fresh item that has never been recalled.
    ///
    /// `importance` is clamped to [0, 1].
    #[must_use]
    pub fn new(
        id: MemoryId,
        content: impl Into<String>,
        category: Category,
        importance: f32,
        metadata: Metadata,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            content: content.into(),
            category,
            created_at,
            importance: importance.clamp(0.0, 1.0),
            metadata,
            access_count: 0,
            last_accessed_at: created_at,
        }
    }

    /// Record a successful recall. Count and timestamp never move backwards.
    pub fn record_access(&mut self, now: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        if now > self.last_accessed_at {
            self.last_accessed_at = now;
        }
    }

    /// Hours elapsed since creation (0 if `now` precedes creation).
    #[must_use]
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        let millis = now.signed_duration_since(self.created_at).num_milliseconds();
        #[allow(clippy::cast_precision_loss)]
        let hours = millis.max(0) as f64 / 3_600_000.0;
        hours
    }
}
