//! Memory Retrieval — keyword relevance + multi-factor ranking
//!
//! The retrieval score combines five weighted factors:
//!   Score = w₁·Lexical + w₂·Phrase + w₃·Importance + w₄·Recency + w₅·Frequency
//!
//! Candidates are scanned working → episodic → semantic. An item reachable
//! through several views is scored once, at its first occurrence, and equal
//! scores keep scan order.

pub mod scoring;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::RetrievalConfig;
use crate::memory::MemoryItem;
use crate::types::{MemoryId, RelevanceScore};

/// A query normalized for matching: lowercased, split on whitespace.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    lowered: String,
    words: Vec<String>,
}

impl PreparedQuery {
    /// Prepare `query`, or `None` if it is blank.
    #[must_use]
    pub fn new(query: &str) -> Option<Self> {
        let lowered = query.trim().to_lowercase();
        if lowered.is_empty() {
            return None;
        }
        let words = lowered.split_whitespace().map(str::to_string).collect();
        Some(Self { lowered, words })
    }

    /// The whole lowercased query.
    #[must_use]
    pub fn lowered(&self) -> &str {
        &self.lowered
    }

    /// Lowercased query words.
    #[must_use]
    pub fn words(&self) -> &[String] {
        &self.words
    }
}

/// Breakdown of a retrieval score into its weighted factors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    /// Word-overlap contribution.
    pub lexical: f64,
    /// Exact-phrase bonus.
    pub phrase: f64,
    /// Importance contribution.
    pub importance: f64,
    /// Recency contribution.
    pub recency: f64,
    /// Access-frequency contribution.
    pub frequency: f64,
}

impl ScoreBreakdown {
    /// Sum of all factors.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.lexical + self.phrase + self.importance + self.recency + self.frequency
    }
}

/// A candidate that matched, before access bookkeeping is applied.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    /// Which item matched.
    pub id: MemoryId,
    /// Combined score.
    pub score: RelevanceScore,
    /// Per-factor breakdown.
    pub breakdown: ScoreBreakdown,
}

/// A retrieval hit with its score (useful for diagnostics and the CLI).
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMemory {
    /// The matched memory, with this retrieval's access already recorded.
    pub memory: MemoryItem,
    /// Combined score.
    #[serde(serialize_with = "serialize_score")]
    pub score: RelevanceScore,
    /// Per-factor breakdown.
    pub breakdown: ScoreBreakdown,
}

fn serialize_score<S: serde::Serializer>(score: &RelevanceScore, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(score.value())
}

/// Scores and orders candidates for a query.
#[derive(Debug, Clone)]
pub struct RetrievalEngine {
    config: RetrievalConfig,
}

impl RetrievalEngine {
    /// Create a new retrieval engine with the given configuration.
    #[must_use]
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Score every candidate and return the matches, best first.
    ///
    /// Duplicate IDs are skipped after their first occurrence. Items with no
    /// text overlap, or a non-positive total, are dropped. The result is not
    /// truncated; callers apply their own limit after recording access.
    pub fn rank<'a>(
        &self,
        query: &PreparedQuery,
        candidates: impl IntoIterator<Item = &'a MemoryItem>,
        now: DateTime<Utc>,
    ) -> Vec<RankedCandidate> {
        let mut seen: HashSet<MemoryId> = HashSet::new();
        let mut ranked: Vec<RankedCandidate> = candidates
            .into_iter()
            .filter(|m| seen.insert(m.id))
            .filter_map(|m| {
                let breakdown = scoring::compute_breakdown(m, query, now, &self.config)?;
                let total = breakdown.total();
                (total > 0.0).then(|| RankedCandidate {
                    id: m.id,
                    score: RelevanceScore::new(total),
                    breakdown,
                })
            })
            .collect();

        // Stable: ties keep scan order.
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }
}
