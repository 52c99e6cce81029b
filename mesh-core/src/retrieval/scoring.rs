//! Per-factor scoring functions for relevance retrieval.
//!
//! Score = w₁·Lexical(m) + w₂·Phrase(m) + w₃·Importance(m)
//!       + w₄·Recency(m) + w₅·Frequency(m)
//!
//! Where:
//!   Lexical(m)    = matched query words / query words   (substring match)
//!   Phrase(m)     = 1 if the whole query occurs in the content, else 0
//!   Importance(m) = stored importance (0–1)
//!   Recency(m)    = max(0, 1 − age_hours / window)
//!   Frequency(m)  = min(1, access_count / saturation)
//!
//! An item only scores when it shares text with the query (lexical or
//! phrase); importance, recency and frequency rank matches, they never
//! create them.

use chrono::{DateTime, Utc};

use crate::config::RetrievalConfig;
use crate::memory::MemoryItem;
use crate::retrieval::{PreparedQuery, ScoreBreakdown};

/// Compute the weighted breakdown for one item, or `None` when the item
/// shares no text with the query.
#[must_use]
pub fn compute_breakdown(
    memory: &MemoryItem,
    query: &PreparedQuery,
    now: DateTime<Utc>,
    config: &RetrievalConfig,
) -> Option<ScoreBreakdown> {
    let content = memory.content.to_lowercase();
    let lexical = lexical_overlap(query.words(), &content);
    let phrase = phrase_match(query.lowered(), &content);
    if lexical <= 0.0 && !phrase {
        return None;
    }

    let w = &config.weights;
    Some(ScoreBreakdown {
        lexical: w.lexical * lexical,
        phrase: if phrase { w.phrase } else { 0.0 },
        importance: w.importance * f64::from(memory.importance),
        recency: w.recency * recency(memory, now, config.recency_window_hours),
        frequency: w.frequency * frequency(memory.access_count, config.frequency_saturation),
    })
}

/// Fraction of query words that occur somewhere in `content`.
///
/// Both sides are expected lowercased. Matching is by substring, so "tea"
/// matches "steam".
#[must_use]
pub fn lexical_overlap(words: &[String], content: &str) -> f64 {
    if words.is_empty() {
        return 0.0;
    }
    let matched = words.iter().filter(|w| content.contains(w.as_str())).count();
    #[allow(clippy::cast_precision_loss)]
    let fraction = matched as f64 / words.len() as f64;
    fraction
}

/// Whether the whole (lowercased) query occurs in `content`.
#[must_use]
pub fn phrase_match(query: &str, content: &str) -> bool {
    !query.is_empty() && content.contains(query)
}

/// Linear recency decay: 1 for brand-new items, 0 at `window_hours` and beyond.
#[must_use]
pub fn recency(memory: &MemoryItem, now: DateTime<Utc>, window_hours: f64) -> f64 {
    (1.0 - memory.age_hours(now) / window_hours).max(0.0)
}

/// Access-frequency signal, saturating at 1.
#[must_use]
pub fn frequency(access_count: u32, saturation: u32) -> f64 {
    (f64::from(access_count) / f64::from(saturation.max(1))).min(1.0)
}
