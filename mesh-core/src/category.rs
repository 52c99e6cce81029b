//! Semantic categories and keyword-driven auto-categorization.
//!
//! Categorization is a pure function of `(content, metadata)`. Keyword groups
//! are checked in the fixed order of [`CATEGORY_RULES`]; the first group with
//! any match wins, so content mentioning both "learn" and "prefer" files
//! under [`Category::Learning`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MeshError;
use crate::types::Metadata;

/// Semantic memory bucket.
///
/// Unknown names (from older save files or free-form metadata hints) decode
/// as [`Category::Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Category {
    /// Conversation patterns and recalled statements.
    Conversation,
    /// Learned facts and concepts.
    Learning,
    /// User likes, dislikes and preferences.
    Preferences,
    /// People and connections.
    Relationships,
    /// Important events and milestones.
    Events,
    /// Everything else.
    Context,
}

impl Category {
    /// Every category, in bucket order.
    pub const ALL: [Self; 6] = [
        Self::Conversation,
        Self::Learning,
        Self::Preferences,
        Self::Relationships,
        Self::Events,
        Self::Context,
    ];

    /// Snake-case name used on disk and in formatted context.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Learning => "learning",
            Self::Preferences => "preferences",
            Self::Relationships => "relationships",
            Self::Events => "events",
            Self::Context => "context",
        }
    }

    /// Parse a category name, mapping anything unrecognized to `Context`.
    #[must_use]
    pub fn parse_lenient(name: &str) -> Self {
        name.parse().unwrap_or(Self::Context)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == lowered)
            .ok_or_else(|| MeshError::invalid("category", format!("unknown category {s:?}")))
    }
}

impl From<String> for Category {
    fn from(name: String) -> Self {
        Self::parse_lenient(&name)
    }
}

/// How the store should pick a category for new content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryHint {
    /// Derive the category with [`categorize`].
    #[default]
    Auto,
    /// Pin the item to this category.
    Explicit(Category),
}

impl From<Category> for CategoryHint {
    fn from(category: Category) -> Self {
        Self::Explicit(category)
    }
}

impl From<Option<Category>> for CategoryHint {
    fn from(category: Option<Category>) -> Self {
        category.map_or(Self::Auto, Self::Explicit)
    }
}

/// Keyword groups in priority order. Matching is case-insensitive substring.
pub const CATEGORY_RULES: &[(Category, &[&str])] = &[
    (
        Category::Conversation,
        &["remember", "recall", "told me", "said that"],
    ),
    (
        Category::Learning,
        &["learn", "understand", "know", "fact", "information"],
    ),
    (
        Category::Preferences,
        &["like", "prefer", "favorite", "love", "hate"],
    ),
    (
        Category::Relationships,
        &["meet", "person", "friend", "family", "colleague"],
    ),
    (
        Category::Events,
        &["happened", "event", "milestone", "achievement"],
    ),
];

/// Pick a category for `content`.
///
/// Metadata hints win: a string `type` entry names the category directly,
/// and a `speaker` entry means conversation. Otherwise the first matching
/// keyword group in [`CATEGORY_RULES`] decides, defaulting to `Context`.
#[must_use]
pub fn categorize(content: &str, metadata: &Metadata) -> Category {
    if let Some(kind) = metadata.get("type").and_then(serde_json::Value::as_str) {
        if !kind.is_empty() {
            return Category::parse_lenient(kind);
        }
    }
    if metadata.get("speaker").is_some_and(|v| !v.is_null()) {
        return Category::Conversation;
    }

    let lowered = content.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map_or(Category::Context, |(category, _)| *category)
}
