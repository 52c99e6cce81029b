//! Configuration for the memory mesh.
//!
//! Maps directly to `memory_mesh.toml`. Every section and field is optional;
//! missing values take the defaults documented on each field.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{MeshError, Result};

/// Top-level memory mesh configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Tier sizes and store-boundary limits.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Retrieval scoring settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Background consolidation settings.
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
    /// Persistence / save settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl MeshConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `MeshError::Config` if the TOML is invalid or fails validation.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| MeshError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Default configuration rooted at `memory_dir`.
    #[must_use]
    pub fn with_memory_dir(memory_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.persistence.memory_dir = memory_dir.into();
        config
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    /// Returns `MeshError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.memory.working_capacity == 0 {
            return Err(MeshError::Config("memory.working_capacity must be at least 1".into()));
        }
        if self.memory.max_content_chars == 0 {
            return Err(MeshError::Config("memory.max_content_chars must be at least 1".into()));
        }
        if self.memory.retention.max_long_term == Some(0) {
            return Err(MeshError::Config(
                "memory.retention.max_long_term must be at least 1".into(),
            ));
        }
        if self.consolidation.interval_seconds == 0 {
            return Err(MeshError::Config(
                "consolidation.interval_seconds must be at least 1".into(),
            ));
        }
        let window = self.retrieval.recency_window_hours;
        if window <= 0.0 || !window.is_finite() {
            return Err(MeshError::Config("retrieval.recency_window_hours must be positive".into()));
        }
        if self.retrieval.frequency_saturation == 0 {
            return Err(MeshError::Config(
                "retrieval.frequency_saturation must be at least 1".into(),
            ));
        }
        let w = &self.retrieval.weights;
        for (name, value) in [
            ("lexical", w.lexical),
            ("phrase", w.phrase),
            ("importance", w.importance),
            ("recency", w.recency),
            ("frequency", w.frequency),
        ] {
            if value < 0.0 || !value.is_finite() {
                return Err(MeshError::Config(format!(
                    "retrieval.weights.{name} must be a non-negative number"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level used when `RUST_LOG` is unset: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Tier sizes and store-boundary limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Working tier cap (Miller's 7±2).
    #[serde(default = "default_7_usize")]
    pub working_capacity: usize,
    /// Working tier size at which a non-forced consolidation runs.
    #[serde(default = "default_5_usize")]
    pub consolidation_threshold: usize,
    /// Longest accepted content, in characters.
    #[serde(default = "default_10000")]
    pub max_content_chars: usize,
    /// Long-term retention policy.
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            working_capacity: 7,
            consolidation_threshold: 5,
            max_content_chars: 10_000,
            retention: RetentionConfig::default(),
        }
    }
}

/// Long-term retention policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Maximum distinct consolidated items. `None` keeps everything.
    #[serde(default)]
    pub max_long_term: Option<usize>,
}

/// Retrieval scoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Results returned when the caller does not pass a limit.
    #[serde(default = "default_5_usize")]
    pub default_limit: usize,
    /// Age (hours) at which the recency signal reaches zero.
    #[serde(default = "default_168")]
    pub recency_window_hours: f64,
    /// Access count at which the frequency signal saturates.
    #[serde(default = "default_10_u32")]
    pub frequency_saturation: u32,
    /// Signal weights.
    #[serde(default)]
    pub weights: RelevanceWeights,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 5,
            recency_window_hours: 168.0,
            frequency_saturation: 10,
            weights: RelevanceWeights::default(),
        }
    }
}

/// Relevance signal weights. They are not normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceWeights {
    /// Weight for the fraction of query words found in the content.
    #[serde(default = "default_0_5")]
    pub lexical: f64,
    /// Flat bonus when the whole query appears in the content.
    #[serde(default = "default_0_3")]
    pub phrase: f64,
    /// Weight for stored importance.
    #[serde(default = "default_0_2")]
    pub importance: f64,
    /// Weight for linear recency decay.
    #[serde(default = "default_0_1")]
    pub recency: f64,
    /// Weight for access frequency.
    #[serde(default = "default_0_1")]
    pub frequency: f64,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            lexical: 0.5,
            phrase: 0.3,
            importance: 0.2,
            recency: 0.1,
            frequency: 0.1,
        }
    }
}

/// Background consolidation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Whether [`crate::MemoryMesh::start_auto_consolidation`] spawns a task.
    #[serde(default = "default_true")]
    pub auto_consolidate: bool,
    /// Seconds between background consolidation checks.
    #[serde(default = "default_300")]
    pub interval_seconds: u64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            auto_consolidate: true,
            interval_seconds: 300,
        }
    }
}

/// Storage backend for persisted tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// One JSON file per document in the memory directory.
    #[default]
    Json,
    /// The same documents as rows of a SQLite database.
    Sqlite,
}

/// Persistence / save configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding the persisted documents.
    #[serde(default = "default_memory_dir")]
    pub memory_dir: PathBuf,
    /// Backend: "json" or "sqlite".
    #[serde(default)]
    pub backend: BackendKind,
    /// Use WAL mode (SQLite backend only).
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Detect corruption via checksums (SQLite backend only).
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
    /// Number of backup generations to keep.
    #[serde(default = "default_3")]
    pub backup_count: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            memory_dir: default_memory_dir(),
            backend: BackendKind::Json,
            wal_mode: true,
            checksum_enabled: true,
            backup_count: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_memory_dir() -> PathBuf { PathBuf::from("alphavox_memory") }
fn default_0_1() -> f64 { 0.1 }
fn default_0_2() -> f64 { 0.2 }
fn default_0_3() -> f64 { 0.3 }
fn default_0_5() -> f64 { 0.5 }
fn default_168() -> f64 { 168.0 }
fn default_3() -> u32 { 3 }
fn default_5_usize() -> usize { 5 }
fn default_7_usize() -> usize { 7 }
fn default_10_u32() -> u32 { 10 }
fn default_300() -> u64 { 300 }
fn default_10000() -> usize { 10_000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = MeshConfig::from_toml("").expect("parse");
        assert_eq!(config.memory.working_capacity, 7);
        assert_eq!(config.memory.consolidation_threshold, 5);
        assert_eq!(config.consolidation.interval_seconds, 300);
        assert_eq!(config.persistence.backend, BackendKind::Json);
        assert_eq!(config.persistence.memory_dir, PathBuf::from("alphavox_memory"));
        assert!(config.memory.retention.max_long_term.is_none());
        assert!((config.retrieval.weights.lexical - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_sections_override() {
        let config = MeshConfig::from_toml(
            r#"
            [memory]
            working_capacity = 3

            [memory.retention]
            max_long_term = 500

            [retrieval.weights]
            phrase = 0.4

            [persistence]
            backend = "sqlite"
            memory_dir = "/tmp/mesh"
            "#,
        )
        .expect("parse");
        assert_eq!(config.memory.working_capacity, 3);
        assert_eq!(config.memory.consolidation_threshold, 5);
        assert_eq!(config.memory.retention.max_long_term, Some(500));
        assert!((config.retrieval.weights.phrase - 0.4).abs() < f64::EPSILON);
        assert!((config.retrieval.weights.lexical - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.persistence.backend, BackendKind::Sqlite);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(MeshConfig::from_toml("[memory]\nworking_capacity = 0").is_err());
        assert!(MeshConfig::from_toml("[consolidation]\ninterval_seconds = 0").is_err());
        assert!(MeshConfig::from_toml("[retrieval.weights]\nlexical = -1.0").is_err());
        assert!(MeshConfig::from_toml("[persistence]\nbackend = \"redis\"").is_err());
        assert!(MeshConfig::from_toml("not toml at all [").is_err());
    }

    #[test]
    fn memory_dir_helper() {
        let config = MeshConfig::with_memory_dir("/var/lib/mesh");
        assert_eq!(config.persistence.memory_dir, PathBuf::from("/var/lib/mesh"));
        assert!(config.validate().is_ok());
    }
}
