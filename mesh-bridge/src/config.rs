//! Bridge configuration.
//!
//! The bridge reads the same TOML file as the mesh and adds a `[bridge]`
//! section:
//!
//! ```toml
//! [persistence]
//! memory_dir = "alphavox_memory"
//!
//! [bridge]
//! retrieve_limit = 5
//! high_importance_keywords = ["learn", "important", "remember", "critical"]
//! ```

use std::path::Path;

use mesh_core::{MeshConfig, MeshError, Result};
use serde::{Deserialize, Serialize};

/// Formatting and heuristic knobs for [`crate::MemoryMeshBridge`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Hits returned by `retrieve_relevant`.
    #[serde(default = "default_retrieve_limit")]
    pub retrieve_limit: usize,
    /// Items returned by `get_recent_context`.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
    /// Items returned by `get_category_context`.
    #[serde(default = "default_category_limit")]
    pub category_limit: usize,
    /// Values containing any of these (case-insensitive) are stored as important.
    #[serde(default = "default_keywords")]
    pub high_importance_keywords: Vec<String>,
    /// Importance for values matching a keyword.
    #[serde(default = "default_high_importance")]
    pub high_importance: f32,
    /// Importance for everything else.
    #[serde(default = "default_importance")]
    pub default_importance: f32,
    /// Separator between formatted memories.
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            retrieve_limit: default_retrieve_limit(),
            recent_limit: default_recent_limit(),
            category_limit: default_category_limit(),
            high_importance_keywords: default_keywords(),
            high_importance: default_high_importance(),
            default_importance: default_importance(),
            delimiter: default_delimiter(),
        }
    }
}

/// One TOML file: the mesh sections plus `[bridge]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeFileConfig {
    /// Mesh configuration (top-level sections).
    #[serde(flatten)]
    pub mesh: MeshConfig,
    /// Bridge section.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl BridgeFileConfig {
    /// Parse and validate a TOML string.
    ///
    /// # Errors
    /// Returns `MeshError::Config` on parse or validation failure.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| MeshError::Config(e.to_string()))?;
        config.mesh.validate()?;
        if config.bridge.retrieve_limit == 0 {
            return Err(MeshError::Config("bridge.retrieve_limit must be at least 1".into()));
        }
        Ok(config)
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

fn default_retrieve_limit() -> usize { 5 }
fn default_recent_limit() -> usize { 10 }
fn default_category_limit() -> usize { 5 }
fn default_high_importance() -> f32 { 0.8 }
fn default_importance() -> f32 { 0.5 }
fn default_delimiter() -> String { " | ".to_string() }
fn default_keywords() -> Vec<String> {
    ["learn", "important", "remember", "critical"]
        .into_iter()
        .map(str::to_string)
        .collect()
}
