//! Bridge module — maps between string context and memory items.
//!
//! Callers hand the bridge `key: value` facts and free-text queries and get
//! back single strings ready to drop into a prompt or a log line. Formatting
//! rules:
//! - retrieval hits render as `[category] content`
//! - working, recent and category context render as bare `content`
//! - entries are joined with the configured delimiter (`" | "` by default)
//! - no hits render as the empty string

use std::fmt::Display;
use std::sync::Arc;

use mesh_core::{
    Category, CategoryHint, ConsolidationReport, MemoryId, MemoryItem, MemoryMesh, MeshStats,
    Metadata, Result,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{BridgeConfig, BridgeFileConfig};

/// Hours counted as "recent" for the `recent_conversations` alias.
const RECENT_CONVERSATION_HOURS: u32 = 24;
/// Episodic entries scanned for the `recent_conversations` alias.
const RECENT_CONVERSATION_SCAN: usize = 20;
/// IDs reported in `most_accessed`.
const MOST_ACCESSED_COUNT: usize = 5;

/// Mesh statistics plus the fields older callers expect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeStats {
    /// Tier counts from the mesh.
    #[serde(flatten)]
    pub mesh: MeshStats,
    /// Whether the mesh has persisted anything yet.
    pub memory_file_exists: bool,
    /// Most recalled memory IDs, most recalled first.
    pub most_accessed: Vec<MemoryId>,
    /// Alias of `episodic_memory_count`.
    pub long_term_memories: usize,
    /// Alias of `working_memory_count`.
    pub session_memories: usize,
    /// Episodic entries created in the last 24 hours.
    pub recent_conversations: usize,
}

/// String-context adapter over a shared [`MemoryMesh`].
#[derive(Debug, Clone)]
pub struct MemoryMeshBridge {
    mesh: Arc<MemoryMesh>,
    config: BridgeConfig,
}

impl MemoryMeshBridge {
    /// Wrap an existing mesh.
    #[must_use]
    pub fn new(mesh: Arc<MemoryMesh>, config: BridgeConfig) -> Self {
        Self { mesh, config }
    }

    /// Open a mesh from a combined configuration and wrap it.
    ///
    /// # Errors
    /// Returns an error if the mesh cannot be opened.
    pub fn open(config: BridgeFileConfig) -> Result<Self> {
        let mesh = Arc::new(MemoryMesh::open(config.mesh)?);
        Ok(Self::new(mesh, config.bridge))
    }

    /// The wrapped mesh.
    #[must_use]
    pub fn mesh(&self) -> &Arc<MemoryMesh> {
        &self.mesh
    }

    /// Bridge configuration.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Re-read persisted long-term memory.
    pub fn load(&self) {
        self.mesh.reload();
        info!("Memory mesh bridge loaded");
    }

    /// Consolidate all working memory and make sure it reached disk.
    ///
    /// # Errors
    /// Returns the save error if persisting fails.
    pub fn save(&self) -> Result<()> {
        if self.mesh.consolidate_all(true).persisted {
            Ok(())
        } else {
            self.mesh.save()
        }
    }

    /// Store `"{key}: {value}"` with keyword-derived importance and
    /// automatic categorization. The key is kept in the metadata.
    ///
    /// # Errors
    /// Returns `MeshError::InvalidInput` if the combined content is rejected.
    pub fn store(&self, key: &str, value: impl Display) -> Result<MemoryId> {
        let value = value.to_string();
        let importance = self.importance_for(&value);
        let mut metadata = Metadata::new();
        metadata.insert("key".to_string(), serde_json::Value::String(key.to_string()));

        let id = self
            .mesh
            .store(&format!("{key}: {value}"), CategoryHint::Auto, importance, metadata)?;
        debug!(%id, key, importance, "Bridge stored memory");
        Ok(id)
    }

    /// Importance the bridge assigns to a stored value.
    #[must_use]
    pub fn importance_for(&self, value: &str) -> f32 {
        let lowered = value.to_lowercase();
        let important = self
            .config
            .high_importance_keywords
            .iter()
            .any(|k| lowered.contains(&k.to_lowercase()));
        if important {
            self.config.high_importance
        } else {
            self.config.default_importance
        }
    }

    /// Top hits for `query` as `[category] content`, joined.
    #[must_use]
    pub fn retrieve_relevant(&self, query: &str) -> String {
        let hits = self.mesh.retrieve(query, None, self.config.retrieve_limit);
        self.join(hits.iter().map(|m| format!("[{}] {}", m.category, m.content)))
    }

    /// Mesh statistics with legacy aliases.
    #[must_use]
    pub fn get_memory_stats(&self) -> BridgeStats {
        let mesh = self.mesh.stats();
        BridgeStats {
            memory_file_exists: self.mesh.has_persisted_state(),
            most_accessed: self.mesh.most_accessed(MOST_ACCESSED_COUNT),
            long_term_memories: mesh.episodic_memory_count,
            session_memories: mesh.working_memory_count,
            recent_conversations: self
                .mesh
                .recent_memories(RECENT_CONVERSATION_HOURS, RECENT_CONVERSATION_SCAN)
                .len(),
            mesh,
        }
    }

    /// Working memory contents, joined.
    #[must_use]
    pub fn get_working_context(&self) -> String {
        self.join_contents(&self.mesh.working_memory())
    }

    /// Episodic memories from the last `hours`, newest first, joined.
    #[must_use]
    pub fn get_recent_context(&self, hours: u32) -> String {
        self.join_contents(&self.mesh.recent_memories(hours, self.config.recent_limit))
    }

    /// Most important memories in one category, joined.
    #[must_use]
    pub fn get_category_context(&self, category: Category) -> String {
        self.join_contents(&self.mesh.by_category(category, self.config.category_limit))
    }

    /// Trigger consolidation.
    pub fn consolidate(&self, force: bool) -> ConsolidationReport {
        self.mesh.consolidate_all(force)
    }

    fn join_contents(&self, items: &[MemoryItem]) -> String {
        self.join(items.iter().map(|m| m.content.clone()))
    }

    fn join(&self, parts: impl Iterator<Item = String>) -> String {
        parts.collect::<Vec<_>>().join(&self.config.delimiter)
    }
}
