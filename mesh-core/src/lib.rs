//! # Memory Mesh Core Library
//!
//! Tiered memory for a conversational assistant, modelled on human memory:
//!
//! - **Working** — "What I'm thinking about now" (bounded, Miller's 7±2)
//! - **Episodic** — "What happened" (time-ordered log of consolidated items)
//! - **Semantic** — "What I know" (consolidated items bucketed by [`Category`])
//!
//! New content lands in working memory. Overflow, explicit consolidation or
//! the periodic background task moves it into the long-term tiers, which are
//! persisted as JSON documents (or rows in SQLite). Retrieval scores every
//! tier by keyword overlap, exact phrase, importance, recency and access
//! frequency, and strengthens the memories it returns.
//!
//! ```no_run
//! # use mesh_core::{MemoryMesh, MeshConfig, CategoryHint, Metadata};
//! let mesh = MemoryMesh::open(MeshConfig::with_memory_dir("alphavox_memory"))?;
//! mesh.store("Everett is learning Python", CategoryHint::Auto, 0.9, Metadata::new())?;
//! let hits = mesh.retrieve("python", None, 5);
//! assert_eq!(hits.len(), 1);
//! # Ok::<(), mesh_core::MeshError>(())
//! ```

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod category;
pub mod config;
pub mod consolidation;
pub mod error;
pub mod memory;
pub mod mesh;
pub mod metrics;
pub mod persistence;
pub mod retrieval;
pub mod scheduler;
pub mod types;
pub mod validation;

pub use category::{categorize, Category, CategoryHint};
pub use config::MeshConfig;
pub use consolidation::ConsolidationReport;
pub use error::{MeshError, Result};
pub use memory::MemoryItem;
pub use mesh::{MemoryMesh, MeshStats};
pub use retrieval::ScoredMemory;
pub use scheduler::ConsolidationHandle;
pub use types::*;
