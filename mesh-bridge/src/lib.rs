//! # mesh-bridge — string-context adapter for the memory mesh
//!
//! Conversational callers think in strings, not memory items. This crate
//! wraps a shared [`mesh_core::MemoryMesh`] behind the small surface they
//! expect:
//!
//! - `store(key, value)` with a keyword importance heuristic
//! - `retrieve_relevant(query)` returning `"[category] content | ..."`
//! - `get_memory_stats()` with the legacy field names older callers read
//!
//! It also ships the `memory-mesh` operator CLI.
//!
//! ## Modules
//!
//! - `bridge` — [`MemoryMeshBridge`] and [`BridgeStats`]
//! - `config` — `[bridge]` TOML section layered over the mesh configuration

#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]

pub mod bridge;
pub mod config;

pub use bridge::{BridgeStats, MemoryMeshBridge};
pub use config::{BridgeConfig, BridgeFileConfig};
