//! Durable storage for the long-term tiers.
//!
//! The mesh persists three JSON documents:
//!
//! | Document                | Contents                                        |
//! |-------------------------|-------------------------------------------------|
//! | `episodic_memory.json`  | array of records, episodic order                |
//! | `semantic_memory.json`  | object: category name → array of records        |
//! | `memory_metadata.json`  | importance / access / consolidation maps by id  |
//!
//! Where the documents live is up to a [`DocumentStore`]:
//! - [`JsonDirStore`] writes one file per document (tmp file + rename).
//! - [`SqliteStore`] keeps them as rows of a single table:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS mesh_documents (
//!     name       TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! Loading never fails: a missing or unreadable document leaves its tier
//! empty and logs a warning.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::category::Category;
use crate::config::{BackendKind, PersistenceConfig};
use crate::error::Result;
use crate::memory::{LongTermMemory, MemoryItem};
use crate::types::{timestamp, MemoryId};

/// Episodic log document.
pub const EPISODIC_DOC: &str = "episodic_memory.json";
/// Semantic buckets document.
pub const SEMANTIC_DOC: &str = "semantic_memory.json";
/// Per-item bookkeeping document.
pub const METADATA_DOC: &str = "memory_metadata.json";
/// Every persisted document, in write order.
pub const DOCUMENTS: [&str; 3] = [EPISODIC_DOC, SEMANTIC_DOC, METADATA_DOC];

/// SQLite database file name inside the memory directory.
pub const SQLITE_FILE: &str = "memory_mesh.db";
/// Backup generations live under this subdirectory.
pub const BACKUP_DIR: &str = "backups";
/// Suffix for the copy kept of a document that failed to decode.
pub const CORRUPT_SUFFIX: &str = ".corrupt";

/// Per-process sequence for temp file names.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 (ISO 3309) of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    format!("{:08x}", !crc)
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Per-item bookkeeping, keyed by memory ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    /// Importance per item.
    #[serde(default)]
    pub importance: BTreeMap<MemoryId, f32>,
    /// Access count per item.
    #[serde(default)]
    pub access_count: BTreeMap<MemoryId, u32>,
    /// Last retrieval time per item.
    #[serde(default, deserialize_with = "timestamp::deserialize_map")]
    pub last_access: BTreeMap<MemoryId, DateTime<Utc>>,
    /// When each item was consolidated.
    #[serde(default, deserialize_with = "timestamp::deserialize_map")]
    pub consolidated_at: BTreeMap<MemoryId, DateTime<Utc>>,
}

/// Everything the mesh persists, captured at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshSnapshot {
    /// Episodic log, in order.
    pub episodic: Vec<MemoryItem>,
    /// Semantic buckets.
    pub semantic: BTreeMap<Category, Vec<MemoryItem>>,
    /// Bookkeeping maps.
    pub metadata: MetadataDocument,
}

impl MeshSnapshot {
    /// Capture the long-term tiers.
    #[must_use]
    pub fn capture(long_term: &LongTermMemory) -> Self {
        let mut metadata = MetadataDocument::default();
        for item in long_term.items() {
            metadata.importance.insert(item.id, item.importance);
            metadata.access_count.insert(item.id, item.access_count);
            metadata.last_access.insert(item.id, item.last_accessed_at);
        }
        metadata.consolidated_at = long_term
            .consolidation_times()
            .iter()
            .map(|(id, at)| (*id, *at))
            .collect();

        Self {
            episodic: long_term.episodic_records(),
            semantic: long_term.semantic_records(),
            metadata,
        }
    }

    /// Rebuild the long-term tiers.
    ///
    /// Bookkeeping maps override the embedded record fields, except that
    /// access statistics never move backwards.
    #[must_use]
    pub fn into_long_term(self) -> LongTermMemory {
        let Self {
            episodic,
            semantic,
            metadata,
        } = self;
        let overlay = |mut item: MemoryItem| {
            if let Some(&importance) = metadata.importance.get(&item.id) {
                if importance.is_finite() {
                    item.importance = importance.clamp(0.0, 1.0);
                }
            }
            if let Some(&count) = metadata.access_count.get(&item.id) {
                item.access_count = item.access_count.max(count);
            }
            if let Some(&at) = metadata.last_access.get(&item.id) {
                item.last_accessed_at = item.last_accessed_at.max(at);
            }
            item
        };

        let episodic = episodic.into_iter().map(overlay).collect();
        let semantic = semantic
            .into_iter()
            .map(|(c, items)| (c, items.into_iter().map(overlay).collect()))
            .collect();
        let consolidated_at = metadata.consolidated_at.into_iter().collect();
        LongTermMemory::from_views(episodic, semantic, consolidated_at)
    }
}

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

/// Named-blob storage used by [`Persistence`].
pub trait DocumentStore: Send + Sync + fmt::Debug {
    /// Replace a document.
    ///
    /// # Errors
    /// Returns an error if the backend write fails.
    fn write(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Read a document, `None` if it has never been written.
    ///
    /// # Errors
    /// Returns an error if the backend read fails.
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Human-readable location, for logs.
    fn location(&self) -> &Path;
}

/// One pretty-printed JSON file per document.
///
/// Each write goes to its own temp file and is renamed into place, so
/// concurrent writers never share a temp path.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// Store documents under `dir` (created on first write).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DocumentStore for JsonDirStore {
    fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let target = self.dir.join(name);
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!("{name}.{}.{seq}.tmp", std::process::id()));
        std::fs::write(&tmp, data)?;
        if let Err(e) = std::fs::rename(&tmp, &target) {
            // Best effort; the rename error is the one worth reporting.
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.dir.join(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn location(&self) -> &Path {
        &self.dir
    }
}

/// Documents as rows of an SQLite table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    checksum_enabled: bool,
    db_path: PathBuf,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("checksum_enabled", &self.checksum_enabled)
            .finish_non_exhaustive()
    }
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS mesh_documents (
    name       TEXT PRIMARY KEY,
    data       BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns [`crate::MeshError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "SQLite document store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            checksum_enabled: config.checksum_enabled,
            db_path,
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    /// Returns [`crate::MeshError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            checksum_enabled: config.checksum_enabled,
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Run SQLite's integrity check.
    ///
    /// # Errors
    /// Returns [`crate::MeshError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

impl DocumentStore for SqliteStore {
    fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        let checksum = self.checksum_enabled.then(|| crc32_hex(data));
        let now = Utc::now().to_rfc3339();
        self.conn.lock().execute(
            "INSERT INTO mesh_documents (name, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![name, data, now, checksum],
        )?;
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT data, checksum FROM mesh_documents WHERE name = ?1")?;
        let row: Option<(Vec<u8>, Option<String>)> = stmt
            .query_row(params![name], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((data, stored_checksum)) = row else {
            return Ok(None);
        };
        if self.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(
                        document = name,
                        expected = %expected,
                        actual = %actual,
                        "Checksum mismatch, possible save corruption"
                    );
                }
            }
        }
        Ok(Some(data))
    }

    fn location(&self) -> &Path {
        &self.db_path
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Saves, loads and backs up mesh snapshots through a [`DocumentStore`].
#[derive(Debug)]
pub struct Persistence {
    store: Box<dyn DocumentStore>,
    memory_dir: PathBuf,
    backup_count: u32,
}

impl Persistence {
    /// Open the backend selected by `config.backend`.
    ///
    /// # Errors
    /// Returns an error if the SQLite database cannot be opened.
    pub fn open(config: &PersistenceConfig) -> Result<Self> {
        let store: Box<dyn DocumentStore> = match config.backend {
            BackendKind::Json => Box::new(JsonDirStore::new(&config.memory_dir)),
            BackendKind::Sqlite => {
                Box::new(SqliteStore::open(config.memory_dir.join(SQLITE_FILE), config)?)
            }
        };
        Ok(Self::with_store(store, config))
    }

    /// Use an explicit document store.
    #[must_use]
    pub fn with_store(store: Box<dyn DocumentStore>, config: &PersistenceConfig) -> Self {
        Self {
            store,
            memory_dir: config.memory_dir.clone(),
            backup_count: config.backup_count,
        }
    }

    /// Directory backups are written under.
    #[must_use]
    pub fn memory_dir(&self) -> &Path {
        &self.memory_dir
    }

    /// Write all three documents.
    ///
    /// # Errors
    /// Returns an error on encoding or backend failure. Documents written
    /// before the failure stay written.
    pub fn save(&self, snapshot: &MeshSnapshot) -> Result<()> {
        let start = Instant::now();
        let episodic = serde_json::to_vec_pretty(&snapshot.episodic)?;
        let semantic = serde_json::to_vec_pretty(&snapshot.semantic)?;
        let metadata = serde_json::to_vec_pretty(&snapshot.metadata)?;

        self.store.write(EPISODIC_DOC, &episodic)?;
        self.store.write(SEMANTIC_DOC, &semantic)?;
        self.store.write(METADATA_DOC, &metadata)?;

        debug!(
            location = %self.store.location().display(),
            episodic = snapshot.episodic.len(),
            bytes = episodic.len() + semantic.len() + metadata.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved memory mesh"
        );
        Ok(())
    }

    /// Load whatever is persisted. Missing or corrupt documents load empty.
    ///
    /// A document that cannot be decoded is first copied to
    /// `<name>.corrupt`, so the next save cannot destroy its contents.
    #[must_use]
    pub fn load(&self) -> MeshSnapshot {
        let start = Instant::now();
        let snapshot = MeshSnapshot {
            episodic: self.load_document(EPISODIC_DOC).unwrap_or_default(),
            semantic: self.load_document(SEMANTIC_DOC).unwrap_or_default(),
            metadata: self.load_document(METADATA_DOC).unwrap_or_default(),
        };
        debug!(
            location = %self.store.location().display(),
            episodic = snapshot.episodic.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Loaded memory mesh"
        );
        snapshot
    }

    fn load_document<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        let bytes = match self.store.read(name) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(
                    document = name,
                    error = %e,
                    "Failed to read persisted document; starting empty"
                );
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                let keep = format!("{name}{CORRUPT_SUFFIX}");
                match self.store.write(&keep, &bytes) {
                    Ok(()) => warn!(
                        document = name,
                        kept_as = %keep,
                        error = %e,
                        "Corrupt persisted document; copy kept, starting empty"
                    ),
                    Err(write_err) => warn!(
                        document = name,
                        error = %e,
                        keep_error = %write_err,
                        "Corrupt persisted document; could not keep a copy, starting empty"
                    ),
                }
                None
            }
        }
    }

    /// Whether the episodic document has ever been written.
    #[must_use]
    pub fn has_persisted_state(&self) -> bool {
        matches!(self.store.read(EPISODIC_DOC), Ok(Some(_)))
    }

    /// Copy the persisted documents into `memory_dir/backups/1/`, shifting
    /// older generations up and keeping at most `backup_count`.
    ///
    /// Returns the new backup directory, or `None` when backups are
    /// disabled (`backup_count = 0`).
    ///
    /// # Errors
    /// Returns an error if rotating or writing the backup fails.
    pub fn backup(&self) -> Result<Option<PathBuf>> {
        let max = self.backup_count;
        if max == 0 {
            return Ok(None);
        }

        let root = self.memory_dir.join(BACKUP_DIR);
        std::fs::create_dir_all(&root)?;

        // Oldest first so nothing is overwritten.
        let oldest = root.join(max.to_string());
        if oldest.exists() {
            std::fs::remove_dir_all(&oldest)?;
        }
        for n in (1..max).rev() {
            let src = root.join(n.to_string());
            if src.exists() {
                std::fs::rename(&src, root.join((n + 1).to_string()))?;
            }
        }

        let dest = root.join("1");
        std::fs::create_dir_all(&dest)?;
        let mut copied = 0usize;
        for name in DOCUMENTS {
            if let Some(bytes) = self.store.read(name)? {
                std::fs::write(dest.join(name), bytes)?;
                copied += 1;
            }
        }

        info!(
            dest = %dest.display(),
            documents = copied,
            max_backups = max,
            "Rotating backup created"
        );
        Ok(Some(dest))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
