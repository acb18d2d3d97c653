//! The tag database handle.

use crate::config::TagDbConfig;
use crate::error::Result;
use crate::keys;
use crate::storage::{KvRead, Storage};
use ed25519_dalek::SigningKey;
use serde::Serialize;
use tagstore_core::PublicKey;

/// Schema version recorded under the `db_version` misc key.
pub const SCHEMA_VERSION: u32 = 1;

/// Misc key holding the schema version.
pub const DB_VERSION_KEY: &str = "db_version";

/// Number of rows per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub resources: u64,
    pub peers: u64,
    pub statements: u64,
    pub operations: u64,
}

/// A local replica of the knowledge graph.
///
/// Safe to share between threads; every method runs in its own transaction
/// or snapshot.
pub struct TagDatabase {
    pub(crate) storage: Storage,
    pub(crate) config: TagDbConfig,
    pub(crate) signing_key: SigningKey,
    pub(crate) local_key: PublicKey,
}

impl TagDatabase {
    /// Open or create the database described by `config`.
    pub fn open(config: TagDbConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let storage = Storage::open(&config.data_dir)?;
        let signing_key = storage.get_or_create_node_key()?;
        let local_key = PublicKey::new(signing_key.verifying_key().to_bytes().to_vec());

        let db = Self {
            storage,
            config,
            signing_key,
            local_key,
        };

        if db.get_misc(DB_VERSION_KEY)?.is_none() {
            db.set_misc(DB_VERSION_KEY, &SCHEMA_VERSION.to_string())?;
        }

        let counts = db.table_counts()?;
        tracing::info!(
            "Tag database opened at {:?} (peer {}, {} statements, {} operations)",
            db.config.data_dir,
            db.local_key,
            counts.statements,
            counts.operations
        );
        Ok(db)
    }

    /// Open with default settings at `path`.
    pub fn open_path(path: impl Into<std::path::PathBuf>) -> Result<Self> {
        Self::open(TagDbConfig::with_data_dir(path))
    }

    pub fn config(&self) -> &TagDbConfig {
        &self.config
    }

    /// Public key this node signs its own operations with.
    pub fn local_public_key(&self) -> &PublicKey {
        &self.local_key
    }

    // --- Misc ---

    pub fn get_misc(&self, name: &str) -> Result<Option<String>> {
        self.storage.read(|r| r.get_json(&keys::misc(name)))
    }

    pub fn set_misc(&self, name: &str, value: &str) -> Result<()> {
        self.storage.write(|txn| txn.put_json(&keys::misc(name), &value))
    }

    /// Row counts, from the id sequences.
    pub fn table_counts(&self) -> Result<TableCounts> {
        self.storage.read(|r| {
            Ok(TableCounts {
                resources: r.last_id(keys::RESOURCES)?,
                peers: r.last_id(keys::PEERS)?,
                statements: r.last_id(keys::STATEMENTS)?,
                operations: r.last_id(keys::OPERATIONS)?,
            })
        })
    }
}
