//! Transactional storage using RocksDB.
//!
//! All writes go through [`Storage::write`], which runs a closure inside one
//! pessimistic transaction and commits only if the closure succeeds. Reads go
//! through [`Storage::read`], which runs against a snapshot.

use crate::error::{Error, Result};
use crate::keys;
use ed25519_dalek::SigningKey;
use rocksdb::{
    Direction, IteratorMode, Options, SnapshotWithThreadMode, Transaction, TransactionDB,
    TransactionDBOptions,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// A raw key/value entry.
pub type KvPair = (Box<[u8]>, Box<[u8]>);

/// Read access shared by snapshots and write transactions.
pub trait KvRead {
    /// Get the raw value at `key`.
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>>;

    /// Get and decode a JSON row.
    fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.get_raw(key)? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Get an id stored as an 8-byte value.
    fn get_id(&self, key: &[u8]) -> Result<Option<u64>> {
        self.get_raw(key)?.map(|data| decode_id(&data)).transpose()
    }

    /// Ids stored in the key suffix of every entry under `prefix`.
    fn scan_ids(&self, prefix: &[u8]) -> Result<Vec<u64>> {
        self.scan_prefix(prefix)?
            .iter()
            .map(|(key, _)| {
                keys::trailing_id(key)
                    .ok_or_else(|| Error::Corrupted(format!("index key too short: {key:?}")))
            })
            .collect()
    }

    /// Highest id handed out for `table` so far (0 if none).
    fn last_id(&self, table: &str) -> Result<u64> {
        Ok(self.get_id(&keys::sequence(table))?.unwrap_or(0))
    }
}

pub(crate) fn decode_id(data: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = data
        .try_into()
        .map_err(|_| Error::Corrupted(format!("id value has {} bytes", data.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

fn collect_prefix<I>(iter: I, prefix: &[u8]) -> Result<Vec<KvPair>>
where
    I: Iterator<Item = std::result::Result<KvPair, rocksdb::Error>>,
{
    let mut entries = Vec::new();
    for item in iter {
        let (key, value) = item?;
        if key.starts_with(prefix) {
            entries.push((key, value));
        } else {
            break;
        }
    }
    Ok(entries)
}

/// A write transaction. Reads see the transaction's own writes.
pub struct WriteTxn<'db> {
    txn: Transaction<'db, TransactionDB>,
}

impl WriteTxn<'_> {
    /// Read `key` and lock it until the transaction ends.
    pub fn get_for_update(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.txn.get_for_update(key, true)?)
    }

    /// Locking variant of [`KvRead::get_json`].
    pub fn get_json_for_update<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.get_for_update(key)? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Locking variant of [`KvRead::get_id`].
    pub fn get_id_for_update(&self, key: &[u8]) -> Result<Option<u64>> {
        self.get_for_update(key)?.map(|data| decode_id(&data)).transpose()
    }

    pub fn put_raw(&self, key: &[u8], value: &[u8]) -> Result<()> {
        Ok(self.txn.put(key, value)?)
    }

    pub fn put_json<T: Serialize>(&self, key: &[u8], value: &T) -> Result<()> {
        let data = serde_json::to_vec(value)?;
        self.put_raw(key, &data)
    }

    pub fn put_id(&self, key: &[u8], id: u64) -> Result<()> {
        self.put_raw(key, &id.to_be_bytes())
    }

    /// Allocate the next id of `table`. Ids start at 1 and are never reused.
    pub fn next_id(&self, table: &str) -> Result<u64> {
        let key = keys::sequence(table);
        let next = self.get_id_for_update(&key)?.unwrap_or(0) + 1;
        self.put_id(&key, next)?;
        Ok(next)
    }
}

impl KvRead for WriteTxn<'_> {
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.txn.get(key)?)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        let iter = self.txn.iterator(IteratorMode::From(prefix, Direction::Forward));
        collect_prefix(iter, prefix)
    }
}

/// A consistent read-only view.
pub struct ReadTxn<'db> {
    snapshot: SnapshotWithThreadMode<'db, TransactionDB>,
}

impl KvRead for ReadTxn<'_> {
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.snapshot.get(key)?)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        let iter = self
            .snapshot
            .iterator(IteratorMode::From(prefix, Direction::Forward));
        collect_prefix(iter, prefix)
    }
}

/// Storage backend for the tag database.
pub struct Storage {
    db: TransactionDB,
}

impl Storage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = TransactionDB::open(&opts, &TransactionDBOptions::default(), path)?;
        Ok(Self { db })
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise. Commit failures
    /// and lock conflicts come back as [`Error::Storage`].
    pub fn write<T>(&self, f: impl FnOnce(&WriteTxn<'_>) -> Result<T>) -> Result<T> {
        let txn = WriteTxn {
            txn: self.db.transaction(),
        };
        match f(&txn) {
            Ok(value) => {
                txn.txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = txn.txn.rollback() {
                    tracing::warn!("Rollback failed after {}: {}", e, rollback);
                }
                Err(e)
            }
        }
    }

    /// Run `f` against a snapshot of the current state.
    pub fn read<T>(&self, f: impl FnOnce(&ReadTxn<'_>) -> Result<T>) -> Result<T> {
        let txn = ReadTxn {
            snapshot: self.db.snapshot(),
        };
        f(&txn)
    }

    // --- Node Identity ---

    /// Get or create the node's signing key (persistent identity).
    pub fn get_or_create_node_key(&self) -> Result<SigningKey> {
        self.write(|txn| {
            if let Some(data) = txn.get_for_update(keys::NODE_SIGNING_KEY)? {
                let bytes: [u8; 32] = data
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Corrupted("Invalid stored node key".into()))?;
                Ok(SigningKey::from_bytes(&bytes))
            } else {
                let mut rng = rand::thread_rng();
                let signing_key = SigningKey::generate(&mut rng);
                txn.put_raw(keys::NODE_SIGNING_KEY, signing_key.as_bytes())?;
                Ok(signing_key)
            }
        })
    }
}
