//! Tagstore DB - Persistent Knowledge Store
//!
//! The RocksDB-backed replica of the tag knowledge graph. Peers assert or
//! retract `(subject, predicate, object)` statements; every peer converges
//! to the same counters and the local user's own opinion overrides them.
//!
//! # Architecture
//!
//! - **Storage**: RocksDB transactions and snapshots over prefixed keys
//! - **Catalog**: interned resources and peers
//! - **Ledger**: statements and their per-peer replica registers
//! - **Engine**: the clock-gated merge, the only writer of counters
//! - **Query**: shown objects/subjects, suggestions, intersections
//! - **Gossip**: age-gated and randomly sampled operations for peers
//!
//! # Example
//!
//! ```no_run
//! use tagstore_db::{Operation, Predicate, TagDatabase};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = TagDatabase::open_path("./tagstore-data")?;
//!     db.add_local_operation("infohash", Predicate::Tag, "linux", Operation::Add)?;
//!     println!("{:?}", db.get_objects("infohash", Predicate::Tag, false)?);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod gossip;
pub mod keys;
pub mod ledger;
pub mod query;
pub mod storage;

pub use config::TagDbConfig;
pub use database::{TableCounts, TagDatabase, DB_VERSION_KEY, SCHEMA_VERSION};
pub use engine::BatchReport;
pub use error::{Error, Result};
pub use query::SimpleStatement;
pub use storage::Storage;

pub use tagstore_core::{
    MergeOutcome, Operation, Predicate, PublicKey, SignedOperation, Statement, StatementOp,
    StatementOperation, SHOW_THRESHOLD,
};
