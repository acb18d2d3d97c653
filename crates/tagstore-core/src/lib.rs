//! Tagstore core
//!
//! The persistence-free half of the decentralized knowledge store: peers
//! attach `(subject, predicate, object)` statements to content and vote on
//! them with ADD/REMOVE operations. Every peer converges to the same
//! counters regardless of delivery order or duplication.
//!
//! # Merge
//!
//! Each `(statement, peer)` pair is a last-writer-wins register keyed on the
//! peer's own logical clock. A write is accepted only with a strictly newer
//! clock; see [`merge`].
//!
//! # Visibility
//!
//! The local user's opinion overrides the community score; without one, a
//! statement is shown at [`SHOW_THRESHOLD`]. See [`visibility`].

pub mod error;
pub mod merge;
pub mod model;
pub mod operation;
pub mod visibility;

pub use error::{Error, Result};
pub use merge::{merge_into, resolve, MergeOutcome, ReplicaWrite};
pub use model::{
    unix_millis, Operation, OperationId, Peer, PeerId, Predicate, PublicKey, Resource, ResourceId,
    Statement, StatementId, StatementOp, AUTO_GENERATED_PUBLIC_KEY,
};
pub use operation::{SignedOperation, StatementOperation};
pub use visibility::{show_condition, suggestion_condition, SHOW_THRESHOLD};
