//! Key layout.
//!
//! Everything lives in the default column family under short prefixes:
//!
//! ```text
//! res/id/{id}                       → Resource
//! res/text/{text}                   → id
//! res/lower/{len}{lowercase}{id}    → ()
//! peer/id/{id}                      → Peer
//! peer/key/{public key}             → id
//! stmt/id/{id}                      → Statement
//! stmt/spo/{subject}{pred}{object}  → id
//! stmt/sp/{subject}{pred}{id}       → ()
//! stmt/op/{object}{pred}{id}        → ()
//! op/id/{id}                        → StatementOp
//! op/sp/{statement}{peer}           → id
//! seq/{table}                       → last id
//! misc/{name}                       → value
//! ```
//!
//! Ids are 8-byte big-endian so prefix scans come back in insertion order.
//! Variable-length text inside a scanned prefix is length-prefixed.

use tagstore_core::{OperationId, PeerId, Predicate, PublicKey, ResourceId, StatementId};

pub const RESOURCES: &str = "resource";
pub const PEERS: &str = "peer";
pub const STATEMENTS: &str = "statement";
pub const OPERATIONS: &str = "operation";

/// The node's persistent ed25519 signing key.
pub const NODE_SIGNING_KEY: &[u8] = b"node/signing_key";

pub const OPERATION_PREFIX: &[u8] = b"op/id/";

struct Key(Vec<u8>);

impl Key {
    fn new(prefix: &[u8]) -> Self {
        Self(prefix.to_vec())
    }

    fn bytes(mut self, bytes: &[u8]) -> Self {
        self.0.extend_from_slice(bytes);
        self
    }

    fn id(self, id: u64) -> Self {
        self.bytes(&id.to_be_bytes())
    }

    fn predicate(mut self, predicate: Predicate) -> Self {
        self.0.push(predicate.code());
        self
    }

    /// Length-prefixed text, for text that sits in front of scanned suffixes.
    fn text(self, text: &str) -> Self {
        self.bytes(&(text.len() as u32).to_be_bytes()).bytes(text.as_bytes())
    }

    fn build(self) -> Vec<u8> {
        self.0
    }
}

pub fn resource(id: ResourceId) -> Vec<u8> {
    Key::new(b"res/id/").id(id.0).build()
}

pub fn resource_by_text(text: &str) -> Vec<u8> {
    Key::new(b"res/text/").bytes(text.as_bytes()).build()
}

pub fn resources_by_lowercase(lowercase: &str) -> Vec<u8> {
    Key::new(b"res/lower/").text(lowercase).build()
}

pub fn resource_by_lowercase(lowercase: &str, id: ResourceId) -> Vec<u8> {
    Key::new(b"res/lower/").text(lowercase).id(id.0).build()
}

pub fn peer(id: PeerId) -> Vec<u8> {
    Key::new(b"peer/id/").id(id.0).build()
}

pub fn peer_by_key(public_key: &PublicKey) -> Vec<u8> {
    Key::new(b"peer/key/").bytes(public_key.as_bytes()).build()
}

pub fn statement(id: StatementId) -> Vec<u8> {
    Key::new(b"stmt/id/").id(id.0).build()
}

pub fn statement_by_triple(subject: ResourceId, predicate: Predicate, object: ResourceId) -> Vec<u8> {
    Key::new(b"stmt/spo/")
        .id(subject.0)
        .predicate(predicate)
        .id(object.0)
        .build()
}

/// All statements of `subject`, or of `(subject, predicate)` when given.
pub fn statements_by_subject(subject: ResourceId, predicate: Option<Predicate>) -> Vec<u8> {
    let key = Key::new(b"stmt/sp/").id(subject.0);
    match predicate {
        Some(predicate) => key.predicate(predicate).build(),
        None => key.build(),
    }
}

pub fn statement_by_subject(subject: ResourceId, predicate: Predicate, id: StatementId) -> Vec<u8> {
    Key::new(b"stmt/sp/")
        .id(subject.0)
        .predicate(predicate)
        .id(id.0)
        .build()
}

pub fn statements_by_object(object: ResourceId, predicate: Predicate) -> Vec<u8> {
    Key::new(b"stmt/op/").id(object.0).predicate(predicate).build()
}

pub fn statement_by_object(object: ResourceId, predicate: Predicate, id: StatementId) -> Vec<u8> {
    Key::new(b"stmt/op/")
        .id(object.0)
        .predicate(predicate)
        .id(id.0)
        .build()
}

pub fn operation(id: OperationId) -> Vec<u8> {
    Key::new(OPERATION_PREFIX).id(id.0).build()
}

pub fn operations_by_statement(statement: StatementId) -> Vec<u8> {
    Key::new(b"op/sp/").id(statement.0).build()
}

pub fn operation_by_replica(statement: StatementId, peer: PeerId) -> Vec<u8> {
    Key::new(b"op/sp/").id(statement.0).id(peer.0).build()
}

pub fn sequence(table: &str) -> Vec<u8> {
    Key::new(b"seq/").bytes(table.as_bytes()).build()
}

pub fn misc(name: &str) -> Vec<u8> {
    Key::new(b"misc/").bytes(name.as_bytes()).build()
}

/// The id stored in the last 8 bytes of an index key.
pub fn trailing_id(key: &[u8]) -> Option<u64> {
    let start = key.len().checked_sub(8)?;
    let bytes: [u8; 8] = key[start..].try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}
