//! Entities of the knowledge graph.
//!
//! Every persisted row is one of:
//!
//! - [`Resource`]: an interned text value (tag, content hash, contributor name)
//! - [`Peer`]: an interned public key
//! - [`Statement`]: a `(subject, predicate, object)` triple with aggregate counters
//! - [`StatementOp`]: one peer's current opinion about one statement
//!
//! Ids are dense sequences handed out by the store; they never get reused.

use crate::error::{Error, Result};
use crate::visibility::SHOW_THRESHOLD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Public key of the pseudo-peer that owns locally inferred statements.
///
/// Real peers are identified by 32-byte ed25519 keys, so this value can
/// never collide with a gossiped identity.
pub const AUTO_GENERATED_PUBLIC_KEY: &[u8] = b"auto_generated";

/// Current Unix time in milliseconds.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Big-endian bytes, so that key order matches id order.
            pub const fn to_be_bytes(self) -> [u8; 8] {
                self.0.to_be_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Id of a [`Resource`].
    ResourceId
);
entity_id!(
    /// Id of a [`Peer`].
    PeerId
);
entity_id!(
    /// Id of a [`Statement`]. Ordering follows insertion order.
    StatementId
);
entity_id!(
    /// Id of a [`StatementOp`].
    OperationId
);

/// Semantic role of the object relative to the subject.
///
/// Codes 1-15 are the Dublin Core terms, 101+ are network specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Predicate {
    Contributor = 1,
    Coverage = 2,
    Creator = 3,
    Date = 4,
    Description = 5,
    Format = 6,
    Identifier = 7,
    Language = 8,
    Publisher = 9,
    Relation = 10,
    Rights = 11,
    Source = 12,
    Subject = 13,
    Title = 14,
    Type = 15,
    Tag = 101,
    Torrent = 102,
    ContentItem = 103,
}

impl Predicate {
    /// All predicates, in code order.
    pub const ALL: [Predicate; 18] = [
        Predicate::Contributor,
        Predicate::Coverage,
        Predicate::Creator,
        Predicate::Date,
        Predicate::Description,
        Predicate::Format,
        Predicate::Identifier,
        Predicate::Language,
        Predicate::Publisher,
        Predicate::Relation,
        Predicate::Rights,
        Predicate::Source,
        Predicate::Subject,
        Predicate::Title,
        Predicate::Type,
        Predicate::Tag,
        Predicate::Torrent,
        Predicate::ContentItem,
    ];

    /// Numeric wire code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Upper-case name as used on the command line and in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Predicate::Contributor => "CONTRIBUTOR",
            Predicate::Coverage => "COVERAGE",
            Predicate::Creator => "CREATOR",
            Predicate::Date => "DATE",
            Predicate::Description => "DESCRIPTION",
            Predicate::Format => "FORMAT",
            Predicate::Identifier => "IDENTIFIER",
            Predicate::Language => "LANGUAGE",
            Predicate::Publisher => "PUBLISHER",
            Predicate::Relation => "RELATION",
            Predicate::Rights => "RIGHTS",
            Predicate::Source => "SOURCE",
            Predicate::Subject => "SUBJECT",
            Predicate::Title => "TITLE",
            Predicate::Type => "TYPE",
            Predicate::Tag => "TAG",
            Predicate::Torrent => "TORRENT",
            Predicate::ContentItem => "CONTENT_ITEM",
        }
    }
}

impl TryFrom<u8> for Predicate {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Predicate::ALL
            .into_iter()
            .find(|p| p.code() == code)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown predicate code {code}")))
    }
}

impl From<Predicate> for u8 {
    fn from(predicate: Predicate) -> u8 {
        predicate.code()
    }
}

impl FromStr for Predicate {
    type Err = Error;

    /// Accepts either the numeric code or the name, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(code) = s.parse::<u8>() {
            return Predicate::try_from(code);
        }
        let upper = s.to_ascii_uppercase().replace('-', "_");
        Predicate::ALL
            .into_iter()
            .find(|p| p.name() == upper)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown predicate {s:?}")))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Predicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for Predicate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Predicate::try_from(code).map_err(serde::de::Error::custom)
    }
}

/// A peer's opinion about a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operation {
    Add = 1,
    Remove = 2,
}

impl Operation {
    /// Numeric wire code.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Operation {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Operation::Add),
            2 => Ok(Operation::Remove),
            other => Err(Error::InvalidArgument(format!("unknown operation code {other}"))),
        }
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "add" | "1" => Ok(Operation::Add),
            "remove" | "2" => Ok(Operation::Remove),
            _ => Err(Error::InvalidArgument(format!("unknown operation {s:?}"))),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Add => f.write_str("ADD"),
            Operation::Remove => f.write_str("REMOVE"),
        }
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Operation::try_from(code).map_err(serde::de::Error::custom)
    }
}

/// Raw public key bytes identifying a peer.
///
/// Serialized as a hex string.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PublicKey(pub Vec<u8>);

impl PublicKey {
    /// Create from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The pseudo-peer that owns auto-generated statements.
    pub fn auto_generated() -> Self {
        Self(AUTO_GENERATED_PUBLIC_KEY.to_vec())
    }

    /// Whether this is the auto-generation pseudo-peer.
    pub fn is_auto_generated(&self) -> bool {
        self.0 == AUTO_GENERATED_PUBLIC_KEY
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the key is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        hex::decode(s)
            .map(Self)
            .map_err(|e| Error::InvalidArgument(format!("public key is not hex: {e}")))
    }
}

impl From<&[u8]> for PublicKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for PublicKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        if hex.len() > 16 {
            write!(f, "{}...", &hex[..16])
        } else {
            f.write_str(&hex)
        }
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// An interned text value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    /// Exact text, unique across the catalog.
    pub text: String,
    /// Lower-cased projection used for case-insensitive lookup only.
    pub text_lowercase: String,
}

impl Resource {
    pub fn new(id: ResourceId, text: impl Into<String>) -> Self {
        let text = text.into();
        let text_lowercase = text.to_lowercase();
        Self {
            id,
            text,
            text_lowercase,
        }
    }
}

/// An interned peer identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub public_key: PublicKey,
}

impl Peer {
    /// How much one opinion of this peer weighs in a statement's counters.
    ///
    /// The auto-generation pseudo-peer weighs [`SHOW_THRESHOLD`], so that a
    /// single inferred statement is visible on its own.
    pub fn weight(&self) -> u32 {
        if self.public_key.is_auto_generated() {
            SHOW_THRESHOLD
        } else {
            1
        }
    }
}

/// A `(subject, predicate, object)` triple and its community counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub id: StatementId,
    pub subject: ResourceId,
    pub predicate: Predicate,
    pub object: ResourceId,
    pub added_count: u32,
    pub removed_count: u32,
    /// The local user's latest opinion, overriding the counters for display.
    pub local_operation: Option<Operation>,
    /// Seeded by local inference. Never offered as a suggestion.
    #[serde(default)]
    pub auto_generated: bool,
}

impl Statement {
    pub fn new(id: StatementId, subject: ResourceId, predicate: Predicate, object: ResourceId) -> Self {
        Self {
            id,
            subject,
            predicate,
            object,
            added_count: 0,
            removed_count: 0,
            local_operation: None,
            auto_generated: false,
        }
    }

    /// Community consensus: `added_count - removed_count`.
    pub fn score(&self) -> i64 {
        i64::from(self.added_count) - i64::from(self.removed_count)
    }

    /// Count one more opinion `operation` of the given weight.
    pub fn claim(&mut self, operation: Operation, weight: u32) {
        match operation {
            Operation::Add => self.added_count = self.added_count.saturating_add(weight),
            Operation::Remove => self.removed_count = self.removed_count.saturating_add(weight),
        }
    }

    /// Withdraw an opinion previously counted with [`Statement::claim`].
    pub fn release(&mut self, operation: Operation, weight: u32) {
        let counter = match operation {
            Operation::Add => &mut self.added_count,
            Operation::Remove => &mut self.removed_count,
        };
        debug_assert!(*counter >= weight, "releasing more than was claimed");
        *counter = counter.saturating_sub(weight);
    }
}

/// One peer's current opinion about one statement: the replica register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementOp {
    pub id: OperationId,
    pub statement: StatementId,
    pub peer: PeerId,
    pub operation: Operation,
    /// Logical clock of the peer that produced `operation`.
    pub clock: u64,
    pub auto_generated: bool,
    /// Unix millis of the last accepted write. Only used for gossip staleness.
    pub updated_at: u64,
    /// Signature over the originating [`crate::StatementOperation`]; empty if unsigned.
    #[serde(default, with = "hex_bytes")]
    pub signature: Vec<u8>,
}

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

pub(crate) use hex_bytes as hex_serde;
