//! Per-peer last-writer-wins register with explicit logical clocks.
//!
//! Each `(statement, peer)` pair holds one [`StatementOp`]. An incoming
//! operation replaces it only when its clock is strictly greater; anything
//! else is a stale or duplicate delivery and changes nothing. Wall-clock
//! time never takes part in conflict resolution.
//!
//! Counters move through [`Statement::release`] / [`Statement::claim`] pairs
//! so that `added_count` and `removed_count` always equal the weighted number
//! of replicas holding ADD and REMOVE.

use crate::model::{Operation, Statement, StatementOp};
use std::fmt;

/// What happened when an operation met the stored register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No register existed for this peer; one was created.
    Inserted,
    /// Newer clock, same operation. Only the clock and `updated_at` moved.
    Refreshed,
    /// Newer clock and the peer changed its mind.
    Flipped { from: Operation, to: Operation },
    /// Clock not strictly newer. Nothing was written.
    Stale,
}

impl MergeOutcome {
    /// Whether the register was written.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, MergeOutcome::Stale)
    }

    /// Whether the statement counters changed.
    pub fn changes_counters(&self) -> bool {
        matches!(self, MergeOutcome::Inserted | MergeOutcome::Flipped { .. })
    }
}

impl fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeOutcome::Inserted => f.write_str("inserted"),
            MergeOutcome::Refreshed => f.write_str("refreshed"),
            MergeOutcome::Flipped { from, to } => write!(f, "flipped {from}->{to}"),
            MergeOutcome::Stale => f.write_str("stale"),
        }
    }
}

/// Decide how an incoming `(operation, clock)` relates to the stored register.
pub fn resolve(stored: Option<&StatementOp>, operation: Operation, clock: u64) -> MergeOutcome {
    match stored {
        None => MergeOutcome::Inserted,
        Some(current) if current.clock >= clock => MergeOutcome::Stale,
        Some(current) if current.operation == operation => MergeOutcome::Refreshed,
        Some(current) => MergeOutcome::Flipped {
            from: current.operation,
            to: operation,
        },
    }
}

/// The write half of an incoming operation, once the peer and statement are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaWrite {
    pub operation: Operation,
    pub clock: u64,
    pub auto_generated: bool,
    pub updated_at: u64,
    pub signature: Vec<u8>,
}

/// Apply `write` to the register `stored` and the statement counters.
///
/// `weight` is the peer's counter weight (see [`crate::Peer::weight`]).
/// Returns the outcome and, unless stale, the register contents to persist.
/// A new register is built from `new_op`, whose id the caller allocates.
/// Only a new register takes the write's `auto_generated` flag; a register
/// created by auto-generation marks its statement for good.
pub fn merge_into(
    statement: &mut Statement,
    stored: Option<StatementOp>,
    write: ReplicaWrite,
    weight: u32,
    new_op: impl FnOnce() -> StatementOp,
) -> (MergeOutcome, Option<StatementOp>) {
    let outcome = resolve(stored.as_ref(), write.operation, write.clock);
    let register = match (outcome, stored) {
        (MergeOutcome::Stale, _) => return (outcome, None),
        (_, Some(mut current)) => {
            statement.release(current.operation, weight);
            overwrite(&mut current, write);
            current
        }
        (_, None) => {
            let mut fresh = new_op();
            fresh.auto_generated = write.auto_generated;
            statement.auto_generated |= write.auto_generated;
            overwrite(&mut fresh, write);
            fresh
        }
    };
    statement.claim(register.operation, weight);
    (outcome, Some(register))
}

fn overwrite(register: &mut StatementOp, write: ReplicaWrite) {
    register.operation = write.operation;
    register.clock = write.clock;
    register.updated_at = write.updated_at;
    register.signature = write.signature;
}
