//! Merge engine: the only write path for statements and their replicas.
//!
//! Every incoming operation runs in one transaction that interns its texts
//! and peer, locks the `(statement, peer)` register and applies
//! [`tagstore_core::merge_into`]. Counter changes and the register write
//! commit together or not at all.

use crate::catalog;
use crate::database::TagDatabase;
use crate::error::{Error, Result};
use crate::keys;
use crate::ledger;
use crate::storage::WriteTxn;
use serde::Serialize;
use tagstore_core::{
    merge_into, unix_millis, MergeOutcome, Operation, OperationId, Predicate, PublicKey,
    ReplicaWrite, SignedOperation, StatementOp, StatementOperation,
};

/// Result of applying a batch of remote operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub accepted: usize,
    pub stale: usize,
}

struct Incoming<'a> {
    operation: &'a StatementOperation,
    peer_key: &'a PublicKey,
    signature: &'a [u8],
    is_local: bool,
    auto_generated: bool,
    now: u64,
}

fn merge_in(txn: &WriteTxn<'_>, incoming: &Incoming<'_>) -> Result<MergeOutcome> {
    let op = incoming.operation;
    let subject = catalog::get_or_create_resource(txn, &op.subject)?;
    let object = catalog::get_or_create_resource(txn, &op.object)?;
    let peer = catalog::get_or_create_peer(txn, incoming.peer_key)?;

    let mut statement = ledger::get_or_create_statement(txn, subject.id, op.predicate, object.id)?;
    let stored = ledger::operation_for_update(txn, statement.id, peer.id)?;
    let created = stored.is_none();

    // A missing register always merges as Inserted, so the id is never wasted.
    let new_id = if created {
        txn.next_id(keys::OPERATIONS)?
    } else {
        0
    };
    let statement_id = statement.id;
    let peer_id = peer.id;

    let write = ReplicaWrite {
        operation: op.operation,
        clock: op.clock,
        auto_generated: incoming.auto_generated,
        updated_at: incoming.now,
        signature: incoming.signature.to_vec(),
    };
    let (outcome, register) = merge_into(&mut statement, stored, write, peer.weight(), move || {
        StatementOp {
            id: OperationId(new_id),
            statement: statement_id,
            peer: peer_id,
            operation: op.operation,
            clock: 0,
            auto_generated: false,
            updated_at: 0,
            signature: Vec::new(),
        }
    });

    if let Some(register) = &register {
        ledger::put_operation(txn, register, created)?;
    }

    // The local user's intent is recorded even when the register write was stale.
    if incoming.is_local {
        statement.local_operation = Some(op.operation);
    }
    if outcome.is_accepted() || incoming.is_local {
        ledger::put_statement(txn, &statement)?;
    }

    tracing::debug!(
        "Merged {} on statement {} from peer {} at clock {}: {}",
        op.operation,
        statement.id,
        peer.id,
        op.clock,
        outcome
    );
    Ok(outcome)
}

/// The key a write is attributed to. The pseudo-peer key is reserved for
/// auto-generated writes.
fn attributed_key(creator: &PublicKey, auto_generated: bool) -> Result<PublicKey> {
    match (creator.is_empty(), auto_generated) {
        (true, true) => Ok(PublicKey::auto_generated()),
        (true, false) => Err(Error::InvalidArgument(
            "operation has an empty creator public key".into(),
        )),
        (false, false) if creator.is_auto_generated() => Err(Error::InvalidArgument(
            "only auto-generated operations may use the reserved key".into(),
        )),
        (false, _) => Ok(creator.clone()),
    }
}

impl TagDatabase {
    /// Apply one operation.
    ///
    /// `is_local` marks the local user's own opinion, which overrides the
    /// community score for display. Stale operations are not errors; they
    /// come back as [`MergeOutcome::Stale`].
    pub fn add_operation(
        &self,
        operation: &StatementOperation,
        signature: &[u8],
        is_local: bool,
        auto_generated: bool,
    ) -> Result<MergeOutcome> {
        self.add_operation_at(operation, signature, is_local, auto_generated, unix_millis())
    }

    /// [`TagDatabase::add_operation`] with an explicit `updated_at` timestamp.
    pub fn add_operation_at(
        &self,
        operation: &StatementOperation,
        signature: &[u8],
        is_local: bool,
        auto_generated: bool,
        now: u64,
    ) -> Result<MergeOutcome> {
        let peer_key = attributed_key(&operation.creator_public_key, auto_generated)?;
        let incoming = Incoming {
            operation,
            peer_key: &peer_key,
            signature,
            is_local,
            auto_generated,
            now,
        };
        self.storage.write(|txn| merge_in(txn, &incoming))
    }

    /// Seed a statement inferred locally.
    ///
    /// It is attributed to the auto-generation pseudo-peer, whose weight makes
    /// it visible on its own. It is never gossiped and never suggested.
    pub fn add_auto_generated(
        &self,
        subject: &str,
        predicate: Predicate,
        object: &str,
    ) -> Result<MergeOutcome> {
        let operation = StatementOperation::new(
            subject,
            predicate,
            object,
            Operation::Add,
            0,
            PublicKey::auto_generated(),
        );
        self.add_operation(&operation, &[], false, true)
    }

    /// Record the local user's opinion and return it signed for broadcast.
    ///
    /// The clock is one past the local peer's stored clock for the statement,
    /// read and bumped in the same transaction.
    pub fn add_local_operation(
        &self,
        subject: &str,
        predicate: Predicate,
        object: &str,
        operation: Operation,
    ) -> Result<SignedOperation> {
        self.add_local_operation_at(subject, predicate, object, operation, unix_millis())
    }

    pub fn add_local_operation_at(
        &self,
        subject: &str,
        predicate: Predicate,
        object: &str,
        operation: Operation,
        now: u64,
    ) -> Result<SignedOperation> {
        self.storage.write(|txn| {
            let subject_id = catalog::get_or_create_resource(txn, subject)?.id;
            let object_id = catalog::get_or_create_resource(txn, object)?.id;
            let peer = catalog::get_or_create_peer(txn, &self.local_key)?;
            let statement = ledger::get_or_create_statement(txn, subject_id, predicate, object_id)?;
            let clock = ledger::operation_for_update(txn, statement.id, peer.id)?
                .map_or(0, |stored| stored.clock)
                + 1;

            let signed = SignedOperation::sign(
                StatementOperation::new(
                    subject,
                    predicate,
                    object,
                    operation,
                    clock,
                    self.local_key.clone(),
                ),
                &self.signing_key,
            );
            merge_in(
                txn,
                &Incoming {
                    operation: &signed.operation,
                    peer_key: &self.local_key,
                    signature: &signed.signature,
                    is_local: true,
                    auto_generated: false,
                    now,
                },
            )?;
            Ok(signed)
        })
    }

    /// Apply a batch received from the network in one transaction.
    ///
    /// Signatures are not checked here. The whole batch is rejected if any
    /// operation has an empty creator key or claims the pseudo-peer's key.
    pub fn add_remote_operations(&self, batch: &[SignedOperation]) -> Result<BatchReport> {
        self.add_remote_operations_at(batch, unix_millis())
    }

    pub fn add_remote_operations_at(&self, batch: &[SignedOperation], now: u64) -> Result<BatchReport> {
        for signed in batch {
            let key = &signed.operation.creator_public_key;
            if key.is_empty() || key.is_auto_generated() {
                return Err(Error::InvalidArgument(format!(
                    "remote operation from reserved or empty key {key}"
                )));
            }
        }

        let report = self.storage.write(|txn| {
            let mut report = BatchReport::default();
            for signed in batch {
                let incoming = Incoming {
                    operation: &signed.operation,
                    peer_key: &signed.operation.creator_public_key,
                    signature: &signed.signature,
                    is_local: false,
                    auto_generated: false,
                    now,
                };
                if merge_in(txn, &incoming)?.is_accepted() {
                    report.accepted += 1;
                } else {
                    report.stale += 1;
                }
            }
            Ok(report)
        })?;

        tracing::debug!(
            "Applied remote batch: {} accepted, {} stale",
            report.accepted,
            report.stale
        );
        Ok(report)
    }
}
