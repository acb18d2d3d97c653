//! Selection of operations for anti-entropy gossip.

use crate::catalog;
use crate::database::TagDatabase;
use crate::error::{Error, Result};
use crate::keys;
use crate::ledger;
use crate::storage::KvRead;
use rand::seq::index;
use std::time::Duration;
use tagstore_core::{unix_millis, OperationId, SignedOperation, StatementOp, StatementOperation};

/// Rows peers may receive: never auto-generated, and settled for `min_age`.
fn gossip_filter(min_age: Duration, now: u64) -> impl Fn(&StatementOp) -> bool {
    let cutoff = now.saturating_sub(u64::try_from(min_age.as_millis()).unwrap_or(u64::MAX));
    move |op| !op.auto_generated && op.updated_at <= cutoff
}

impl TagDatabase {
    /// Every operation eligible for gossip. Scans the whole log.
    pub fn get_operations_for_gossip(&self, min_age: Duration) -> Result<Vec<StatementOp>> {
        self.get_operations_for_gossip_at(min_age, unix_millis())
    }

    pub fn get_operations_for_gossip_at(&self, min_age: Duration, now: u64) -> Result<Vec<StatementOp>> {
        let eligible = gossip_filter(min_age, now);
        self.storage.read(|r| {
            Ok(ledger::all_operations(r)?
                .into_iter()
                .filter(|op| eligible(op))
                .collect())
        })
    }

    /// Up to `count` distinct operations matching `condition`.
    ///
    /// Probes random ids instead of scanning; at most `max_attempts` rows are
    /// read. Returns fewer than `count` only when the log holds fewer matches
    /// or the probes run out.
    pub fn sample_by_condition(
        &self,
        condition: impl Fn(&StatementOp) -> bool,
        count: usize,
        max_attempts: usize,
    ) -> Result<Vec<StatementOp>> {
        self.storage.read(|r| {
            let total = r.last_id(keys::OPERATIONS)?;
            let total = usize::try_from(total)
                .map_err(|_| Error::Corrupted(format!("operation sequence out of range: {total}")))?;
            let attempts = max_attempts.min(total);

            let mut rng = rand::thread_rng();
            let mut found = Vec::with_capacity(count.min(attempts));
            for probe in index::sample(&mut rng, total, attempts).into_iter() {
                if found.len() >= count {
                    break;
                }
                if let Some(op) = ledger::operation(r, OperationId(probe as u64 + 1))? {
                    if condition(&op) {
                        found.push(op);
                    }
                }
            }

            tracing::debug!(
                "Sampled {} of {} requested operations in {} probes",
                found.len(),
                count,
                attempts
            );
            Ok(found)
        })
    }

    /// Random selection of gossip-eligible operations, bounded by the
    /// configured probe budget.
    pub fn sample_operations_for_gossip(&self, min_age: Duration, count: usize) -> Result<Vec<StatementOp>> {
        self.sample_operations_for_gossip_at(min_age, count, unix_millis())
    }

    pub fn sample_operations_for_gossip_at(
        &self,
        min_age: Duration,
        count: usize,
        now: u64,
    ) -> Result<Vec<StatementOp>> {
        self.sample_by_condition(gossip_filter(min_age, now), count, self.config.sample_attempts)
    }

    /// Resolve registers back into the signed records their creators sent.
    pub fn signed_operations(&self, operations: &[StatementOp]) -> Result<Vec<SignedOperation>> {
        self.storage.read(|r| {
            operations
                .iter()
                .map(|op| {
                    let statement = ledger::statement(r, op.statement)?;
                    let operation = StatementOperation::new(
                        catalog::resource(r, statement.subject)?.text,
                        statement.predicate,
                        catalog::resource(r, statement.object)?.text,
                        op.operation,
                        op.clock,
                        catalog::peer(r, op.peer)?.public_key,
                    );
                    Ok(SignedOperation {
                        operation,
                        signature: op.signature.clone(),
                    })
                })
                .collect()
        })
    }
}
