//! Statement ledger and operation log tables.

use crate::error::{Error, Result};
use crate::keys;
use crate::storage::{decode_id, KvRead, WriteTxn};
use tagstore_core::{OperationId, PeerId, Predicate, ResourceId, Statement, StatementId, StatementOp};

// --- Statements ---

/// Get the statement for a triple, creating it with zero counters if needed.
///
/// The statement row is locked for the rest of the transaction.
pub fn get_or_create_statement(
    txn: &WriteTxn<'_>,
    subject: ResourceId,
    predicate: Predicate,
    object: ResourceId,
) -> Result<Statement> {
    let by_triple = keys::statement_by_triple(subject, predicate, object);
    if let Some(id) = txn.get_id_for_update(&by_triple)? {
        let id = StatementId(id);
        return txn
            .get_json_for_update(&keys::statement(id))?
            .ok_or_else(|| Error::Corrupted(format!("statement {id} is indexed but missing")));
    }

    let statement = Statement::new(
        StatementId(txn.next_id(keys::STATEMENTS)?),
        subject,
        predicate,
        object,
    );
    txn.put_json(&keys::statement(statement.id), &statement)?;
    txn.put_id(&by_triple, statement.id.0)?;
    txn.put_raw(&keys::statement_by_subject(subject, predicate, statement.id), &[])?;
    txn.put_raw(&keys::statement_by_object(object, predicate, statement.id), &[])?;
    Ok(statement)
}

/// Overwrite a statement row. Only the merge engine calls this.
pub(crate) fn put_statement(txn: &WriteTxn<'_>, statement: &Statement) -> Result<()> {
    txn.put_json(&keys::statement(statement.id), statement)
}

pub fn statement<R: KvRead>(r: &R, id: StatementId) -> Result<Statement> {
    r.get_json(&keys::statement(id))?
        .ok_or_else(|| Error::Corrupted(format!("statement {id} is referenced but missing")))
}

pub fn find_statement<R: KvRead>(
    r: &R,
    subject: ResourceId,
    predicate: Predicate,
    object: ResourceId,
) -> Result<Option<Statement>> {
    match r.get_id(&keys::statement_by_triple(subject, predicate, object))? {
        Some(id) => statement(r, StatementId(id)).map(Some),
        None => Ok(None),
    }
}

fn statements_under<R: KvRead>(r: &R, prefix: &[u8]) -> Result<Vec<Statement>> {
    r.scan_ids(prefix)?
        .into_iter()
        .map(|id| statement(r, StatementId(id)))
        .collect()
}

/// Statements with this subject (and predicate, when given).
pub fn statements_by_subject<R: KvRead>(
    r: &R,
    subject: ResourceId,
    predicate: Option<Predicate>,
) -> Result<Vec<Statement>> {
    statements_under(r, &keys::statements_by_subject(subject, predicate))
}

/// Statements with this object and predicate.
pub fn statements_by_object<R: KvRead>(
    r: &R,
    object: ResourceId,
    predicate: Predicate,
) -> Result<Vec<Statement>> {
    statements_under(r, &keys::statements_by_object(object, predicate))
}

// --- Operations ---

/// The register of `peer` for `statement`, locked for the rest of the transaction.
pub fn operation_for_update(
    txn: &WriteTxn<'_>,
    statement: StatementId,
    peer: PeerId,
) -> Result<Option<StatementOp>> {
    match txn.get_id_for_update(&keys::operation_by_replica(statement, peer))? {
        Some(id) => txn
            .get_json_for_update(&keys::operation(OperationId(id)))?
            .ok_or_else(|| Error::Corrupted(format!("operation {id} is indexed but missing")))
            .map(Some),
        None => Ok(None),
    }
}

/// Write a register. `created` adds it to the `(statement, peer)` index.
pub(crate) fn put_operation(txn: &WriteTxn<'_>, operation: &StatementOp, created: bool) -> Result<()> {
    txn.put_json(&keys::operation(operation.id), operation)?;
    if created {
        txn.put_id(
            &keys::operation_by_replica(operation.statement, operation.peer),
            operation.id.0,
        )?;
    }
    Ok(())
}

pub fn operation<R: KvRead>(r: &R, id: OperationId) -> Result<Option<StatementOp>> {
    r.get_json(&keys::operation(id))
}

pub fn find_operation<R: KvRead>(
    r: &R,
    statement: StatementId,
    peer: PeerId,
) -> Result<Option<StatementOp>> {
    match r.get_id(&keys::operation_by_replica(statement, peer))? {
        Some(id) => operation(r, OperationId(id)),
        None => Ok(None),
    }
}

/// Every register of a statement, in peer order.
pub fn operations_of<R: KvRead>(r: &R, statement: StatementId) -> Result<Vec<StatementOp>> {
    r.scan_prefix(&keys::operations_by_statement(statement))?
        .iter()
        .map(|(_, value)| {
            let id = decode_id(value)?;
            operation(r, OperationId(id))?
                .ok_or_else(|| Error::Corrupted(format!("operation {id} is indexed but missing")))
        })
        .collect()
}

/// Every register in the log, in id order.
pub fn all_operations<R: KvRead>(r: &R) -> Result<Vec<StatementOp>> {
    r.scan_prefix(keys::OPERATION_PREFIX)?
        .iter()
        .map(|(_, value)| Ok(serde_json::from_slice(value)?))
        .collect()
}
