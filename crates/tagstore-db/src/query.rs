//! Visibility and query engine.
//!
//! All queries run against one snapshot, so counters are never observed
//! mid-transition.

use crate::catalog;
use crate::database::TagDatabase;
use crate::error::Result;
use crate::ledger;
use crate::storage::{KvRead, ReadTxn};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tagstore_core::{
    show_condition, suggestion_condition, Predicate, PublicKey, Statement, StatementId, StatementOp,
};

/// A statement resolved to its texts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimpleStatement {
    pub subject: String,
    pub predicate: Predicate,
    pub object: String,
}

#[derive(Clone, Copy)]
enum Side {
    /// Look up by subject, return objects.
    Objects,
    /// Look up by object, return subjects.
    Subjects,
}

/// Texts on the far `side` of every statement around `text` that passes `keep`.
///
/// Ordered by score, highest first, ties by statement age. Each text appears
/// once.
fn related<R: KvRead>(
    r: &R,
    side: Side,
    text: &str,
    predicate: Predicate,
    case_sensitive: bool,
    keep: fn(&Statement) -> bool,
) -> Result<Vec<String>> {
    let mut statements = Vec::new();
    for anchor in catalog::find_resources(r, text, case_sensitive)? {
        let found = match side {
            Side::Objects => ledger::statements_by_subject(r, anchor.id, Some(predicate))?,
            Side::Subjects => ledger::statements_by_object(r, anchor.id, predicate)?,
        };
        statements.extend(found.into_iter().filter(|s| keep(s)));
    }
    statements.sort_by(|a, b| b.score().cmp(&a.score()).then(a.id.cmp(&b.id)));

    let mut seen = HashSet::new();
    let mut texts = Vec::new();
    for statement in statements {
        let far = match side {
            Side::Objects => statement.object,
            Side::Subjects => statement.subject,
        };
        if seen.insert(far) {
            texts.push(catalog::resource(r, far)?.text);
        }
    }
    Ok(texts)
}

impl TagDatabase {
    /// Objects shown for `subject` under `predicate`.
    pub fn get_objects(
        &self,
        subject: &str,
        predicate: Predicate,
        case_sensitive: bool,
    ) -> Result<Vec<String>> {
        self.storage.read(|r| {
            related(r, Side::Objects, subject, predicate, case_sensitive, show_condition)
        })
    }

    /// Subjects shown for `object` under `predicate`.
    pub fn get_subjects(
        &self,
        object: &str,
        predicate: Predicate,
        case_sensitive: bool,
    ) -> Result<Vec<String>> {
        self.storage.read(|r| {
            related(r, Side::Subjects, object, predicate, case_sensitive, show_condition)
        })
    }

    /// Subjects shown for every one of `objects`. Empty input gives an empty set.
    pub fn get_subjects_intersection<S: AsRef<str>>(
        &self,
        objects: &[S],
        predicate: Predicate,
        case_sensitive: bool,
    ) -> Result<BTreeSet<String>> {
        self.storage.read(|r| subjects_intersection(r, objects, predicate, case_sensitive))
    }

    /// Objects with some support but not shown yet, for a subject the local
    /// user has no opinion on.
    pub fn get_suggestions(&self, subject: &str, predicate: Predicate) -> Result<Vec<String>> {
        self.storage.read(|r| {
            related(r, Side::Objects, subject, predicate, true, suggestion_condition)
        })
    }

    /// Clock stored for `peer_key` on the statement, or 0 if it has none.
    pub fn get_clock(
        &self,
        peer_key: &PublicKey,
        subject: &str,
        predicate: Predicate,
        object: &str,
    ) -> Result<u64> {
        self.storage.read(|r| {
            let Some(peer) = catalog::find_peer(r, peer_key)? else {
                return Ok(0);
            };
            let Some(statement) = find_statement(r, subject, predicate, object)? else {
                return Ok(0);
            };
            Ok(ledger::find_operation(r, statement.id, peer.id)?.map_or(0, |op| op.clock))
        })
    }

    /// Every shown statement about `subject`, across all predicates.
    pub fn get_statements(&self, subject: &str, case_sensitive: bool) -> Result<Vec<SimpleStatement>> {
        self.storage.read(|r| {
            let mut out = Vec::new();
            for anchor in catalog::find_resources(r, subject, case_sensitive)? {
                for statement in ledger::statements_by_subject(r, anchor.id, None)? {
                    if !show_condition(&statement) {
                        continue;
                    }
                    out.push(SimpleStatement {
                        subject: anchor.text.clone(),
                        predicate: statement.predicate,
                        object: catalog::resource(r, statement.object)?.text,
                    });
                }
            }
            Ok(out)
        })
    }

    /// The statement row for an exact triple.
    pub fn get_statement(
        &self,
        subject: &str,
        predicate: Predicate,
        object: &str,
    ) -> Result<Option<Statement>> {
        self.storage.read(|r| find_statement(r, subject, predicate, object))
    }

    /// Every replica register of a statement.
    pub fn statement_operations(&self, statement: StatementId) -> Result<Vec<StatementOp>> {
        self.storage.read(|r| ledger::operations_of(r, statement))
    }
}

fn find_statement<R: KvRead>(
    r: &R,
    subject: &str,
    predicate: Predicate,
    object: &str,
) -> Result<Option<Statement>> {
    let (Some(subject), Some(object)) = (
        catalog::find_resource(r, subject)?,
        catalog::find_resource(r, object)?,
    ) else {
        return Ok(None);
    };
    ledger::find_statement(r, subject.id, predicate, object.id)
}

fn subjects_intersection<S: AsRef<str>>(
    r: &ReadTxn<'_>,
    objects: &[S],
    predicate: Predicate,
    case_sensitive: bool,
) -> Result<BTreeSet<String>> {
    let mut common: Option<BTreeSet<String>> = None;
    for object in objects {
        let subjects: BTreeSet<String> = related(
            r,
            Side::Subjects,
            object.as_ref(),
            predicate,
            case_sensitive,
            show_condition,
        )?
        .into_iter()
        .collect();
        let next = match common {
            Some(acc) => acc.intersection(&subjects).cloned().collect(),
            None => subjects,
        };
        if next.is_empty() {
            return Ok(next);
        }
        common = Some(next);
    }
    Ok(common.unwrap_or_default())
}
