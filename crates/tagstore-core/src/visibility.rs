//! Visibility policy.
//!
//! A statement is shown when the local user said so, hidden when the local
//! user said so, and otherwise shown once the community score reaches
//! [`SHOW_THRESHOLD`]. Statements with some support but below the threshold
//! are offered as suggestions, unless they were seeded by auto-generation.
//!
//! ```text
//! local ADD      → shown
//! local REMOVE   → hidden
//! no opinion     → shown      if score ≥ SHOW_THRESHOLD
//!                → suggested  if 0 ≤ score < SHOW_THRESHOLD
//! ```

use crate::model::{Operation, Statement};

/// Minimum community score for a statement to be shown without a local opinion.
pub const SHOW_THRESHOLD: u32 = 2;

/// Whether the statement is shown to the local user.
pub fn show_condition(statement: &Statement) -> bool {
    match statement.local_operation {
        Some(Operation::Add) => true,
        Some(Operation::Remove) => false,
        None => statement.score() >= i64::from(SHOW_THRESHOLD),
    }
}

/// Whether the statement is a suggestion: no local opinion and some, but
/// not enough, support. Negative scores and auto-generated statements are
/// not suggested.
pub fn suggestion_condition(statement: &Statement) -> bool {
    statement.local_operation.is_none()
        && !statement.auto_generated
        && (0..i64::from(SHOW_THRESHOLD)).contains(&statement.score())
}
