//! Custom Test Assertions
//!
//! Provides assertion helpers for repository results that give more
//! meaningful failure messages than bare `assert_eq!`.

use infra_db::{DbContext, PersistenceFailure, COMMIT_FAILED};

/// Asserts that a commit returned the failure sentinel and left a diagnostic
///
/// # Returns
///
/// The diagnostic, taken off the context
///
/// # Panics
///
/// Panics if `result` is not [`COMMIT_FAILED`] or no diagnostic was recorded
pub fn assert_commit_failed(result: i64, context: &DbContext) -> PersistenceFailure {
    assert_eq!(
        result, COMMIT_FAILED,
        "Expected the commit to fail, it reported {} affected rows",
        result
    );
    context
        .take_last_failure()
        .expect("Expected a persistence failure diagnostic on the context")
}

/// Asserts that the context has nothing left to flush
pub fn assert_no_pending(context: &DbContext) {
    let pending = context.pending_entries();
    assert!(
        pending.is_empty(),
        "Expected no pending changes, found {}: {:?}",
        pending.len(),
        pending
            .iter()
            .map(|entry| (entry.meta.name, entry.state))
            .collect::<Vec<_>>()
    );
}

/// Asserts that a commit succeeded with the expected row count
pub fn assert_affected(result: i64, expected: i64) {
    assert_eq!(
        result, expected,
        "Expected {} affected rows, got {}",
        expected, result
    );
}
