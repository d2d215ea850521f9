//! Integration tests for commit failure recovery
//!
//! A commit that hits a write conflict reports `COMMIT_FAILED`, leaves a
//! diagnostic on the context and keeps the context usable. Every other store
//! failure propagates as an error with the pending changes intact.

use core_kernel::{Entity, EntityId};
use domain_catalog::{City, Fuel};
use infra_db::{
    DatabaseError, EntityState, PersistenceFailure, Repository, RepositoryError, COMMIT_FAILED,
};
use test_utils::*;

// ============================================================================
// Conflict Recovery Tests
// ============================================================================

mod conflict_tests {
    use super::*;

    /// Tests that a duplicate name leaves the identifier unassigned
    #[test]
    fn test_duplicate_insert_is_reported() {
        let context = memory_context();
        let fuels = Repository::<Fuel>::new(context.clone());
        fuels.insert(FuelFixtures::diesel()).unwrap();

        let duplicate = fuels.insert(FuelFixtures::diesel()).unwrap();
        assert!(!duplicate.id.is_assigned());

        let failure = context.take_last_failure().expect("diagnostic recorded");
        assert!(matches!(failure, PersistenceFailure::Conflict { .. }));
        assert!(failure.diagnostic().contains("Diesel"));
        assert_no_pending(&context);
        assert_eq!(fuels.get_all_no_tracking().count().unwrap(), 1);
    }

    /// Tests that an update of a row that does not exist is a conflict
    #[test]
    fn test_update_of_missing_row() {
        let context = memory_context();
        let fuels = Repository::<Fuel>::new(context.clone());
        let diesel = fuels.insert(FuelFixtures::diesel()).unwrap();

        let failure = assert_commit_failed(fuels.update(FuelFixtures::unknown()).unwrap(), &context);
        assert!(failure.diagnostic().contains("9999"));

        assert_eq!(fuels.get_by_id(diesel.id).unwrap(), Some(diesel));
        assert_eq!(fuels.commit().unwrap(), 0);
    }

    /// Tests that a key which exists in the store survives recovery as unchanged
    #[test]
    fn test_keyed_entry_is_kept_unchanged() {
        let context = memory_context();
        let fuels = Repository::<Fuel>::new(context.clone());
        fuels.insert(FuelFixtures::unknown()).unwrap();
        context.clear();

        let (_, entry) = fuels.insert_without_commit(FuelFixtures::unknown()).unwrap();
        assert_commit_failed(fuels.commit().unwrap(), &context);
        assert_eq!(context.entry_state(entry), EntityState::Unchanged);
        assert_eq!(context.entry_key(entry), Some(EntityId::new(9_999)));
    }

    #[test]
    fn test_overlong_name_is_rejected() {
        let context = memory_context();
        let fuels = Repository::<Fuel>::new(context.clone());
        fuels.insert_without_commit(FuelFixtures::overlong()).unwrap();

        let failure = assert_commit_failed(fuels.commit().unwrap(), &context);
        assert!(failure.diagnostic().contains("name"));
        assert_no_pending(&context);
        assert_eq!(fuels.get_all_no_tracking().count().unwrap(), 0);
    }

    /// Tests that one bad entity rolls back the whole batch
    #[test]
    fn test_conflict_writes_nothing() {
        let (context, store) = memory_context_with_store();
        let cities = Repository::<City>::new(context.clone());
        let mut batch = fake_cities(3);
        batch.push(batch[0].clone());

        let failure = assert_commit_failed(cities.insert_bulk(batch).unwrap(), &context);
        assert!(matches!(failure, PersistenceFailure::Conflict { .. }));
        assert!(store.snapshot(City::meta()).is_empty());
        assert!(context.entries().is_empty());
    }

    /// Tests that the last diagnostic is replaced by the next failure
    #[test]
    fn test_last_failure_is_overwritten() {
        let context = memory_context();
        let fuels = Repository::<Fuel>::new(context.clone());
        fuels.update(FuelFixtures::unknown()).unwrap();
        fuels.insert(FuelFixtures::overlong()).unwrap();

        let failure = context.last_failure().unwrap();
        assert!(!failure.diagnostic().contains("9999"));
        assert!(context.take_last_failure().is_some());
        assert!(context.last_failure().is_none());
    }

    /// Tests that an empty commit never reaches the store
    #[test]
    fn test_empty_commit_skips_store() {
        let (context, store) = faulty_context();
        let fuels = Repository::<Fuel>::new(context);
        assert_eq!(fuels.commit().unwrap(), 0);
        assert_eq!(store.apply_calls(), 0);
    }
}

// ============================================================================
// Store Failure Tests
// ============================================================================

mod store_failure_tests {
    use super::*;

    /// Tests that a connection failure propagates and keeps pending changes
    #[test]
    fn test_connection_failure_propagates() {
        let (context, store) = faulty_context();
        let fuels = Repository::<Fuel>::new(context.clone());
        store.fail_next_apply(DatabaseError::ConnectionFailed("connection reset".into()));

        fuels.insert_without_commit(FuelFixtures::diesel()).unwrap();
        let error = fuels.commit().unwrap_err();
        assert!(matches!(
            error,
            RepositoryError::Database(DatabaseError::ConnectionFailed(_))
        ));
        assert!(context.last_failure().is_none());
        assert_eq!(context.pending_entries().len(), 1);

        assert_affected(fuels.commit().unwrap(), 1);
        assert_eq!(store.apply_calls(), 2);
    }

    /// Tests that an injected conflict triggers exactly one store call
    #[test]
    fn test_injected_conflict_on_bulk_insert() {
        let (context, store) = faulty_context();
        let cities = Repository::<City>::new(context.clone());
        store.fail_next_apply(DatabaseError::duplicate("cities", "name", "'Baku'"));

        let result = cities.insert_bulk(fake_cities(2)).unwrap();
        assert_commit_failed(result, &context);
        assert_eq!(store.apply_calls(), 1);
        assert!(store.inner().snapshot(City::meta()).is_empty());
        assert_no_pending(&context);
    }

    /// Tests that a failed read surfaces as a database error
    #[test]
    fn test_select_failure_propagates() {
        let (context, store) = faulty_context();
        let fuels = Repository::<Fuel>::new(context);
        store.fail_next_select(DatabaseError::PoolExhausted);

        let error = fuels.get_all().to_vec().unwrap_err();
        assert!(matches!(error, RepositoryError::Database(ref e) if e.is_connection_error()));
        assert!(fuels.get_all().to_vec().unwrap().is_empty());
    }

    #[test]
    fn test_update_and_delete_report_conflicts() {
        let (context, store) = faulty_context();
        let fuels = Repository::<Fuel>::new(context.clone());
        let diesel = fuels.insert(FuelFixtures::diesel()).unwrap();

        store.fail_next_apply(DatabaseError::ConcurrencyConflict("row changed".into()));
        let mut renamed = diesel.clone();
        renamed.name = "Biodiesel".to_string();
        assert_eq!(fuels.update(renamed).unwrap(), COMMIT_FAILED);
        assert!(context.take_last_failure().is_some());

        store.fail_next_apply(DatabaseError::ConcurrencyConflict("row changed".into()));
        assert_eq!(fuels.delete(diesel.clone()).unwrap(), COMMIT_FAILED);

        context.clear();
        assert_eq!(fuels.get_by_id(diesel.id).unwrap(), Some(diesel));
    }
}
