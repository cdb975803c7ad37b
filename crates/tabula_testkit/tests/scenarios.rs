//! End-to-end scenarios through the public table API.

use tabula_core::{
    CacheConfig, CacheError, Database, InMemoryRowStore, RowOp, StoreOp, TableDescriptor,
};
use tabula_testkit::prelude::*;

#[test]
fn insert_then_update_reaches_store_as_one_insert() {
    let mut t = TestTable::cached();

    t.db.begin().unwrap();
    t.table.insert(Person::new(5, "A")).unwrap();
    t.table.update(Person::new(5, "B")).unwrap();
    t.db.commit().unwrap();

    let calls = t.store.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].op, StoreOp::Insert);
    assert_eq!(calls[0].row, Some(Person::new(5, "B")));
}

#[test]
fn identity_insert_then_update_reaches_store_twice() {
    let mut t = TestTable::tickets();

    t.db.begin().unwrap();
    let ticket = t.table.insert(Ticket::new("A")).unwrap();
    assert_eq!(ticket.id, Some(1));
    t.table
        .update(Ticket {
            title: "B".into(),
            ..ticket
        })
        .unwrap();
    t.db.commit().unwrap();

    let ops: Vec<_> = t.store.calls().iter().map(|c| c.op).collect();
    assert_eq!(ops, vec![StoreOp::Insert, StoreOp::Update]);
    assert_eq!(t.store.rows(), vec![Ticket::with_id(1, "B")]);
}

#[test]
fn committed_select_serves_the_next_transaction() {
    let mut t = TestTable::cached();
    t.store.seed(Person::new(7, "R"));

    t.db.begin().unwrap();
    assert_eq!(t.table.select(&Person::key(7)).unwrap(), Some(Person::new(7, "R")));
    t.db.commit().unwrap();

    t.db.begin().unwrap();
    assert_eq!(t.table.select(&Person::key(7)).unwrap(), Some(Person::new(7, "R")));
    t.db.commit().unwrap();

    assert_eq!(t.store.call_count(StoreOp::SelectByKey), 1);
}

#[test]
fn select_of_missing_row_is_none() {
    let mut t = TestTable::cached();

    t.db.begin().unwrap();
    assert_eq!(t.table.select(&Person::key(7)).unwrap(), None);
    t.db.commit().unwrap();

    assert_eq!(t.store.call_count(StoreOp::SelectByKey), 1);
    assert_eq!(t.table.committed_len(), 0);
}

#[test]
fn cached_row_wins_over_reselected_row() {
    let mut t = TestTable::cached();
    t.store.seed(Person::new(1, "first"));

    t.db.begin().unwrap();
    t.table.select(&Person::key(1)).unwrap();
    t.store.seed(Person::new(1, "changed elsewhere"));

    let rows = t.table.select_where(|_| true).unwrap();
    assert_eq!(rows, vec![Person::new(1, "first")]);
    t.db.rollback().unwrap();
}

#[test]
fn insert_then_delete_never_reaches_store() {
    let mut t = TestTable::cached();

    t.db.begin().unwrap();
    t.table.insert(Person::new(1, "a")).unwrap();
    t.table.delete(Person::new(1, "a")).unwrap();
    assert_eq!(t.table.pending_len(), 0);
    t.db.commit().unwrap();

    assert!(t.store.calls().is_empty());
}

#[test]
fn two_updates_flush_once() {
    let mut t = TestTable::cached();
    t.store.seed(Person::new(2, "old"));

    t.db.begin().unwrap();
    t.table.update(Person::new(2, "r1")).unwrap();
    t.table.update(Person::new(2, "r2")).unwrap();
    t.db.commit().unwrap();

    assert_eq!(t.store.call_count(StoreOp::Update), 1);
    assert_eq!(t.store.get(&Person::key(2)), Some(Person::new(2, "r2")));
}

#[test]
fn commit_promotes_and_rollback_discards() {
    let mut t = TestTable::cached();
    t.store.seed(Person::new(2, "old"));
    t.store.seed(Person::new(3, "gone"));

    t.db.begin().unwrap();
    t.table.insert(Person::new(1, "r1")).unwrap();
    t.table.update(Person::new(2, "r2")).unwrap();
    t.table.delete(Person::new(3, "gone")).unwrap();
    t.db.commit().unwrap();

    assert_eq!(t.table.committed_row(&Person::key(1)), Some(Person::new(1, "r1")));
    assert_eq!(t.table.committed_row(&Person::key(2)), Some(Person::new(2, "r2")));
    assert_eq!(t.table.committed_row(&Person::key(3)), None);
    assert_eq!(t.store.call_count(StoreOp::Insert), 1);
    assert_eq!(t.store.call_count(StoreOp::Update), 1);
    assert_eq!(t.store.call_count(StoreOp::Delete), 1);

    t.store.clear_calls();
    t.db.begin().unwrap();
    t.table.update(Person::new(1, "never")).unwrap();
    t.table.insert(Person::new(4, "never")).unwrap();
    t.db.rollback().unwrap();

    assert_eq!(t.table.pending_len(), 0);
    assert_eq!(t.table.committed_row(&Person::key(1)), Some(Person::new(1, "r1")));
    assert_eq!(t.table.committed_len(), 2);
    assert!(t.store.calls().is_empty());
}

#[test]
fn writes_outside_a_transaction_are_refused() {
    let mut t = TestTable::cached();

    let err = t.table.insert(Person::new(1, "a")).unwrap_err();
    assert!(matches!(err, CacheError::CacheUnavailable { .. }));
    assert!(t.table.update(Person::new(1, "a")).is_err());
    assert!(t.table.save(Person::new(1, "a")).is_err());
    assert!(t.table.delete(Person::new(1, "a")).is_err());

    assert_eq!(t.table.pending_len(), 0);
    assert!(t.store.calls().is_empty());
}

#[test]
fn strict_policy_refuses_insert_after_update() {
    let mut t = TestTable::strict();

    t.db.begin().unwrap();
    t.table.update(Person::new(1, "a")).unwrap();
    assert!(t.table.insert(Person::new(1, "b")).unwrap_err().is_duplicate_key());
    assert_eq!(t.table.pending_op(&Person::key(1)), Some(RowOp::Update));
    t.db.rollback().unwrap();
}

#[test]
fn relaxed_policy_turns_update_into_insert() {
    let mut t = TestTable::cached();

    t.db.begin().unwrap();
    t.table.update(Person::new(1, "a")).unwrap();
    t.table.insert(Person::new(1, "b")).unwrap();
    assert_eq!(t.table.pending_op(&Person::key(1)), Some(RowOp::Insert));
    t.db.commit().unwrap();

    assert_eq!(t.store.rows(), vec![Person::new(1, "b")]);
}

#[test]
fn flush_runs_inside_the_physical_transaction() {
    let journal = Journal::new();
    let db = Database::with_backend(
        CacheConfig::new().cache_all_tables(true),
        Box::new(JournalBackend::new(journal.clone())),
    );
    let store = JournalStore::new(InMemoryRowStore::new(), journal.clone());
    let mut people = db.table(TableDescriptor::new(PEOPLE), store);

    db.begin().unwrap();
    people.insert(Person::new(1, "a")).unwrap();
    people.insert(Person::new(2, "b")).unwrap();
    db.commit().unwrap();

    assert_eq!(
        journal.entries(),
        vec!["begin", "insert (1)", "insert (2)", "commit"]
    );
}

#[test]
fn in_transaction_rolls_back_on_error() {
    let mut t = TestTable::cached();
    t.store.seed(Person::new(1, "a"));

    let result = t.db.in_transaction(|| {
        t.table.update(Person::new(1, "changed"))?;
        t.table.insert(Person::new(2, "b"))?;
        t.table.insert(Person::new(2, "c"))?;
        Ok(())
    });

    assert!(result.unwrap_err().is_duplicate_key());
    assert!(!t.db.is_active());
    assert_eq!(t.store.rows(), vec![Person::new(1, "a")]);
    assert_eq!(t.db.stats().snapshot().rollbacks, 1);
}

#[test]
fn uncached_table_writes_through() {
    let mut t = TestTable::uncached();

    t.db.begin().unwrap();
    t.table.insert(Person::new(1, "a")).unwrap();
    assert_eq!(t.store.len(), 1);
    t.table.save(Person::new(1, "b")).unwrap();
    t.table.delete(Person::new(1, "b")).unwrap();
    t.db.commit().unwrap();

    let ops: Vec<_> = t.store.calls().iter().map(|c| c.op).collect();
    assert_eq!(ops, vec![StoreOp::Insert, StoreOp::Update, StoreOp::Delete]);
}
