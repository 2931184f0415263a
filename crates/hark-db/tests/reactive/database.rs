//! Tests for `Database<S>` change notification.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hark_db::error::{HarkDbError, StorageError};
use hark_db::query::ObjectsQuery;
use hark_db::schema::{p, record_type, Schema};
use hark_db::storage::{SqliteStore, Store};
use hark_db::types::CreateMode;
use hark_db::{AsRecord, ChangeEvent, ChangeKind, Database, Record, SqliteDatabase};
use serde_json::{json, Map, Value};

// ============================================================================
// Test helpers
// ============================================================================

fn schema() -> Schema {
    Schema::new(
        1,
        vec![
            record_type("User")
                .property("id", p::string())
                .property("username", p::string())
                .build(),
            record_type("Post")
                .property("id", p::int())
                .property("title", p::string().with_default("untitled"))
                .build(),
        ],
    )
    .expect("valid schema")
}

/// Route `tracing` output through the test harness; `RUST_LOG=hark_db=trace`
/// shows dispatch and write-scope logs for a failing test.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn open() -> SqliteDatabase {
    init_tracing();
    SqliteDatabase::open_in_memory(schema()).expect("open in-memory DB")
}

fn props(v: Value) -> Map<String, Value> {
    v.as_object().cloned().expect("object literal")
}

type EventLog = Arc<Mutex<Vec<ChangeEvent>>>;

/// Register a listener that records every event it receives.
fn record_events<S: Store>(db: &Database<S>) -> EventLog {
    let log: EventLog = Arc::default();
    let l = Arc::clone(&log);
    db.add_listener(move |event| {
        l.lock().unwrap().push(event.clone());
        Ok(())
    });
    log
}

fn create_user(db: &SqliteDatabase, id: &str, username: &str) -> Record {
    db.write(|db| db.create("User", props(json!({ "id": id, "username": username })), &[]))
        .expect("create user")
}

/// Delegates to `SqliteStore`, counting every query issued.
struct CountingStore {
    inner: SqliteStore,
    queries: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory(schema()).expect("open in-memory DB"),
            queries: AtomicUsize::new(0),
        }
    }

    fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl Store for CountingStore {
    fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    fn create(
        &self,
        record_type: &str,
        properties: Map<String, Value>,
        mode: CreateMode,
    ) -> hark_db::Result<Record> {
        self.inner.create(record_type, properties, mode)
    }

    fn delete(&self, records: &[Record]) -> hark_db::Result<()> {
        self.inner.delete(records)
    }

    fn delete_all(&self) -> hark_db::Result<()> {
        self.inner.delete_all()
    }

    fn count(&self, query: &ObjectsQuery) -> hark_db::Result<usize> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.count(query)
    }

    fn fetch(
        &self,
        query: &ObjectsQuery,
        offset: usize,
        limit: usize,
    ) -> hark_db::Result<Vec<Record>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(query, offset, limit)
    }

    fn is_empty(&self) -> hark_db::Result<bool> {
        self.inner.is_empty()
    }

    fn write<F, T>(&self, f: F) -> hark_db::Result<T>
    where
        F: FnOnce() -> hark_db::Result<T>,
    {
        self.inner.write(f)
    }

    fn in_write_scope(&self) -> bool {
        self.inner.in_write_scope()
    }

    fn close(self) -> hark_db::Result<()> {
        self.inner.close()
    }
}

/// A record wrapper with a teardown hook that logs before deletion.
struct Tracked {
    record: Record,
    log: Arc<Mutex<Vec<String>>>,
}

impl AsRecord for Tracked {
    fn as_record(&self) -> &Record {
        &self.record
    }

    fn teardown(&self) -> hark_db::Result<()> {
        let id = self.record.get_str("id").unwrap_or_default();
        self.log.lock().unwrap().push(format!("teardown:{id}"));
        Ok(())
    }
}

// ============================================================================
// create / update / delete notifications
// ============================================================================

#[test]
fn create_update_delete_scenario() {
    let db = open();
    let log = record_events(&db);

    let created = create_user(&db, "1", "a");
    db.write(|db| db.update("User", props(json!({ "id": "1", "username": "b" })), &[]))
        .unwrap();
    db.write(|db| db.delete("User", [&created], &[])).unwrap();

    let events = log.lock().unwrap();
    assert_eq!(events.len(), 3);

    assert_eq!(events[0].kind(), ChangeKind::Create);
    assert_eq!(events[0].record_type(), Some("User"));
    assert_eq!(
        events[0].record().unwrap().to_json(),
        json!({ "id": "1", "username": "a" })
    );

    assert_eq!(events[1].kind(), ChangeKind::Update);
    assert_eq!(
        events[1].record().unwrap().to_json(),
        json!({ "id": "1", "username": "b" })
    );

    assert_eq!(events[2].kind(), ChangeKind::Delete);
    assert_eq!(events[2].record().unwrap().to_json(), json!({ "id": "1" }));
    assert!(db.get("User", "1").unwrap().is_none());
}

#[test]
fn every_listener_sees_each_mutation_once() {
    let db = open();
    let first = record_events(&db);
    let second = record_events(&db);

    create_user(&db, "1", "a");
    create_user(&db, "2", "b");

    assert_eq!(first.lock().unwrap().len(), 2);
    assert_eq!(*first.lock().unwrap(), *second.lock().unwrap());
}

#[test]
fn context_is_forwarded_verbatim() {
    let db = open();
    let log = record_events(&db);
    let context = vec![json!("sync"), json!({ "origin": "remote" })];

    db.write(|db| db.create("User", props(json!({ "id": "1", "username": "a" })), &context))
        .unwrap();
    db.write(|db| db.delete_all(&context)).unwrap();

    let events = log.lock().unwrap();
    assert_eq!(events[0].context(), context.as_slice());
    assert_eq!(events[1].context(), context.as_slice());
}

#[test]
fn update_of_new_record_is_reported_as_update() {
    let db = open();
    let log = record_events(&db);

    db.write(|db| db.update("User", props(json!({ "id": "9", "username": "z" })), &[]))
        .unwrap();

    let events = log.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), ChangeKind::Update);
    assert_eq!(db.get("User", "9").unwrap().unwrap().get_str("username"), Some("z"));
}

#[test]
fn create_with_existing_key_fails_without_notifying() {
    let db = open();
    create_user(&db, "1", "a");
    let log = record_events(&db);

    let err = db
        .write(|db| db.create("User", props(json!({ "id": "1", "username": "dup" })), &[]))
        .unwrap_err();

    assert!(matches!(
        err,
        HarkDbError::Storage(StorageError::ConstraintViolation { .. })
    ));
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(db.get("User", "1").unwrap().unwrap().get_str("username"), Some("a"));
}

#[test]
fn save_notifies_without_persisting() {
    let db = open();
    let mut user = create_user(&db, "1", "a");
    let log = record_events(&db);

    user.set("username", "edited");
    db.save("User", &user, &[]).unwrap();

    let events = log.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), ChangeKind::Update);
    assert_eq!(events[0].record().unwrap().get_str("username"), Some("edited"));
    assert_eq!(db.get("User", "1").unwrap().unwrap().get_str("username"), Some("a"));
}

// ============================================================================
// delete
// ============================================================================

#[test]
fn delete_runs_teardown_then_notifies_while_record_exists() {
    let db = Arc::new(open());
    create_user(&db, "1", "a");
    create_user(&db, "2", "b");

    let log = Arc::new(Mutex::new(Vec::new()));
    {
        let log = Arc::clone(&log);
        let weak = Arc::downgrade(&db);
        db.add_listener(move |event| {
            let db = weak.upgrade().expect("database alive");
            let pk = event.record().unwrap().primary_key().clone();
            let present = db.get("User", pk.clone())?.is_some();
            log.lock()
                .unwrap()
                .push(format!("delete:{}:{present}", pk.as_str().unwrap_or_default()));
            Ok(())
        });
    }

    let tracked: Vec<Tracked> = db
        .objects("User")
        .unwrap()
        .to_vec()
        .unwrap()
        .into_iter()
        .map(|record| Tracked {
            record,
            log: Arc::clone(&log),
        })
        .collect();

    db.write(|db| db.delete("User", &tracked, &[])).unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "teardown:1",
            "delete:1:true",
            "teardown:2",
            "delete:2:true"
        ]
    );
    assert!(db.is_empty().unwrap());
}

#[test]
fn delete_shadow_uses_declared_primary_key() {
    let db = open();
    let log = record_events(&db);

    let post = db
        .write(|db| db.create("Post", props(json!({ "id": 7 })), &[]))
        .unwrap();
    assert_eq!(post.get_str("title"), Some("untitled"));

    db.write(|db| db.delete("Post", [&post], &[])).unwrap();

    let events = log.lock().unwrap();
    assert_eq!(events[1].record().unwrap().to_json(), json!({ "id": 7 }));
}

#[test]
fn delete_of_empty_batch_does_nothing() {
    let db = open();
    let log = record_events(&db);
    let none: Vec<Record> = Vec::new();

    db.delete("User", &none, &[]).unwrap();

    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn delete_rejects_mixed_record_types_before_side_effects() {
    let db = open();
    let user = create_user(&db, "1", "a");
    let post = db
        .write(|db| db.create("Post", props(json!({ "id": 1 })), &[]))
        .unwrap();
    let log = record_events(&db);

    let err = db
        .write(|db| db.delete("User", [&user, &post], &[]))
        .unwrap_err();

    assert!(matches!(
        err,
        HarkDbError::Storage(StorageError::TypeMismatch { .. })
    ));
    assert!(log.lock().unwrap().is_empty());
    assert!(db.get("User", "1").unwrap().is_some());
}

#[test]
fn delete_all_emits_single_wipe() {
    let db = open();
    create_user(&db, "1", "a");
    create_user(&db, "2", "b");
    db.write(|db| db.create("Post", props(json!({ "id": 1 })), &[]))
        .unwrap();
    let log = record_events(&db);

    db.write(|db| db.delete_all(&[])).unwrap();

    let events = log.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), ChangeKind::Wipe);
    assert_eq!(events[0].record_type(), None);
    assert!(db.is_empty().unwrap());
}

// ============================================================================
// get / get_or_create
// ============================================================================

#[test]
fn blank_keys_never_reach_the_store() {
    let db = Database::new(CountingStore::new());

    assert!(db.get("User", Value::Null).unwrap().is_none());
    assert!(db.get("User", "").unwrap().is_none());
    assert!(db.get_by("User", "", "username").unwrap().is_none());
    assert!(db.get_or_create("User", Value::Null, &[]).unwrap().is_none());
    assert_eq!(db.store().queries(), 0);

    assert!(db.get("User", "1").unwrap().is_none());
    assert_eq!(db.store().queries(), 1);
}

#[test]
fn building_views_is_lazy() {
    let db = Database::new(CountingStore::new());

    let view = db
        .objects("User")
        .unwrap()
        .filtered("username BEGINSWITH $0", &[json!("a")])
        .unwrap();
    assert_eq!(db.store().queries(), 0);

    assert_eq!(view.len().unwrap(), 0);
    assert_eq!(db.store().queries(), 1);
}

#[test]
fn get_by_matches_non_key_fields() {
    let db = open();
    create_user(&db, "1", "ada");
    create_user(&db, "2", "bob");

    let found = db.get_by("User", "bob", "username").unwrap().unwrap();
    assert_eq!(found.get_str("id"), Some("2"));
    assert!(db.get_by("User", "eve", "username").unwrap().is_none());
}

#[test]
fn get_or_create_creates_once() {
    let db = open();
    let log = record_events(&db);

    let first = db
        .write(|db| db.get_or_create("User", "1", &[]))
        .unwrap()
        .unwrap();
    let second = db
        .write(|db| db.get_or_create("User", "1", &[]))
        .unwrap()
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.to_json(), json!({ "id": "1", "username": "" }));
    let events = log.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), ChangeKind::Create);
}

// ============================================================================
// write scopes
// ============================================================================

#[test]
fn mutations_outside_write_scope_fail() {
    let db = open();
    let log = record_events(&db);

    let err = db
        .create("User", props(json!({ "id": "1", "username": "a" })), &[])
        .unwrap_err();
    assert!(matches!(
        err,
        HarkDbError::Storage(StorageError::NotInWriteScope { .. })
    ));
    assert!(db.delete_all(&[]).is_err());
    assert!(db
        .update("User", props(json!({ "id": "1" })), &[])
        .is_err());
    assert!(log.lock().unwrap().is_empty());
    assert!(db.is_empty().unwrap());
}

#[test]
fn failing_listener_rolls_back_the_write() {
    let db = open();
    db.add_listener(|event| match event.kind() {
        ChangeKind::Create => Err(HarkDbError::listener("refused")),
        _ => Ok(()),
    });

    let err = db
        .write(|db| db.create("User", props(json!({ "id": "1", "username": "a" })), &[]))
        .unwrap_err();

    assert!(matches!(err, HarkDbError::Listener(_)));
    assert!(err.to_string().contains("refused"), "{err}");
    assert!(db.is_empty().unwrap());
}

#[test]
fn failing_listener_stops_later_listeners() {
    let db = open();
    db.add_listener(|_| Err(HarkDbError::listener("first")));
    let later = record_events(&db);

    assert!(db
        .write(|db| db.create("User", props(json!({ "id": "1", "username": "a" })), &[]))
        .is_err());
    assert!(later.lock().unwrap().is_empty());
}

#[test]
fn nested_write_rolls_back_independently() {
    let db = open();

    db.write(|db| {
        db.create("User", props(json!({ "id": "1", "username": "outer" })), &[])?;
        let inner = db.write(|db| {
            db.create("User", props(json!({ "id": "2", "username": "inner" })), &[])?;
            Err::<(), _>(HarkDbError::Internal("abort inner".into()))
        });
        assert!(inner.is_err());
        assert!(db.store().in_write_scope());
        Ok(())
    })
    .unwrap();

    assert!(!db.store().in_write_scope());
    assert!(db.get("User", "1").unwrap().is_some());
    assert!(db.get("User", "2").unwrap().is_none());
}

#[test]
fn outer_failure_discards_committed_inner_write() {
    let db = open();

    let result = db.write(|db| {
        db.write(|db| db.create("User", props(json!({ "id": "1", "username": "a" })), &[]))?;
        Err::<(), _>(HarkDbError::Internal("abort outer".into()))
    });

    assert!(result.is_err());
    assert!(db.is_empty().unwrap());
}

#[test]
fn panicking_write_is_rolled_back() {
    let db = open();

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = db.write(|db| -> hark_db::Result<()> {
            db.create("User", props(json!({ "id": "1", "username": "a" })), &[])?;
            panic!("boom")
        });
    }));

    assert!(outcome.is_err());
    assert!(!db.store().in_write_scope());
    assert!(db.is_empty().unwrap());
    create_user(&db, "2", "b");
    assert!(db.get("User", "2").unwrap().is_some());
}

#[test]
fn listener_may_write_within_the_scope() {
    let db = Arc::new(open());
    let weak = Arc::downgrade(&db);
    db.add_listener(move |event| {
        if event.kind() == ChangeKind::Create && event.record_type() == Some("User") {
            let db = weak.upgrade().expect("database alive");
            db.create("Post", props(json!({ "id": 1, "title": "welcome" })), &[])?;
        }
        Ok(())
    });

    create_user(&db, "1", "a");

    let post = db.get("Post", 1).unwrap().unwrap();
    assert_eq!(post.get_str("title"), Some("welcome"));
}

// ============================================================================
// listeners and lifecycle
// ============================================================================

#[test]
fn removed_listener_receives_nothing_more() {
    let db = open();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let id = db.add_listener(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    create_user(&db, "1", "a");
    db.remove_listener(id);
    db.remove_listener(id);
    create_user(&db, "2", "b");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(db.listener_count(), 0);
}

#[test]
fn concurrent_writers_are_serialized() {
    let db = Arc::new(open());
    let log = record_events(&db);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let db = Arc::clone(&db);
            std::thread::spawn(move || {
                for i in 0..10 {
                    let id = format!("{t}-{i}");
                    db.write(|db| db.create("User", props(json!({ "id": id, "username": "u" })), &[]))
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(log.lock().unwrap().len(), 40);
    assert_eq!(db.objects("User").unwrap().len().unwrap(), 40);
}

#[test]
fn close_releases_the_store() {
    let db = open();
    record_events(&db);
    create_user(&db, "1", "a");
    db.close().unwrap();
}
