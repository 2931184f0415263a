//! Tests for `ListenerRegistry<E>`.

use hark_db::error::HarkDbError;
use hark_db::reactive::{ListenerId, ListenerRegistry};
use std::sync::{Arc, Mutex};

/// Helper: create a shared call-log that listeners append to.
fn make_log() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

// ============================================================================
// Basic subscription
// ============================================================================

#[test]
fn add_registers_and_emit_calls() {
    let registry: ListenerRegistry<i32> = ListenerRegistry::new();
    let log = make_log();
    let log_clone = Arc::clone(&log);

    registry.add(move |event| {
        log_clone.lock().unwrap().push(format!("{event}"));
        Ok(())
    });

    registry.emit(&42).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["42"]);
    assert_eq!(registry.len(), 1);
}

#[test]
fn emit_with_no_listeners_is_ok() {
    let registry: ListenerRegistry<i32> = ListenerRegistry::new();
    assert!(registry.emit(&1).is_ok());
    assert!(registry.is_empty());
}

#[test]
fn ids_are_distinct_and_displayable() {
    let registry: ListenerRegistry<i32> = ListenerRegistry::new();
    let ids: Vec<ListenerId> = (0..5).map(|_| registry.add(|_| Ok(()))).collect();

    for pair in ids.windows(2) {
        assert!(pair[0] < pair[1]);
    }
    assert_eq!(ids[0].to_string(), format!("listener#{}", ids[0].get()));
}

// ============================================================================
// Unsubscription
// ============================================================================

#[test]
fn remove_twice_is_noop() {
    let registry: ListenerRegistry<i32> = ListenerRegistry::new();
    let log = make_log();
    let gone = registry.add(|_| Ok(()));
    let l = Arc::clone(&log);
    registry.add(move |e| {
        l.lock().unwrap().push(format!("{e}"));
        Ok(())
    });

    assert!(registry.remove(gone));
    assert!(!registry.remove(gone));
    registry.emit(&1).unwrap();

    assert_eq!(registry.len(), 1);
    assert_eq!(*log.lock().unwrap(), vec!["1"]);
}

#[test]
fn clear_drops_every_listener() {
    let registry: ListenerRegistry<i32> = ListenerRegistry::new();
    registry.add(|_| Ok(()));
    registry.add(|_| Ok(()));

    registry.clear();

    assert!(registry.is_empty());
}

// ============================================================================
// Re-entrancy
// ============================================================================

#[test]
fn listener_can_remove_itself() {
    let registry = Arc::new(ListenerRegistry::<i32>::new());
    let log = make_log();
    let own_id = Arc::new(Mutex::new(None::<ListenerId>));

    let r = Arc::clone(&registry);
    let l = Arc::clone(&log);
    let oid = Arc::clone(&own_id);
    let id = registry.add(move |e| {
        l.lock().unwrap().push(format!("once:{e}"));
        if let Some(id) = *oid.lock().unwrap() {
            r.remove(id);
        }
        Ok(())
    });
    *own_id.lock().unwrap() = Some(id);

    registry.emit(&1).unwrap();
    registry.emit(&2).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["once:1"]);
}

#[test]
fn listener_can_emit_recursively() {
    let registry = Arc::new(ListenerRegistry::<i32>::new());
    let log = make_log();

    let r = Arc::clone(&registry);
    let l = Arc::clone(&log);
    registry.add(move |e| {
        l.lock().unwrap().push(format!("{e}"));
        if *e > 0 {
            r.emit(&(e - 1))?;
        }
        Ok(())
    });

    registry.emit(&2).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["2", "1", "0"]);
}

#[test]
fn nested_error_propagates_to_outer_emit() {
    let registry = Arc::new(ListenerRegistry::<i32>::new());
    let r = Arc::clone(&registry);
    registry.add(move |e| {
        if *e == 0 {
            return Err(HarkDbError::listener("bottom"));
        }
        r.emit(&(e - 1))
    });

    let err = registry.emit(&3).unwrap_err();

    assert_eq!(err.to_string(), "Listener failed: bottom");
}
