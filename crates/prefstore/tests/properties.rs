//! Behavioural properties every observable backend must satisfy.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc, Arc,
    },
    thread,
    time::Duration,
};

use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use prefstore::{
    MemoryStore, ObservableSettings, ObservableSettingsExt, ObservableStore, Settings,
    SettingsFlowExt,
};

struct Fixture {
    settings: Arc<dyn ObservableSettings>,
    #[cfg(feature = "sqlite")]
    _dir: Option<tempfile::TempDir>,
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn memory() -> Fixture {
    init_logger();
    Fixture {
        settings: Arc::new(ObservableStore::new(MemoryStore::isolated())),
        #[cfg(feature = "sqlite")]
        _dir: None,
    }
}

#[cfg(feature = "sqlite")]
fn sqlite() -> Fixture {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let store = prefstore::SqliteStore::open(dir.path().join("settings.sqlite"), None).unwrap();
    Fixture {
        settings: Arc::new(ObservableStore::new(store)),
        _dir: Some(dir),
    }
}

/// Run `test` on its own thread and fail if it does not finish in time, so a deadlock fails
/// the test instead of hanging the run.
fn within_timeout(test: impl FnOnce() + Send + 'static) {
    let (done_tx, done_rx) = mpsc::channel();
    let runner = thread::spawn(move || {
        test();
        let _ = done_tx.send(());
    });

    match done_rx.recv_timeout(Duration::from_secs(10)) {
        Ok(()) => runner.join().unwrap(),
        // The runner panicked; surface its panic.
        Err(mpsc::RecvTimeoutError::Disconnected) => runner.join().unwrap(),
        Err(mpsc::RecvTimeoutError::Timeout) => panic!("timed out, likely deadlocked"),
    }
}

fn counter() -> (Arc<AtomicUsize>, impl Fn(Option<i32>) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let inc = count.clone();
    (count, move |_| {
        inc.fetch_add(1, Ordering::SeqCst);
    })
}

fn check_round_trip(settings: &dyn ObservableSettings) {
    for value in [i32::MIN, -1, 0, 1, i32::MAX] {
        settings.put_int("int", value).unwrap();
        assert_eq!(settings.get_int("int", 7).unwrap(), value);
    }
    for value in [i64::MIN, 0, i64::MAX] {
        settings.put_long("long", value).unwrap();
        assert_eq!(settings.get_long("long", 7).unwrap(), value);
    }
    for value in ["", "plain", "ünïcødé ✓", "with\nnewline"] {
        settings.put_string("string", value).unwrap();
        assert_eq!(settings.get_string("string", "default").unwrap(), value);
    }
    for value in [0.0f32, -0.0, f32::MIN_POSITIVE, f32::MAX, f32::INFINITY, f32::NAN] {
        settings.put_float("float", value).unwrap();
        assert_eq!(
            settings.get_float("float", -1.0).unwrap().to_bits(),
            value.to_bits()
        );
    }
    for value in [0.0f64, -0.0, 1e-310, f64::MAX, f64::NEG_INFINITY, f64::NAN] {
        settings.put_double("double", value).unwrap();
        assert_eq!(
            settings.get_double("double", -1.0).unwrap().to_bits(),
            value.to_bits()
        );
    }
    for value in [true, false] {
        settings.put_bool("bool", value).unwrap();
        assert_eq!(settings.get_bool("bool", !value).unwrap(), value);
    }
}

fn check_absence(settings: &dyn ObservableSettings) {
    assert!(!settings.has_key("never").unwrap());
    assert_eq!(settings.get_int_or_null("never").unwrap(), None);
    assert_eq!(settings.get_double("never", 2.5).unwrap(), 2.5);

    settings.put_long("removed", 3).unwrap();
    settings.remove("removed").unwrap();
    assert!(!settings.has_key("removed").unwrap());
    assert_eq!(settings.get_long_or_null("removed").unwrap(), None);
    assert_eq!(settings.get_long("removed", 9).unwrap(), 9);

    settings.remove("never").unwrap();
}

fn check_clear(settings: &dyn ObservableSettings) {
    settings.put_int("a", 1).unwrap();
    settings.put_string("b", "two").unwrap();
    settings.clear().unwrap();

    assert!(!settings.has_key("a").unwrap());
    assert!(!settings.has_key("b").unwrap());
    assert_eq!(settings.size().unwrap(), 0);
}

fn check_fires_exactly_on_change(settings: &dyn ObservableSettings) {
    let (count, callback) = counter();

    settings.put_int("a", 2).unwrap();
    let _listener = settings.add_int_or_null_listener("a", callback).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 0);

    settings.put_int("a", 2).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 0);
    settings.put_int("a", 1).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    settings.put_int("a", 1).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    settings.remove("a").unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);
    settings.put_int("a", 1).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 3);
    settings.put_int("b", 1).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 3);
    settings.clear().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 4);
}

fn check_independent_listeners(settings: &dyn ObservableSettings) {
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));

    let sink = first.clone();
    let _first = settings
        .add_string_or_null_listener("k", move |value| sink.lock().push(value))
        .unwrap();
    settings.put_string("k", "x").unwrap();

    let sink = second.clone();
    let _second = settings
        .add_string_or_null_listener("k", move |value| sink.lock().push(value))
        .unwrap();
    settings.put_string("k", "y").unwrap();
    settings.remove("k").unwrap();

    assert_eq!(
        *first.lock(),
        vec![Some("x".to_string()), Some("y".to_string()), None]
    );
    assert_eq!(*second.lock(), vec![Some("y".to_string()), None]);
}

fn check_deactivation(settings: &dyn ObservableSettings) {
    let (stopped, callback) = counter();
    let (running, other) = counter();
    let listener = settings.add_int_or_null_listener("k", callback).unwrap();
    let _other = settings.add_int_or_null_listener("k", other).unwrap();

    settings.put_int("k", 1).unwrap();
    listener.deactivate();
    listener.deactivate();
    settings.put_int("k", 2).unwrap();
    settings.remove_listener(&listener);
    settings.put_int("k", 3).unwrap();

    assert!(!listener.is_active());
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
    assert_eq!(running.load(Ordering::SeqCst), 3);
}

fn check_cross_writing_callbacks(settings: Arc<dyn ObservableSettings>) {
    let store = Arc::downgrade(&settings);
    let _on_a = settings
        .add_int_or_null_listener("a", move |_| {
            thread::sleep(Duration::from_millis(50));
            if let Some(store) = store.upgrade() {
                store.put_int("b", 99).unwrap();
            }
        })
        .unwrap();
    let store = Arc::downgrade(&settings);
    let _on_b = settings
        .add_int_or_null_listener("b", move |_| {
            thread::sleep(Duration::from_millis(50));
            if let Some(store) = store.upgrade() {
                store.put_int("a", 99).unwrap();
            }
        })
        .unwrap();

    let writers: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|key| {
            let settings = settings.clone();
            thread::spawn(move || settings.put_int(key, 1).unwrap())
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    // Every change of "a" ends with a write of 99 to "b".
    assert_eq!(settings.get_int("b", 0).unwrap(), 99);
}

fn check_registration_during_concurrent_dispatch(settings: Arc<dyn ObservableSettings>) {
    let nested = Arc::new(AtomicUsize::new(0));
    let registered = nested.clone();
    let store = Arc::downgrade(&settings);
    let _listener = settings
        .add_long_or_null_listener("k", move |_| {
            let Some(store) = store.upgrade() else {
                return;
            };
            let listener = store.add_long_or_null_listener("k", |_| {}).unwrap();
            store.put_long("other", 1).unwrap();
            listener.deactivate();
            registered.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let writers: Vec<_> = (0..2)
        .map(|thread| {
            let settings = settings.clone();
            thread::spawn(move || {
                for i in 0..20 {
                    settings.put_long("k", thread * 100 + i).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    assert!(nested.load(Ordering::SeqCst) > 0);
}

fn check_deactivate_waits_for_delivery(settings: Arc<dyn ObservableSettings>) {
    let (entered_tx, entered_rx) = mpsc::channel();
    let in_callback = Arc::new(AtomicBool::new(false));
    let (calls, count) = counter();

    let running = in_callback.clone();
    let listener = settings
        .add_int_or_null_listener("k", move |value| {
            running.store(true, Ordering::SeqCst);
            count(value);
            let _ = entered_tx.send(());
            thread::sleep(Duration::from_millis(100));
            running.store(false, Ordering::SeqCst);
        })
        .unwrap();

    let writer = {
        let settings = settings.clone();
        thread::spawn(move || settings.put_int("k", 1).unwrap())
    };
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    listener.deactivate();
    assert!(!in_callback.load(Ordering::SeqCst));

    settings.put_int("k", 2).unwrap();
    writer.join().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

async fn check_first_emission(settings: Arc<dyn ObservableSettings>) {
    let mut stream = settings.flow("unset", 17i64).stream();
    assert_eq!(stream.next().now_or_never(), Some(Some(17)));

    let mut nullable = settings.or_null_flow::<f32>("unset").stream();
    assert_eq!(nullable.next().await, Some(None));

    settings.put_long("unset", 17).unwrap();
    assert_eq!(nullable.next().now_or_never(), None);
}

macro_rules! backend_properties {
    ($backend:ident) => {
        mod $backend {
            use super::*;

            #[test]
            fn round_trip() {
                check_round_trip(&*$backend().settings);
            }

            #[test]
            fn absence() {
                check_absence(&*$backend().settings);
            }

            #[test]
            fn clear_empties_all_keys() {
                check_clear(&*$backend().settings);
            }

            #[test]
            fn listener_fires_exactly_on_change() {
                check_fires_exactly_on_change(&*$backend().settings);
            }

            #[test]
            fn multiple_listeners_are_independent() {
                check_independent_listeners(&*$backend().settings);
            }

            #[test]
            fn deactivation_stops_delivery() {
                check_deactivation(&*$backend().settings);
            }

            #[test]
            fn cross_writing_callbacks_on_two_threads_complete() {
                let fixture = $backend();
                within_timeout(move || check_cross_writing_callbacks(fixture.settings.clone()));
            }

            #[test]
            fn callbacks_register_while_another_thread_dispatches() {
                let fixture = $backend();
                within_timeout(move || {
                    check_registration_during_concurrent_dispatch(fixture.settings.clone())
                });
            }

            #[test]
            fn deactivate_waits_for_in_flight_delivery() {
                let fixture = $backend();
                within_timeout(move || check_deactivate_waits_for_delivery(fixture.settings.clone()));
            }

            #[tokio::test]
            async fn stream_first_emission() {
                let fixture = $backend();
                check_first_emission(fixture.settings.clone()).await;
            }
        }
    };
}

backend_properties!(memory);
#[cfg(feature = "sqlite")]
backend_properties!(sqlite);

#[test]
fn named_memory_stores_isolate_and_alias() {
    let x = MemoryStore::named("properties-X");
    let y = MemoryStore::named("properties-Y");
    x.put_int("k", 1).unwrap();
    y.put_int("k", 2).unwrap();
    assert_eq!(x.get_int("k", 0).unwrap(), 1);
    assert_eq!(y.get_int("k", 0).unwrap(), 2);

    let first = ObservableStore::new(MemoryStore::named("properties-Z"));
    let second = ObservableStore::new(MemoryStore::named("properties-Z"));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _listener = second
        .add_int_listener("k", 0, move |value| sink.lock().push(value))
        .unwrap();

    first.put_int("k", 5).unwrap();
    assert_eq!(second.get_int("k", 0).unwrap(), 5);
    assert_eq!(*seen.lock(), vec![5]);
}

#[cfg(feature = "sqlite")]
#[test]
fn named_sqlite_stores_isolate_and_alias() {
    use prefstore::SqliteStore;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.sqlite");

    let x = SqliteStore::open(&path, Some("X")).unwrap();
    let y = SqliteStore::open(&path, Some("Y")).unwrap();
    x.put_int("k", 1).unwrap();
    y.put_int("k", 2).unwrap();
    assert_eq!(x.get_int("k", 0).unwrap(), 1);
    assert_eq!(y.get_int("k", 0).unwrap(), 2);

    let first = SqliteStore::open(&path, Some("Z")).unwrap();
    let second = SqliteStore::open(&path, Some("Z")).unwrap();
    first.put_string("k", "shared").unwrap();
    assert_eq!(second.get_string("k", "").unwrap(), "shared");

    first.clear().unwrap();
    assert!(!second.has_key("k").unwrap());
    assert_eq!(x.get_int("k", 0).unwrap(), 1);
}

#[cfg(feature = "sqlite")]
#[test]
fn named_sqlite_stores_notify_each_other() {
    use prefstore::SqliteStore;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.sqlite");

    let first = ObservableStore::new(SqliteStore::open(&path, Some("Z")).unwrap());
    let second = ObservableStore::new(SqliteStore::open(&path, Some("Z")).unwrap());
    let other = ObservableStore::new(SqliteStore::open(&path, Some("Y")).unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _listener = second
        .add_int_listener("k", 0, move |value| sink.lock().push(value))
        .unwrap();

    other.put_int("k", 3).unwrap();
    first.put_int("k", 5).unwrap();
    assert_eq!(second.get_int("k", 0).unwrap(), 5);
    assert_eq!(*seen.lock(), vec![5]);
}

#[test]
fn panicking_callbacks_do_not_block_siblings() {
    let fixture = memory();
    let settings = &fixture.settings;
    let (count, callback) = counter();

    let _panicking = settings
        .add_bool_or_null_listener("k", |_| panic!("listener failure"))
        .unwrap();
    let _counting = settings.add_int_or_null_listener("k", callback).unwrap();

    settings.put_int("k", 1).unwrap();
    settings.put_bool("k", true).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn concurrent_writers_settle_on_the_final_value() {
    let fixture = memory();
    let settings = fixture.settings.clone();
    let last = Arc::new(Mutex::new(None));
    let sink = last.clone();
    let _listener = settings
        .add_long_or_null_listener("k", move |value| *sink.lock() = value)
        .unwrap();

    let writers: Vec<_> = (0..4)
        .map(|thread| {
            let settings = settings.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    settings.put_long("k", thread * 1000 + i).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    settings.put_long("k", -1).unwrap();
    assert_eq!(*last.lock(), Some(-1));
}
