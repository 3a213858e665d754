use std::sync::Arc;

use super::ObservableSettings;
use crate::{
    error::SettingsError,
    listener::{Delivery, ListenerRegistry, SettingsListener, ValueCallback},
    settings::Settings,
    value::ValueKind,
};

/// Observability for stores without any native change notification.
///
/// Every write made through this adapter is forwarded to the delegate and then checked against
/// the listeners of the affected key. `clear` re-checks every registered listener.
///
/// Writes made directly on the delegate, or by anything else sharing its persisted collection,
/// bypass the adapter and are **not** observed. Route every write through the adapter when
/// listeners must see it.
pub struct RuntimeObservable {
    delegate: Arc<dyn Settings>,
    registry: Arc<ListenerRegistry>,
}

impl RuntimeObservable {
    /// Wrap `delegate`. Prefer [`make_observable`] when the delegate may already be observable.
    pub fn new(delegate: Arc<dyn Settings>) -> Self {
        Self {
            delegate,
            registry: ListenerRegistry::new(),
        }
    }

    /// The wrapped store. Writes made through it are not observed.
    pub fn delegate(&self) -> &Arc<dyn Settings> {
        &self.delegate
    }

    /// The number of active listeners registered through this adapter.
    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    fn written(&self, key: &str) {
        self.registry.dispatch_key(self.delegate.as_ref(), key);
    }
}

impl ObservableSettings for RuntimeObservable {
    fn add_value_listener(
        &self,
        key: &str,
        kind: ValueKind,
        delivery: Delivery,
        callback: ValueCallback,
    ) -> Result<SettingsListener, SettingsError> {
        self.registry
            .register(self.delegate.as_ref(), key, kind, delivery, callback)
    }

    fn remove_listener(&self, listener: &SettingsListener) {
        if listener.belongs_to(&self.registry) {
            listener.deactivate();
        }
    }
}

impl Settings for RuntimeObservable {
    fn keys(&self) -> Result<Vec<String>, SettingsError> {
        self.delegate.keys()
    }
    fn size(&self) -> Result<usize, SettingsError> {
        self.delegate.size()
    }
    fn clear(&self) -> Result<(), SettingsError> {
        self.delegate.clear()?;
        self.registry.dispatch_all(self.delegate.as_ref());
        Ok(())
    }
    fn remove(&self, key: &str) -> Result<(), SettingsError> {
        self.delegate.remove(key)?;
        self.written(key);
        Ok(())
    }
    fn has_key(&self, key: &str) -> Result<bool, SettingsError> {
        self.delegate.has_key(key)
    }

    fn put_int(&self, key: &str, value: i32) -> Result<(), SettingsError> {
        self.delegate.put_int(key, value)?;
        self.written(key);
        Ok(())
    }
    fn get_int_or_null(&self, key: &str) -> Result<Option<i32>, SettingsError> {
        self.delegate.get_int_or_null(key)
    }
    fn put_long(&self, key: &str, value: i64) -> Result<(), SettingsError> {
        self.delegate.put_long(key, value)?;
        self.written(key);
        Ok(())
    }
    fn get_long_or_null(&self, key: &str) -> Result<Option<i64>, SettingsError> {
        self.delegate.get_long_or_null(key)
    }
    fn put_string(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.delegate.put_string(key, value)?;
        self.written(key);
        Ok(())
    }
    fn get_string_or_null(&self, key: &str) -> Result<Option<String>, SettingsError> {
        self.delegate.get_string_or_null(key)
    }
    fn put_float(&self, key: &str, value: f32) -> Result<(), SettingsError> {
        self.delegate.put_float(key, value)?;
        self.written(key);
        Ok(())
    }
    fn get_float_or_null(&self, key: &str) -> Result<Option<f32>, SettingsError> {
        self.delegate.get_float_or_null(key)
    }
    fn put_double(&self, key: &str, value: f64) -> Result<(), SettingsError> {
        self.delegate.put_double(key, value)?;
        self.written(key);
        Ok(())
    }
    fn get_double_or_null(&self, key: &str) -> Result<Option<f64>, SettingsError> {
        self.delegate.get_double_or_null(key)
    }
    fn put_bool(&self, key: &str, value: bool) -> Result<(), SettingsError> {
        self.delegate.put_bool(key, value)?;
        self.written(key);
        Ok(())
    }
    fn get_bool_or_null(&self, key: &str) -> Result<Option<bool>, SettingsError> {
        self.delegate.get_bool_or_null(key)
    }

    fn into_observable(self: Arc<Self>) -> Option<Arc<dyn ObservableSettings>> {
        Some(self)
    }
}

impl std::fmt::Debug for RuntimeObservable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeObservable")
            .field("listeners", &self.registry.len())
            .finish()
    }
}

/// How [`make_observable`] treats a store that can already be observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObservePolicy {
    /// Return the store's own observable view when it has one, so native notifications keep
    /// reaching listeners. Only stores without one are wrapped.
    #[default]
    PreferNative,
    /// Always wrap in a [`RuntimeObservable`], observing only writes made through the wrapper.
    ForceRuntime,
}

/// Make any store observable.
///
/// With [`ObservePolicy::PreferNative`] a store that is already observable, or whose backend has
/// native notifications, is returned through its own observable view. Anything else is wrapped
/// in a [`RuntimeObservable`], with its bypass limitation.
pub fn make_observable(
    settings: Arc<dyn Settings>,
    policy: ObservePolicy,
) -> Arc<dyn ObservableSettings> {
    if policy == ObservePolicy::PreferNative {
        if let Some(observable) = Arc::clone(&settings).into_observable() {
            return observable;
        }
    }
    Arc::new(RuntimeObservable::new(settings))
}

/// The store's observable view, or [`SettingsError::ObservationUnsupported`] if it has neither
/// native notifications nor an observable wrapper.
pub fn require_observable(
    settings: Arc<dyn Settings>,
) -> Result<Arc<dyn ObservableSettings>, SettingsError> {
    settings
        .into_observable()
        .ok_or(SettingsError::ObservationUnsupported)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use super::*;
    use crate::{observable::ObservableSettingsExt, MemoryStore};

    /// A store without notifications, standing in for mechanisms like plain property files.
    struct PlainStore(MemoryStore);

    impl Settings for PlainStore {
        fn keys(&self) -> Result<Vec<String>, SettingsError> {
            self.0.keys()
        }
        fn clear(&self) -> Result<(), SettingsError> {
            self.0.clear()
        }
        fn remove(&self, key: &str) -> Result<(), SettingsError> {
            self.0.remove(key)
        }
        fn has_key(&self, key: &str) -> Result<bool, SettingsError> {
            self.0.has_key(key)
        }
        fn put_int(&self, key: &str, value: i32) -> Result<(), SettingsError> {
            self.0.put_int(key, value)
        }
        fn get_int_or_null(&self, key: &str) -> Result<Option<i32>, SettingsError> {
            self.0.get_int_or_null(key)
        }
        fn put_long(&self, key: &str, value: i64) -> Result<(), SettingsError> {
            self.0.put_long(key, value)
        }
        fn get_long_or_null(&self, key: &str) -> Result<Option<i64>, SettingsError> {
            self.0.get_long_or_null(key)
        }
        fn put_string(&self, key: &str, value: &str) -> Result<(), SettingsError> {
            self.0.put_string(key, value)
        }
        fn get_string_or_null(&self, key: &str) -> Result<Option<String>, SettingsError> {
            self.0.get_string_or_null(key)
        }
        fn put_float(&self, key: &str, value: f32) -> Result<(), SettingsError> {
            self.0.put_float(key, value)
        }
        fn get_float_or_null(&self, key: &str) -> Result<Option<f32>, SettingsError> {
            self.0.get_float_or_null(key)
        }
        fn put_double(&self, key: &str, value: f64) -> Result<(), SettingsError> {
            self.0.put_double(key, value)
        }
        fn get_double_or_null(&self, key: &str) -> Result<Option<f64>, SettingsError> {
            self.0.get_double_or_null(key)
        }
        fn put_bool(&self, key: &str, value: bool) -> Result<(), SettingsError> {
            self.0.put_bool(key, value)
        }
        fn get_bool_or_null(&self, key: &str) -> Result<Option<bool>, SettingsError> {
            self.0.get_bool_or_null(key)
        }
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(i32) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (count, move |_: i32| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn writes_through_the_adapter_notify() {
        let adapter = RuntimeObservable::new(Arc::new(PlainStore(MemoryStore::isolated())));
        let (count, callback) = counter();
        let _listener = adapter.add_int_listener("a", 0, callback).unwrap();

        adapter.put_int("a", 1).unwrap();
        adapter.put_int("a", 1).unwrap();
        adapter.remove("a").unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn writes_on_the_delegate_are_not_observed() {
        let delegate: Arc<dyn Settings> = Arc::new(PlainStore(MemoryStore::isolated()));
        let adapter = RuntimeObservable::new(delegate.clone());
        let (count, callback) = counter();
        let _listener = adapter.add_int_listener("a", 0, callback).unwrap();

        delegate.put_int("a", 1).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // The next adapter write compares against the stale cache and catches up.
        adapter.put_int("a", 2).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_notifies_each_observed_key_individually() {
        let adapter = RuntimeObservable::new(Arc::new(PlainStore(MemoryStore::isolated())));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut listeners = Vec::new();
        for key in ["a", "b", "c"] {
            let seen = seen.clone();
            listeners.push(
                adapter
                    .add_int_or_null_listener(key, move |value| {
                        seen.lock().unwrap().push((key, value))
                    })
                    .unwrap(),
            );
        }
        adapter.put_int("a", 1).unwrap();
        adapter.put_int("b", 2).unwrap();
        seen.lock().unwrap().clear();

        adapter.clear().unwrap();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec![("a", None), ("b", None)]);
    }

    #[test]
    fn make_observable_short_circuits_native_stores() {
        let native: Arc<dyn Settings> = Arc::new(MemoryStore::isolated());
        let observable = make_observable(native.clone(), ObservePolicy::PreferNative);
        let (count, callback) = counter();
        let _listener = observable.add_int_listener("a", 0, callback).unwrap();

        // A native store keeps observing writes made outside the observable view.
        native.put_int("a", 1).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn make_observable_can_force_the_adapter() {
        let native: Arc<dyn Settings> = Arc::new(MemoryStore::isolated());
        let observable = make_observable(native.clone(), ObservePolicy::ForceRuntime);
        let (count, callback) = counter();
        let _listener = observable.add_int_listener("a", 0, callback).unwrap();

        native.put_int("a", 1).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        observable.put_int("a", 2).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn make_observable_returns_observable_stores_unchanged() {
        let adapter: Arc<dyn Settings> = Arc::new(RuntimeObservable::new(Arc::new(PlainStore(
            MemoryStore::isolated(),
        ))));
        let observable = make_observable(adapter.clone(), ObservePolicy::PreferNative);

        assert!(std::ptr::addr_eq(
            Arc::as_ptr(&adapter),
            Arc::as_ptr(&observable)
        ));
    }

    #[test]
    fn require_observable_fails_for_plain_stores() {
        let plain: Arc<dyn Settings> = Arc::new(PlainStore(MemoryStore::isolated()));
        assert!(matches!(
            require_observable(plain),
            Err(SettingsError::ObservationUnsupported)
        ));

        let native: Arc<dyn Settings> = Arc::new(MemoryStore::isolated());
        assert!(require_observable(native).is_ok());
    }
}
