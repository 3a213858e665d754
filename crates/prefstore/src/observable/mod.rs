//! Observable stores: per-key listeners on top of a [`Settings`] store.
//!
//! Three strategies exist, chosen by the binding rather than at runtime:
//!
//! - A backend whose native mechanism reports the changed key implements
//!   [`NativeNotifications`] and emits [`ChangeSignal::Key`]. [`ObservableStore`] routes each
//!   signal to the listeners of that key.
//! - A backend whose mechanism only reports "something changed" (or drops the key, as on a bulk
//!   clear) emits [`ChangeSignal::AnyKey`]. Every listener of the store re-checks its own key and
//!   only real changes fire.
//! - A backend with no notifications at all is wrapped in a [`RuntimeObservable`], which
//!   notifies on writes made through itself.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::{
    error::SettingsError,
    listener::{Delivery, ListenerRegistry, SettingsListener, ValueCallback},
    settings::{Key, Settings},
    value::{SettingType, ValueKind},
};

mod runtime;

pub use runtime::{make_observable, require_observable, ObservePolicy, RuntimeObservable};

/// A store whose per-key changes can be listened to.
pub trait ObservableSettings: Settings {
    /// Register `callback` for changes to `key`, read with the getter for `kind`.
    ///
    /// The callback receives `None` when the key becomes absent. It fires only when the value
    /// differs from the last one it was given (or from the value at registration time), and is
    /// never given the same value twice in a row. A key without a value registers fine; the
    /// first write to it fires.
    fn add_value_listener(
        &self,
        key: &str,
        kind: ValueKind,
        delivery: Delivery,
        callback: ValueCallback,
    ) -> Result<SettingsListener, SettingsError>;

    /// Deactivate `listener` if it was registered on this store.
    ///
    /// Handles from other stores and handles that are already inactive are ignored.
    fn remove_listener(&self, listener: &SettingsListener);
}

/// Typed listener registration, available on every [`ObservableSettings`].
pub trait ObservableSettingsExt: ObservableSettings {
    /// Listen to `key` as `T`. The callback receives `default` when the key is absent.
    ///
    /// Change detection still tells absence from presence, so removing a key whose value equals
    /// `default` fires the callback.
    fn add_listener<T: SettingType>(
        &self,
        key: &str,
        default: T,
        callback: impl Fn(T) + Send + Sync + 'static,
    ) -> Result<SettingsListener, SettingsError> {
        self.add_value_listener(
            key,
            T::KIND,
            Delivery::ChangesOnly,
            Box::new(move |value| {
                callback(
                    value
                        .and_then(T::from_value)
                        .unwrap_or_else(|| default.clone()),
                )
            }),
        )
    }

    /// Listen to `key` as `T`. The callback receives `None` when the key is absent.
    fn add_or_null_listener<T: SettingType>(
        &self,
        key: &str,
        callback: impl Fn(Option<T>) + Send + Sync + 'static,
    ) -> Result<SettingsListener, SettingsError> {
        self.add_value_listener(
            key,
            T::KIND,
            Delivery::ChangesOnly,
            Box::new(move |value| callback(value.and_then(T::from_value))),
        )
    }

    /// Listen to a typed key.
    fn add_key_listener<T: SettingType>(
        &self,
        key: Key<T>,
        callback: impl Fn(Option<T>) + Send + Sync + 'static,
    ) -> Result<SettingsListener, SettingsError> {
        self.add_or_null_listener(key.name(), callback)
    }

    #[allow(missing_docs)]
    fn add_int_listener(
        &self,
        key: &str,
        default: i32,
        callback: impl Fn(i32) + Send + Sync + 'static,
    ) -> Result<SettingsListener, SettingsError> {
        self.add_listener(key, default, callback)
    }

    #[allow(missing_docs)]
    fn add_int_or_null_listener(
        &self,
        key: &str,
        callback: impl Fn(Option<i32>) + Send + Sync + 'static,
    ) -> Result<SettingsListener, SettingsError> {
        self.add_or_null_listener(key, callback)
    }

    #[allow(missing_docs)]
    fn add_long_listener(
        &self,
        key: &str,
        default: i64,
        callback: impl Fn(i64) + Send + Sync + 'static,
    ) -> Result<SettingsListener, SettingsError> {
        self.add_listener(key, default, callback)
    }

    #[allow(missing_docs)]
    fn add_long_or_null_listener(
        &self,
        key: &str,
        callback: impl Fn(Option<i64>) + Send + Sync + 'static,
    ) -> Result<SettingsListener, SettingsError> {
        self.add_or_null_listener(key, callback)
    }

    #[allow(missing_docs)]
    fn add_string_listener(
        &self,
        key: &str,
        default: &str,
        callback: impl Fn(String) + Send + Sync + 'static,
    ) -> Result<SettingsListener, SettingsError> {
        self.add_listener(key, default.to_string(), callback)
    }

    #[allow(missing_docs)]
    fn add_string_or_null_listener(
        &self,
        key: &str,
        callback: impl Fn(Option<String>) + Send + Sync + 'static,
    ) -> Result<SettingsListener, SettingsError> {
        self.add_or_null_listener(key, callback)
    }

    #[allow(missing_docs)]
    fn add_float_listener(
        &self,
        key: &str,
        default: f32,
        callback: impl Fn(f32) + Send + Sync + 'static,
    ) -> Result<SettingsListener, SettingsError> {
        self.add_listener(key, default, callback)
    }

    #[allow(missing_docs)]
    fn add_float_or_null_listener(
        &self,
        key: &str,
        callback: impl Fn(Option<f32>) + Send + Sync + 'static,
    ) -> Result<SettingsListener, SettingsError> {
        self.add_or_null_listener(key, callback)
    }

    #[allow(missing_docs)]
    fn add_double_listener(
        &self,
        key: &str,
        default: f64,
        callback: impl Fn(f64) + Send + Sync + 'static,
    ) -> Result<SettingsListener, SettingsError> {
        self.add_listener(key, default, callback)
    }

    #[allow(missing_docs)]
    fn add_double_or_null_listener(
        &self,
        key: &str,
        callback: impl Fn(Option<f64>) + Send + Sync + 'static,
    ) -> Result<SettingsListener, SettingsError> {
        self.add_or_null_listener(key, callback)
    }

    #[allow(missing_docs)]
    fn add_bool_listener(
        &self,
        key: &str,
        default: bool,
        callback: impl Fn(bool) + Send + Sync + 'static,
    ) -> Result<SettingsListener, SettingsError> {
        self.add_listener(key, default, callback)
    }

    #[allow(missing_docs)]
    fn add_bool_or_null_listener(
        &self,
        key: &str,
        callback: impl Fn(Option<bool>) + Send + Sync + 'static,
    ) -> Result<SettingsListener, SettingsError> {
        self.add_or_null_listener(key, callback)
    }
}

impl<O: ObservableSettings + ?Sized> ObservableSettingsExt for O {}

/// A "this may have changed" signal from a native mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSignal {
    /// The value at this key may have changed.
    Key(String),
    /// Something in the store changed but the key is unknown.
    AnyKey,
}

/// Receives change signals from a backend.
///
/// Sinks may be invoked on any thread. Backends must not hold locks guarding their data while
/// invoking a sink, since the sink reads the store.
pub type ChangeSink = Arc<dyn Fn(&ChangeSignal) + Send + Sync>;

/// Implemented by backends whose native mechanism reports changes.
pub trait NativeNotifications: Settings {
    /// Unsubscribes when dropped.
    type Subscription: Send + Sync;

    /// Start delivering change signals to `sink`.
    fn subscribe(&self, sink: ChangeSink) -> Result<Self::Subscription, SettingsError>;
}

/// An observable store driven by its backend's native change notifications.
///
/// The backend is subscribed to once, on the first listener registration, and every signal is
/// routed through this instance's own listener registry. Signals carrying a key reach only that
/// key's listeners; [`ChangeSignal::AnyKey`] re-checks all of them.
pub struct ObservableStore<S: NativeNotifications> {
    inner: Arc<Inner<S>>,
}

struct Inner<S: NativeNotifications> {
    settings: S,
    registry: Arc<ListenerRegistry>,
    subscription: Mutex<Option<S::Subscription>>,
}

impl<S: NativeNotifications + 'static> ObservableStore<S> {
    /// Observe `settings` through its native notifications.
    pub fn new(settings: S) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                registry: ListenerRegistry::new(),
                subscription: Mutex::new(None),
            }),
        }
    }

    /// The wrapped backend.
    pub fn delegate(&self) -> &S {
        &self.inner.settings
    }

    /// The number of active listeners registered through this instance.
    pub fn listener_count(&self) -> usize {
        self.inner.registry.len()
    }

    fn ensure_subscribed(&self) -> Result<(), SettingsError> {
        let mut subscription = self.inner.subscription.lock();
        if subscription.is_none() {
            let inner: Weak<Inner<S>> = Arc::downgrade(&self.inner);
            let sink: ChangeSink = Arc::new(move |signal: &ChangeSignal| {
                if let Some(inner) = inner.upgrade() {
                    match signal {
                        ChangeSignal::Key(key) => {
                            inner.registry.dispatch_key(&inner.settings, key)
                        }
                        ChangeSignal::AnyKey => inner.registry.dispatch_all(&inner.settings),
                    }
                }
            });
            *subscription = Some(self.inner.settings.subscribe(sink)?);
            log::debug!("Subscribed to native change notifications");
        }
        Ok(())
    }
}

impl<S: NativeNotifications + 'static> ObservableSettings for ObservableStore<S> {
    fn add_value_listener(
        &self,
        key: &str,
        kind: ValueKind,
        delivery: Delivery,
        callback: ValueCallback,
    ) -> Result<SettingsListener, SettingsError> {
        self.ensure_subscribed()?;
        self.inner
            .registry
            .register(&self.inner.settings, key, kind, delivery, callback)
    }

    fn remove_listener(&self, listener: &SettingsListener) {
        if listener.belongs_to(&self.inner.registry) {
            listener.deactivate();
        }
    }
}

impl<S: NativeNotifications + 'static> Settings for ObservableStore<S> {
    fn keys(&self) -> Result<Vec<String>, SettingsError> {
        self.inner.settings.keys()
    }
    fn size(&self) -> Result<usize, SettingsError> {
        self.inner.settings.size()
    }
    fn clear(&self) -> Result<(), SettingsError> {
        self.inner.settings.clear()
    }
    fn remove(&self, key: &str) -> Result<(), SettingsError> {
        self.inner.settings.remove(key)
    }
    fn has_key(&self, key: &str) -> Result<bool, SettingsError> {
        self.inner.settings.has_key(key)
    }

    fn put_int(&self, key: &str, value: i32) -> Result<(), SettingsError> {
        self.inner.settings.put_int(key, value)
    }
    fn get_int_or_null(&self, key: &str) -> Result<Option<i32>, SettingsError> {
        self.inner.settings.get_int_or_null(key)
    }
    fn put_long(&self, key: &str, value: i64) -> Result<(), SettingsError> {
        self.inner.settings.put_long(key, value)
    }
    fn get_long_or_null(&self, key: &str) -> Result<Option<i64>, SettingsError> {
        self.inner.settings.get_long_or_null(key)
    }
    fn put_string(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.inner.settings.put_string(key, value)
    }
    fn get_string_or_null(&self, key: &str) -> Result<Option<String>, SettingsError> {
        self.inner.settings.get_string_or_null(key)
    }
    fn put_float(&self, key: &str, value: f32) -> Result<(), SettingsError> {
        self.inner.settings.put_float(key, value)
    }
    fn get_float_or_null(&self, key: &str) -> Result<Option<f32>, SettingsError> {
        self.inner.settings.get_float_or_null(key)
    }
    fn put_double(&self, key: &str, value: f64) -> Result<(), SettingsError> {
        self.inner.settings.put_double(key, value)
    }
    fn get_double_or_null(&self, key: &str) -> Result<Option<f64>, SettingsError> {
        self.inner.settings.get_double_or_null(key)
    }
    fn put_bool(&self, key: &str, value: bool) -> Result<(), SettingsError> {
        self.inner.settings.put_bool(key, value)
    }
    fn get_bool_or_null(&self, key: &str) -> Result<Option<bool>, SettingsError> {
        self.inner.settings.get_bool_or_null(key)
    }

    fn into_observable(self: Arc<Self>) -> Option<Arc<dyn ObservableSettings>> {
        Some(self)
    }
}

impl<S: NativeNotifications> std::fmt::Debug for ObservableStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableStore")
            .field("listeners", &self.inner.registry.len())
            .finish()
    }
}
