use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, OnceLock, RwLock, Weak,
    },
};

use parking_lot::Mutex;

use crate::{
    error::SettingsError,
    observable::{ChangeSignal, ChangeSink, NativeNotifications, ObservableSettings, ObservableStore},
    settings::{Settings, SettingsFactory},
    value::{SettingType, SettingValue},
};

/// Collections created by name live for the rest of the process.
static NAMED_COLLECTIONS: OnceLock<Mutex<HashMap<String, Arc<Collection>>>> = OnceLock::new();

const DEFAULT_COLLECTION: &str = "";

struct Collection {
    entries: RwLock<HashMap<String, SettingValue>>,
    subscribers: Mutex<Vec<(u64, ChangeSink)>>,
    next_subscriber: AtomicU64,
}

impl Collection {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(1),
        }
    }

    fn notify(&self, signal: ChangeSignal) {
        let sinks: Vec<ChangeSink> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, sink)| Arc::clone(sink))
            .collect();

        for sink in sinks {
            sink(&signal);
        }
    }
}

/// An in-process store with native per-key change notifications.
///
/// Stores opened with the same name share one collection for the lifetime of the process, so
/// a write through one instance is visible to, and signalled to, every other instance with that
/// name. Writes signal the key they touched; `clear` signals without a key.
#[derive(Clone)]
pub struct MemoryStore {
    collection: Arc<Collection>,
}

impl MemoryStore {
    /// Open the shared collection called `name`.
    pub fn named(name: &str) -> Self {
        let collections = NAMED_COLLECTIONS.get_or_init(|| Mutex::new(HashMap::new()));
        let collection = collections
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Collection::new()))
            .clone();
        Self { collection }
    }

    /// Open the shared default collection.
    pub fn default_collection() -> Self {
        Self::named(DEFAULT_COLLECTION)
    }

    /// Create a private collection that no other name resolves to.
    pub fn isolated() -> Self {
        Self {
            collection: Arc::new(Collection::new()),
        }
    }

    /// The number of native subscriptions currently attached to this collection.
    pub fn subscriber_count(&self) -> usize {
        self.collection.subscribers.lock().len()
    }

    fn read<T: SettingType>(&self, key: &str) -> Result<Option<T>, SettingsError> {
        Ok(self
            .entries()?
            .get(key)
            .cloned()
            .and_then(T::from_value))
    }

    fn write(&self, key: &str, value: SettingValue) -> Result<(), SettingsError> {
        self.collection
            .entries
            .write()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), value);
        self.collection.notify(ChangeSignal::Key(key.to_string()));
        Ok(())
    }

    fn entries(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, SettingValue>>, SettingsError> {
        self.collection.entries.read().map_err(|_| poisoned())
    }
}

fn poisoned() -> SettingsError {
    SettingsError::Internal("memory store lock poisoned".to_string())
}

impl Settings for MemoryStore {
    fn keys(&self) -> Result<Vec<String>, SettingsError> {
        Ok(self.entries()?.keys().cloned().collect())
    }
    fn size(&self) -> Result<usize, SettingsError> {
        Ok(self.entries()?.len())
    }
    fn clear(&self) -> Result<(), SettingsError> {
        self.collection
            .entries
            .write()
            .map_err(|_| poisoned())?
            .clear();
        self.collection.notify(ChangeSignal::AnyKey);
        Ok(())
    }
    fn remove(&self, key: &str) -> Result<(), SettingsError> {
        let removed = self
            .collection
            .entries
            .write()
            .map_err(|_| poisoned())?
            .remove(key);
        if removed.is_some() {
            self.collection.notify(ChangeSignal::Key(key.to_string()));
        }
        Ok(())
    }
    fn has_key(&self, key: &str) -> Result<bool, SettingsError> {
        Ok(self.entries()?.contains_key(key))
    }

    fn put_int(&self, key: &str, value: i32) -> Result<(), SettingsError> {
        self.write(key, SettingValue::Int(value))
    }
    fn get_int_or_null(&self, key: &str) -> Result<Option<i32>, SettingsError> {
        self.read(key)
    }
    fn put_long(&self, key: &str, value: i64) -> Result<(), SettingsError> {
        self.write(key, SettingValue::Long(value))
    }
    fn get_long_or_null(&self, key: &str) -> Result<Option<i64>, SettingsError> {
        self.read(key)
    }
    fn put_string(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.write(key, SettingValue::String(value.to_string()))
    }
    fn get_string_or_null(&self, key: &str) -> Result<Option<String>, SettingsError> {
        self.read(key)
    }
    fn put_float(&self, key: &str, value: f32) -> Result<(), SettingsError> {
        self.write(key, SettingValue::Float(value))
    }
    fn get_float_or_null(&self, key: &str) -> Result<Option<f32>, SettingsError> {
        self.read(key)
    }
    fn put_double(&self, key: &str, value: f64) -> Result<(), SettingsError> {
        self.write(key, SettingValue::Double(value))
    }
    fn get_double_or_null(&self, key: &str) -> Result<Option<f64>, SettingsError> {
        self.read(key)
    }
    fn put_bool(&self, key: &str, value: bool) -> Result<(), SettingsError> {
        self.write(key, SettingValue::Boolean(value))
    }
    fn get_bool_or_null(&self, key: &str) -> Result<Option<bool>, SettingsError> {
        self.read(key)
    }

    fn into_observable(self: Arc<Self>) -> Option<Arc<dyn ObservableSettings>> {
        Some(Arc::new(ObservableStore::new(self.as_ref().clone())))
    }
}

/// Detaches a sink from its collection when dropped.
pub struct MemorySubscription {
    collection: Weak<Collection>,
    id: u64,
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        if let Some(collection) = self.collection.upgrade() {
            collection.subscribers.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl NativeNotifications for MemoryStore {
    type Subscription = MemorySubscription;

    fn subscribe(&self, sink: ChangeSink) -> Result<Self::Subscription, SettingsError> {
        let id = self.collection.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.collection.subscribers.lock().push((id, sink));
        Ok(MemorySubscription {
            collection: Arc::downgrade(&self.collection),
            id,
        })
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Creates [`MemoryStore`]s over process-wide named collections.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStoreFactory;

impl SettingsFactory for MemoryStoreFactory {
    type Settings = MemoryStore;

    fn create(&self, name: Option<&str>) -> Result<MemoryStore, SettingsError> {
        Ok(match name {
            Some(name) => MemoryStore::named(name),
            None => MemoryStore::default_collection(),
        })
    }
}
