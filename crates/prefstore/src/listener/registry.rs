use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use super::{ListenerRecord, SettingsListener, ValueCallback};
use crate::{error::SettingsError, settings::Settings, value::ValueKind};

/// When a new listener receives its first value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Only changes after registration are delivered.
    #[default]
    ChangesOnly,
    /// The value at registration time is delivered first, before any change can be.
    CurrentThenChanges,
}

/// Per-store mapping from key to the independent listener records registered on it.
///
/// The lock is never held while a callback runs: dispatch works on a snapshot, so callbacks may
/// add or remove listeners on the same store.
pub(crate) struct ListenerRegistry {
    listeners: RwLock<HashMap<String, Vec<Arc<ListenerRecord>>>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(ListenerRegistry {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Register a listener whose baseline is read through `settings`.
    ///
    /// The record is published before its baseline is read. A signal racing with registration
    /// is deferred and re-checked against the baseline, so a write that lands after the baseline
    /// read is never missed.
    pub(crate) fn register(
        self: &Arc<Self>,
        settings: &dyn Settings,
        key: &str,
        kind: ValueKind,
        delivery: Delivery,
        callback: ValueCallback,
    ) -> Result<SettingsListener, SettingsError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = Arc::new(ListenerRecord::new(id, key, kind, callback));
        self.insert(Arc::clone(&record));

        let deliver_current = delivery == Delivery::CurrentThenChanges;
        if let Err(e) = record.complete_registration(settings, deliver_current) {
            record.deactivate();
            self.remove(&record);
            return Err(e);
        }

        log::debug!("Registered listener {} for '{}'", id, key);
        Ok(SettingsListener::new(Arc::downgrade(self), record))
    }

    /// Re-check the listeners registered on `key`.
    pub(crate) fn dispatch_key(&self, settings: &dyn Settings, key: &str) {
        let snapshot: Vec<Arc<ListenerRecord>> = self
            .listeners
            .read()
            .expect("RwLock should not be poisoned")
            .get(key)
            .cloned()
            .unwrap_or_default();

        for record in snapshot {
            record.on_signal(settings);
        }
    }

    /// Re-check every listener, for signals that do not say which key changed.
    pub(crate) fn dispatch_all(&self, settings: &dyn Settings) {
        let snapshot: Vec<Arc<ListenerRecord>> = self
            .listeners
            .read()
            .expect("RwLock should not be poisoned")
            .values()
            .flatten()
            .cloned()
            .collect();

        for record in snapshot {
            record.on_signal(settings);
        }
    }

    pub(crate) fn remove(&self, record: &ListenerRecord) {
        let mut listeners = self
            .listeners
            .write()
            .expect("RwLock should not be poisoned");

        if let Some(records) = listeners.get_mut(record.key()) {
            records.retain(|r| r.id() != record.id());
            if records.is_empty() {
                listeners.remove(record.key());
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners
            .read()
            .expect("RwLock should not be poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }

    fn insert(&self, record: Arc<ListenerRecord>) {
        self.listeners
            .write()
            .expect("RwLock should not be poisoned")
            .entry(record.key().to_string())
            .or_default()
            .push(record);
    }
}
