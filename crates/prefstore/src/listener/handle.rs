use std::sync::{Arc, Weak};

use super::{ListenerRecord, ListenerRegistry};

/// A handle to a registered listener, returned by
/// [`ObservableSettings::add_value_listener`](crate::ObservableSettings::add_value_listener).
///
/// The handle's only operation is [`deactivate`](Self::deactivate). Dropping the handle does
/// not stop deliveries; the listener stays registered until it is deactivated or its store is
/// dropped.
pub struct SettingsListener {
    registry: Weak<ListenerRegistry>,
    record: Arc<ListenerRecord>,
}

impl SettingsListener {
    pub(crate) fn new(registry: Weak<ListenerRegistry>, record: Arc<ListenerRecord>) -> Self {
        Self { registry, record }
    }

    /// Stop delivering changes to this listener's callback.
    ///
    /// Idempotent. Once this returns, the callback is not invoked again. If a delivery is in
    /// flight on another thread this waits for it to finish. Called from this listener's own
    /// callback it only prevents further deliveries.
    pub fn deactivate(&self) {
        let first = self.record.deactivate();
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.record);
        }
        if first {
            log::debug!(
                "Deactivated listener {} for '{}'",
                self.record.id(),
                self.record.key()
            );
        }
    }

    /// Whether the listener still receives changes.
    pub fn is_active(&self) -> bool {
        self.record.is_active()
    }

    /// The key this listener observes.
    pub fn key(&self) -> &str {
        self.record.key()
    }

    pub(crate) fn belongs_to(&self, registry: &Arc<ListenerRegistry>) -> bool {
        std::ptr::eq(self.registry.as_ptr(), Arc::as_ptr(registry))
    }
}

impl std::fmt::Debug for SettingsListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsListener")
            .field("key", &self.record.key())
            .field("active", &self.record.is_active())
            .finish()
    }
}
