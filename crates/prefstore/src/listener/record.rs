use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::atomic::{AtomicBool, Ordering},
    thread::{self, ThreadId},
};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::{
    error::SettingsError,
    settings::Settings,
    value::{SettingValue, ValueKind},
};

/// Callback invoked with the new value of a key, `None` meaning the key is absent.
pub type ValueCallback = Box<dyn Fn(Option<SettingValue>) + Send + Sync>;

struct DeliveryState {
    /// The last value the callback saw.
    cache: Option<SettingValue>,
    /// The thread currently delivering to this record.
    owner: Option<ThreadId>,
    /// A signal arrived that the owner has not re-checked yet.
    recheck: bool,
}

/// One listener registration: a key, the last value its callback saw, and the callback.
///
/// Deliveries to a record are serialized without blocking signal senders: the first thread to
/// signal becomes the owner and keeps re-checking until no signal is pending. Signals arriving
/// meanwhile, from any thread or from the callback itself, only mark a re-check. No lock is held
/// while the callback or a store read runs.
///
/// The cache only changes when the callback fires.
pub(crate) struct ListenerRecord {
    id: u64,
    key: String,
    kind: ValueKind,
    active: AtomicBool,
    state: Mutex<DeliveryState>,
    idle: Condvar,
    callback: ValueCallback,
}

impl ListenerRecord {
    /// Create a record owned by the calling thread, which must then call
    /// [`complete_registration`](Self::complete_registration). Signals that arrive before that
    /// are deferred until the baseline is known.
    pub(crate) fn new(id: u64, key: &str, kind: ValueKind, callback: ValueCallback) -> Self {
        Self {
            id,
            key: key.to_string(),
            kind,
            active: AtomicBool::new(true),
            state: Mutex::new(DeliveryState {
                cache: None,
                owner: Some(thread::current().id()),
                recheck: false,
            }),
            idle: Condvar::new(),
            callback,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Read the baseline through `settings`, optionally deliver it, then handle any signal that
    /// raced with registration.
    pub(crate) fn complete_registration(
        &self,
        settings: &dyn Settings,
        deliver_current: bool,
    ) -> Result<(), SettingsError> {
        let baseline = match self.kind.read(settings, &self.key) {
            Ok(value) => value,
            Err(e) => {
                self.release(self.state.lock());
                return Err(e);
            }
        };

        self.state.lock().cache = baseline.clone();
        if deliver_current {
            self.invoke(baseline);
        }

        self.drain(settings, self.state.lock());
        Ok(())
    }

    /// Re-read the key and fire the callback if the value differs from the cache.
    ///
    /// Never blocks on another delivery: if one is in progress it is asked to re-check instead.
    pub(crate) fn on_signal(&self, settings: &dyn Settings) {
        let mut state = self.state.lock();
        if !self.is_active() {
            return;
        }

        state.recheck = true;
        if state.owner.is_some() {
            return;
        }

        state.owner = Some(thread::current().id());
        self.drain(settings, state);
    }

    fn drain(&self, settings: &dyn Settings, mut state: MutexGuard<'_, DeliveryState>) {
        while state.recheck && self.is_active() {
            state.recheck = false;

            let current =
                match MutexGuard::unlocked(&mut state, || self.kind.read(settings, &self.key)) {
                    Ok(value) => value,
                    Err(e) => {
                        log::warn!(
                            "Failed to read '{}' while checking for changes: {}",
                            self.key,
                            e
                        );
                        continue;
                    }
                };

            // Checked under the lock so a concurrent `deactivate` either stops this delivery or
            // waits for it.
            if state.cache == current || !self.is_active() {
                continue;
            }
            state.cache = current.clone();

            MutexGuard::unlocked(&mut state, || self.invoke(current));
        }

        self.release(state);
    }

    fn release(&self, mut state: MutexGuard<'_, DeliveryState>) {
        state.owner = None;
        drop(state);
        self.idle.notify_all();
    }

    /// Run the callback, isolating any panic so sibling listeners are still notified.
    fn invoke(&self, value: Option<SettingValue>) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (self.callback)(value))) {
            log::error!(
                "Listener for '{}' panicked: {}",
                self.key,
                panic_message(panic.as_ref())
            );
        }
    }

    /// Stop future deliveries. Returns whether this call did the deactivation.
    ///
    /// Waits for a delivery in progress on another thread to finish, so no callback runs after
    /// this returns. Called from this record's own callback it returns immediately and the
    /// delivery loop stops once the callback returns.
    pub(crate) fn deactivate(&self) -> bool {
        let was_active = self.active.swap(false, Ordering::SeqCst);

        let me = thread::current().id();
        let mut state = self.state.lock();
        while state.owner.is_some_and(|owner| owner != me) {
            self.idle.wait(&mut state);
        }
        was_active
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
