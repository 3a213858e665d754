//! Reactive sequences over observable stores.
//!
//! A [`SettingFlow`] is a cold description of "the value at this key over time". Each call to
//! [`SettingFlow::stream`] produces an independent [`SettingStream`] that registers its
//! listener on first poll, yields the current value (or the default) first, then one item per
//! change, and never ends on its own. Dropping the stream deactivates its listener.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use futures::StreamExt;
//! use prefstore::{MemoryStore, ObservableStore, Settings, SettingsFlowExt};
//!
//! # futures::executor::block_on(async {
//! let settings = Arc::new(ObservableStore::new(MemoryStore::isolated()));
//! let mut theme = settings.flow("theme", "light".to_string()).stream();
//!
//! assert_eq!(theme.next().await.as_deref(), Some("light"));
//! settings.put_string("theme", "dark").unwrap();
//! assert_eq!(theme.next().await.as_deref(), Some("dark"));
//! # });
//! ```

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::{
    channel::mpsc::{self, UnboundedReceiver},
    Stream, StreamExt,
};

use crate::{
    listener::{Delivery, SettingsListener, ValueCallback},
    observable::ObservableSettings,
    settings::Key,
    value::{SettingType, SettingValue, ValueKind},
};

type Mapper<T> = Arc<dyn Fn(Option<SettingValue>) -> T + Send + Sync>;

/// A cold, restartable sequence of the values at one key.
pub struct SettingFlow<T> {
    settings: Arc<dyn ObservableSettings>,
    key: String,
    kind: ValueKind,
    map: Mapper<T>,
}

impl<T: SettingType> SettingFlow<T> {
    /// Values of `key` as `T`, with `default` standing in while the key is absent.
    pub fn new(settings: Arc<dyn ObservableSettings>, key: &str, default: T) -> Self {
        Self {
            settings,
            key: key.to_string(),
            kind: T::KIND,
            map: Arc::new(move |value| {
                value
                    .and_then(T::from_value)
                    .unwrap_or_else(|| default.clone())
            }),
        }
    }
}

impl<T: SettingType> SettingFlow<Option<T>> {
    /// Values of `key` as `T`, with `None` exactly while the key is absent.
    pub fn or_null(settings: Arc<dyn ObservableSettings>, key: &str) -> Self {
        Self {
            settings,
            key: key.to_string(),
            kind: T::KIND,
            map: Arc::new(|value| value.and_then(T::from_value)),
        }
    }

    /// Values of a typed key, with `None` exactly while it is absent.
    pub fn for_key(settings: Arc<dyn ObservableSettings>, key: Key<T>) -> Self {
        Self::or_null(settings, key.name())
    }
}

impl<T: Send + 'static> SettingFlow<T> {
    /// Start a new, independent subscription. Nothing is registered until it is first polled.
    pub fn stream(&self) -> SettingStream<T> {
        SettingStream {
            state: StreamState::Idle(self.clone()),
        }
    }

    /// The key this flow observes.
    pub fn key(&self) -> &str {
        &self.key
    }

    fn start(&self) -> StreamState<T> {
        let (sender, receiver) = mpsc::unbounded();
        let map = Arc::clone(&self.map);
        let callback: ValueCallback = Box::new(move |value| {
            // Only fails once the stream is gone, and dropping the stream deactivates us.
            let _ = sender.unbounded_send(map(value));
        });

        match self.settings.add_value_listener(
            &self.key,
            self.kind,
            Delivery::CurrentThenChanges,
            callback,
        ) {
            Ok(listener) => StreamState::Running { receiver, listener },
            Err(e) => {
                log::error!("Failed to observe '{}', ending its stream: {}", self.key, e);
                StreamState::Done
            }
        }
    }
}

impl<T> Clone for SettingFlow<T> {
    fn clone(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            key: self.key.clone(),
            kind: self.kind,
            map: Arc::clone(&self.map),
        }
    }
}

impl<T> std::fmt::Debug for SettingFlow<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingFlow")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .finish()
    }
}

/// One running subscription to a [`SettingFlow`].
pub struct SettingStream<T> {
    state: StreamState<T>,
}

enum StreamState<T> {
    Idle(SettingFlow<T>),
    Running {
        receiver: UnboundedReceiver<T>,
        listener: SettingsListener,
    },
    Done,
}

impl<T: Send + 'static> Stream for SettingStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        if let StreamState::Idle(flow) = &self.state {
            let started = flow.start();
            self.state = started;
        }

        match &mut self.state {
            StreamState::Running { receiver, .. } => receiver.poll_next_unpin(cx),
            _ => Poll::Ready(None),
        }
    }
}

impl<T> Drop for SettingStream<T> {
    fn drop(&mut self) {
        if let StreamState::Running { listener, .. } = &self.state {
            listener.deactivate();
        }
    }
}

impl<T> std::fmt::Debug for SettingStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            StreamState::Idle(_) => "idle",
            StreamState::Running { .. } => "running",
            StreamState::Done => "done",
        };
        f.debug_struct("SettingStream").field("state", &state).finish()
    }
}

/// Flow constructors on shared observable stores.
pub trait SettingsFlowExt {
    /// This store as a shared trait object.
    fn observable(&self) -> Arc<dyn ObservableSettings>;

    /// See [`SettingFlow::new`].
    fn flow<T: SettingType>(&self, key: &str, default: T) -> SettingFlow<T> {
        SettingFlow::new(self.observable(), key, default)
    }

    /// See [`SettingFlow::or_null`].
    fn or_null_flow<T: SettingType>(&self, key: &str) -> SettingFlow<Option<T>> {
        SettingFlow::or_null(self.observable(), key)
    }

    /// See [`SettingFlow::for_key`].
    fn key_flow<T: SettingType>(&self, key: Key<T>) -> SettingFlow<Option<T>> {
        SettingFlow::for_key(self.observable(), key)
    }
}

impl<O: ObservableSettings + 'static> SettingsFlowExt for Arc<O> {
    fn observable(&self) -> Arc<dyn ObservableSettings> {
        Arc::clone(self) as Arc<dyn ObservableSettings>
    }
}

impl SettingsFlowExt for Arc<dyn ObservableSettings> {
    fn observable(&self) -> Arc<dyn ObservableSettings> {
        Arc::clone(self)
    }
}
