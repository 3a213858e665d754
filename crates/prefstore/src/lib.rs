#![doc = include_str!("../README.md")]

mod error;

/// Tagged representation of the six primitive setting types.
pub mod value;

/// The synchronous store contract, typed keys and store factories.
pub mod settings;

/// Change detection and listener handles shared by every observable store.
pub mod listener;

/// Observable stores and the adapter for stores without notifications.
pub mod observable;

/// Cold, restartable streams of a key's values.
pub mod stream;

/// Asynchronous stores and the blocking facade over them.
pub mod suspend;

/// Concrete backends and configuration-driven construction.
pub mod backends;

pub use backends::{open_store, MemoryStore, MemoryStoreFactory, StoreConfiguration};
#[cfg(feature = "sqlite")]
pub use backends::{SqliteStore, SqliteStoreFactory};
pub use error::SettingsError;
pub use listener::{Delivery, SettingsListener, ValueCallback};
pub use observable::{
    make_observable, require_observable, ChangeSignal, ChangeSink, NativeNotifications,
    ObservableSettings, ObservableSettingsExt, ObservableStore, ObservePolicy, RuntimeObservable,
};
pub use settings::{Key, Setting, Settings, SettingsExt, SettingsFactory};
pub use stream::{SettingFlow, SettingStream, SettingsFlowExt};
pub use suspend::{BlockingSettings, SuspendAdapter, SuspendSettings, SuspendSettingsExt};
pub use value::{SettingType, SettingValue, ValueKind};
