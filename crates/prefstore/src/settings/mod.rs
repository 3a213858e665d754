//! The primitive store contract every backend implements.
//!
//! A [`Settings`] store maps string keys to values of six primitive types. Reading a key with a
//! type other than the one it was written with is unspecified; backends in this crate report it
//! as absent, but callers must not rely on that.
//!
//! # Usage
//!
//! ```rust
//! use prefstore::{MemoryStore, Settings, SettingsExt};
//!
//! # fn main() -> Result<(), prefstore::SettingsError> {
//! let settings = MemoryStore::isolated();
//!
//! settings.put_int("launches", 3)?;
//! assert_eq!(settings.get_int("launches", 0)?, 3);
//!
//! // Generic access dispatches on the Rust type.
//! settings.put("theme", "dark".to_string())?;
//! assert_eq!(settings.get_or_null::<String>("theme")?.as_deref(), Some("dark"));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::{
    error::SettingsError,
    observable::ObservableSettings,
    value::SettingType,
};

mod key;
mod setting;

pub use key::Key;
pub use setting::Setting;

/// A synchronous key-value store for primitive values.
///
/// Every operation is fallible so that failures from the native mechanism (disk full, permission
/// denied, a locked database) reach the caller unmodified. After any successful write, remove or
/// clear, a read through the same instance observes the new state.
pub trait Settings: Send + Sync {
    /// All keys currently present in the store, in no particular order.
    fn keys(&self) -> Result<Vec<String>, SettingsError>;

    /// The number of keys currently present in the store.
    fn size(&self) -> Result<usize, SettingsError> {
        Ok(self.keys()?.len())
    }

    /// Remove every key from the store.
    fn clear(&self) -> Result<(), SettingsError>;

    /// Remove `key` from the store. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), SettingsError>;

    /// Whether `key` is present, regardless of its type.
    fn has_key(&self, key: &str) -> Result<bool, SettingsError>;

    #[allow(missing_docs)]
    fn put_int(&self, key: &str, value: i32) -> Result<(), SettingsError>;
    #[allow(missing_docs)]
    fn get_int_or_null(&self, key: &str) -> Result<Option<i32>, SettingsError>;
    #[allow(missing_docs)]
    fn get_int(&self, key: &str, default: i32) -> Result<i32, SettingsError> {
        Ok(self.get_int_or_null(key)?.unwrap_or(default))
    }

    #[allow(missing_docs)]
    fn put_long(&self, key: &str, value: i64) -> Result<(), SettingsError>;
    #[allow(missing_docs)]
    fn get_long_or_null(&self, key: &str) -> Result<Option<i64>, SettingsError>;
    #[allow(missing_docs)]
    fn get_long(&self, key: &str, default: i64) -> Result<i64, SettingsError> {
        Ok(self.get_long_or_null(key)?.unwrap_or(default))
    }

    #[allow(missing_docs)]
    fn put_string(&self, key: &str, value: &str) -> Result<(), SettingsError>;
    #[allow(missing_docs)]
    fn get_string_or_null(&self, key: &str) -> Result<Option<String>, SettingsError>;
    #[allow(missing_docs)]
    fn get_string(&self, key: &str, default: &str) -> Result<String, SettingsError> {
        Ok(self
            .get_string_or_null(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    #[allow(missing_docs)]
    fn put_float(&self, key: &str, value: f32) -> Result<(), SettingsError>;
    #[allow(missing_docs)]
    fn get_float_or_null(&self, key: &str) -> Result<Option<f32>, SettingsError>;
    #[allow(missing_docs)]
    fn get_float(&self, key: &str, default: f32) -> Result<f32, SettingsError> {
        Ok(self.get_float_or_null(key)?.unwrap_or(default))
    }

    #[allow(missing_docs)]
    fn put_double(&self, key: &str, value: f64) -> Result<(), SettingsError>;
    #[allow(missing_docs)]
    fn get_double_or_null(&self, key: &str) -> Result<Option<f64>, SettingsError>;
    #[allow(missing_docs)]
    fn get_double(&self, key: &str, default: f64) -> Result<f64, SettingsError> {
        Ok(self.get_double_or_null(key)?.unwrap_or(default))
    }

    #[allow(missing_docs)]
    fn put_bool(&self, key: &str, value: bool) -> Result<(), SettingsError>;
    #[allow(missing_docs)]
    fn get_bool_or_null(&self, key: &str) -> Result<Option<bool>, SettingsError>;
    #[allow(missing_docs)]
    fn get_bool(&self, key: &str, default: bool) -> Result<bool, SettingsError> {
        Ok(self.get_bool_or_null(key)?.unwrap_or(default))
    }

    /// Returns an observable view of this store if it can be observed without an adapter.
    ///
    /// Stores backed by a mechanism with native change notifications return a view that uses
    /// them, and stores that are already observable return themselves. The default returns
    /// `None`. See [`make_observable`](crate::make_observable) and
    /// [`require_observable`](crate::require_observable).
    fn into_observable(self: Arc<Self>) -> Option<Arc<dyn ObservableSettings>> {
        None
    }
}

/// Generic, type-driven helpers available on every [`Settings`] store.
pub trait SettingsExt: Settings {
    /// Store `value` under `key` using the setter for `T`.
    fn put<T: SettingType>(&self, key: &str, value: T) -> Result<(), SettingsError> {
        T::write(self, key, value)
    }

    /// Read `key` as `T`, or `None` if it is absent.
    fn get_or_null<T: SettingType>(&self, key: &str) -> Result<Option<T>, SettingsError> {
        T::read(self, key)
    }

    /// Read `key` as `T`, or `default` if it is absent.
    fn get_or<T: SettingType>(&self, key: &str, default: T) -> Result<T, SettingsError> {
        Ok(T::read(self, key)?.unwrap_or(default))
    }

    /// Read a typed key.
    fn get_key<T: SettingType>(&self, key: Key<T>) -> Result<Option<T>, SettingsError> {
        T::read(self, key.name())
    }

    /// Write a typed key.
    fn set_key<T: SettingType>(&self, key: Key<T>, value: T) -> Result<(), SettingsError> {
        T::write(self, key.name(), value)
    }
}

impl<S: Settings + ?Sized> SettingsExt for S {}

/// Creates stores by name.
///
/// Stores created with the same name share one persisted collection, even when they are
/// separate instances. Distinct names never see each other's entries. `None` selects the
/// backend's default collection.
pub trait SettingsFactory {
    /// The store type produced by this factory.
    type Settings: Settings;

    /// Create a store over the collection identified by `name`.
    fn create(&self, name: Option<&str>) -> Result<Self::Settings, SettingsError>;
}
