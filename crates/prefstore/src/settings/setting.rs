//! Handles for type-safe access to individual settings.

use std::sync::Arc;

use super::{Key, Settings};
use crate::{error::SettingsError, value::SettingType};

/// A handle to a single setting value in storage.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
///
/// use prefstore::{register_setting_key, MemoryStore, Setting};
///
/// register_setting_key!(const THEME: String = "theme");
///
/// # fn main() -> Result<(), prefstore::SettingsError> {
/// let setting = Setting::new(Arc::new(MemoryStore::isolated()), THEME);
///
/// assert_eq!(setting.get()?, None);
/// setting.update("dark".to_string())?;
/// assert_eq!(setting.get()?.as_deref(), Some("dark"));
/// setting.delete()?;
/// assert!(!setting.exists()?);
/// # Ok(())
/// # }
/// ```
pub struct Setting<T> {
    settings: Arc<dyn Settings>,
    key: Key<T>,
}

impl<T: SettingType> Setting<T> {
    /// Create a new setting handle from a store and key.
    pub fn new(settings: Arc<dyn Settings>, key: Key<T>) -> Self {
        Self { settings, key }
    }

    /// The key this handle reads and writes.
    pub fn key(&self) -> Key<T> {
        self.key
    }

    /// Get the current value of this setting, or `None` if it is not stored.
    pub fn get(&self) -> Result<Option<T>, SettingsError> {
        T::read(self.settings.as_ref(), self.key.name())
    }

    /// Get the current value of this setting, or `default` if it is not stored.
    pub fn get_or(&self, default: T) -> Result<T, SettingsError> {
        Ok(self.get()?.unwrap_or(default))
    }

    /// Update (or create) this setting with a new value.
    pub fn update(&self, value: T) -> Result<(), SettingsError> {
        T::write(self.settings.as_ref(), self.key.name(), value)
    }

    /// Delete this setting from storage.
    pub fn delete(&self) -> Result<(), SettingsError> {
        self.settings.remove(self.key.name())
    }

    /// Whether a value is stored under this setting's key.
    pub fn exists(&self) -> Result<bool, SettingsError> {
        self.settings.has_key(self.key.name())
    }
}

impl<T> std::fmt::Debug for Setting<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Setting")
            .field("key", &self.key.name())
            .finish()
    }
}
