//! Type-safe keys for settings storage.

use std::marker::PhantomData;

use crate::value::SettingType;

/// Declare a [`Key`] constant binding a stored name to one of the six primitive types.
///
/// The type must implement [`SettingType`](crate::SettingType), so keys for unsupported types
/// are rejected at compile time.
///
/// # Example
/// ```rust
/// use prefstore::register_setting_key;
///
/// register_setting_key!(pub const LAUNCH_COUNT: i32 = "launch_count");
/// register_setting_key!(const THEME: String = "theme");
///
/// assert_eq!(LAUNCH_COUNT.name(), "launch_count");
/// ```
#[macro_export]
macro_rules! register_setting_key {
    ($vis:vis const $name:ident: $ty:ty = $key:literal) => {
        $vis const $name: $crate::Key<$ty> = $crate::Key::new($key);
    };
}

/// A stored key name tagged with the type of its value.
///
/// Associates a string key name with a value type at compile time, so reads and writes through
/// the key cannot disagree on the type stored under it.
///
/// Use the [`register_setting_key!`](crate::register_setting_key) macro to create keys.
#[derive(Debug)]
pub struct Key<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T: SettingType> Key<T> {
    /// Create a new type-safe key with the given storage name.
    #[doc(hidden)]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }
}

impl<T> Key<T> {
    /// Get the string key name used for storage.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}
