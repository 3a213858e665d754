//! Asynchronous stores, and a blocking facade that turns one back into a [`Settings`] store.
//!
//! Some platforms only expose their preferences through asynchronous operations. Such a
//! mechanism implements [`SuspendSettings`]; wrapping it in [`BlockingSettings`] yields a
//! synchronous store that waits for each operation to complete before returning, so a write
//! followed by a read on the same facade always observes the write.
//!
//! [`SuspendAdapter`] goes the other way and lets async code use any synchronous store.

use crate::{
    error::SettingsError,
    settings::Settings,
    value::{SettingType, SettingValue, ValueKind},
};

/// A key-value store whose operations complete asynchronously.
#[async_trait::async_trait]
pub trait SuspendSettings: Send + Sync {
    /// All keys currently present in the store.
    async fn keys(&self) -> Result<Vec<String>, SettingsError>;

    /// The number of keys currently present in the store.
    async fn size(&self) -> Result<usize, SettingsError> {
        Ok(self.keys().await?.len())
    }

    /// Remove every key from the store.
    async fn clear(&self) -> Result<(), SettingsError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), SettingsError>;

    /// Whether `key` is present, regardless of its type.
    async fn has_key(&self, key: &str) -> Result<bool, SettingsError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn put_value(&self, key: &str, value: SettingValue) -> Result<(), SettingsError>;

    /// Read `key` as a value of `kind`, or `None` if it is absent.
    async fn get_value(
        &self,
        key: &str,
        kind: ValueKind,
    ) -> Result<Option<SettingValue>, SettingsError>;
}

/// Typed helpers available on every [`SuspendSettings`] store.
#[async_trait::async_trait]
pub trait SuspendSettingsExt: SuspendSettings {
    /// Store `value` under `key`.
    async fn put<T: SettingType>(&self, key: &str, value: T) -> Result<(), SettingsError> {
        self.put_value(key, value.into_value()).await
    }

    /// Read `key` as `T`, or `None` if it is absent.
    async fn get_or_null<T: SettingType>(&self, key: &str) -> Result<Option<T>, SettingsError> {
        Ok(self
            .get_value(key, T::KIND)
            .await?
            .and_then(T::from_value))
    }

    /// Read `key` as `T`, or `default` if it is absent.
    async fn get_or<T: SettingType>(&self, key: &str, default: T) -> Result<T, SettingsError> {
        Ok(self.get_or_null(key).await?.unwrap_or(default))
    }
}

impl<S: SuspendSettings + ?Sized> SuspendSettingsExt for S {}

/// Exposes a synchronous store through the [`SuspendSettings`] contract.
///
/// Every operation completes immediately on the calling task.
#[derive(Debug, Clone)]
pub struct SuspendAdapter<S> {
    settings: S,
}

impl<S: Settings> SuspendAdapter<S> {
    #[allow(missing_docs)]
    pub fn new(settings: S) -> Self {
        Self { settings }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.settings
    }
}

#[async_trait::async_trait]
impl<S: Settings> SuspendSettings for SuspendAdapter<S> {
    async fn keys(&self) -> Result<Vec<String>, SettingsError> {
        self.settings.keys()
    }
    async fn size(&self) -> Result<usize, SettingsError> {
        self.settings.size()
    }
    async fn clear(&self) -> Result<(), SettingsError> {
        self.settings.clear()
    }
    async fn remove(&self, key: &str) -> Result<(), SettingsError> {
        self.settings.remove(key)
    }
    async fn has_key(&self, key: &str) -> Result<bool, SettingsError> {
        self.settings.has_key(key)
    }
    async fn put_value(&self, key: &str, value: SettingValue) -> Result<(), SettingsError> {
        value.write_to(&self.settings, key)
    }
    async fn get_value(
        &self,
        key: &str,
        kind: ValueKind,
    ) -> Result<Option<SettingValue>, SettingsError> {
        kind.read(&self.settings, key)
    }
}

/// A synchronous [`Settings`] facade over an asynchronous store.
///
/// Each call blocks the current thread until the underlying operation has completed and returns
/// its error unmodified. The facade has no change notifications of its own; wrap it with
/// [`make_observable`](crate::make_observable) to observe writes made through the wrapper.
///
/// Calls must not be made from a thread that is itself needed to drive the wrapped store's
/// futures, such as the only worker of a single-threaded async runtime.
#[derive(Debug)]
pub struct BlockingSettings<A> {
    inner: A,
}

impl<A: SuspendSettings> BlockingSettings<A> {
    #[allow(missing_docs)]
    pub fn new(inner: A) -> Self {
        Self { inner }
    }

    /// The wrapped asynchronous store.
    pub fn inner(&self) -> &A {
        &self.inner
    }

    fn get<T: SettingType>(&self, key: &str) -> Result<Option<T>, SettingsError> {
        futures::executor::block_on(self.inner.get_or_null(key))
    }

    fn put<T: SettingType>(&self, key: &str, value: T) -> Result<(), SettingsError> {
        futures::executor::block_on(self.inner.put_value(key, value.into_value()))
    }
}

impl<A: SuspendSettings> Settings for BlockingSettings<A> {
    fn keys(&self) -> Result<Vec<String>, SettingsError> {
        futures::executor::block_on(self.inner.keys())
    }
    fn size(&self) -> Result<usize, SettingsError> {
        futures::executor::block_on(self.inner.size())
    }
    fn clear(&self) -> Result<(), SettingsError> {
        futures::executor::block_on(self.inner.clear())
    }
    fn remove(&self, key: &str) -> Result<(), SettingsError> {
        futures::executor::block_on(self.inner.remove(key))
    }
    fn has_key(&self, key: &str) -> Result<bool, SettingsError> {
        futures::executor::block_on(self.inner.has_key(key))
    }

    fn put_int(&self, key: &str, value: i32) -> Result<(), SettingsError> {
        self.put(key, value)
    }
    fn get_int_or_null(&self, key: &str) -> Result<Option<i32>, SettingsError> {
        self.get(key)
    }
    fn put_long(&self, key: &str, value: i64) -> Result<(), SettingsError> {
        self.put(key, value)
    }
    fn get_long_or_null(&self, key: &str) -> Result<Option<i64>, SettingsError> {
        self.get(key)
    }
    fn put_string(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.put(key, value.to_string())
    }
    fn get_string_or_null(&self, key: &str) -> Result<Option<String>, SettingsError> {
        self.get(key)
    }
    fn put_float(&self, key: &str, value: f32) -> Result<(), SettingsError> {
        self.put(key, value)
    }
    fn get_float_or_null(&self, key: &str) -> Result<Option<f32>, SettingsError> {
        self.get(key)
    }
    fn put_double(&self, key: &str, value: f64) -> Result<(), SettingsError> {
        self.put(key, value)
    }
    fn get_double_or_null(&self, key: &str) -> Result<Option<f64>, SettingsError> {
        self.get(key)
    }
    fn put_bool(&self, key: &str, value: bool) -> Result<(), SettingsError> {
        self.put(key, value)
    }
    fn get_bool_or_null(&self, key: &str) -> Result<Option<bool>, SettingsError> {
        self.get(key)
    }
}
