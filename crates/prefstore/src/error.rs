use thiserror::Error;

use crate::backends::StoreConfiguration;

/// An error resulting from operations on a settings store.
///
/// Failures raised by a native persistence mechanism are carried unmodified; this crate adds no
/// retry logic of its own.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// An internal unspecified error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// An error raised by the SQLite backend.
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Backend(#[from] rusqlite::Error),

    /// The store has neither native nor synthetic change notifications, so listeners cannot be
    /// registered on it.
    #[error("The store does not support change notifications")]
    ObservationUnsupported,

    /// The configuration names a backend this build cannot open.
    #[error("Unsupported store configuration: {0:?}")]
    UnsupportedConfiguration(StoreConfiguration),

    /// The store configuration could not be parsed.
    #[error("Invalid store configuration: {0}")]
    Configuration(#[from] serde_json::Error),
}
