use std::{path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};

use super::MemoryStore;
use crate::{
    error::SettingsError,
    observable::{ObservableSettings, ObservableStore},
};

/// Which backend a store is opened on.
///
/// Deserializes from JSON tagged by `"backend"`:
///
/// ```json
/// { "backend": "sqlite", "file_path": "/var/lib/app/settings.sqlite" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfiguration {
    /// Process-wide in-memory collections.
    Memory,

    /// A SQLite database file, used on native platforms.
    Sqlite {
        /// The database file. Stores for different users should use different files.
        file_path: PathBuf,
    },
}

impl StoreConfiguration {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Open the collection `name` on the configured backend, observed through its native
/// notifications.
pub fn open_store(
    configuration: StoreConfiguration,
    name: Option<&str>,
) -> Result<Arc<dyn ObservableSettings>, SettingsError> {
    log::debug!("Opening store {:?} with {:?}", name, configuration);

    match configuration {
        StoreConfiguration::Memory => {
            let store = match name {
                Some(name) => MemoryStore::named(name),
                None => MemoryStore::default_collection(),
            };
            Ok(Arc::new(ObservableStore::new(store)))
        }
        #[cfg(feature = "sqlite")]
        StoreConfiguration::Sqlite { file_path } => Ok(Arc::new(ObservableStore::new(
            super::SqliteStore::open(file_path, name)?,
        ))),
        #[cfg(not(feature = "sqlite"))]
        configuration @ StoreConfiguration::Sqlite { .. } => {
            Err(SettingsError::UnsupportedConfiguration(configuration))
        }
    }
}
