mod configuration;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use configuration::{open_store, StoreConfiguration};
pub use memory::{MemoryStore, MemoryStoreFactory, MemorySubscription};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteStore, SqliteStoreFactory, SqliteSubscription};
