use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, OnceLock, Weak,
    },
    time::Duration,
};

use rusqlite::{hooks::Action, types::Value, Connection, OptionalExtension};

use crate::{
    error::SettingsError,
    observable::{ChangeSignal, ChangeSink, NativeNotifications, ObservableSettings, ObservableStore},
    settings::{Settings, SettingsFactory},
    value::{SettingType, SettingValue, ValueKind},
};

const TABLE: &str = "settings";
const DEFAULT_COLLECTION: &str = "";

/// Subscriber lists shared by instances opened on the same file and collection.
static SHARED_SUBSCRIBERS: OnceLock<parking_lot::Mutex<HashMap<(PathBuf, String), Weak<Subscribers>>>> =
    OnceLock::new();

#[derive(Default)]
struct Subscribers {
    sinks: parking_lot::Mutex<Vec<(u64, ChangeSink)>>,
    next_id: AtomicU64,
}

impl Subscribers {
    /// The list for `collection` in the database at `path`, created on first use.
    fn shared(path: PathBuf, collection: &str) -> Arc<Self> {
        let table = SHARED_SUBSCRIBERS.get_or_init(|| parking_lot::Mutex::new(HashMap::new()));
        let mut table = table.lock();
        table.retain(|_, subscribers| subscribers.strong_count() > 0);

        let entry = table.entry((path, collection.to_string())).or_default();
        if let Some(subscribers) = entry.upgrade() {
            return subscribers;
        }
        let subscribers = Arc::new(Subscribers::default());
        *entry = Arc::downgrade(&subscribers);
        subscribers
    }

    fn add(&self, sink: ChangeSink) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sinks.lock().push((id, sink));
        id
    }

    fn notify(&self, signal: ChangeSignal) {
        let sinks: Vec<ChangeSink> = self
            .sinks
            .lock()
            .iter()
            .map(|(_, sink)| Arc::clone(sink))
            .collect();

        for sink in sinks {
            sink(&signal);
        }
    }
}

/// A store persisted in a SQLite database file.
///
/// Every named collection lives in the same `settings` table, so stores opened on the same file
/// with the same name alias each other. Floats are stored by their bit pattern and round-trip
/// exactly.
///
/// Change notifications come from SQLite's update hook, which reports a row id but not the
/// key, so every signal is [`ChangeSignal::AnyKey`]. Instances created with [`open`](Self::open)
/// on the same file and collection share their subscribers, so a write through one signals the
/// others. Writes from other processes to the same file are persisted but not signalled.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<SqliteInner>,
}

struct SqliteInner {
    connection: Mutex<Connection>,
    collection: String,
    changed: Arc<AtomicBool>,
    subscribers: Arc<Subscribers>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `file_path` and select the collection `name`.
    pub fn open(file_path: impl AsRef<Path>, name: Option<&str>) -> Result<Self, SettingsError> {
        let file_path = file_path.as_ref();
        let connection = Connection::open(file_path)?;
        let changed = prepare(&connection)?;
        let collection = name.unwrap_or(DEFAULT_COLLECTION);

        // The file exists once the table is created. Paths that do not resolve, such as
        // `:memory:`, get a private subscriber list.
        let subscribers = match std::fs::canonicalize(file_path) {
            Ok(path) => Subscribers::shared(path, collection),
            Err(e) => {
                log::debug!(
                    "Not sharing notifications for {}: {}",
                    file_path.display(),
                    e
                );
                Arc::new(Subscribers::default())
            }
        };
        Ok(Self::assemble(connection, collection, changed, subscribers))
    }

    /// Use an already opened connection.
    ///
    /// The store gets its own subscriber list, so only writes made through it are signalled.
    pub fn from_connection(connection: Connection, name: Option<&str>) -> Result<Self, SettingsError> {
        let changed = prepare(&connection)?;
        Ok(Self::assemble(
            connection,
            name.unwrap_or(DEFAULT_COLLECTION),
            changed,
            Arc::new(Subscribers::default()),
        ))
    }

    fn assemble(
        connection: Connection,
        collection: &str,
        changed: Arc<AtomicBool>,
        subscribers: Arc<Subscribers>,
    ) -> Self {
        SqliteStore {
            inner: Arc::new(SqliteInner {
                connection: Mutex::new(connection),
                collection: collection.to_string(),
                changed,
                subscribers,
            }),
        }
    }

    /// The collection this store reads and writes.
    pub fn collection(&self) -> &str {
        &self.inner.collection
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, SettingsError> {
        self.inner
            .connection
            .lock()
            .map_err(|_| SettingsError::Internal("sqlite connection lock poisoned".to_string()))
    }

    fn read_value(&self, key: &str) -> Result<Option<SettingValue>, SettingsError> {
        let conn = self.connection()?;
        let row = conn
            .query_row(
                "SELECT kind, value FROM settings WHERE collection = ?1 AND key = ?2",
                rusqlite::params![self.inner.collection, key],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Value>(1)?)),
            )
            .optional()?;

        Ok(row.and_then(|(kind, value)| decode(kind, value)))
    }

    fn read<T: SettingType>(&self, key: &str) -> Result<Option<T>, SettingsError> {
        Ok(self.read_value(key)?.and_then(T::from_value))
    }

    fn write(&self, key: &str, value: SettingValue) -> Result<(), SettingsError> {
        let (kind, value) = encode(value);
        self.execute(
            "INSERT OR REPLACE INTO settings (collection, key, kind, value) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![self.inner.collection, key, kind, value],
        )
    }

    /// Run a write, then signal subscribers if the update hook saw a change.
    ///
    /// The signal is sent after the connection lock is released so listeners can read.
    fn execute(&self, sql: &str, params: impl rusqlite::Params) -> Result<(), SettingsError> {
        {
            let mut conn = self.connection()?;
            let transaction = conn.transaction()?;
            transaction.execute(sql, params)?;
            transaction.commit()?;
        }

        if self.inner.changed.swap(false, Ordering::SeqCst) {
            self.inner.subscribers.notify(ChangeSignal::AnyKey);
        }
        Ok(())
    }
}

/// Set up `connection` and return the flag its update hook raises on every settings write.
fn prepare(connection: &Connection) -> Result<Arc<AtomicBool>, SettingsError> {
    // WAL lets several stores on the same file read while one writes.
    connection.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    connection.busy_timeout(Duration::from_secs(5))?;
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS settings (
            collection TEXT NOT NULL,
            key TEXT NOT NULL,
            kind INTEGER NOT NULL,
            value NOT NULL,
            PRIMARY KEY (collection, key)
        );",
    )?;

    let changed = Arc::new(AtomicBool::new(false));
    let hook_flag = Arc::clone(&changed);
    connection.update_hook(Some(
        move |_action: Action, _database: &str, table: &str, _row_id: i64| {
            if table == TABLE {
                hook_flag.store(true, Ordering::SeqCst);
            }
        },
    ));
    Ok(changed)
}

fn encode(value: SettingValue) -> (i64, Value) {
    let kind = value.kind().code();
    let value = match value {
        SettingValue::Int(v) => Value::Integer(i64::from(v)),
        SettingValue::Long(v) => Value::Integer(v),
        SettingValue::String(v) => Value::Text(v),
        SettingValue::Float(v) => Value::Integer(i64::from(v.to_bits())),
        SettingValue::Double(v) => Value::Integer(v.to_bits() as i64),
        SettingValue::Boolean(v) => Value::Integer(i64::from(v)),
    };
    (kind, value)
}

fn decode(kind: i64, value: Value) -> Option<SettingValue> {
    match (ValueKind::from_code(kind)?, value) {
        (ValueKind::Int, Value::Integer(v)) => i32::try_from(v).ok().map(SettingValue::Int),
        (ValueKind::Long, Value::Integer(v)) => Some(SettingValue::Long(v)),
        (ValueKind::String, Value::Text(v)) => Some(SettingValue::String(v)),
        (ValueKind::Float, Value::Integer(v)) => u32::try_from(v)
            .ok()
            .map(|bits| SettingValue::Float(f32::from_bits(bits))),
        (ValueKind::Double, Value::Integer(v)) => {
            Some(SettingValue::Double(f64::from_bits(v as u64)))
        }
        (ValueKind::Boolean, Value::Integer(v)) => Some(SettingValue::Boolean(v != 0)),
        (kind, _) => {
            log::warn!("Ignoring malformed {:?} row in the settings table", kind);
            None
        }
    }
}

impl Settings for SqliteStore {
    fn keys(&self) -> Result<Vec<String>, SettingsError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT key FROM settings WHERE collection = ?1")?;
        let rows = stmt.query_map(rusqlite::params![self.inner.collection], |row| row.get(0))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }
    fn size(&self) -> Result<usize, SettingsError> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM settings WHERE collection = ?1",
            rusqlite::params![self.inner.collection],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
    fn clear(&self) -> Result<(), SettingsError> {
        self.execute(
            "DELETE FROM settings WHERE collection = ?1",
            rusqlite::params![self.inner.collection],
        )
    }
    fn remove(&self, key: &str) -> Result<(), SettingsError> {
        self.execute(
            "DELETE FROM settings WHERE collection = ?1 AND key = ?2",
            rusqlite::params![self.inner.collection, key],
        )
    }
    fn has_key(&self, key: &str) -> Result<bool, SettingsError> {
        let conn = self.connection()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM settings WHERE collection = ?1 AND key = ?2",
                rusqlite::params![self.inner.collection, key],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn put_int(&self, key: &str, value: i32) -> Result<(), SettingsError> {
        self.write(key, SettingValue::Int(value))
    }
    fn get_int_or_null(&self, key: &str) -> Result<Option<i32>, SettingsError> {
        self.read(key)
    }
    fn put_long(&self, key: &str, value: i64) -> Result<(), SettingsError> {
        self.write(key, SettingValue::Long(value))
    }
    fn get_long_or_null(&self, key: &str) -> Result<Option<i64>, SettingsError> {
        self.read(key)
    }
    fn put_string(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.write(key, SettingValue::String(value.to_string()))
    }
    fn get_string_or_null(&self, key: &str) -> Result<Option<String>, SettingsError> {
        self.read(key)
    }
    fn put_float(&self, key: &str, value: f32) -> Result<(), SettingsError> {
        self.write(key, SettingValue::Float(value))
    }
    fn get_float_or_null(&self, key: &str) -> Result<Option<f32>, SettingsError> {
        self.read(key)
    }
    fn put_double(&self, key: &str, value: f64) -> Result<(), SettingsError> {
        self.write(key, SettingValue::Double(value))
    }
    fn get_double_or_null(&self, key: &str) -> Result<Option<f64>, SettingsError> {
        self.read(key)
    }
    fn put_bool(&self, key: &str, value: bool) -> Result<(), SettingsError> {
        self.write(key, SettingValue::Boolean(value))
    }
    fn get_bool_or_null(&self, key: &str) -> Result<Option<bool>, SettingsError> {
        self.read(key)
    }

    fn into_observable(self: Arc<Self>) -> Option<Arc<dyn ObservableSettings>> {
        Some(Arc::new(ObservableStore::new(self.as_ref().clone())))
    }
}

/// Detaches a sink from its store when dropped.
pub struct SqliteSubscription {
    subscribers: Weak<Subscribers>,
    id: u64,
}

impl Drop for SqliteSubscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.sinks.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl NativeNotifications for SqliteStore {
    type Subscription = SqliteSubscription;

    fn subscribe(&self, sink: ChangeSink) -> Result<Self::Subscription, SettingsError> {
        let id = self.inner.subscribers.add(sink);
        Ok(SqliteSubscription {
            subscribers: Arc::downgrade(&self.inner.subscribers),
            id,
        })
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("collection", &self.inner.collection)
            .finish()
    }
}

/// Creates [`SqliteStore`]s over one database file.
#[derive(Debug, Clone)]
pub struct SqliteStoreFactory {
    file_path: PathBuf,
}

impl SqliteStoreFactory {
    /// Create stores in the database at `file_path`.
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }
}

impl SettingsFactory for SqliteStoreFactory {
    type Settings = SqliteStore;

    fn create(&self, name: Option<&str>) -> Result<SqliteStore, SettingsError> {
        SqliteStore::open(&self.file_path, name)
    }
}
