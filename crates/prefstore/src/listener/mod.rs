//! Per-key change detection shared by every observable store.
//!
//! Each registration keeps its own cache of the last value its callback saw. A signal, native or
//! synthetic, only means "this key may have changed": the record re-reads the key, compares it
//! bit-exactly against the cache, and fires only on a real difference.

mod handle;
mod record;
mod registry;

pub use handle::SettingsListener;
pub(crate) use record::ListenerRecord;
pub use record::ValueCallback;
pub use registry::Delivery;
pub(crate) use registry::ListenerRegistry;
