//! State management for the Stackform provisioning engine.
//!
//! The state snapshot is the durable record of the last-applied resource
//! graph and is the baseline the diff engine compares against. It is
//! persisted incrementally during apply so a crash partway through a run
//! leaves it consistent with the operations that actually completed.

mod local;
mod lock;
mod recorder;
mod store;
mod types;

pub use local::LocalStateStore;
pub use lock::{generate_holder_id, LockInfo, LOCK_EXPIRY_SECS};
pub use recorder::{StateChange, StateRecorder};
pub use store::StateStore;
pub use types::{OutputMap, ResourceRecord, RunHistoryEntry, RunOperation, StateSnapshot, STATE_VERSION};
