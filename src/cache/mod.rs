//! Expiring cache over synchronous string storage.
//!
//! - [`ExpiringCache`]: values with a time-to-live
//! - [`Storage`]: the local-storage style backend seam
//! - [`MemoryStorage`] / [`FileStorage`]: in-process and on-disk backends

mod expiring;
mod file;
mod storage;

pub use expiring::{ExpiringCache, TtlUnit};
pub use file::FileStorage;
pub use storage::{MemoryStorage, Storage};
