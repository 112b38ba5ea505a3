//! cgraph Storage - Object and counter stores for cached graphs
//!
//! Defines the storage seams of the graph cache and the two components that
//! sit on them: the cache writer (write path) and the serve-or-refresh
//! decider (read path). Cloud clients are out of scope; the filesystem and
//! LMDB stores stand in for a bucket and a key-value datastore.

pub mod decider;
pub mod fs;
pub mod lmdb;
pub mod memory;
pub mod traits;
pub mod writer;

pub use decider::{CacheState, ServeOrRefresh};
pub use fs::FsObjectStore;
pub use lmdb::{LmdbCounterError, LmdbCounterStore};
pub use memory::{InMemoryCounterStore, InMemoryObjectStore};
pub use traits::{CounterStore, ObjectInfo, ObjectMetadata, ObjectReader, ObjectStore};
pub use writer::CacheWriter;
