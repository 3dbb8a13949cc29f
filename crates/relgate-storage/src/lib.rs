pub mod keys;
pub mod memory;
pub mod redis_store;
pub mod traits;

pub use keys::KeySpace;
pub use memory::{InMemoryStore, SeedFile};
pub use redis_store::RedisStore;
pub use traits::{InvalidationMarker, RevocationStore, SnapshotSource, StorageError, StoreContents};
