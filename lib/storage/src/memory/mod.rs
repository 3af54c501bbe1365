mod store;
mod version_range;

pub use store::{MemoryStorage, MemoryStorageReader, MemoryStorageWriter, QuadIterator, StorageChanges};
