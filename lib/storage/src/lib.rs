//! Storage layer of sparqlite.
//!
//! [`MemoryStorage`] is an in-memory quad store working with MVCC: readers work on immutable
//! snapshots while a single writer prepares the next version. On-disk stores additionally keep a
//! [`Journal`] of committed changes that is replayed when the store is reopened.

mod error;
mod journal;
mod memory;

pub use error::{CorruptionError, StorageError};
pub use journal::{Journal, JournalRecord, JOURNAL_FILE_NAME};
pub use memory::{
    MemoryStorage, MemoryStorageReader, MemoryStorageWriter, QuadIterator, StorageChanges,
};
