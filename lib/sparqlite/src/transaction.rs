//! The single-writer transaction discipline of a connection.

use crate::error::SparqlError;
use crate::notifier::NotifierRegistry;
use parking_lot::{Mutex, MutexGuard};
use sparqlite_storage::{MemoryStorage, MemoryStorageReader, MemoryStorageWriter, StorageChanges};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::debug;

/// Serializes the write transactions of a connection.
///
/// A transaction holds the write slot from [`TransactionManager::begin`] until it is committed or
/// rolled back. Commit notifications are dispatched before the slot is released, so subscribers
/// see commits in order. Reads never take the slot, they work on storage snapshots.
pub(crate) struct TransactionManager {
    storage: MemoryStorage,
    write_slot: Mutex<()>,
    timeout: Option<Duration>,
    state: Mutex<TransactionState>,
}

#[derive(Debug, Default)]
struct TransactionState {
    /// The thread running the current write transaction.
    owner: Option<ThreadId>,
    /// The thread running change notification callbacks.
    dispatching: Option<ThreadId>,
}

impl TransactionManager {
    pub fn new(storage: MemoryStorage, timeout: Option<Duration>) -> Self {
        Self {
            storage,
            write_slot: Mutex::new(()),
            timeout,
            state: Mutex::new(TransactionState::default()),
        }
    }

    /// A read-only view of the latest commit.
    pub fn snapshot(&self) -> MemoryStorageReader {
        self.storage.snapshot()
    }

    /// Begins a write transaction, waiting for the write slot.
    ///
    /// Fails without waiting if the current thread already holds the slot, either in a
    /// transaction or while dispatching change notifications.
    pub fn begin(&self) -> Result<WriteTransaction<'_>, SparqlError> {
        let current = thread::current().id();
        {
            let state = self.state.lock();
            if state.dispatching == Some(current) {
                return Err(SparqlError::Reentrancy);
            }
            if state.owner == Some(current) {
                return Err(SparqlError::TransactionInProgress);
            }
        }
        let slot = match self.timeout {
            Some(timeout) => self
                .write_slot
                .try_lock_for(timeout)
                .ok_or(SparqlError::TransactionTimeout(timeout))?,
            None => self.write_slot.lock(),
        };
        self.state.lock().owner = Some(current);
        let writer = self.storage.begin();
        debug!(tx_id = writer.transaction_id(), "Began write transaction");
        Ok(WriteTransaction {
            writer,
            _owner: OwnerGuard { manager: self },
            _slot: slot,
        })
    }

    /// Waits for the running write transaction to end.
    ///
    /// Returns immediately when called from the thread that runs it.
    pub fn wait_idle(&self) {
        if self.state.lock().owner == Some(thread::current().id()) {
            return;
        }
        drop(self.write_slot.lock());
    }
}

/// A running write transaction. Dropping it rolls it back.
pub(crate) struct WriteTransaction<'a> {
    // Fields drop in order: the writer rolls back before the slot is released.
    writer: MemoryStorageWriter,
    _owner: OwnerGuard<'a>,
    _slot: MutexGuard<'a, ()>,
}

impl WriteTransaction<'_> {
    pub fn writer(&mut self) -> &mut MemoryStorageWriter {
        &mut self.writer
    }

    /// Commits and notifies the subscribers of `notifiers` of the net changes.
    pub fn commit(self, notifiers: &NotifierRegistry) -> Result<StorageChanges, SparqlError> {
        let Self {
            writer,
            _owner: owner,
            _slot: slot,
        } = self;
        let tx_id = writer.transaction_id();
        let changes = writer.commit()?;
        debug!(
            tx_id,
            inserted = changes.inserted.len(),
            removed = changes.removed.len(),
            "Committed write transaction"
        );
        if !changes.is_empty() {
            let _dispatching = DispatchGuard::new(owner.manager);
            notifiers.dispatch(&changes);
        }
        drop(owner);
        drop(slot);
        Ok(changes)
    }

    pub fn rollback(self) {
        let tx_id = self.writer.transaction_id();
        self.writer.rollback();
        debug!(tx_id, "Rolled back write transaction");
    }
}

struct OwnerGuard<'a> {
    manager: &'a TransactionManager,
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        self.manager.state.lock().owner = None;
    }
}

struct DispatchGuard<'a> {
    manager: &'a TransactionManager,
}

impl<'a> DispatchGuard<'a> {
    fn new(manager: &'a TransactionManager) -> Self {
        manager.state.lock().dispatching = Some(thread::current().id());
        Self { manager }
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.manager.state.lock().dispatching = None;
    }
}
