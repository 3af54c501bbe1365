use crate::journal::{Journal, JournalRecord};
use crate::memory::version_range::VersionRange;
use crate::{CorruptionError, StorageError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::{FxHashSet, FxHasher};
use sparqlite_model::{
    GraphName, GraphNameRef, NamedNode, NamedOrBlankNode, NamedOrBlankNodeRef, Quad, QuadRef,
    Subject, Term,
};
use std::fmt::{Debug, Formatter};
use std::hash::{BuildHasherDefault, Hash};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info};

type QuadIndex<K> = DashMap<K, (Weak<QuadListNode>, u64), BuildHasherDefault<FxHasher>>;

/// In-memory storage working with MVCC
///
/// Each quad and graph name is annotated by a version range, allowing to read old versions while
/// updates are applied. A single write transaction is allowed at a time; [`MemoryStorage::begin`]
/// blocks until the previous writer has committed or rolled back.
///
/// A storage opened with [`MemoryStorage::open`] additionally appends every commit to a
/// [`Journal`] before making it visible, and replays that journal at open.
#[derive(Clone)]
pub struct MemoryStorage {
    content: Arc<Content>,
    version_counter: Arc<AtomicUsize>,
    write_slot: Arc<WriteSlot>,
    journal: Option<Arc<Mutex<Journal>>>,
}

struct Content {
    quad_set: DashMap<Quad, Arc<QuadListNode>, BuildHasherDefault<FxHasher>>,
    last_quad: RwLock<Option<Weak<QuadListNode>>>,
    last_quad_by_subject: QuadIndex<Subject>,
    last_quad_by_predicate: QuadIndex<NamedNode>,
    last_quad_by_object: QuadIndex<Term>,
    last_quad_by_graph_name: QuadIndex<GraphName>,
    named_graphs: DashMap<NamedOrBlankNode, VersionRange, BuildHasherDefault<FxHasher>>,
}

struct WriteSlot {
    state: Mutex<WriteSlotState>,
    released: Condvar,
}

struct WriteSlotState {
    busy: bool,
    last_transaction_id: usize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Creates an empty, non-persistent storage.
    pub fn new() -> Self {
        Self {
            content: Arc::new(Content {
                quad_set: DashMap::default(),
                last_quad: RwLock::new(None),
                last_quad_by_subject: DashMap::default(),
                last_quad_by_predicate: DashMap::default(),
                last_quad_by_object: DashMap::default(),
                last_quad_by_graph_name: DashMap::default(),
                named_graphs: DashMap::default(),
            }),
            version_counter: Arc::new(AtomicUsize::new(0)),
            write_slot: Arc::new(WriteSlot {
                state: Mutex::new(WriteSlotState {
                    busy: false,
                    // Transaction ids must be bigger than every committed version
                    last_transaction_id: usize::MAX >> 1,
                }),
                released: Condvar::new(),
            }),
            journal: None,
        }
    }

    /// Opens the persistent storage located in `directory`, replaying its journal.
    pub fn open(directory: &Path, sync_on_commit: bool) -> Result<Self, StorageError> {
        std::fs::create_dir_all(directory)?;
        let (mut journal, groups) = Journal::open(directory, sync_on_commit)?;
        let mut storage = Self::new();
        for group in &groups {
            let mut writer = storage.begin();
            for record in group {
                writer.apply(record);
            }
            writer.commit()?;
        }

        let snapshot = storage.snapshot();
        let live_quads = snapshot.len();
        if journal.removals() > live_quads {
            journal.compact(snapshot.version(), &snapshot.records())?;
        }
        info!(
            path = %directory.display(),
            quads = live_quads,
            version = snapshot.version(),
            "Opened persistent storage"
        );
        storage.journal = Some(Arc::new(Mutex::new(journal)));
        Ok(storage)
    }

    pub fn is_persistent(&self) -> bool {
        self.journal.is_some()
    }

    /// Returns a reader on the latest committed version.
    pub fn snapshot(&self) -> MemoryStorageReader {
        MemoryStorageReader {
            storage: self.clone(),
            snapshot_id: self.version_counter.load(Ordering::Acquire),
        }
    }

    /// Starts a write transaction, waiting for the current writer to finish.
    pub fn begin(&self) -> MemoryStorageWriter {
        let mut state = self.write_slot.state.lock();
        while state.busy {
            self.write_slot.released.wait(&mut state);
        }
        self.start_writer(&mut state)
    }

    /// Starts a write transaction, waiting at most `timeout` for the current writer to finish.
    pub fn try_begin_for(&self, timeout: Duration) -> Option<MemoryStorageWriter> {
        let deadline = Instant::now() + timeout;
        let mut state = self.write_slot.state.lock();
        while state.busy {
            if self
                .write_slot
                .released
                .wait_until(&mut state, deadline)
                .timed_out()
                && state.busy
            {
                return None;
            }
        }
        Some(self.start_writer(&mut state))
    }

    fn start_writer(&self, state: &mut WriteSlotState) -> MemoryStorageWriter {
        state.busy = true;
        state.last_transaction_id += 1;
        let transaction_id = state.last_transaction_id;
        let snapshot_id = self.version_counter.load(Ordering::Acquire);
        debug!(transaction_id, snapshot_id, "Started storage transaction");
        MemoryStorageWriter {
            storage: self.clone(),
            log: Vec::new(),
            transaction_id,
            snapshot_id,
            finished: false,
        }
    }

    fn release_write_slot(&self) {
        self.write_slot.state.lock().busy = false;
        self.write_slot.released.notify_one();
    }
}

impl Debug for MemoryStorage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("version", &self.version_counter.load(Ordering::Relaxed))
            .field("persistent", &self.is_persistent())
            .finish()
    }
}

/// A read-only view of a single committed version (or of a pending transaction).
#[derive(Clone, Debug)]
pub struct MemoryStorageReader {
    storage: MemoryStorage,
    snapshot_id: usize,
}

impl MemoryStorageReader {
    pub fn version(&self) -> usize {
        self.snapshot_id
    }

    pub fn len(&self) -> usize {
        self.storage
            .content
            .quad_set
            .iter()
            .filter(|e| self.is_node_in_range(e.value()))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        !self
            .storage
            .content
            .quad_set
            .iter()
            .any(|e| self.is_node_in_range(e.value()))
    }

    pub fn contains(&self, quad: QuadRef<'_>) -> bool {
        self.storage
            .content
            .quad_set
            .get(&quad.into_owned())
            .is_some_and(|node| self.is_node_in_range(node.value()))
    }

    /// Returns the quads matching the given pattern. `None` matches anything.
    ///
    /// The scan starts from the smallest index list among the bound components.
    pub fn quads_for_pattern(
        &self,
        subject: Option<&Subject>,
        predicate: Option<&NamedNode>,
        object: Option<&Term>,
        graph_name: Option<&GraphName>,
    ) -> QuadIterator {
        fn get_start_and_count<K: Eq + Hash>(
            index: &QuadIndex<K>,
            key: Option<&K>,
        ) -> (Option<Weak<QuadListNode>>, u64) {
            let Some(key) = key else {
                return (None, u64::MAX);
            };
            index
                .view(key, |_, (node, count)| (Some(Weak::clone(node)), *count))
                .unwrap_or_default()
        }

        let content = &self.storage.content;
        let (subject_start, subject_count) =
            get_start_and_count(&content.last_quad_by_subject, subject);
        let (predicate_start, predicate_count) =
            get_start_and_count(&content.last_quad_by_predicate, predicate);
        let (object_start, object_count) =
            get_start_and_count(&content.last_quad_by_object, object);
        let (graph_name_start, graph_name_count) =
            get_start_and_count(&content.last_quad_by_graph_name, graph_name);

        let (start, kind) = if subject.is_some()
            && subject_count <= predicate_count
            && subject_count <= object_count
            && subject_count <= graph_name_count
        {
            (subject_start, QuadIteratorKind::Subject)
        } else if predicate.is_some()
            && predicate_count <= object_count
            && predicate_count <= graph_name_count
        {
            (predicate_start, QuadIteratorKind::Predicate)
        } else if object.is_some() && object_count <= graph_name_count {
            (object_start, QuadIteratorKind::Object)
        } else if graph_name.is_some() {
            (graph_name_start, QuadIteratorKind::GraphName)
        } else {
            (content.last_quad.read().clone(), QuadIteratorKind::All)
        };
        QuadIterator {
            reader: self.clone(),
            current: start,
            kind,
            expect_subject: subject
                .filter(|_| kind != QuadIteratorKind::Subject)
                .cloned(),
            expect_predicate: predicate
                .filter(|_| kind != QuadIteratorKind::Predicate)
                .cloned(),
            expect_object: object.filter(|_| kind != QuadIteratorKind::Object).cloned(),
            expect_graph_name: graph_name
                .filter(|_| kind != QuadIteratorKind::GraphName)
                .cloned(),
        }
    }

    /// Returns the named graphs existing in this version.
    pub fn named_graphs(&self) -> Vec<NamedOrBlankNode> {
        self.storage
            .content
            .named_graphs
            .iter()
            .filter(|entry| self.is_in_range(entry.value()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn contains_named_graph(&self, graph_name: NamedOrBlankNodeRef<'_>) -> bool {
        self.storage
            .content
            .named_graphs
            .get(&graph_name.into_owned())
            .is_some_and(|range| self.is_in_range(&range))
    }

    /// Journal records rebuilding this version from an empty store.
    pub(crate) fn records(&self) -> Vec<JournalRecord> {
        let mut records = self
            .named_graphs()
            .into_iter()
            .map(JournalRecord::CreateGraph)
            .collect::<Vec<_>>();
        records.extend(
            self.quads_for_pattern(None, None, None, None)
                .map(JournalRecord::Insert),
        );
        records
    }

    /// Validates that all the storage invariants held in the data
    pub fn validate(&self) -> Result<(), StorageError> {
        let content = &self.storage.content;
        let expected_quad_len = content.quad_set.len() as u64;

        let mut next = content.last_quad.read().clone();
        let mut count_last_quad = 0;
        while let Some(current) = next.take().and_then(|c| c.upgrade()) {
            count_last_quad += 1;
            self.validate_node_in_set(&current)?;
            if let Some(graph_name) = named_graph_of(&current.quad.graph_name) {
                if !content.named_graphs.contains_key(&graph_name) {
                    return Err(
                        CorruptionError::msg("Quad in named graph that does not exists").into(),
                    );
                }
            }
            next.clone_from(&current.previous);
        }
        if count_last_quad != expected_quad_len {
            return Err(CorruptionError::msg("Too many quads in quad_set").into());
        }

        self.validate_chains(&content.last_quad_by_subject, |n| {
            (&n.quad.subject, &n.previous_subject)
        })?;
        self.validate_chains(&content.last_quad_by_predicate, |n| {
            (&n.quad.predicate, &n.previous_predicate)
        })?;
        self.validate_chains(&content.last_quad_by_object, |n| {
            (&n.quad.object, &n.previous_object)
        })?;
        self.validate_chains(&content.last_quad_by_graph_name, |n| {
            (&n.quad.graph_name, &n.previous_graph_name)
        })
    }

    fn validate_chains<K: Eq + Hash>(
        &self,
        index: &QuadIndex<K>,
        key_and_previous: impl Fn(&QuadListNode) -> (&K, &Option<Weak<QuadListNode>>),
    ) -> Result<(), StorageError> {
        let mut total = 0;
        for entry in index {
            let mut next = Some(Weak::clone(&entry.value().0));
            let mut element_count = 0;
            while let Some(current) = next.take().and_then(|n| n.upgrade()) {
                element_count += 1;
                let (key, previous) = key_and_previous(current.as_ref());
                if key != entry.key() {
                    return Err(CorruptionError::msg("Quad in wrong list").into());
                }
                self.validate_node_in_set(&current)?;
                next.clone_from(previous);
            }
            if element_count != entry.value().1 {
                return Err(CorruptionError::msg("Too many quads in a chain").into());
            }
            total += element_count;
        }
        if total != self.storage.content.quad_set.len() as u64 {
            return Err(CorruptionError::msg("Too many quads in quad_set").into());
        }
        Ok(())
    }

    fn validate_node_in_set(&self, node: &Arc<QuadListNode>) -> Result<(), StorageError> {
        if self
            .storage
            .content
            .quad_set
            .get(&node.quad)
            .is_some_and(|e| Arc::ptr_eq(e.value(), node))
        {
            Ok(())
        } else {
            Err(CorruptionError::msg("Quad in previous chain but not in quad set").into())
        }
    }

    fn is_in_range(&self, range: &VersionRange) -> bool {
        range.contains(self.snapshot_id)
    }

    fn is_node_in_range(&self, node: &QuadListNode) -> bool {
        self.is_in_range(&node.range.lock())
    }
}

/// The net effect of a write transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageChanges {
    pub inserted: Vec<Quad>,
    pub removed: Vec<Quad>,
    pub created_graphs: Vec<NamedOrBlankNode>,
    pub dropped_graphs: Vec<NamedOrBlankNode>,
}

impl StorageChanges {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty()
            && self.removed.is_empty()
            && self.created_graphs.is_empty()
            && self.dropped_graphs.is_empty()
    }

    fn records(&self) -> Vec<JournalRecord> {
        // Removals first so that replay never sees a quad in a dropped graph
        self.removed
            .iter()
            .cloned()
            .map(JournalRecord::Remove)
            .chain(self.dropped_graphs.iter().cloned().map(JournalRecord::DropGraph))
            .chain(self.created_graphs.iter().cloned().map(JournalRecord::CreateGraph))
            .chain(self.inserted.iter().cloned().map(JournalRecord::Insert))
            .collect()
    }
}

/// The single writer of a [`MemoryStorage`].
///
/// Writes are invisible to every other reader until [`MemoryStorageWriter::commit`]. Dropping a
/// writer without committing rolls it back.
pub struct MemoryStorageWriter {
    storage: MemoryStorage,
    log: Vec<LogEntry>,
    transaction_id: usize,
    snapshot_id: usize,
    finished: bool,
}

impl MemoryStorageWriter {
    /// A reader seeing the committed state plus the writes of this transaction.
    pub fn reader(&self) -> MemoryStorageReader {
        MemoryStorageReader {
            storage: self.storage.clone(),
            snapshot_id: self.transaction_id,
        }
    }

    pub fn transaction_id(&self) -> usize {
        self.transaction_id
    }

    pub fn insert(&mut self, quad: QuadRef<'_>) -> bool {
        let quad = quad.into_owned();
        let content = Arc::clone(&self.storage.content);
        let existing = content
            .quad_set
            .get(&quad)
            .map(|node| Arc::clone(node.value()));
        if let Some(node) = existing {
            let added = node.range.lock().add(self.transaction_id);
            if added {
                self.log.push(LogEntry::QuadNode(node));
                if let Some(graph_name) = named_graph_of(&quad.graph_name) {
                    self.insert_owned_named_graph(graph_name);
                }
            }
            return added;
        }

        let node = Arc::new(QuadListNode {
            range: Mutex::new(VersionRange::Start(self.transaction_id)),
            previous: content.last_quad.read().clone(),
            previous_subject: content
                .last_quad_by_subject
                .view(&quad.subject, |_, (node, _)| Weak::clone(node)),
            previous_predicate: content
                .last_quad_by_predicate
                .view(&quad.predicate, |_, (node, _)| Weak::clone(node)),
            previous_object: content
                .last_quad_by_object
                .view(&quad.object, |_, (node, _)| Weak::clone(node)),
            previous_graph_name: content
                .last_quad_by_graph_name
                .view(&quad.graph_name, |_, (node, _)| Weak::clone(node)),
            quad: quad.clone(),
        });
        content.quad_set.insert(quad.clone(), Arc::clone(&node));
        *content.last_quad.write() = Some(Arc::downgrade(&node));
        push_to_index(&content.last_quad_by_subject, quad.subject.clone(), &node);
        push_to_index(&content.last_quad_by_predicate, quad.predicate.clone(), &node);
        push_to_index(&content.last_quad_by_object, quad.object.clone(), &node);
        push_to_index(&content.last_quad_by_graph_name, quad.graph_name.clone(), &node);

        if let Some(graph_name) = named_graph_of(&quad.graph_name) {
            self.insert_owned_named_graph(graph_name);
        }
        self.log.push(LogEntry::QuadNode(node));
        true
    }

    pub fn insert_named_graph(&mut self, graph_name: NamedOrBlankNodeRef<'_>) -> bool {
        self.insert_owned_named_graph(graph_name.into_owned())
    }

    fn insert_owned_named_graph(&mut self, graph_name: NamedOrBlankNode) -> bool {
        let added = match self.storage.content.named_graphs.entry(graph_name.clone()) {
            Entry::Occupied(mut entry) => entry.get_mut().add(self.transaction_id),
            Entry::Vacant(entry) => {
                entry.insert(VersionRange::Start(self.transaction_id));
                true
            }
        };
        if added {
            self.log.push(LogEntry::NamedGraph(graph_name));
        }
        added
    }

    pub fn remove(&mut self, quad: QuadRef<'_>) -> bool {
        let Some(node) = self
            .storage
            .content
            .quad_set
            .get(&quad.into_owned())
            .map(|node| Arc::clone(node.value()))
        else {
            return false;
        };
        let removed = node.range.lock().remove(self.transaction_id);
        if removed {
            self.log.push(LogEntry::QuadNode(node));
        }
        removed
    }

    /// Removes every quad of the graph. Named graphs are kept.
    pub fn clear_graph(&mut self, graph_name: GraphNameRef<'_>) {
        let mut next = self
            .storage
            .content
            .last_quad_by_graph_name
            .view(&graph_name.into_owned(), |_, (node, _)| Weak::clone(node));
        while let Some(current) = next.take().and_then(|c| c.upgrade()) {
            if current.range.lock().remove(self.transaction_id) {
                self.log.push(LogEntry::QuadNode(Arc::clone(&current)));
            }
            next.clone_from(&current.previous_graph_name);
        }
    }

    pub fn clear_all_named_graphs(&mut self) {
        for graph_name in self.reader().named_graphs() {
            self.clear_graph(graph_name.as_ref().into());
        }
    }

    pub fn clear_all_graphs(&mut self) {
        let nodes = self
            .storage
            .content
            .quad_set
            .iter()
            .map(|node| Arc::clone(node.value()))
            .collect::<Vec<_>>();
        for node in nodes {
            if node.range.lock().remove(self.transaction_id) {
                self.log.push(LogEntry::QuadNode(node));
            }
        }
    }

    /// Removes the named graph and all its quads.
    pub fn remove_named_graph(&mut self, graph_name: NamedOrBlankNodeRef<'_>) -> bool {
        self.clear_graph(graph_name.into());
        let graph_name = graph_name.into_owned();
        let removed = self
            .storage
            .content
            .named_graphs
            .get_mut(&graph_name)
            .is_some_and(|mut range| range.remove(self.transaction_id));
        if removed {
            self.log.push(LogEntry::NamedGraph(graph_name));
        }
        removed
    }

    pub fn remove_all_named_graphs(&mut self) {
        self.clear_all_named_graphs();
        self.remove_graph_entries();
    }

    /// Removes every quad and every named graph.
    pub fn clear(&mut self) {
        self.clear_all_graphs();
        self.remove_graph_entries();
    }

    fn remove_graph_entries(&mut self) {
        for mut entry in self.storage.content.named_graphs.iter_mut() {
            if entry.value_mut().remove(self.transaction_id) {
                self.log.push(LogEntry::NamedGraph(entry.key().clone()));
            }
        }
    }

    /// Applies a replayed journal record.
    pub(crate) fn apply(&mut self, record: &JournalRecord) {
        match record {
            JournalRecord::Insert(quad) => {
                self.insert(quad.as_ref());
            }
            JournalRecord::Remove(quad) => {
                self.remove(quad.as_ref());
            }
            JournalRecord::CreateGraph(graph_name) => {
                self.insert_named_graph(graph_name.as_ref());
            }
            JournalRecord::DropGraph(graph_name) => {
                self.remove_named_graph(graph_name.as_ref());
            }
        }
    }

    /// Computes the net changes of this transaction compared to its starting snapshot.
    ///
    /// Writes that cancel each other (e.g. an insertion followed by a removal of the same quad)
    /// do not appear.
    pub fn changes(&self) -> StorageChanges {
        let mut changes = StorageChanges::default();
        let mut seen_quads = FxHashSet::default();
        let mut seen_graphs = FxHashSet::default();
        for entry in &self.log {
            match entry {
                LogEntry::QuadNode(node) => {
                    if !seen_quads.insert(Arc::as_ptr(node)) {
                        continue;
                    }
                    let range = node.range.lock();
                    match (
                        range.contains(self.snapshot_id),
                        range.contains(self.transaction_id),
                    ) {
                        (false, true) => changes.inserted.push(node.quad.clone()),
                        (true, false) => changes.removed.push(node.quad.clone()),
                        _ => (),
                    }
                }
                LogEntry::NamedGraph(graph_name) => {
                    if !seen_graphs.insert(graph_name) {
                        continue;
                    }
                    let visibility = self.storage.content.named_graphs.view(graph_name, |_, r| {
                        (r.contains(self.snapshot_id), r.contains(self.transaction_id))
                    });
                    match visibility {
                        Some((false, true)) => changes.created_graphs.push(graph_name.clone()),
                        Some((true, false)) => changes.dropped_graphs.push(graph_name.clone()),
                        _ => (),
                    }
                }
            }
        }
        changes
    }

    /// Makes the writes visible to new snapshots and returns their net effect.
    ///
    /// Persistent storages write the changes to the journal first. If that fails the transaction
    /// is rolled back and nothing becomes visible.
    pub fn commit(mut self) -> Result<StorageChanges, StorageError> {
        let changes = self.changes();
        let new_version_id = self.snapshot_id + 1;
        let journaled = match &self.storage.journal {
            Some(journal) if !changes.is_empty() => {
                journal.lock().append(new_version_id, &changes.records())
            }
            _ => Ok(()),
        };
        if let Err(error) = journaled {
            self.finish_rollback();
            return Err(error);
        }
        for entry in std::mem::take(&mut self.log) {
            match entry {
                LogEntry::QuadNode(node) => {
                    node.range
                        .lock()
                        .upgrade_transaction(self.transaction_id, new_version_id);
                }
                LogEntry::NamedGraph(graph_name) => {
                    if let Some(mut range) = self.storage.content.named_graphs.get_mut(&graph_name)
                    {
                        range.upgrade_transaction(self.transaction_id, new_version_id);
                    }
                }
            }
        }
        self.storage
            .version_counter
            .store(new_version_id, Ordering::Release);
        // TODO: garbage collect list nodes whose range ended before the oldest live snapshot
        debug!(
            transaction_id = self.transaction_id,
            version = new_version_id,
            inserted = changes.inserted.len(),
            removed = changes.removed.len(),
            "Committed storage transaction"
        );
        self.finished = true;
        self.storage.release_write_slot();
        Ok(changes)
    }

    /// Discards all the writes of this transaction.
    pub fn rollback(mut self) {
        self.finish_rollback();
    }

    fn finish_rollback(&mut self) {
        if self.finished {
            return;
        }
        for entry in std::mem::take(&mut self.log) {
            match entry {
                LogEntry::QuadNode(node) => {
                    node.range.lock().rollback_transaction(self.transaction_id);
                }
                LogEntry::NamedGraph(graph_name) => {
                    if let Some(mut range) = self.storage.content.named_graphs.get_mut(&graph_name)
                    {
                        range.rollback_transaction(self.transaction_id);
                    }
                }
            }
        }
        debug!(
            transaction_id = self.transaction_id,
            "Rolled back storage transaction"
        );
        self.finished = true;
        self.storage.release_write_slot();
    }
}

impl Drop for MemoryStorageWriter {
    fn drop(&mut self) {
        self.finish_rollback();
    }
}

impl Debug for MemoryStorageWriter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorageWriter")
            .field("transaction_id", &self.transaction_id)
            .field("snapshot_id", &self.snapshot_id)
            .field("log_len", &self.log.len())
            .finish()
    }
}

fn push_to_index<K: Eq + Hash>(index: &QuadIndex<K>, key: K, node: &Arc<QuadListNode>) {
    index
        .entry(key)
        .and_modify(|(last, count)| {
            *last = Arc::downgrade(node);
            *count += 1;
        })
        .or_insert_with(|| (Arc::downgrade(node), 1));
}

fn named_graph_of(graph_name: &GraphName) -> Option<NamedOrBlankNode> {
    match graph_name {
        GraphName::NamedNode(node) => Some(node.clone().into()),
        GraphName::BlankNode(node) => Some(node.clone().into()),
        GraphName::DefaultGraph => None,
    }
}

/// Iterates over the quads of a reader matching a pattern, newest first.
pub struct QuadIterator {
    reader: MemoryStorageReader,
    current: Option<Weak<QuadListNode>>,
    kind: QuadIteratorKind,
    expect_subject: Option<Subject>,
    expect_predicate: Option<NamedNode>,
    expect_object: Option<Term>,
    expect_graph_name: Option<GraphName>,
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum QuadIteratorKind {
    All,
    Subject,
    Predicate,
    Object,
    GraphName,
}

impl Iterator for QuadIterator {
    type Item = Quad;

    fn next(&mut self) -> Option<Quad> {
        loop {
            let current = self.current.take()?.upgrade()?;
            self.current = match self.kind {
                QuadIteratorKind::All => current.previous.clone(),
                QuadIteratorKind::Subject => current.previous_subject.clone(),
                QuadIteratorKind::Predicate => current.previous_predicate.clone(),
                QuadIteratorKind::Object => current.previous_object.clone(),
                QuadIteratorKind::GraphName => current.previous_graph_name.clone(),
            };
            if !self.reader.is_node_in_range(&current) {
                continue;
            }
            if self
                .expect_subject
                .as_ref()
                .is_some_and(|s| *s != current.quad.subject)
                || self
                    .expect_predicate
                    .as_ref()
                    .is_some_and(|p| *p != current.quad.predicate)
                || self
                    .expect_object
                    .as_ref()
                    .is_some_and(|o| *o != current.quad.object)
                || self
                    .expect_graph_name
                    .as_ref()
                    .is_some_and(|g| *g != current.quad.graph_name)
            {
                continue;
            }
            return Some(current.quad.clone());
        }
    }
}

enum LogEntry {
    QuadNode(Arc<QuadListNode>),
    NamedGraph(NamedOrBlankNode),
}

struct QuadListNode {
    quad: Quad,
    range: Mutex<VersionRange>,
    previous: Option<Weak<Self>>,
    previous_subject: Option<Weak<Self>>,
    previous_predicate: Option<Weak<Self>>,
    previous_object: Option<Weak<Self>>,
    previous_graph_name: Option<Weak<Self>>,
}
