//! Change notifications fired after each commit.

use crate::connection::ConnectionInner;
use crate::error::SparqlError;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use sparqlite_model::vocab::rdf;
use sparqlite_model::{GraphName, NamedNode, NamedOrBlankNode, Quad, Subject};
use sparqlite_storage::StorageChanges;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// What happened to a `(subject, predicate)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    /// An `rdf:type` was added.
    Create,
    /// A value of another predicate was added or removed.
    Update,
    /// An `rdf:type` was removed.
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    pub graph: GraphName,
    pub subject: NamedOrBlankNode,
    pub predicate: NamedNode,
    pub event_type: EventType,
}

/// A change notification callback.
///
/// It receives the service the changes come from (`None` for a local store), the graph and the
/// events of that graph.
pub type NotifierCallback = dyn Fn(Option<&str>, &GraphName, &[ChangeEvent]) + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// The subscribers of a connection, notified in subscription order.
#[derive(Default)]
pub(crate) struct NotifierRegistry {
    subscribers: Mutex<Vec<(SubscriptionId, Arc<NotifierCallback>)>>,
    next_id: AtomicU64,
}

impl NotifierRegistry {
    pub fn subscribe(&self, callback: Arc<NotifierCallback>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, callback));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let len = subscribers.len();
        subscribers.retain(|(subscription, _)| *subscription != id);
        subscribers.len() != len
    }

    pub fn clear(&self) {
        self.subscribers.lock().clear();
    }

    /// Invokes every subscriber once per changed graph.
    ///
    /// Callbacks run on the calling thread without the subscriber lock held, so they may
    /// subscribe or unsubscribe.
    pub fn dispatch(&self, changes: &StorageChanges) {
        let subscribers = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect::<Vec<_>>();
        if subscribers.is_empty() {
            return;
        }
        let groups = change_events(changes);
        for (graph, events) in &groups {
            for callback in &subscribers {
                callback(None, graph, events);
            }
        }
        debug!(
            graphs = groups.len(),
            subscribers = subscribers.len(),
            "Dispatched change notifications"
        );
    }
}

/// Groups the net changes of a commit into events per graph.
///
/// Graphs keep the order in which their first change appears, removals before insertions.
pub(crate) fn change_events(changes: &StorageChanges) -> Vec<(GraphName, Vec<ChangeEvent>)> {
    let mut groups: Vec<(GraphName, Vec<ChangeEvent>)> = Vec::new();
    let mut group_index = FxHashMap::<GraphName, usize>::default();
    let mut seen = FxHashSet::<ChangeEvent>::default();

    let removed = changes.removed.iter().map(|quad| (quad, false));
    let inserted = changes.inserted.iter().map(|quad| (quad, true));
    for (quad, is_insertion) in removed.chain(inserted) {
        let event = change_event(quad, is_insertion);
        if !seen.insert(event.clone()) {
            continue;
        }
        let index = *group_index.entry(event.graph.clone()).or_insert_with(|| {
            groups.push((event.graph.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[index].1.push(event);
    }
    groups
}

fn change_event(quad: &Quad, is_insertion: bool) -> ChangeEvent {
    let subject = match &quad.subject {
        Subject::NamedNode(node) => NamedOrBlankNode::from(node.clone()),
        Subject::BlankNode(node) => NamedOrBlankNode::from(node.clone()),
    };
    let event_type = match (quad.predicate == rdf::TYPE, is_insertion) {
        (true, true) => EventType::Create,
        (true, false) => EventType::Delete,
        (false, _) => EventType::Update,
    };
    ChangeEvent {
        graph: quad.graph_name.clone(),
        subject,
        predicate: quad.predicate.clone(),
        event_type,
    }
}

/// Receives the change events of a connection.
///
/// Callbacks run synchronously on the committing thread, after the commit and before the next
/// write transaction can begin. They must not write through the same connection: doing so fails
/// with [`SparqlError::Reentrancy`]. Dropping the notifier removes its subscriptions.
///
/// ```
/// use sparqlite::{Connection, ConnectionOptions, EventType, StoreLocation};
/// use std::sync::{Arc, Mutex};
///
/// let connection = Connection::open(ConnectionOptions::default(), StoreLocation::Memory, None)?;
/// let notifier = connection.create_notifier()?;
/// let created = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&created);
/// notifier.subscribe(move |_service, _graph, events| {
///     for event in events {
///         if event.event_type == EventType::Create {
///             sink.lock().unwrap().push(event.subject.to_string());
///         }
///     }
/// })?;
///
/// connection.update("INSERT DATA { <urn:a> a nfo:Document }")?;
/// assert_eq!(*created.lock().unwrap(), ["<urn:a>"]);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct Notifier {
    registry: Arc<NotifierRegistry>,
    connection: Weak<ConnectionInner>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl Notifier {
    pub(crate) fn new(registry: Arc<NotifierRegistry>, connection: Weak<ConnectionInner>) -> Self {
        Self {
            registry,
            connection,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Result<SubscriptionId, SparqlError>
    where
        F: Fn(Option<&str>, &GraphName, &[ChangeEvent]) + Send + Sync + 'static,
    {
        match self.connection.upgrade() {
            Some(connection) if !connection.is_closed() => (),
            _ => return Err(SparqlError::ClosedConnection),
        }
        let id = self.registry.subscribe(Arc::new(callback));
        self.subscriptions.lock().push(id);
        debug!(subscription = id.0, "Subscribed to change notifications");
        Ok(id)
    }

    /// Returns `false` if `id` is not a live subscription of this notifier.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        let Some(position) = subscriptions.iter().position(|s| *s == id) else {
            return false;
        };
        subscriptions.swap_remove(position);
        self.registry.unsubscribe(id)
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        for id in self.subscriptions.get_mut().drain(..) {
            self.registry.unsubscribe(id);
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("subscriptions", &*self.subscriptions.lock())
            .finish_non_exhaustive()
    }
}
