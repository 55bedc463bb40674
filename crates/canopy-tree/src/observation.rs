//! Change observation
//!
//! Listeners subscribe with an [`EventFilter`] and receive the events of each
//! saved change set as one batch, in commit order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Result, TreeError};
use crate::node::NodeId;
use crate::path;

/// Kind of a single change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NodeAdded,
    NodeRemoved,
    PropertyAdded,
    PropertyChanged,
    PropertyRemoved,
}

bitflags! {
    /// Set of event kinds a subscription is interested in
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventTypes: u8 {
        const NODE_ADDED = 1 << 0;
        const NODE_REMOVED = 1 << 1;
        const PROPERTY_ADDED = 1 << 2;
        const PROPERTY_CHANGED = 1 << 3;
        const PROPERTY_REMOVED = 1 << 4;
    }
}

impl EventKind {
    /// The filter flag for this kind
    pub fn flag(&self) -> EventTypes {
        match self {
            EventKind::NodeAdded => EventTypes::NODE_ADDED,
            EventKind::NodeRemoved => EventTypes::NODE_REMOVED,
            EventKind::PropertyAdded => EventTypes::PROPERTY_ADDED,
            EventKind::PropertyChanged => EventTypes::PROPERTY_CHANGED,
            EventKind::PropertyRemoved => EventTypes::PROPERTY_REMOVED,
        }
    }
}

/// A single change notification
///
/// `path` is the path of the node (node events) or of the property
/// (property events). `identifier` is the node the event is about; for
/// property events that is the node owning the property.
/// `parent_types` lists the effective types (primary, mixins and their
/// supertypes) of the event's associated parent node: the parent of the
/// added/removed node, or the node owning the property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub path: String,
    pub identifier: NodeId,
    pub parent_types: Vec<String>,
}

impl Event {
    pub fn new(
        kind: EventKind,
        path: impl Into<String>,
        identifier: NodeId,
        parent_types: Vec<String>,
    ) -> Self {
        Self {
            kind,
            path: path.into(),
            identifier,
            parent_types,
        }
    }
}

/// Which events a subscription receives
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub types: EventTypes,
    pub root_path: String,
    pub is_deep: bool,
    /// Restrict to events whose associated parent node has one of these
    /// types; empty means no restriction
    pub node_types: Vec<String>,
}

impl EventFilter {
    pub fn new(types: EventTypes, root_path: impl Into<String>, is_deep: bool) -> Self {
        Self {
            types,
            root_path: root_path.into(),
            is_deep,
            node_types: Vec::new(),
        }
    }

    pub fn with_node_types<I, S>(mut self, node_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.node_types = node_types.into_iter().map(Into::into).collect();
        self
    }

    /// Whether an event passes this filter
    pub fn accepts(&self, event: &Event) -> bool {
        if !self.types.contains(event.kind.flag()) {
            return false;
        }

        let Some(parent_path) = path::parent(&event.path) else {
            return false;
        };
        let in_scope = if self.is_deep {
            path::is_descendant_or_equal(&self.root_path, parent_path)
        } else {
            parent_path == self.root_path
        };
        if !in_scope {
            return false;
        }

        self.node_types.is_empty()
            || event
                .parent_types
                .iter()
                .any(|t| self.node_types.iter().any(|wanted| wanted == t))
    }
}

/// Receiver of event batches
pub trait EventListener: Send + Sync {
    fn on_event_batch(&self, events: &[Event]);
}

/// Handle identifying a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscription management of an observation mechanism
pub trait ObservationManager: Send + Sync {
    fn subscribe(
        &self,
        filter: EventFilter,
        listener: Arc<dyn EventListener>,
    ) -> Result<SubscriptionId>;

    fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;
}

struct Subscription {
    id: SubscriptionId,
    filter: EventFilter,
    listener: Arc<dyn EventListener>,
}

/// In-process observation manager delivering batches synchronously
#[derive(Default)]
pub struct ObservationDispatcher {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl ObservationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Deliver a batch to every subscription, filtered per subscription
    ///
    /// Listeners run on the calling thread without the subscription lock
    /// held, so they may subscribe or unsubscribe from inside the callback.
    pub fn dispatch(&self, events: &[Event]) {
        if events.is_empty() {
            return;
        }

        let targets: Vec<(SubscriptionId, Arc<dyn EventListener>, Vec<Event>)> = self
            .subscriptions
            .read()
            .iter()
            .filter_map(|subscription| {
                let accepted: Vec<Event> = events
                    .iter()
                    .filter(|event| subscription.filter.accepts(event))
                    .cloned()
                    .collect();
                (!accepted.is_empty())
                    .then(|| (subscription.id, subscription.listener.clone(), accepted))
            })
            .collect();

        for (id, listener, batch) in targets {
            debug!(subscription = ?id, events = batch.len(), "Delivering event batch");
            listener.on_event_batch(&batch);
        }
    }
}

impl ObservationManager for ObservationDispatcher {
    fn subscribe(
        &self,
        filter: EventFilter,
        listener: Arc<dyn EventListener>,
    ) -> Result<SubscriptionId> {
        path::validate(&filter.root_path)?;
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription {
            id,
            filter,
            listener,
        });
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        if subscriptions.len() == before {
            return Err(TreeError::InvalidItemState(format!(
                "unknown subscription {:?}",
                id
            )));
        }
        Ok(())
    }
}
