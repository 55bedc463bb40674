//! Collection and caching of the entries that apply to a node
//!
//! The collector walks from a node to the root, gathers the entries of the
//! requested principals from every access-controlled level and caches the
//! result per principal set and node. It observes the ACL content of the
//! tree, clears its cache on every relevant change and forwards a summary of
//! the change to registered listeners.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bitflags::bitflags;
use canopy_tree::{
    path, ContentTree, Event, EventFilter, EventKind, EventListener, EventTypes, NodeHandle,
    NodeId, ObservationManager, SubscriptionId,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::acl::{read_acl, NT_ACCESS_CONTROLLABLE, NT_ACE, NT_ACL, POLICY_NODE};
use crate::cache::{BoundedCache, CacheStats};
use crate::entry::AccessControlEntry;
use crate::error::Result;
use crate::principal::PrincipalSet;
use crate::privilege::PrivilegeRegistry;

/// Default number of cached entry lists
pub const DEFAULT_ENTRIES_CACHE_CAPACITY: usize = 1000;

bitflags! {
    /// How the policy of an access-controlled node changed
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AclModification: u8 {
        const POLICY_ADDED = 1 << 0;
        const POLICY_MODIFIED = 1 << 1;
        const POLICY_REMOVED = 1 << 2;
    }
}

/// Policy changes of one saved change set, keyed by owner path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AclChange {
    modifications: BTreeMap<String, AclModification>,
}

impl AclChange {
    /// Modifications recorded for the policy owned by the node at `path`
    pub fn get(&self, path: &str) -> Option<AclModification> {
        self.modifications.get(path).copied()
    }

    /// Owner paths and their modifications, in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, AclModification)> {
        self.modifications.iter().map(|(path, m)| (path.as_str(), *m))
    }

    pub fn len(&self) -> usize {
        self.modifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }

    fn record(&mut self, path: &str, modification: AclModification) {
        *self
            .modifications
            .entry(path.to_string())
            .or_insert(AclModification::empty()) |= modification;
    }
}

/// Receiver of policy change notifications
pub trait AclChangeListener: Send + Sync {
    fn acl_changed(&self, change: &AclChange);
}

/// Handle of a registered change listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Key of the entries cache
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryCacheKey {
    pub principals: String,
    pub node: NodeId,
}

type Entries = Arc<[AccessControlEntry]>;

struct CollectorState {
    tree: Arc<dyn ContentTree>,
    privileges: Arc<PrivilegeRegistry>,
    cache: Mutex<BoundedCache<EntryCacheKey, Entries>>,
    listeners: RwLock<Vec<(ListenerId, Weak<dyn AclChangeListener>)>>,
    next_listener: AtomicU64,
}

/// Entries cache shared by all compiled permissions of a provider
pub struct EntryCollector {
    state: Arc<CollectorState>,
    observation: Arc<dyn ObservationManager>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl EntryCollector {
    /// Create a collector and subscribe it to ACL changes below the root
    ///
    /// # Arguments
    /// * `tree` - Persisted view the entries are read from
    /// * `observation` - Source of the change events invalidating the cache
    /// * `privileges` - Registry resolving the privilege names of entries
    /// * `capacity` - Maximum number of cached entry lists
    ///
    /// # Returns
    /// The collector, or the error of the subscription
    pub fn new(
        tree: Arc<dyn ContentTree>,
        observation: Arc<dyn ObservationManager>,
        privileges: Arc<PrivilegeRegistry>,
        capacity: usize,
    ) -> Result<Self> {
        let state = Arc::new(CollectorState {
            tree,
            privileges,
            cache: Mutex::new(BoundedCache::new(capacity)),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        });

        let filter = EventFilter::new(
            EventTypes::NODE_ADDED
                | EventTypes::NODE_REMOVED
                | EventTypes::PROPERTY_ADDED
                | EventTypes::PROPERTY_CHANGED
                | EventTypes::PROPERTY_REMOVED,
            path::ROOT,
            true,
        )
        .with_node_types([NT_ACCESS_CONTROLLABLE, NT_ACL, NT_ACE]);
        let subscription = observation.subscribe(filter, state.clone())?;

        Ok(Self {
            state,
            observation,
            subscription: Mutex::new(Some(subscription)),
        })
    }

    /// Cache key for a principal set and node
    pub fn cache_key(principals: &PrincipalSet, node: &NodeHandle) -> EntryCacheKey {
        EntryCacheKey {
            principals: principals.signature(),
            node: *node.id(),
        }
    }

    /// Entries of `principals` that apply to `node`
    ///
    /// For each principal in set order, that principal's entries from the
    /// closest access-controlled level up to the root, in list order within
    /// a level.
    ///
    /// # Arguments
    /// * `principals` - Principals whose entries are collected
    /// * `node` - Existing node the entries apply to
    ///
    /// # Returns
    /// The cached or freshly collected entries; a malformed policy on the
    /// way up is an error, never an empty list
    pub fn get_entries(&self, principals: &PrincipalSet, node: &NodeHandle) -> Result<Entries> {
        let key = Self::cache_key(principals, node);
        // Held across collection; an event clears the cache only afterwards
        let mut cache = self.state.cache.lock();
        if let Some(entries) = cache.get(&key) {
            return Ok(entries);
        }

        let entries = self.state.collect(principals, node)?;
        debug!(
            path = %node.path(),
            principals = principals.len(),
            entries = entries.len(),
            "Collected access control entries"
        );
        cache.put(key, entries.clone());
        Ok(entries)
    }

    /// Register a listener; it is dropped once the referent is gone
    ///
    /// # Returns
    /// The id to pass to [`remove_listener`](Self::remove_listener)
    pub fn add_listener(&self, listener: Weak<dyn AclChangeListener>) -> ListenerId {
        let id = ListenerId(self.state.next_listener.fetch_add(1, Ordering::Relaxed));
        self.state.listeners.write().push((id, listener));
        id
    }

    /// Unregister a listener; returns whether it was registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.state.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Number of registered listeners, dead ones not yet pruned included
    pub fn listener_count(&self) -> usize {
        self.state.listeners.read().len()
    }

    /// Statistics of the entries cache
    pub fn stats(&self) -> CacheStats {
        self.state.cache.lock().stats()
    }

    /// Stop observing the tree; later calls are no-ops
    pub fn close(&self) -> Result<()> {
        if let Some(subscription) = self.subscription.lock().take() {
            self.observation.unsubscribe(subscription)?;
            debug!("Entry collector closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.subscription.lock().is_none()
    }
}

impl Drop for EntryCollector {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to unsubscribe entry collector");
        }
    }
}

impl CollectorState {
    fn collect(&self, principals: &PrincipalSet, node: &NodeHandle) -> Result<Entries> {
        // Entries of the requested principals, closest level first
        let mut levels: Vec<Vec<AccessControlEntry>> = Vec::new();
        let mut current = Some(node.clone());
        while let Some(level) = current {
            if let Some(acl) = read_acl(&*self.tree, &level, &self.privileges)? {
                let entries: Vec<AccessControlEntry> = acl
                    .entries()
                    .iter()
                    .filter(|entry| principals.contains(entry.principal_name()))
                    .cloned()
                    .collect();
                if !entries.is_empty() {
                    levels.push(entries);
                }
            }
            current = self.tree.get_parent(&level)?;
        }

        // Regroup by principal, keeping the level order per principal
        let mut ordered = Vec::new();
        for name in principals.names() {
            for level in &levels {
                ordered.extend(
                    level
                        .iter()
                        .filter(|entry| entry.principal_name() == name)
                        .cloned(),
                );
            }
        }
        Ok(ordered.into())
    }

    fn classify(&self, event: &Event) -> Result<Option<(String, AclModification)>> {
        let classified = match event.kind {
            // A new policy, or a new entry in an existing one
            EventKind::NodeAdded => match self.tree.node_by_id(&event.identifier)? {
                Some(node) if self.tree.is_type(&node, NT_ACL)? => {
                    path::parent(&event.path).map(|p| (p, AclModification::POLICY_ADDED))
                }
                Some(node) if self.tree.is_type(&node, NT_ACE)? => {
                    path::ancestor(&event.path, 2).map(|p| (p, AclModification::POLICY_MODIFIED))
                }
                _ => None,
            },
            // The removed node is gone; decide from its name and parent
            EventKind::NodeRemoved => {
                if path::name(&event.path) == POLICY_NODE {
                    path::parent(&event.path).map(|p| (p, AclModification::POLICY_REMOVED))
                } else {
                    let parent = match path::parent(&event.path) {
                        Some(parent) => self.tree.resolve(parent)?,
                        None => None,
                    };
                    match parent {
                        Some(acl) if self.tree.is_type(&acl, NT_ACL)? => path::ancestor(&event.path, 2)
                            .map(|p| (p, AclModification::POLICY_MODIFIED)),
                        _ => None,
                    }
                }
            }
            // Entry properties: principal, privileges or a restriction
            EventKind::PropertyAdded | EventKind::PropertyChanged | EventKind::PropertyRemoved => {
                if event.parent_types.iter().any(|t| t == NT_ACE) {
                    path::ancestor(&event.path, 3).map(|p| (p, AclModification::POLICY_MODIFIED))
                } else {
                    None
                }
            }
        };
        Ok(classified.map(|(path, modification)| (path.to_string(), modification)))
    }

    fn broadcast(&self, change: &AclChange) {
        let mut live = Vec::new();
        let mut dead = Vec::new();
        for (id, listener) in self.listeners.read().iter() {
            match listener.upgrade() {
                Some(listener) => live.push(listener),
                None => dead.push(*id),
            }
        }
        if !dead.is_empty() {
            self.listeners
                .write()
                .retain(|(id, _)| !dead.contains(id));
        }

        debug!(
            paths = change.len(),
            listeners = live.len(),
            "Broadcasting access control change"
        );
        for listener in live {
            listener.acl_changed(change);
        }
    }
}

impl EventListener for CollectorState {
    fn on_event_batch(&self, events: &[Event]) {
        let mut change = AclChange::default();
        for event in events {
            match self.classify(event) {
                Ok(Some((path, modification))) => {
                    debug!(path = %path, modification = ?modification, "Access control change");
                    change.record(&path, modification);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %event.path, error = %e, "Skipping access control event");
                }
            }
        }
        if change.is_empty() {
            return;
        }

        self.cache.lock().clear();
        self.broadcast(&change);
    }
}
