//! In-memory repository and sessions

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::node_types::NodeTypeRegistry;
use super::store::Store;
use crate::error::{Result, TreeError};
use crate::node::{NodeHandle, NodeId};
use crate::observation::ObservationDispatcher;
use crate::tree::{ContentTree, TreeSession};
use crate::value::Value;

/// Primary type of the root node
pub const ROOT_NODE_TYPE: &str = "rep:root";

/// Implements [`ContentTree`] for a type exposing `with_store`
macro_rules! impl_content_tree {
    ($ty:ty) => {
        impl ContentTree for $ty {
            fn root(&self) -> Result<NodeHandle> {
                self.with_store(|store, _| store.require_handle(&store.root()))
            }

            fn resolve(&self, path: &str) -> Result<Option<NodeHandle>> {
                self.with_store(|store, _| {
                    Ok(store.resolve(path)?.and_then(|id| store.handle(&id)))
                })
            }

            fn node_by_id(&self, id: &NodeId) -> Result<Option<NodeHandle>> {
                self.with_store(|store, _| Ok(store.handle(id)))
            }

            fn get_child(&self, node: &NodeHandle, name: &str) -> Result<Option<NodeHandle>> {
                self.with_store(|store, _| {
                    store.require(node.id())?;
                    Ok(store.child(node.id(), name).and_then(|id| store.handle(&id)))
                })
            }

            fn get_children(&self, node: &NodeHandle) -> Result<Vec<NodeHandle>> {
                self.with_store(|store, _| {
                    let record = store.require(node.id())?;
                    record
                        .children
                        .iter()
                        .map(|child| store.require_handle(child))
                        .collect()
                })
            }

            fn get_parent(&self, node: &NodeHandle) -> Result<Option<NodeHandle>> {
                self.with_store(|store, _| match store.require(node.id())?.parent {
                    Some(parent) => store.require_handle(&parent).map(Some),
                    None => Ok(None),
                })
            }

            fn node_type_of(&self, node: &NodeHandle) -> Result<String> {
                self.with_store(|store, _| Ok(store.require(node.id())?.primary_type.clone()))
            }

            fn is_type(&self, node: &NodeHandle, type_name: &str) -> Result<bool> {
                self.with_store(|store, node_types| {
                    store.require(node.id())?;
                    Ok(store
                        .effective_types(node.id(), node_types)
                        .iter()
                        .any(|t| t == type_name))
                })
            }

            fn get_property_value(&self, node: &NodeHandle, name: &str) -> Result<Option<Value>> {
                self.with_store(|store, _| {
                    Ok(store.require(node.id())?.properties.get(name).cloned())
                })
            }

            fn property_names(&self, node: &NodeHandle) -> Result<Vec<String>> {
                self.with_store(|store, _| {
                    Ok(store.require(node.id())?.properties.keys().cloned().collect())
                })
            }
        }
    };
}

/// Persisted repository state with change observation
///
/// Reading through the repository itself always sees saved state only.
pub struct MemoryRepository {
    store: RwLock<Store>,
    node_types: NodeTypeRegistry,
    observation: Arc<ObservationDispatcher>,
}

impl MemoryRepository {
    /// Create an empty repository knowing the default node types
    pub fn new() -> Arc<Self> {
        Self::with_node_types(NodeTypeRegistry::default())
    }

    pub fn with_node_types(node_types: NodeTypeRegistry) -> Arc<Self> {
        Arc::new(Self {
            store: RwLock::new(Store::new(ROOT_NODE_TYPE)),
            node_types,
            observation: Arc::new(ObservationDispatcher::new()),
        })
    }

    /// The observation manager notified on every save
    pub fn observation(&self) -> Arc<ObservationDispatcher> {
        self.observation.clone()
    }

    /// Open a new session on this repository
    pub fn login(self: &Arc<Self>) -> MemorySession {
        MemorySession {
            repository: self.clone(),
            working: Mutex::new(None),
        }
    }

    /// Number of saves applied so far
    pub fn revision(&self) -> u64 {
        self.store.read().revision
    }

    fn with_store<R>(&self, f: impl FnOnce(&Store, &NodeTypeRegistry) -> R) -> R {
        let store = self.store.read();
        f(&store, &self.node_types)
    }
}

impl_content_tree!(MemoryRepository);

struct WorkingCopy {
    store: Store,
    base_revision: u64,
}

/// A session with a private working copy created on the first write
pub struct MemorySession {
    repository: Arc<MemoryRepository>,
    working: Mutex<Option<WorkingCopy>>,
}

impl MemorySession {
    pub fn repository(&self) -> &Arc<MemoryRepository> {
        &self.repository
    }

    fn with_store<R>(&self, f: impl FnOnce(&Store, &NodeTypeRegistry) -> R) -> R {
        let working = self.working.lock();
        match working.as_ref() {
            Some(copy) => f(&copy.store, &self.repository.node_types),
            None => self.repository.with_store(f),
        }
    }

    fn modify<R>(&self, f: impl FnOnce(&mut Store) -> Result<R>) -> Result<R> {
        let mut working = self.working.lock();
        let copy = working.get_or_insert_with(|| {
            let persisted = self.repository.store.read();
            WorkingCopy {
                store: persisted.clone(),
                base_revision: persisted.revision,
            }
        });
        f(&mut copy.store)
    }
}

impl_content_tree!(MemorySession);

impl TreeSession for MemorySession {
    fn add_node(&self, parent: &NodeHandle, name: &str, primary_type: &str) -> Result<NodeHandle> {
        self.modify(|store| {
            let id = store.add_node(parent.id(), name, primary_type)?;
            store.require_handle(&id)
        })
    }

    fn add_mixin(&self, node: &NodeHandle, mixin: &str) -> Result<()> {
        self.modify(|store| store.add_mixin(node.id(), mixin))
    }

    fn set_property(&self, node: &NodeHandle, name: &str, value: Value) -> Result<()> {
        self.modify(|store| store.set_property(node.id(), name, value))
    }

    fn remove_property(&self, node: &NodeHandle, name: &str) -> Result<bool> {
        self.modify(|store| store.remove_property(node.id(), name))
    }

    fn remove_node(&self, node: &NodeHandle) -> Result<()> {
        self.modify(|store| store.remove_node(node.id()))
    }

    fn has_pending_changes(&self) -> bool {
        self.working.lock().is_some()
    }

    fn save(&self) -> Result<()> {
        let events = {
            let mut working = self.working.lock();
            let Some(copy) = working.take() else {
                return Ok(());
            };

            let mut persisted = self.repository.store.write();
            if persisted.revision != copy.base_revision {
                let message = format!(
                    "repository changed since revision {} (now {})",
                    copy.base_revision, persisted.revision
                );
                *working = Some(copy);
                return Err(TreeError::InvalidItemState(message));
            }

            let events = persisted.diff(&copy.store, &self.repository.node_types);
            let mut next = copy.store;
            next.revision = persisted.revision + 1;
            *persisted = next;
            events
        };

        debug!(events = events.len(), "Saved session changes");
        self.repository.observation.dispatch(&events);
        Ok(())
    }

    fn refresh(&self, keep_changes: bool) -> Result<()> {
        let mut working = self.working.lock();
        if !keep_changes {
            *working = None;
        }
        Ok(())
    }
}
