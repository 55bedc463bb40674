//! Content tree access traits
//!
//! `ContentTree` is the read side the access control engine consumes.
//! `TreeSession` adds transient writes that become visible to other readers
//! only after `save`.

use crate::error::Result;
use crate::node::{NodeHandle, NodeId};
use crate::value::Value;

/// Read access to a hierarchical content tree
///
/// Lookups that find nothing return `Ok(None)`; errors are reserved for
/// failures of the tree itself (including handles to nodes that vanished).
pub trait ContentTree: Send + Sync {
    /// The root node
    fn root(&self) -> Result<NodeHandle>;

    /// Resolve an absolute path to a node
    fn resolve(&self, path: &str) -> Result<Option<NodeHandle>>;

    /// Look a node up by identifier
    fn node_by_id(&self, id: &NodeId) -> Result<Option<NodeHandle>>;

    /// Named child of a node
    fn get_child(&self, node: &NodeHandle, name: &str) -> Result<Option<NodeHandle>>;

    /// Children of a node in document order
    fn get_children(&self, node: &NodeHandle) -> Result<Vec<NodeHandle>>;

    /// Parent of a node, `None` for the root
    fn get_parent(&self, node: &NodeHandle) -> Result<Option<NodeHandle>>;

    /// Primary node type name
    fn node_type_of(&self, node: &NodeHandle) -> Result<String>;

    /// Whether the node is of the given type through its primary type, a
    /// mixin, or a supertype of either
    fn is_type(&self, node: &NodeHandle, type_name: &str) -> Result<bool>;

    /// Value of a property, `None` when the property is absent
    fn get_property_value(&self, node: &NodeHandle, name: &str) -> Result<Option<Value>>;

    /// Names of all properties on the node, sorted
    fn property_names(&self, node: &NodeHandle) -> Result<Vec<String>>;
}

/// A session with transient changes on top of a content tree
pub trait TreeSession: ContentTree {
    /// Add a child node with the given primary type
    fn add_node(&self, parent: &NodeHandle, name: &str, primary_type: &str) -> Result<NodeHandle>;

    /// Add a mixin type to a node (no-op when already present)
    fn add_mixin(&self, node: &NodeHandle, mixin: &str) -> Result<()>;

    /// Set a property value
    fn set_property(&self, node: &NodeHandle, name: &str, value: Value) -> Result<()>;

    /// Remove a property; returns whether it existed
    fn remove_property(&self, node: &NodeHandle, name: &str) -> Result<bool>;

    /// Remove a node with its whole subtree
    fn remove_node(&self, node: &NodeHandle) -> Result<()>;

    /// Whether the session has unsaved changes
    fn has_pending_changes(&self) -> bool;

    /// Persist all transient changes
    fn save(&self) -> Result<()>;

    /// Discard transient changes (unless `keep_changes`) and pick up the
    /// latest persisted state
    fn refresh(&self, keep_changes: bool) -> Result<()>;
}
