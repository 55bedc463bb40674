//! Node identity and handles

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable, opaque identifier of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Create a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolved node: its identifier and the path it was found at
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    id: NodeId,
    path: String,
}

impl NodeHandle {
    pub fn new(id: NodeId, path: impl Into<String>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last segment of the node path
    pub fn name(&self) -> &str {
        crate::path::name(&self.path)
    }

    pub fn is_root(&self) -> bool {
        self.path == crate::path::ROOT
    }
}
