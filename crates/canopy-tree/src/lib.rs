//! Canopy content tree
//!
//! Interfaces the access control engine consumes from the content
//! repository: read access to a hierarchical node tree, transient sessions,
//! and change observation. An in-memory implementation backs tests and
//! embedded use.

pub mod error;
pub mod memory;
pub mod node;
pub mod observation;
pub mod path;
pub mod tree;
pub mod value;

pub use error::{Result, TreeError};
pub use memory::{MemoryRepository, MemorySession, NodeTypeRegistry};
pub use node::{NodeHandle, NodeId};
pub use observation::{
    Event, EventFilter, EventKind, EventListener, EventTypes, ObservationDispatcher,
    ObservationManager, SubscriptionId,
};
pub use tree::{ContentTree, TreeSession};
pub use value::Value;
