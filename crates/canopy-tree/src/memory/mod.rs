//! In-memory content tree with transient sessions
//!
//! `MemoryRepository` holds the persisted state. Sessions take a private
//! working copy on their first write; `save` applies the copy atomically,
//! rejects it if another session saved in between, and dispatches the
//! resulting events to the repository's observation manager.

mod node_types;
mod repository;
mod store;

pub use node_types::NodeTypeRegistry;
pub use repository::{MemoryRepository, MemorySession, ROOT_NODE_TYPE};
pub use store::MIXIN_TYPES_PROPERTY;
