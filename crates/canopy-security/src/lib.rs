//! Canopy access control
//!
//! Compiles the access control lists stored in a content tree into per-session
//! permission evaluators. Entries are inherited down the tree, folded with
//! order-sensitive allow/deny semantics and cached per principal set and path.
//! Caches stay coherent with saved policy changes through tree observation.

pub mod acl;
pub mod cache;
pub mod collector;
pub mod compiled;
pub mod config;
pub mod editor;
pub mod entry;
pub mod error;
pub mod glob;
pub mod permission;
pub mod principal;
pub mod privilege;
pub mod provider;

pub use acl::AccessControlList;
pub use cache::CacheStats;
pub use collector::{AclChange, AclChangeListener, AclModification, EntryCollector, ListenerId};
pub use compiled::{
    AclPermissions, AllPermissions, CompiledPermissions, PermissionResult, ReadOnlyPermissions,
};
pub use config::ProviderConfig;
pub use editor::AclEditor;
pub use entry::AccessControlEntry;
pub use error::{Error, Result};
pub use permission::Permission;
pub use principal::{Principal, PrincipalKind, PrincipalManager, PrincipalSet, StaticPrincipalManager};
pub use privilege::{Privilege, PrivilegeBits, PrivilegeRegistry};
pub use provider::AccessControlProvider;
