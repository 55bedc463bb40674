//! Compiled permissions
//!
//! The per-session evaluators answering permission checks. The provider picks
//! one implementation per principal set: [`AllPermissions`] for
//! administrators and the system, [`ReadOnlyPermissions`] for the everyone
//! principal alone, and [`AclPermissions`] for full evaluation.

mod acl;
mod fixed;

use std::collections::BTreeSet;

use canopy_tree::{path, ContentTree, NodeHandle, NodeId};

pub use acl::{AclPermissions, DEFAULT_READ_CACHE_CAPACITY, DEFAULT_RESULT_CACHE_CAPACITY};
pub use fixed::{AllPermissions, ReadOnlyPermissions};

use crate::acl::{NT_ACE, NT_ACL};
use crate::entry::AccessControlEntry;
use crate::error::{Error, Result};
use crate::permission::Permission;
use crate::privilege::{permissions_for, Privilege, PrivilegeBits, PrivilegeRegistry};

/// Permission evaluation bound to one principal set
pub trait CompiledPermissions: Send + Sync {
    /// Whether every permission in `permissions` is granted at `path`
    fn grants(&self, path: &str, permissions: Permission) -> Result<bool>;

    /// Privilege bits granted at `path`
    fn get_privileges(&self, path: &str) -> Result<PrivilegeBits>;

    /// Privileges granted at `path`, aggregates folded
    fn get_privilege_set(&self, path: &str) -> Result<BTreeSet<Privilege>>;

    /// Whether all of `privileges` are granted at `path`
    fn has_privileges(&self, path: &str, privileges: &[Privilege]) -> Result<bool> {
        let granted = self.get_privileges(path)?;
        Ok(granted.contains(PrivilegeRegistry::bits_of(privileges)))
    }

    /// Whether the item at `path` may be read
    ///
    /// Answered per node: a property shares the answer of the node owning
    /// it. `item_id`, when known, is the id of that node; otherwise it is the
    /// closest existing node at or above `path`.
    fn can_read(&self, path: &str, item_id: Option<&NodeId>) -> Result<bool>;

    /// Release resources; later calls fail with `NotInitialized`
    fn close(&self);
}

/// Outcome of folding the entries that apply to one path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionResult {
    pub allows: Permission,
    pub denies: Permission,
    pub allow_privileges: PrivilegeBits,
    pub deny_privileges: PrivilegeBits,
}

impl PermissionResult {
    /// Nothing decided
    pub const EMPTY: PermissionResult = PermissionResult {
        allows: Permission::NONE,
        denies: Permission::NONE,
        allow_privileges: PrivilegeBits::NONE,
        deny_privileges: PrivilegeBits::NONE,
    };

    /// Everything allowed
    pub const ALL: PermissionResult = PermissionResult {
        allows: Permission::ALL,
        denies: Permission::NONE,
        allow_privileges: PrivilegeBits::from_bits_retain(u64::MAX),
        deny_privileges: PrivilegeBits::NONE,
    };

    pub fn grants(&self, permissions: Permission) -> bool {
        self.allows.contains(permissions)
    }

    /// Privileges granted by this result
    pub fn privileges(&self) -> PrivilegeBits {
        self.allow_privileges
    }

    /// Merge with a result of lower precedence
    ///
    /// Bits `self` already allows or denies stay as they are; `other` only
    /// decides the remaining ones.
    pub fn combine(&self, other: &PermissionResult) -> PermissionResult {
        PermissionResult {
            allows: self.allows | Permission::diff(other.allows, self.denies),
            denies: self.denies | Permission::diff(other.denies, self.allows),
            allow_privileges: self.allow_privileges
                | PrivilegeBits::diff(other.allow_privileges, self.deny_privileges),
            deny_privileges: self.deny_privileges
                | PrivilegeBits::diff(other.deny_privileges, self.allow_privileges),
        }
    }
}

/// Fold collected entries into a result for `path`
///
/// `entries` must be in evaluation order. `node_id` is the node the entries
/// were collected for.
///
/// Two accumulations run side by side:
/// - entries covering `path` decide the allow and deny sets of the result;
/// - entries defined above `node_id` that cover the parent of `path` form
///   the parent level, which decides `REMOVE_NODE` together with the
///   node level.
///
/// An entry can take part in either one, both or neither, depending on its
/// restrictions.
pub fn evaluate(
    entries: &[AccessControlEntry],
    path: &str,
    node_id: &NodeId,
    is_ac_item: bool,
) -> PermissionResult {
    let parent_path = path::parent(path);
    let mut result = PermissionResult::EMPTY;
    let mut parent_allows = PrivilegeBits::NONE;
    let mut parent_denies = PrivilegeBits::NONE;

    for entry in entries {
        let bits = entry.privilege_bits();

        let matches_parent =
            !entry.is_local(node_id) && parent_path.is_some_and(|parent| entry.matches(parent));
        if matches_parent {
            if entry.is_allow() {
                parent_allows |= PrivilegeBits::diff(bits, parent_denies);
            } else {
                parent_denies |= PrivilegeBits::diff(bits, parent_allows);
            }
        }

        if !entry.matches(path) {
            continue;
        }
        if entry.is_allow() {
            result.allow_privileges |= PrivilegeBits::diff(bits, result.deny_privileges);
            let permissions =
                permissions_for(result.allow_privileges, parent_allows, true, is_ac_item);
            result.allows |= Permission::diff(permissions, result.denies);
        } else {
            result.deny_privileges |= PrivilegeBits::diff(bits, result.allow_privileges);
            let permissions =
                permissions_for(result.deny_privileges, parent_denies, false, is_ac_item);
            result.denies |= Permission::diff(permissions, result.allows);
        }
    }

    // Parent level entries restricted away from `path` itself never ran
    // through the loop above.
    let permissions = permissions_for(result.allow_privileges, parent_allows, true, is_ac_item);
    result.allows |= Permission::diff(permissions, result.denies);
    let permissions = permissions_for(result.deny_privileges, parent_denies, false, is_ac_item);
    result.denies |= Permission::diff(permissions, result.allows);

    result
}

/// The closest existing node at or above `item_path`
///
/// Covers properties and paths that only exist transiently in some session.
pub(crate) fn locate(tree: &dyn ContentTree, item_path: &str) -> Result<NodeHandle> {
    let mut current = item_path;
    loop {
        if let Some(node) = tree.resolve(current)? {
            return Ok(node);
        }
        current = path::parent(current).ok_or_else(|| {
            Error::ItemNotFound(format!("no existing ancestor of {}", item_path))
        })?;
    }
}

/// The node whose policy governs `node`, and whether `node` is an ac-item
///
/// ACL nodes are governed by their owner, entry nodes by the owner of their
/// ACL.
pub(crate) fn access_controlled_target(
    tree: &dyn ContentTree,
    node: NodeHandle,
) -> Result<(NodeHandle, bool)> {
    let levels = if tree.is_type(&node, NT_ACL)? {
        1
    } else if tree.is_type(&node, NT_ACE)? {
        2
    } else {
        return Ok((node, false));
    };

    let mut target = node;
    for _ in 0..levels {
        target = tree.get_parent(&target)?.ok_or_else(|| {
            Error::ItemNotFound(format!("access control item {} has no owner", target.path()))
        })?;
    }
    Ok((target, true))
}
