//! Privileges and their mapping onto permissions
//!
//! A privilege is a named capability granted or denied by an access control
//! entry. Concrete privileges own one bit of [`PrivilegeBits`]; aggregates
//! carry the union of their members; abstract privileges carry no bits and
//! can never be used in an entry.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use bitflags::bitflags;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::permission::Permission;

pub const JCR_READ: &str = "jcr:read";
pub const JCR_MODIFY_PROPERTIES: &str = "jcr:modifyProperties";
pub const JCR_ADD_CHILD_NODES: &str = "jcr:addChildNodes";
pub const JCR_REMOVE_NODE: &str = "jcr:removeNode";
pub const JCR_REMOVE_CHILD_NODES: &str = "jcr:removeChildNodes";
pub const JCR_READ_ACCESS_CONTROL: &str = "jcr:readAccessControl";
pub const JCR_MODIFY_ACCESS_CONTROL: &str = "jcr:modifyAccessControl";
pub const JCR_NODE_TYPE_MANAGEMENT: &str = "jcr:nodeTypeManagement";
pub const JCR_VERSION_MANAGEMENT: &str = "jcr:versionManagement";
pub const JCR_LOCK_MANAGEMENT: &str = "jcr:lockManagement";
pub const JCR_LIFECYCLE_MANAGEMENT: &str = "jcr:lifecycleManagement";
pub const JCR_RETENTION_MANAGEMENT: &str = "jcr:retentionManagement";
pub const JCR_WRITE: &str = "jcr:write";
pub const JCR_ALL: &str = "jcr:all";

/// First bit handed out to custom privileges
const FIRST_CUSTOM_BIT: u32 = 16;

bitflags! {
    /// Privilege bit set; bits from 16 upwards belong to custom privileges
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PrivilegeBits: u64 {
        const NONE = 0;
        const READ = 1 << 0;
        const MODIFY_PROPERTIES = 1 << 1;
        const ADD_CHILD_NODES = 1 << 2;
        const REMOVE_NODE = 1 << 3;
        const REMOVE_CHILD_NODES = 1 << 4;
        const READ_AC = 1 << 5;
        const MODIFY_AC = 1 << 6;
        const NODE_TYPE_MNGMT = 1 << 7;
        const VERSION_MNGMT = 1 << 8;
        const LOCK_MNGMT = 1 << 9;
        const LIFECYCLE_MNGMT = 1 << 10;
        const RETENTION_MNGMT = 1 << 11;

        const WRITE = Self::MODIFY_PROPERTIES.bits()
            | Self::ADD_CHILD_NODES.bits()
            | Self::REMOVE_NODE.bits()
            | Self::REMOVE_CHILD_NODES.bits();

        const ALL_BUILTIN = Self::READ.bits()
            | Self::WRITE.bits()
            | Self::READ_AC.bits()
            | Self::MODIFY_AC.bits()
            | Self::NODE_TYPE_MNGMT.bits()
            | Self::VERSION_MNGMT.bits()
            | Self::LOCK_MNGMT.bits()
            | Self::LIFECYCLE_MNGMT.bits()
            | Self::RETENTION_MNGMT.bits();
    }
}

impl PrivilegeBits {
    /// Bits of `a` that are not in `b`
    pub fn diff(a: PrivilegeBits, b: PrivilegeBits) -> PrivilegeBits {
        a.difference(b)
    }
}

impl Default for PrivilegeBits {
    fn default() -> Self {
        PrivilegeBits::NONE
    }
}

/// A named privilege
///
/// Privileges compare, order and hash by name only.
#[derive(Debug, Clone)]
pub struct Privilege {
    name: String,
    bits: PrivilegeBits,
    is_abstract: bool,
    aggregate_names: Vec<String>,
}

impl Privilege {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bits(&self) -> PrivilegeBits {
        self.bits
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_aggregate(&self) -> bool {
        !self.aggregate_names.is_empty()
    }

    /// Names of the directly aggregated privileges
    pub fn aggregate_names(&self) -> &[String] {
        &self.aggregate_names
    }
}

impl PartialEq for Privilege {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Privilege {}

impl Hash for Privilege {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for Privilege {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Privilege {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

impl std::fmt::Display for Privilege {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

struct RegistryState {
    privileges: BTreeMap<String, Privilege>,
    next_custom_bit: u32,
}

/// Registry of built-in and custom privileges
pub struct PrivilegeRegistry {
    state: RwLock<RegistryState>,
}

impl PrivilegeRegistry {
    /// Registry holding the built-in privileges
    pub fn new() -> Self {
        let concrete = [
            (JCR_READ, PrivilegeBits::READ),
            (JCR_MODIFY_PROPERTIES, PrivilegeBits::MODIFY_PROPERTIES),
            (JCR_ADD_CHILD_NODES, PrivilegeBits::ADD_CHILD_NODES),
            (JCR_REMOVE_NODE, PrivilegeBits::REMOVE_NODE),
            (JCR_REMOVE_CHILD_NODES, PrivilegeBits::REMOVE_CHILD_NODES),
            (JCR_READ_ACCESS_CONTROL, PrivilegeBits::READ_AC),
            (JCR_MODIFY_ACCESS_CONTROL, PrivilegeBits::MODIFY_AC),
            (JCR_NODE_TYPE_MANAGEMENT, PrivilegeBits::NODE_TYPE_MNGMT),
            (JCR_VERSION_MANAGEMENT, PrivilegeBits::VERSION_MNGMT),
            (JCR_LOCK_MANAGEMENT, PrivilegeBits::LOCK_MNGMT),
            (JCR_LIFECYCLE_MANAGEMENT, PrivilegeBits::LIFECYCLE_MNGMT),
            (JCR_RETENTION_MANAGEMENT, PrivilegeBits::RETENTION_MNGMT),
        ];

        let mut privileges = BTreeMap::new();
        for (name, bits) in concrete {
            privileges.insert(
                name.to_string(),
                Privilege {
                    name: name.to_string(),
                    bits,
                    is_abstract: false,
                    aggregate_names: Vec::new(),
                },
            );
        }

        let write_members = [
            JCR_MODIFY_PROPERTIES,
            JCR_ADD_CHILD_NODES,
            JCR_REMOVE_NODE,
            JCR_REMOVE_CHILD_NODES,
        ];
        privileges.insert(
            JCR_WRITE.to_string(),
            Privilege {
                name: JCR_WRITE.to_string(),
                bits: PrivilegeBits::WRITE,
                is_abstract: false,
                aggregate_names: write_members.iter().map(|s| s.to_string()).collect(),
            },
        );

        let all_members = concrete
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| !write_members.contains(name))
            .chain(std::iter::once(JCR_WRITE))
            .map(str::to_string)
            .collect();
        privileges.insert(
            JCR_ALL.to_string(),
            Privilege {
                name: JCR_ALL.to_string(),
                bits: PrivilegeBits::ALL_BUILTIN,
                is_abstract: false,
                aggregate_names: all_members,
            },
        );

        Self {
            state: RwLock::new(RegistryState {
                privileges,
                next_custom_bit: FIRST_CUSTOM_BIT,
            }),
        }
    }

    /// Look a privilege up by name
    pub fn get(&self, name: &str) -> Result<Privilege> {
        self.state
            .read()
            .privileges
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownPrivilege(name.to_string()))
    }

    /// Look several privileges up, failing on the first unknown name
    pub fn get_all<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Privilege>> {
        names.iter().map(|name| self.get(name.as_ref())).collect()
    }

    /// All registered privileges, sorted by name
    pub fn privileges(&self) -> Vec<Privilege> {
        self.state.read().privileges.values().cloned().collect()
    }

    /// Register a custom privilege
    ///
    /// A non-abstract privilege without aggregates gets the next free bit
    /// and becomes part of `jcr:all`. An aggregate carries the union of its
    /// members' bits. Abstract privileges carry no bits and cannot aggregate.
    pub fn register_custom<S: AsRef<str>>(
        &self,
        name: &str,
        is_abstract: bool,
        aggregate_names: &[S],
    ) -> Result<Privilege> {
        if name.is_empty() {
            return Err(Error::InvalidPrivilege("empty privilege name".to_string()));
        }

        let mut state = self.state.write();
        if state.privileges.contains_key(name) {
            return Err(Error::InvalidPrivilege(format!("{} already registered", name)));
        }

        let privilege = if is_abstract {
            if !aggregate_names.is_empty() {
                return Err(Error::InvalidPrivilege(format!(
                    "abstract privilege {} cannot aggregate",
                    name
                )));
            }
            Privilege {
                name: name.to_string(),
                bits: PrivilegeBits::NONE,
                is_abstract: true,
                aggregate_names: Vec::new(),
            }
        } else if aggregate_names.is_empty() {
            if state.next_custom_bit >= u64::BITS {
                return Err(Error::InvalidPrivilege(
                    "no privilege bits left for custom privileges".to_string(),
                ));
            }
            let bits = PrivilegeBits::from_bits_retain(1u64 << state.next_custom_bit);
            state.next_custom_bit += 1;
            if let Some(all) = state.privileges.get_mut(JCR_ALL) {
                all.bits |= bits;
                all.aggregate_names.push(name.to_string());
            }
            Privilege {
                name: name.to_string(),
                bits,
                is_abstract: false,
                aggregate_names: Vec::new(),
            }
        } else {
            let mut bits = PrivilegeBits::NONE;
            for member in aggregate_names {
                let member = state.privileges.get(member.as_ref()).ok_or_else(|| {
                    Error::UnknownPrivilege(member.as_ref().to_string())
                })?;
                bits |= member.bits;
            }
            if bits.is_empty() {
                return Err(Error::InvalidPrivilege(format!(
                    "aggregate {} has no concrete members",
                    name
                )));
            }
            Privilege {
                name: name.to_string(),
                bits,
                is_abstract: false,
                aggregate_names: aggregate_names
                    .iter()
                    .map(|n| n.as_ref().to_string())
                    .collect(),
            }
        };

        state
            .privileges
            .insert(name.to_string(), privilege.clone());
        Ok(privilege)
    }

    /// Bits of `jcr:all`, custom privileges included
    pub fn all_bits(&self) -> PrivilegeBits {
        self.state
            .read()
            .privileges
            .get(JCR_ALL)
            .map(|all| all.bits)
            .unwrap_or(PrivilegeBits::ALL_BUILTIN)
    }

    /// Union of the bits of the given privileges
    pub fn bits_of(privileges: &[Privilege]) -> PrivilegeBits {
        privileges
            .iter()
            .fold(PrivilegeBits::NONE, |acc, p| acc | p.bits)
    }

    /// Smallest privilege set covering `bits`
    ///
    /// Aggregates whose bits are all present replace their members.
    pub fn privileges_for(&self, bits: PrivilegeBits) -> BTreeSet<Privilege> {
        let state = self.state.read();
        let mut result = BTreeSet::new();
        if bits.is_empty() {
            return result;
        }
        if let Some(all) = state.privileges.get(JCR_ALL) {
            if bits.contains(all.bits) {
                result.insert(all.clone());
                return result;
            }
        }

        let mut candidates: Vec<&Privilege> = state
            .privileges
            .values()
            .filter(|p| p.name != JCR_ALL && !p.bits.is_empty())
            .collect();
        candidates.sort_by(|a, b| b.bits.bits().count_ones().cmp(&a.bits.bits().count_ones()));

        let mut remaining = bits;
        for privilege in candidates {
            if bits.contains(privilege.bits) && privilege.bits.intersects(remaining) {
                remaining = remaining.difference(privilege.bits);
                result.insert(privilege.clone());
            }
        }
        result
    }
}

impl Default for PrivilegeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Permissions implied by a privilege set
///
/// `parent_privileges` are the privileges accumulated from entries that are
/// not local to the evaluated node; they decide `REMOVE_NODE`, which needs
/// `jcr:removeNode` on the node and `jcr:removeChildNodes` on its parent
/// for an allow, and either one for a deny. On ac-items only the access
/// control privileges map, onto the item permissions needed to read or
/// edit the policy.
pub fn permissions_for(
    privileges: PrivilegeBits,
    parent_privileges: PrivilegeBits,
    is_allow: bool,
    is_ac_item: bool,
) -> Permission {
    let mut permissions = Permission::NONE;

    if is_ac_item {
        if privileges.contains(PrivilegeBits::READ_AC) {
            permissions |= Permission::READ | Permission::READ_AC;
        }
        if privileges.contains(PrivilegeBits::MODIFY_AC) {
            permissions |= Permission::MODIFY_AC
                | Permission::ADD_NODE
                | Permission::SET_PROPERTY
                | Permission::REMOVE_NODE
                | Permission::REMOVE_PROPERTY;
        }
        return permissions;
    }

    if privileges.contains(PrivilegeBits::READ) {
        permissions |= Permission::READ;
    }
    if privileges.contains(PrivilegeBits::MODIFY_PROPERTIES) {
        permissions |= Permission::SET_PROPERTY | Permission::REMOVE_PROPERTY;
    }
    if privileges.contains(PrivilegeBits::ADD_CHILD_NODES) {
        permissions |= Permission::ADD_NODE;
    }

    let on_node = privileges.contains(PrivilegeBits::REMOVE_NODE);
    let on_parent = parent_privileges.contains(PrivilegeBits::REMOVE_CHILD_NODES);
    let removable = if is_allow {
        on_node && on_parent
    } else {
        on_node || on_parent
    };
    if removable {
        permissions |= Permission::REMOVE_NODE;
    }

    let direct = [
        (PrivilegeBits::READ_AC, Permission::READ_AC),
        (PrivilegeBits::MODIFY_AC, Permission::MODIFY_AC),
        (PrivilegeBits::NODE_TYPE_MNGMT, Permission::NODE_TYPE_MNGMT),
        (PrivilegeBits::VERSION_MNGMT, Permission::VERSION_MNGMT),
        (PrivilegeBits::LOCK_MNGMT, Permission::LOCK_MNGMT),
        (PrivilegeBits::LIFECYCLE_MNGMT, Permission::LIFECYCLE_MNGMT),
        (PrivilegeBits::RETENTION_MNGMT, Permission::RETENTION_MNGMT),
    ];
    for (privilege, permission) in direct {
        if privileges.contains(privilege) {
            permissions |= permission;
        }
    }

    permissions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(set: &BTreeSet<Privilege>) -> Vec<&str> {
        set.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn test_builtin_lookup() {
        let registry = PrivilegeRegistry::new();
        assert_eq!(registry.get(JCR_READ).unwrap().bits(), PrivilegeBits::READ);
        assert_eq!(registry.get(JCR_WRITE).unwrap().bits(), PrivilegeBits::WRITE);
        assert!(registry.get(JCR_WRITE).unwrap().is_aggregate());
        assert_eq!(registry.all_bits(), PrivilegeBits::ALL_BUILTIN);
        assert!(matches!(
            registry.get("jcr:unknown"),
            Err(Error::UnknownPrivilege(_))
        ));
    }

    #[test]
    fn test_custom_concrete_privilege_extends_all() {
        let registry = PrivilegeRegistry::new();
        let custom = registry
            .register_custom::<&str>("app:publish", false, &[])
            .unwrap();
        assert_eq!(custom.bits().bits(), 1 << FIRST_CUSTOM_BIT);
        assert!(registry.all_bits().contains(custom.bits()));
        assert!(registry
            .get(JCR_ALL)
            .unwrap()
            .aggregate_names()
            .contains(&"app:publish".to_string()));
    }

    #[test]
    fn test_custom_abstract_and_aggregate() {
        let registry = PrivilegeRegistry::new();
        let abstract_priv = registry
            .register_custom::<&str>("app:abstract", true, &[])
            .unwrap();
        assert!(abstract_priv.is_abstract());
        assert!(abstract_priv.bits().is_empty());

        let aggregate = registry
            .register_custom("app:editor", false, &[JCR_READ, JCR_MODIFY_PROPERTIES])
            .unwrap();
        assert_eq!(
            aggregate.bits(),
            PrivilegeBits::READ | PrivilegeBits::MODIFY_PROPERTIES
        );

        assert!(registry
            .register_custom("app:bad", true, &[JCR_READ])
            .is_err());
        assert!(registry
            .register_custom("app:empty", false, &["app:abstract"])
            .is_err());
        assert!(matches!(
            registry.register_custom("app:missing", false, &["app:nope"]),
            Err(Error::UnknownPrivilege(_))
        ));
        assert!(registry
            .register_custom::<&str>("app:editor", false, &[])
            .is_err());
    }

    #[test]
    fn test_privileges_for_prefers_aggregates() {
        let registry = PrivilegeRegistry::new();
        let set = registry.privileges_for(PrivilegeBits::READ | PrivilegeBits::WRITE);
        assert_eq!(names(&set), vec![JCR_READ, JCR_WRITE]);

        let set = registry.privileges_for(PrivilegeBits::READ | PrivilegeBits::REMOVE_NODE);
        assert_eq!(names(&set), vec![JCR_READ, JCR_REMOVE_NODE]);

        let set = registry.privileges_for(registry.all_bits());
        assert_eq!(names(&set), vec![JCR_ALL]);

        assert!(registry.privileges_for(PrivilegeBits::NONE).is_empty());
    }

    #[test]
    fn test_permissions_for_regular_items() {
        let perms = permissions_for(
            PrivilegeBits::READ | PrivilegeBits::MODIFY_PROPERTIES,
            PrivilegeBits::NONE,
            true,
            false,
        );
        assert_eq!(
            perms,
            Permission::READ | Permission::SET_PROPERTY | Permission::REMOVE_PROPERTY
        );

        let perms = permissions_for(PrivilegeBits::ADD_CHILD_NODES, PrivilegeBits::NONE, true, false);
        assert_eq!(perms, Permission::ADD_NODE);
    }

    #[test]
    fn test_remove_node_needs_parent_privilege_for_allow() {
        let node_only = permissions_for(PrivilegeBits::REMOVE_NODE, PrivilegeBits::NONE, true, false);
        assert!(!node_only.contains(Permission::REMOVE_NODE));

        let both = permissions_for(
            PrivilegeBits::REMOVE_NODE,
            PrivilegeBits::REMOVE_CHILD_NODES,
            true,
            false,
        );
        assert!(both.contains(Permission::REMOVE_NODE));

        let deny_parent = permissions_for(
            PrivilegeBits::NONE,
            PrivilegeBits::REMOVE_CHILD_NODES,
            false,
            false,
        );
        assert!(deny_parent.contains(Permission::REMOVE_NODE));
    }

    #[test]
    fn test_permissions_for_ac_items() {
        let read_only = permissions_for(PrivilegeBits::READ, PrivilegeBits::NONE, true, true);
        assert_eq!(read_only, Permission::NONE);

        let read_ac = permissions_for(PrivilegeBits::READ_AC, PrivilegeBits::NONE, true, true);
        assert_eq!(read_ac, Permission::READ | Permission::READ_AC);

        let modify_ac = permissions_for(PrivilegeBits::MODIFY_AC, PrivilegeBits::NONE, true, true);
        assert!(modify_ac.contains(Permission::SET_PROPERTY | Permission::MODIFY_AC));
        assert!(!modify_ac.contains(Permission::READ));
    }

    #[test]
    fn test_privilege_identity_is_by_name() {
        let registry = PrivilegeRegistry::new();
        let a = registry.get(JCR_READ).unwrap();
        let b = registry.get(JCR_READ).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), JCR_READ);
    }
}
