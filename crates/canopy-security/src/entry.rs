//! Access control entries

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use canopy_tree::{NodeHandle, NodeId, Value};

use crate::error::{Error, Result};
use crate::glob::{GlobPattern, GLOB_RESTRICTION};
use crate::privilege::{Privilege, PrivilegeBits, PrivilegeRegistry};

/// One principal's allow or deny of a set of privileges
///
/// Entries are immutable once built. Equality and hashing cover the
/// principal, the privilege bits, the allow flag and the restrictions; the
/// node that defines the entry does not take part.
#[derive(Debug, Clone)]
pub struct AccessControlEntry {
    principal_name: String,
    privileges: Vec<Privilege>,
    privilege_bits: PrivilegeBits,
    is_allow: bool,
    restrictions: BTreeMap<String, Value>,
    defining_node_id: NodeId,
    pattern: GlobPattern,
}

impl AccessControlEntry {
    /// Build an entry defined by the access-controlled node `defining_node`
    ///
    /// Fails with `InvalidEntry` for an empty principal name, an empty
    /// privilege list, an abstract privilege, or a malformed glob.
    pub fn new(
        principal_name: &str,
        privileges: &[Privilege],
        is_allow: bool,
        restrictions: BTreeMap<String, Value>,
        defining_node: &NodeHandle,
    ) -> Result<Self> {
        if principal_name.is_empty() {
            return Err(Error::InvalidEntry("principal name is empty".to_string()));
        }
        if privileges.is_empty() {
            return Err(Error::InvalidEntry(format!(
                "no privileges for principal {}",
                principal_name
            )));
        }
        if let Some(abstract_privilege) = privileges.iter().find(|p| p.is_abstract()) {
            return Err(Error::InvalidEntry(format!(
                "abstract privilege {} cannot be used in an entry",
                abstract_privilege.name()
            )));
        }

        let glob = match restrictions.get(GLOB_RESTRICTION) {
            None => None,
            Some(value) => {
                let glob = value.as_str().ok_or_else(|| {
                    Error::InvalidEntry(format!("{} must be a string", GLOB_RESTRICTION))
                })?;
                GlobPattern::validate(glob)?;
                Some(glob)
            }
        };
        let pattern = GlobPattern::new(defining_node.path(), glob);

        let mut privileges = privileges.to_vec();
        privileges.sort();
        privileges.dedup();

        Ok(Self {
            principal_name: principal_name.to_string(),
            privilege_bits: PrivilegeRegistry::bits_of(&privileges),
            privileges,
            is_allow,
            restrictions,
            defining_node_id: *defining_node.id(),
            pattern,
        })
    }

    pub fn principal_name(&self) -> &str {
        &self.principal_name
    }

    /// Privileges in name order
    pub fn privileges(&self) -> &[Privilege] {
        &self.privileges
    }

    pub fn privilege_bits(&self) -> PrivilegeBits {
        self.privilege_bits
    }

    pub fn is_allow(&self) -> bool {
        self.is_allow
    }

    pub fn restrictions(&self) -> &BTreeMap<String, Value> {
        &self.restrictions
    }

    pub fn restriction(&self, name: &str) -> Option<&Value> {
        self.restrictions.get(name)
    }

    pub fn defining_node_id(&self) -> &NodeId {
        &self.defining_node_id
    }

    /// Whether the entry is defined on the node under evaluation
    pub fn is_local(&self, node_id: &NodeId) -> bool {
        self.defining_node_id == *node_id
    }

    /// Whether the restrictions let this entry apply to `item_path`
    pub fn matches(&self, item_path: &str) -> bool {
        self.pattern.matches(item_path)
    }
}

impl PartialEq for AccessControlEntry {
    fn eq(&self, other: &Self) -> bool {
        self.principal_name == other.principal_name
            && self.privilege_bits == other.privilege_bits
            && self.is_allow == other.is_allow
            && self.restrictions == other.restrictions
    }
}

impl Eq for AccessControlEntry {}

impl Hash for AccessControlEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.principal_name.hash(state);
        self.privilege_bits.hash(state);
        self.is_allow.hash(state);
        self.restrictions.hash(state);
    }
}
