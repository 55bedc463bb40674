//! Access control lists and their layout in the content tree
//!
//! An access-controlled node carries the `rep:AccessControllable` mixin and a
//! `rep:policy` child of type `rep:ACL`. Each entry is a child of the policy
//! node typed `rep:GrantACE` or `rep:DenyACE`.

use std::collections::{BTreeMap, HashSet};

use canopy_tree::{ContentTree, NodeHandle, TreeSession, Value};
use tracing::debug;

use crate::entry::AccessControlEntry;
use crate::error::{Error, Result};
use crate::privilege::{Privilege, PrivilegeRegistry};

pub const NT_ACCESS_CONTROLLABLE: &str = "rep:AccessControllable";
pub const NT_ACL: &str = "rep:ACL";
pub const NT_ACE: &str = "rep:ACE";
pub const NT_GRANT_ACE: &str = "rep:GrantACE";
pub const NT_DENY_ACE: &str = "rep:DenyACE";
/// Name of the child node holding a node's ACL
pub const POLICY_NODE: &str = "rep:policy";
pub const PRINCIPAL_NAME_PROPERTY: &str = "rep:principalName";
pub const PRIVILEGES_PROPERTY: &str = "rep:privileges";

/// Ordered entries of the policy of one access-controlled node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControlList {
    owner: NodeHandle,
    entries: Vec<AccessControlEntry>,
}

impl AccessControlList {
    /// An empty list for `owner`
    pub fn new(owner: NodeHandle) -> Self {
        Self {
            owner,
            entries: Vec::new(),
        }
    }

    pub fn owner(&self) -> &NodeHandle {
        &self.owner
    }

    pub fn owner_path(&self) -> &str {
        self.owner.path()
    }

    pub fn entries(&self) -> &[AccessControlEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry; returns `false` when an equal entry is already listed
    pub fn add_entry(&mut self, entry: AccessControlEntry) -> bool {
        if self.entries.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Build an entry defined by the owner and append it
    pub fn add_access_control_entry(
        &mut self,
        principal_name: &str,
        privileges: &[Privilege],
        is_allow: bool,
        restrictions: BTreeMap<String, Value>,
    ) -> Result<bool> {
        let entry =
            AccessControlEntry::new(principal_name, privileges, is_allow, restrictions, &self.owner)?;
        Ok(self.add_entry(entry))
    }

    /// Remove an entry; returns `false` when it is not listed
    pub fn remove_entry(&mut self, entry: &AccessControlEntry) -> bool {
        match self.entries.iter().position(|e| e == entry) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Whether a node is part of access control content
pub fn is_ac_item<T: ContentTree + ?Sized>(tree: &T, node: &NodeHandle) -> Result<bool> {
    Ok(tree.is_type(node, NT_ACL)? || tree.is_type(node, NT_ACE)?)
}

/// The `rep:policy` node of `owner`, if it carries one
pub fn policy_node<T: ContentTree + ?Sized>(
    tree: &T,
    owner: &NodeHandle,
) -> Result<Option<NodeHandle>> {
    if !tree.is_type(owner, NT_ACCESS_CONTROLLABLE)? {
        return Ok(None);
    }
    match tree.get_child(owner, POLICY_NODE)? {
        Some(policy) if tree.is_type(&policy, NT_ACL)? => Ok(Some(policy)),
        _ => Ok(None),
    }
}

/// Parse the ACL stored below `owner`
///
/// Returns `None` when the node is not access controlled. A malformed entry
/// aborts the parse.
pub fn read_acl<T: ContentTree + ?Sized>(
    tree: &T,
    owner: &NodeHandle,
    privileges: &PrivilegeRegistry,
) -> Result<Option<AccessControlList>> {
    let Some(policy) = policy_node(tree, owner)? else {
        return Ok(None);
    };

    let mut acl = AccessControlList::new(owner.clone());
    for ace in tree.get_children(&policy)? {
        if !tree.is_type(&ace, NT_ACE)? {
            continue;
        }
        acl.add_entry(read_entry(tree, owner, &ace, privileges)?);
    }
    Ok(Some(acl))
}

fn read_entry<T: ContentTree + ?Sized>(
    tree: &T,
    owner: &NodeHandle,
    ace: &NodeHandle,
    privileges: &PrivilegeRegistry,
) -> Result<AccessControlEntry> {
    let principal = tree
        .get_property_value(ace, PRINCIPAL_NAME_PROPERTY)?
        .and_then(|value| value.as_str().map(str::to_string))
        .ok_or_else(|| {
            Error::InvalidEntry(format!("{} has no {}", ace.path(), PRINCIPAL_NAME_PROPERTY))
        })?;

    let privilege_names = tree.get_property_value(ace, PRIVILEGES_PROPERTY)?;
    let privilege_names = privilege_names
        .as_ref()
        .and_then(Value::as_strings)
        .ok_or_else(|| {
            Error::InvalidEntry(format!("{} has no {}", ace.path(), PRIVILEGES_PROPERTY))
        })?;
    let entry_privileges = privileges.get_all(&privilege_names)?;

    let mut restrictions = BTreeMap::new();
    for name in tree.property_names(ace)? {
        if name == PRINCIPAL_NAME_PROPERTY || name == PRIVILEGES_PROPERTY || name.starts_with("jcr:")
        {
            continue;
        }
        if let Some(value) = tree.get_property_value(ace, &name)? {
            restrictions.insert(name, value);
        }
    }

    let is_allow = tree.is_type(ace, NT_GRANT_ACE)?;
    AccessControlEntry::new(&principal, &entry_privileges, is_allow, restrictions, owner)
}

/// Replace the stored policy of the list's owner with the list's entries
///
/// Changes stay transient in `session`.
pub fn write_acl<S: TreeSession + ?Sized>(session: &S, acl: &AccessControlList) -> Result<()> {
    let owner = acl.owner();
    if !session.is_type(owner, NT_ACCESS_CONTROLLABLE)? {
        session.add_mixin(owner, NT_ACCESS_CONTROLLABLE)?;
    }
    if let Some(existing) = session.get_child(owner, POLICY_NODE)? {
        session.remove_node(&existing)?;
    }
    let policy = session.add_node(owner, POLICY_NODE, NT_ACL)?;

    let mut used = HashSet::new();
    for (index, entry) in acl.entries().iter().enumerate() {
        let (base, node_type) = if entry.is_allow() {
            ("allow", NT_GRANT_ACE)
        } else {
            ("deny", NT_DENY_ACE)
        };
        let mut name = base.to_string();
        let mut suffix = index;
        while used.contains(&name) {
            name = format!("{}{}", base, suffix);
            suffix += 1;
        }
        used.insert(name.clone());

        let ace = session.add_node(&policy, &name, node_type)?;
        session.set_property(
            &ace,
            PRINCIPAL_NAME_PROPERTY,
            Value::String(entry.principal_name().to_string()),
        )?;
        session.set_property(
            &ace,
            PRIVILEGES_PROPERTY,
            Value::Names(
                entry
                    .privileges()
                    .iter()
                    .map(|p| p.name().to_string())
                    .collect(),
            ),
        )?;
        for (restriction, value) in entry.restrictions() {
            session.set_property(&ace, restriction, value.clone())?;
        }
    }

    debug!(path = %owner.path(), entries = acl.len(), "Wrote access control list");
    Ok(())
}
