//! Reading and editing the policies stored in a session

use std::sync::Arc;

use canopy_tree::{NodeHandle, TreeSession};
use tracing::debug;

use crate::acl::{is_ac_item, policy_node, read_acl, write_acl, AccessControlList};
use crate::error::{Error, Result};
use crate::privilege::PrivilegeRegistry;

/// Policy editor bound to one session
///
/// Edits are transient until the session is saved.
pub struct AclEditor<'a> {
    session: &'a dyn TreeSession,
    privileges: Arc<PrivilegeRegistry>,
}

impl<'a> AclEditor<'a> {
    pub fn new(session: &'a dyn TreeSession, privileges: Arc<PrivilegeRegistry>) -> Self {
        Self {
            session,
            privileges,
        }
    }

    /// The policy stored on the node at `path`
    pub fn get_policy(&self, path: &str) -> Result<Option<AccessControlList>> {
        let node = self.target(path)?;
        read_acl(self.session, &node, &self.privileges)
    }

    /// A new empty policy for `path`, or `None` if the node already has one
    pub fn get_applicable_policy(&self, path: &str) -> Result<Option<AccessControlList>> {
        let node = self.target(path)?;
        if policy_node(self.session, &node)?.is_some() {
            return Ok(None);
        }
        Ok(Some(AccessControlList::new(node)))
    }

    /// Store `acl` as the policy of the node at `path`, replacing any existing one
    pub fn set_policy(&self, path: &str, acl: &AccessControlList) -> Result<()> {
        let node = self.target(path)?;
        if acl.owner_path() != node.path() {
            return Err(Error::AccessControl(format!(
                "policy of {} cannot be set on {}",
                acl.owner_path(),
                path
            )));
        }
        write_acl(self.session, acl)
    }

    /// Remove the policy of the node at `path`
    pub fn remove_policy(&self, path: &str) -> Result<()> {
        let node = self.target(path)?;
        let policy = policy_node(self.session, &node)?.ok_or_else(|| {
            Error::AccessControl(format!("no policy to remove at {}", path))
        })?;
        self.session.remove_node(&policy)?;
        debug!(path = %path, "Removed access control list");
        Ok(())
    }

    fn target(&self, path: &str) -> Result<NodeHandle> {
        let node = self
            .session
            .resolve(path)?
            .ok_or_else(|| Error::ItemNotFound(path.to_string()))?;
        if is_ac_item(self.session, &node)? {
            return Err(Error::AccessControl(format!(
                "{} is access control content",
                path
            )));
        }
        Ok(node)
    }
}
