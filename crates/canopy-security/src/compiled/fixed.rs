//! Evaluators that never consult access control entries

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use canopy_tree::{ContentTree, NodeId};

use super::{locate, CompiledPermissions};
use crate::acl::is_ac_item;
use crate::error::{Error, Result};
use crate::permission::Permission;
use crate::privilege::{Privilege, PrivilegeBits, PrivilegeRegistry};

fn ensure_open(closed: &AtomicBool) -> Result<()> {
    if closed.load(Ordering::Acquire) {
        return Err(Error::NotInitialized(
            "compiled permissions have been closed".to_string(),
        ));
    }
    Ok(())
}

/// Grants everything; used for administrators and the system
pub struct AllPermissions {
    privileges: Arc<PrivilegeRegistry>,
    closed: AtomicBool,
}

impl AllPermissions {
    pub fn new(privileges: Arc<PrivilegeRegistry>) -> Self {
        Self {
            privileges,
            closed: AtomicBool::new(false),
        }
    }
}

impl CompiledPermissions for AllPermissions {
    fn grants(&self, _path: &str, _permissions: Permission) -> Result<bool> {
        ensure_open(&self.closed)?;
        Ok(true)
    }

    fn get_privileges(&self, _path: &str) -> Result<PrivilegeBits> {
        ensure_open(&self.closed)?;
        Ok(self.privileges.all_bits())
    }

    fn get_privilege_set(&self, path: &str) -> Result<BTreeSet<Privilege>> {
        let bits = self.get_privileges(path)?;
        Ok(self.privileges.privileges_for(bits))
    }

    fn can_read(&self, _path: &str, _item_id: Option<&NodeId>) -> Result<bool> {
        ensure_open(&self.closed)?;
        Ok(true)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Read access to everything except access control content
///
/// Used when the only principal is the everyone group.
pub struct ReadOnlyPermissions {
    tree: Arc<dyn ContentTree>,
    privileges: Arc<PrivilegeRegistry>,
    closed: AtomicBool,
}

impl ReadOnlyPermissions {
    pub fn new(tree: Arc<dyn ContentTree>, privileges: Arc<PrivilegeRegistry>) -> Self {
        Self {
            tree,
            privileges,
            closed: AtomicBool::new(false),
        }
    }

    fn is_ac_path(&self, path: &str) -> Result<bool> {
        let node = locate(&*self.tree, path)?;
        is_ac_item(&*self.tree, &node)
    }
}

impl CompiledPermissions for ReadOnlyPermissions {
    fn grants(&self, path: &str, permissions: Permission) -> Result<bool> {
        ensure_open(&self.closed)?;
        if permissions != Permission::READ {
            return Ok(false);
        }
        Ok(!self.is_ac_path(path)?)
    }

    fn get_privileges(&self, path: &str) -> Result<PrivilegeBits> {
        ensure_open(&self.closed)?;
        if self.is_ac_path(path)? {
            Ok(PrivilegeBits::NONE)
        } else {
            Ok(PrivilegeBits::READ)
        }
    }

    fn get_privilege_set(&self, path: &str) -> Result<BTreeSet<Privilege>> {
        let bits = self.get_privileges(path)?;
        Ok(self.privileges.privileges_for(bits))
    }

    fn can_read(&self, path: &str, _item_id: Option<&NodeId>) -> Result<bool> {
        self.grants(path, Permission::READ)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
