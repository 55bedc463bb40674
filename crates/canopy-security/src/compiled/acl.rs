//! Full evaluation of access control entries

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use canopy_tree::{ContentTree, NodeId};
use parking_lot::Mutex;
use tracing::debug;

use super::{access_controlled_target, evaluate, locate, CompiledPermissions, PermissionResult};
use crate::cache::{BoundedCache, CacheStats};
use crate::collector::{AclChange, AclChangeListener, EntryCollector, ListenerId};
use crate::error::{Error, Result};
use crate::permission::Permission;
use crate::principal::PrincipalSet;
use crate::privilege::{Privilege, PrivilegeBits, PrivilegeRegistry};

pub const DEFAULT_RESULT_CACHE_CAPACITY: usize = 1000;
pub const DEFAULT_READ_CACHE_CAPACITY: usize = 5000;

/// Evaluates the entries of a principal set, caching results per path
///
/// Results are cached by item path, read checks by the id of the owning
/// node. Both caches are cleared whenever the collector reports a policy
/// change. The read cache is always locked before the result cache.
pub struct AclPermissions {
    principals: PrincipalSet,
    tree: Arc<dyn ContentTree>,
    collector: Arc<EntryCollector>,
    privileges: Arc<PrivilegeRegistry>,
    results: Mutex<BoundedCache<String, PermissionResult>>,
    reads: Mutex<BoundedCache<NodeId, bool>>,
    listener: Mutex<Option<ListenerId>>,
    closed: AtomicBool,
}

impl AclPermissions {
    /// Evaluator that follows policy changes reported by `collector`
    ///
    /// # Arguments
    /// * `principals` - Principals of the session, in evaluation order
    /// * `tree` - Persisted view used to locate items
    /// * `collector` - Shared entries cache; the evaluator registers with it
    /// * `privileges` - Registry used to expand privilege bits
    /// * `result_capacity` - Maximum number of cached results per path
    /// * `read_capacity` - Maximum number of cached read checks per node
    ///
    /// # Returns
    /// The evaluator; it unregisters on [`close`](CompiledPermissions::close)
    /// or once dropped
    pub fn new(
        principals: PrincipalSet,
        tree: Arc<dyn ContentTree>,
        collector: Arc<EntryCollector>,
        privileges: Arc<PrivilegeRegistry>,
        result_capacity: usize,
        read_capacity: usize,
    ) -> Arc<Self> {
        let permissions = Self::detached(
            principals,
            tree,
            collector,
            privileges,
            result_capacity,
            read_capacity,
        );
        let listener = Arc::downgrade(&permissions) as Weak<dyn AclChangeListener>;
        let id = permissions.collector.add_listener(listener);
        *permissions.listener.lock() = Some(id);
        permissions
    }

    /// Evaluator that does not listen for policy changes
    ///
    /// Meant for one-off checks; its own caches are never invalidated.
    pub fn detached(
        principals: PrincipalSet,
        tree: Arc<dyn ContentTree>,
        collector: Arc<EntryCollector>,
        privileges: Arc<PrivilegeRegistry>,
        result_capacity: usize,
        read_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            principals,
            tree,
            collector,
            privileges,
            results: Mutex::new(BoundedCache::new(result_capacity)),
            reads: Mutex::new(BoundedCache::new(read_capacity)),
            listener: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Principals this evaluator answers for
    pub fn principals(&self) -> &PrincipalSet {
        &self.principals
    }

    /// Statistics of the result cache
    pub fn cache_stats(&self) -> CacheStats {
        self.results.lock().stats()
    }

    /// Statistics of the read cache
    pub fn read_cache_stats(&self) -> CacheStats {
        self.reads.lock().stats()
    }

    /// Cached result for `path`, computed on a miss
    ///
    /// # Arguments
    /// * `path` - Item path; items that do not exist are evaluated at their
    ///   closest existing ancestor node
    ///
    /// # Returns
    /// The folded result, or the tree or entry error that prevented it
    pub fn get_result(&self, path: &str) -> Result<PermissionResult> {
        self.ensure_open()?;
        let mut results = self.results.lock();
        if let Some(result) = results.get(path) {
            return Ok(result);
        }
        let result = self.build_result(path)?;
        results.put(path.to_string(), result);
        Ok(result)
    }

    fn build_result(&self, path: &str) -> Result<PermissionResult> {
        // AC content is evaluated against the node owning the policy
        let node = locate(&*self.tree, path)?;
        let (target, is_ac_item) = access_controlled_target(&*self.tree, node)?;
        let entries = self.collector.get_entries(&self.principals, &target)?;
        let result = evaluate(&entries, path, target.id(), is_ac_item);
        debug!(
            path = %path,
            entries = entries.len(),
            allows = ?result.allows,
            "Built permission result"
        );
        Ok(result)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::NotInitialized(
                "compiled permissions have been closed".to_string(),
            ));
        }
        Ok(())
    }

    /// Clear both caches as one step
    ///
    /// Both locks are held until both caches are empty, so no read check can
    /// observe one cleared and the other not.
    fn clear_caches(&self) {
        let mut reads = self.reads.lock();
        let mut results = self.results.lock();
        reads.clear();
        results.clear();
    }
}

impl CompiledPermissions for AclPermissions {
    fn grants(&self, path: &str, permissions: Permission) -> Result<bool> {
        Ok(self.get_result(path)?.grants(permissions))
    }

    fn get_privileges(&self, path: &str) -> Result<PrivilegeBits> {
        Ok(self.get_result(path)?.privileges())
    }

    fn get_privilege_set(&self, path: &str) -> Result<BTreeSet<Privilege>> {
        let bits = self.get_privileges(path)?;
        Ok(self.privileges.privileges_for(bits))
    }

    fn can_read(&self, path: &str, item_id: Option<&NodeId>) -> Result<bool> {
        self.ensure_open()?;
        // Answers are per node: properties share the answer of their node
        let owner = match item_id {
            Some(id) => self.tree.node_by_id(id)?,
            None => None,
        };
        let owner = match owner {
            Some(node) => node,
            None => locate(&*self.tree, path)?,
        };

        let mut reads = self.reads.lock();
        if let Some(granted) = reads.get(owner.id()) {
            return Ok(granted);
        }
        let granted = self.get_result(owner.path())?.grants(Permission::READ);
        reads.put(*owner.id(), granted);
        Ok(granted)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(id) = self.listener.lock().take() {
            self.collector.remove_listener(id);
        }
        self.clear_caches();
    }
}

impl AclChangeListener for AclPermissions {
    fn acl_changed(&self, change: &AclChange) {
        debug!(paths = change.len(), "Clearing permission caches");
        self.clear_caches();
    }
}
