//! Access control provider
//!
//! Entry point of the engine. It installs the default root policy, owns the
//! entry collector shared by all sessions and compiles permissions for a
//! principal set.

use std::collections::BTreeMap;
use std::sync::Arc;

use canopy_tree::{path, ContentTree, ObservationManager, TreeSession};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::acl::policy_node;
use crate::collector::EntryCollector;
use crate::compiled::{AclPermissions, AllPermissions, CompiledPermissions, ReadOnlyPermissions};
use crate::config::ProviderConfig;
use crate::editor::AclEditor;
use crate::error::{Error, Result};
use crate::permission::Permission;
use crate::principal::{PrincipalManager, PrincipalSet};
use crate::privilege::{PrivilegeRegistry, JCR_ALL, JCR_READ};

/// Capacity of the caches of the evaluator backing `can_access_root`
const ROOT_CHECK_CACHE_CAPACITY: usize = 1;

enum ProviderState {
    Created,
    Initialized(Arc<EntryCollector>),
    Closed,
}

/// Compiles permissions for sessions of one repository
pub struct AccessControlProvider {
    tree: Arc<dyn ContentTree>,
    observation: Arc<dyn ObservationManager>,
    privileges: Arc<PrivilegeRegistry>,
    config: ProviderConfig,
    state: RwLock<ProviderState>,
}

impl AccessControlProvider {
    /// Create a provider; it must be initialized with [`init`](Self::init)
    ///
    /// # Arguments
    /// * `tree` - Persisted view of the repository that policies are read from
    /// * `observation` - Change notifications of the same repository
    /// * `privileges` - Privilege definitions shared with every evaluator
    /// * `config` - Cache capacities and default policy settings
    pub fn new(
        tree: Arc<dyn ContentTree>,
        observation: Arc<dyn ObservationManager>,
        privileges: Arc<PrivilegeRegistry>,
        config: ProviderConfig,
    ) -> Self {
        Self {
            tree,
            observation,
            privileges,
            config,
            state: RwLock::new(ProviderState::Created),
        }
    }

    /// Configuration the provider was created with
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn privileges(&self) -> &Arc<PrivilegeRegistry> {
        &self.privileges
    }

    /// Prepare the provider; may be called once
    ///
    /// Unless disabled, installs the default root policy through
    /// `system_session` when the root has none. A failed installation is
    /// logged and rolled back without failing the initialization.
    ///
    /// # Arguments
    /// * `system_session` - Session the default policy is written and saved with
    /// * `principal_manager` - Used to check that the administrators group exists
    ///
    /// # Returns
    /// `Err(AccessControl)` if already initialized, `Err(NotInitialized)`
    /// after [`close`](Self::close), or the error of subscribing to changes
    pub fn init(
        &self,
        system_session: &dyn TreeSession,
        principal_manager: &dyn PrincipalManager,
    ) -> Result<()> {
        let mut state = self.state.write();
        match *state {
            ProviderState::Created => {}
            ProviderState::Initialized(_) => {
                return Err(Error::AccessControl(
                    "access control provider already initialized".to_string(),
                ))
            }
            ProviderState::Closed => {
                return Err(Error::NotInitialized(
                    "access control provider has been closed".to_string(),
                ))
            }
        }

        // The default policy is saved before the collector subscribes
        if !self.config.omit_default_permission {
            let root = system_session.root()?;
            if policy_node(system_session, &root)?.is_none() {
                if let Err(e) = self.install_default_policy(system_session, principal_manager) {
                    warn!(error = %e, "Failed to install default access control policy");
                    if let Err(e) = system_session.refresh(false) {
                        warn!(error = %e, "Failed to discard default policy changes");
                    }
                }
            }
        }

        let collector = EntryCollector::new(
            self.tree.clone(),
            self.observation.clone(),
            self.privileges.clone(),
            self.config.entries_cache_capacity,
        )?;
        *state = ProviderState::Initialized(Arc::new(collector));
        debug!("Access control provider initialized");
        Ok(())
    }

    fn install_default_policy(
        &self,
        session: &dyn TreeSession,
        principal_manager: &dyn PrincipalManager,
    ) -> Result<()> {
        let editor = AclEditor::new(session, self.privileges.clone());
        let mut acl = editor
            .get_applicable_policy(path::ROOT)?
            .ok_or_else(|| Error::AccessControl("root already has a policy".to_string()))?;

        // Full access for administrators, only if the group exists
        let administrators = &self.config.administrators_principal;
        if principal_manager.has_principal(administrators) {
            acl.add_access_control_entry(
                administrators,
                &self.privileges.get_all(&[JCR_ALL])?,
                true,
                BTreeMap::new(),
            )?;
        } else {
            info!(
                principal = %administrators,
                "Administrators principal does not exist; not granting it access"
            );
        }
        // Read access for everyone
        acl.add_access_control_entry(
            &self.config.everyone_principal,
            &self.privileges.get_all(&[JCR_READ])?,
            true,
            BTreeMap::new(),
        )?;

        editor.set_policy(path::ROOT, &acl)?;
        session.save()?;
        info!(entries = acl.len(), "Installed default access control policy at the root");
        Ok(())
    }

    fn collector(&self) -> Result<Arc<EntryCollector>> {
        match &*self.state.read() {
            ProviderState::Initialized(collector) => Ok(collector.clone()),
            ProviderState::Created => Err(Error::NotInitialized(
                "access control provider not initialized".to_string(),
            )),
            ProviderState::Closed => Err(Error::NotInitialized(
                "access control provider has been closed".to_string(),
            )),
        }
    }

    /// The shared entry collector
    pub fn entry_collector(&self) -> Result<Arc<EntryCollector>> {
        self.collector()
    }

    /// A policy editor over `session`
    pub fn get_editor<'a>(&self, session: &'a dyn TreeSession) -> Result<AclEditor<'a>> {
        self.collector()?;
        Ok(AclEditor::new(session, self.privileges.clone()))
    }

    /// Permission evaluation for `principals`
    ///
    /// # Arguments
    /// * `principals` - Principals of one session, in evaluation order
    ///
    /// # Returns
    /// [`AllPermissions`] when an admin or system principal is present,
    /// [`ReadOnlyPermissions`] for the everyone principal alone, otherwise an
    /// [`AclPermissions`] registered for policy change notifications
    pub fn compile_permissions(
        &self,
        principals: &PrincipalSet,
    ) -> Result<Arc<dyn CompiledPermissions>> {
        let collector = self.collector()?;

        // Fixed evaluators never look at entries
        if principals.is_admin_or_system() {
            return Ok(Arc::new(AllPermissions::new(self.privileges.clone())));
        }
        if principals.is_read_only(&self.config.everyone_principal) {
            return Ok(Arc::new(ReadOnlyPermissions::new(
                self.tree.clone(),
                self.privileges.clone(),
            )));
        }
        Ok(AclPermissions::new(
            principals.clone(),
            self.tree.clone(),
            collector,
            self.privileges.clone(),
            self.config.result_cache_capacity,
            self.config.read_cache_capacity,
        ))
    }

    /// Whether `principals` may read the root node
    ///
    /// Evaluated without caching anything beyond the single check; the
    /// everyone principal alone gets the full evaluation here too.
    pub fn can_access_root(&self, principals: &PrincipalSet) -> Result<bool> {
        let collector = self.collector()?;
        if principals.is_admin_or_system() {
            return Ok(true);
        }
        let permissions = AclPermissions::detached(
            principals.clone(),
            self.tree.clone(),
            collector,
            self.privileges.clone(),
            ROOT_CHECK_CACHE_CAPACITY,
            ROOT_CHECK_CACHE_CAPACITY,
        );
        let granted = permissions.grants(path::ROOT, Permission::READ);
        permissions.close();
        granted
    }

    /// Stop observing the repository; later calls fail with `NotInitialized`
    pub fn close(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.state.write(), ProviderState::Closed);
        if let ProviderState::Initialized(collector) = previous {
            collector.close()?;
            debug!("Access control provider closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::{Principal, StaticPrincipalManager};
    use canopy_tree::MemoryRepository;

    fn provider(repository: &Arc<MemoryRepository>, config: ProviderConfig) -> AccessControlProvider {
        AccessControlProvider::new(
            repository.clone(),
            repository.observation(),
            Arc::new(PrivilegeRegistry::new()),
            config,
        )
    }

    fn managers() -> StaticPrincipalManager {
        StaticPrincipalManager::new(["administrators", "everyone"])
    }

    #[test]
    fn test_init_installs_default_policy() {
        let repository = MemoryRepository::new();
        let provider = provider(&repository, ProviderConfig::default());
        provider.init(&repository.login(), &managers()).unwrap();

        let session = repository.login();
        let policy = provider
            .get_editor(&session)
            .unwrap()
            .get_policy("/")
            .unwrap()
            .unwrap();
        let names: Vec<&str> = policy.entries().iter().map(|e| e.principal_name()).collect();
        assert_eq!(names, vec!["administrators", "everyone"]);
    }

    #[test]
    fn test_default_policy_without_administrators_group() {
        let repository = MemoryRepository::new();
        let provider = provider(&repository, ProviderConfig::default());
        provider
            .init(&repository.login(), &StaticPrincipalManager::new(["everyone"]))
            .unwrap();

        let session = repository.login();
        let policy = provider.get_editor(&session).unwrap().get_policy("/").unwrap().unwrap();
        assert_eq!(policy.len(), 1);
        assert_eq!(policy.entries()[0].principal_name(), "everyone");
    }

    #[test]
    fn test_omit_default_permission() {
        let repository = MemoryRepository::new();
        let config = ProviderConfig {
            omit_default_permission: true,
            ..ProviderConfig::default()
        };
        let provider = provider(&repository, config);
        provider.init(&repository.login(), &managers()).unwrap();
        assert!(repository.resolve("/rep:policy").unwrap().is_none());
    }

    #[test]
    fn test_failed_bootstrap_is_rolled_back() {
        let repository = MemoryRepository::new();
        let system = repository.login();
        let root = system.root().unwrap();
        system.add_node(&root, "pending", "nt:unstructured").unwrap();

        let other = repository.login();
        let root = other.root().unwrap();
        other.add_node(&root, "other", "nt:unstructured").unwrap();
        other.save().unwrap();

        let provider = provider(&repository, ProviderConfig::default());
        provider.init(&system, &managers()).unwrap();

        assert!(!system.has_pending_changes());
        assert!(repository.resolve("/rep:policy").unwrap().is_none());
        assert!(provider.compile_permissions(&PrincipalSet::new([Principal::named("alice")])).is_ok());
    }

    #[test]
    fn test_lifecycle_errors() {
        let repository = MemoryRepository::new();
        let provider = provider(&repository, ProviderConfig::default());
        let alice = PrincipalSet::new([Principal::named("alice")]);

        assert!(matches!(
            provider.compile_permissions(&alice),
            Err(Error::NotInitialized(_))
        ));
        provider.init(&repository.login(), &managers()).unwrap();
        assert!(matches!(
            provider.init(&repository.login(), &managers()),
            Err(Error::AccessControl(_))
        ));

        provider.close().unwrap();
        provider.close().unwrap();
        assert_eq!(repository.observation().subscription_count(), 0);
        assert!(matches!(
            provider.can_access_root(&alice),
            Err(Error::NotInitialized(_))
        ));
        assert!(matches!(
            provider.init(&repository.login(), &managers()),
            Err(Error::NotInitialized(_))
        ));
    }

    #[test]
    fn test_factory_picks_evaluator() {
        let repository = MemoryRepository::new();
        let provider = provider(&repository, ProviderConfig::default());
        provider.init(&repository.login(), &managers()).unwrap();

        let admin = provider
            .compile_permissions(&PrincipalSet::new([Principal::admin("admin")]))
            .unwrap();
        assert!(admin.grants("/rep:policy", Permission::MODIFY_AC).unwrap());

        let everyone = provider
            .compile_permissions(&PrincipalSet::new([Principal::named("everyone")]))
            .unwrap();
        assert!(everyone.grants("/", Permission::READ).unwrap());
        assert!(!everyone.grants("/", Permission::SET_PROPERTY).unwrap());

        let administrators = provider
            .compile_permissions(&PrincipalSet::new([
                Principal::named("bob"),
                Principal::named("administrators"),
            ]))
            .unwrap();
        assert!(administrators
            .grants("/", Permission::READ | Permission::SET_PROPERTY | Permission::MODIFY_AC)
            .unwrap());
        assert!(!administrators.grants("/", Permission::REMOVE_NODE).unwrap());
        assert_eq!(provider.entry_collector().unwrap().listener_count(), 1);
    }

    #[test]
    fn test_can_access_root() {
        let repository = MemoryRepository::new();
        let provider = provider(&repository, ProviderConfig::default());
        provider.init(&repository.login(), &managers()).unwrap();

        assert!(provider
            .can_access_root(&PrincipalSet::new([Principal::named("everyone")]))
            .unwrap());
        assert!(!provider
            .can_access_root(&PrincipalSet::new([Principal::named("stranger")]))
            .unwrap());
        assert!(provider
            .can_access_root(&PrincipalSet::new([Principal::system()]))
            .unwrap());
        assert_eq!(provider.entry_collector().unwrap().listener_count(), 0);
    }
}
