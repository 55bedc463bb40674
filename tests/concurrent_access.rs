//! Concurrent permission checks against live policy changes
//!
//! Readers share one provider and entry collector while a writer thread
//! saves policy changes through its own sessions.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use canopy_security::privilege::JCR_READ;
use canopy_security::{
    AccessControlList, AccessControlProvider, AclEditor, CompiledPermissions, Error, Permission,
    Principal, PrincipalSet, PrivilegeRegistry, ProviderConfig, StaticPrincipalManager,
};
use canopy_tree::{ContentTree, MemoryRepository, TreeSession};

const READERS: usize = 8;
const TOGGLES: usize = 40;

fn setup() -> (Arc<MemoryRepository>, Arc<AccessControlProvider>) {
    let repository = MemoryRepository::new();
    let session = repository.login();
    let root = session.root().unwrap();
    let a = session.add_node(&root, "a", "nt:unstructured").unwrap();
    let b = session.add_node(&a, "b", "nt:unstructured").unwrap();
    session.add_node(&b, "c", "nt:unstructured").unwrap();
    session.add_node(&root, "x", "nt:unstructured").unwrap();
    session.save().unwrap();

    let provider = AccessControlProvider::new(
        repository.clone(),
        repository.observation(),
        Arc::new(PrivilegeRegistry::new()),
        ProviderConfig {
            omit_default_permission: true,
            ..ProviderConfig::default()
        },
    );
    provider
        .init(
            &repository.login(),
            &StaticPrincipalManager::new(["administrators", "everyone"]),
        )
        .unwrap();
    (repository, Arc::new(provider))
}

/// Replace the policy of `/a` with a single read entry for alice
fn set_read(repository: &Arc<MemoryRepository>, privileges: &Arc<PrivilegeRegistry>, allow: bool) {
    let session = repository.login();
    let editor = AclEditor::new(&session, privileges.clone());
    let owner = session.resolve("/a").unwrap().unwrap();
    let mut acl = AccessControlList::new(owner);
    acl.add_access_control_entry(
        "alice",
        &privileges.get_all(&[JCR_READ]).unwrap(),
        allow,
        Default::default(),
    )
    .unwrap();
    editor.set_policy("/a", &acl).unwrap();
    session.save().unwrap();
}

fn alice() -> PrincipalSet {
    PrincipalSet::new([Principal::named("alice")])
}

/// Read decision in force once the save of `generation` has returned
///
/// Even generations are settled; generation 0 has no policy at all and
/// toggle `i` allows read when `i` is even.
fn expected_read(generation: usize) -> bool {
    generation != 0 && (generation / 2 - 1) % 2 == 0
}

#[test]
fn test_concurrent_grants_share_one_collector() {
    let (repository, provider) = setup();
    set_read(&repository, provider.privileges(), true);
    let shared = provider.compile_permissions(&alice()).unwrap();
    let misses_before = provider.entry_collector().unwrap().stats().misses;

    let mut handles = vec![];
    for i in 0..READERS {
        let provider = Arc::clone(&provider);
        let shared = Arc::clone(&shared);
        handles.push(thread::spawn(move || {
            let own = provider.compile_permissions(&alice()).unwrap();
            let permissions: &dyn CompiledPermissions = if i % 2 == 0 { &*shared } else { &*own };
            for _ in 0..200 {
                assert!(permissions.grants("/a", Permission::READ).unwrap());
                assert!(permissions.grants("/a/b", Permission::READ).unwrap());
                assert!(permissions.can_read("/a/b/c", None).unwrap());
                assert!(!permissions.grants("/a/b", Permission::SET_PROPERTY).unwrap());
                assert!(!permissions.grants("/x", Permission::READ).unwrap());
            }
            own.close();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // one collection per node, whatever the number of readers
    let collector = provider.entry_collector().unwrap();
    assert_eq!(collector.stats().misses - misses_before, 4);
}

#[test]
fn test_saves_during_lookups_leave_no_stale_results() {
    let (repository, provider) = setup();
    let generation = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));
    let long_lived = provider.compile_permissions(&alice()).unwrap();

    let mut handles = vec![];
    for i in 0..READERS {
        let provider = Arc::clone(&provider);
        let long_lived = Arc::clone(&long_lived);
        let generation = Arc::clone(&generation);
        let done = Arc::clone(&done);
        handles.push(thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                let fresh;
                let permissions: &dyn CompiledPermissions = if i % 2 == 0 {
                    &*long_lived
                } else {
                    fresh = provider.compile_permissions(&alice()).unwrap();
                    &*fresh
                };

                let before = generation.load(Ordering::SeqCst);
                let granted = if i % 4 < 2 {
                    permissions.grants("/a/b", Permission::READ).unwrap()
                } else {
                    permissions.can_read("/a/b", None).unwrap()
                };
                let after = generation.load(Ordering::SeqCst);

                // no save started or finished while checking
                if before == after && before % 2 == 0 {
                    assert_eq!(granted, expected_read(before), "generation {}", before);
                }
            }
        }));
    }

    let writer = {
        let repository = Arc::clone(&repository);
        let privileges = Arc::clone(provider.privileges());
        let generation = Arc::clone(&generation);
        thread::spawn(move || {
            for toggle in 0..TOGGLES {
                generation.store(2 * toggle + 1, Ordering::SeqCst);
                set_read(&repository, &privileges, toggle % 2 == 0);
                generation.store(2 * toggle + 2, Ordering::SeqCst);
                thread::yield_now();
            }
        })
    };

    writer.join().unwrap();
    done.store(true, Ordering::SeqCst);
    for handle in handles {
        handle.join().unwrap();
    }

    let last = expected_read(2 * TOGGLES);
    assert_eq!(long_lived.grants("/a/b", Permission::READ).unwrap(), last);
    assert_eq!(long_lived.can_read("/a/b", None).unwrap(), last);
    let fresh = provider.compile_permissions(&alice()).unwrap();
    assert_eq!(fresh.grants("/a/b/c", Permission::READ).unwrap(), last);
}

#[test]
fn test_listener_churn_during_broadcasts() {
    let (repository, provider) = setup();
    let done = Arc::new(AtomicBool::new(false));

    let mut handles = vec![];
    for i in 0..READERS {
        let provider = Arc::clone(&provider);
        let done = Arc::clone(&done);
        handles.push(thread::spawn(move || {
            let mut round = 0;
            while !done.load(Ordering::SeqCst) {
                let permissions = provider.compile_permissions(&alice()).unwrap();
                permissions.grants("/a/b", Permission::READ).unwrap();
                // half the evaluators unregister, the rest are just dropped
                if (i + round) % 2 == 0 {
                    permissions.close();
                }
                round += 1;
            }
        }));
    }

    for toggle in 0..TOGGLES {
        set_read(&repository, provider.privileges(), toggle % 2 == 0);
    }
    done.store(true, Ordering::SeqCst);
    for handle in handles {
        handle.join().unwrap();
    }

    // the next broadcast prunes the dropped evaluators
    set_read(&repository, provider.privileges(), true);
    assert_eq!(provider.entry_collector().unwrap().listener_count(), 0);
}

#[test]
fn test_close_while_saving() {
    let (repository, provider) = setup();
    let permissions = provider.compile_permissions(&alice()).unwrap();

    let writer = {
        let repository = Arc::clone(&repository);
        let privileges = Arc::clone(provider.privileges());
        thread::spawn(move || {
            for toggle in 0..TOGGLES {
                set_read(&repository, &privileges, toggle % 2 == 0);
            }
        })
    };

    permissions.grants("/a/b", Permission::READ).unwrap();
    provider.close().unwrap();
    writer.join().unwrap();

    assert!(matches!(
        provider.compile_permissions(&alice()),
        Err(Error::NotInitialized(_))
    ));
    assert!(repository.resolve("/a/rep:policy").unwrap().is_some());
    permissions.close();
}
