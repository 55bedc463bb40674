use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use canopy_security::compiled::evaluate;
use canopy_security::glob::GlobPattern;
use canopy_security::privilege::{JCR_READ, JCR_WRITE};
use canopy_security::{
    AccessControlEntry, AccessControlProvider, Permission, Principal, PrincipalSet,
    PrivilegeRegistry, ProviderConfig, StaticPrincipalManager,
};
use canopy_tree::{ContentTree, MemoryRepository, NodeHandle, NodeId, TreeSession};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Repository with a chain of `depth` nodes under `/n0`, each carrying a policy
fn policy_chain(depth: usize) -> (Arc<MemoryRepository>, AccessControlProvider, String) {
    let repository = MemoryRepository::new();
    let session = repository.login();
    let mut node = session.root().unwrap();
    let mut paths = Vec::new();
    for i in 0..depth {
        node = session.add_node(&node, &format!("n{}", i), "nt:unstructured").unwrap();
        paths.push(node.path().to_string());
    }
    session.save().unwrap();

    let provider = AccessControlProvider::new(
        repository.clone(),
        repository.observation(),
        Arc::new(PrivilegeRegistry::new()),
        ProviderConfig::default(),
    );
    provider
        .init(
            &repository.login(),
            &StaticPrincipalManager::new(["administrators", "everyone"]),
        )
        .unwrap();

    let session = repository.login();
    let editor = provider.get_editor(&session).unwrap();
    let privileges = provider.privileges().get_all(&[JCR_READ, JCR_WRITE]).unwrap();
    for (i, path) in paths.iter().enumerate() {
        let mut acl = editor.get_applicable_policy(path).unwrap().unwrap();
        acl.add_access_control_entry(
            &format!("group{}", i % 4),
            &privileges,
            i % 2 == 0,
            BTreeMap::new(),
        )
        .unwrap();
        editor.set_policy(path, &acl).unwrap();
    }
    session.save().unwrap();

    let leaf = paths.last().cloned().unwrap_or_else(|| "/".to_string());
    (repository, provider, leaf)
}

fn principals() -> PrincipalSet {
    ["alice", "group0", "group1", "group2", "group3", "everyone"]
        .into_iter()
        .map(Principal::named)
        .collect()
}

// ============================================================================
// Benchmark 1: Cached grants
// ============================================================================

fn benchmark_cached_grants(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached_grants");
    group.sample_size(100);

    for depth in [1, 8, 32].iter() {
        let (_repository, provider, leaf) = policy_chain(*depth);
        let permissions = provider.compile_permissions(&principals()).unwrap();
        permissions.grants(&leaf, Permission::READ).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(depth), &leaf, |b, leaf| {
            b.iter(|| {
                let _ = permissions.grants(black_box(leaf), black_box(Permission::READ));
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark 2: Fresh evaluator over a warm entry cache
// ============================================================================

fn benchmark_fresh_evaluator(c: &mut Criterion) {
    let mut group = c.benchmark_group("fresh_evaluator");
    group.sample_size(50);

    for depth in [1, 8, 32].iter() {
        let (_repository, provider, leaf) = policy_chain(*depth);

        group.bench_with_input(BenchmarkId::from_parameter(depth), &leaf, |b, leaf| {
            b.iter(|| {
                let permissions = provider.compile_permissions(&principals()).unwrap();
                let _ = permissions.grants(black_box(leaf), black_box(Permission::SET_PROPERTY));
                permissions.close();
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark 3: Entry fold
// ============================================================================

fn benchmark_entry_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("entry_fold");
    group.sample_size(100);

    let registry = PrivilegeRegistry::new();
    let privileges = registry.get_all(&[JCR_READ, JCR_WRITE]).unwrap();
    let parent = NodeHandle::new(NodeId::new(), "/a");
    let node = NodeHandle::new(NodeId::new(), "/a/b");

    for count in [10, 100, 1000].iter() {
        let entries: Vec<AccessControlEntry> = (0..*count)
            .map(|i| {
                let defining = if i % 3 == 0 { &node } else { &parent };
                AccessControlEntry::new(
                    &format!("p{}", i % 7),
                    &privileges,
                    i % 2 == 0,
                    BTreeMap::new(),
                    defining,
                )
                .unwrap()
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &entries, |b, entries| {
            b.iter(|| evaluate(black_box(entries), "/a/b", node.id(), false));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark 4: Glob restriction matching
// ============================================================================

fn benchmark_glob_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("glob_matching");
    group.sample_size(100);

    let patterns = vec![
        ("subtree", None),
        ("empty", Some("")),
        ("suffix", Some("*/content")),
        ("nested", Some("/*/b/*/d")),
    ];

    for (name, restriction) in patterns {
        let pattern = GlobPattern::new("/a", restriction);
        group.bench_with_input(BenchmarkId::from_parameter(name), &pattern, |b, pattern| {
            b.iter(|| pattern.matches(black_box("/a/x/b/y/d/content")));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_cached_grants,
    benchmark_fresh_evaluator,
    benchmark_entry_fold,
    benchmark_glob_matching,
);

criterion_main!(benches);
