//! Property-based tests for in-memory sessions and event dispatch

use std::sync::Arc;

use canopy_tree::{
    ContentTree, Event, EventFilter, EventKind, EventListener, EventTypes, MemoryRepository,
    ObservationManager, TreeSession, TreeError,
};
use parking_lot::Mutex;
use proptest::prelude::*;

#[derive(Default)]
struct Recorder {
    batches: Mutex<Vec<Vec<Event>>>,
}

impl EventListener for Recorder {
    fn on_event_batch(&self, events: &[Event]) {
        self.batches.lock().push(events.to_vec());
    }
}

fn names_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(r"n[a-z]{1,5}", 1..8).prop_map(|set| set.into_iter().collect())
}

proptest! {
    /// Saved additions arrive as one batch, one event per node, parents first
    #[test]
    fn prop_save_dispatches_one_batch(names in names_strategy()) {
        let repository = MemoryRepository::new();
        let recorder = Arc::new(Recorder::default());
        repository
            .observation()
            .subscribe(EventFilter::new(EventTypes::NODE_ADDED, "/", true), recorder.clone())
            .unwrap();

        let session = repository.login();
        let root = session.root().unwrap();
        let parent = session.add_node(&root, "parent", "nt:unstructured").unwrap();
        for name in &names {
            session.add_node(&parent, name, "nt:unstructured").unwrap();
        }
        prop_assert!(recorder.batches.lock().is_empty());
        session.save().unwrap();

        let batches = recorder.batches.lock();
        prop_assert_eq!(batches.len(), 1);
        prop_assert_eq!(batches[0].len(), names.len() + 1);
        prop_assert_eq!(batches[0][0].path.as_str(), "/parent");
        prop_assert!(batches[0].iter().all(|e| e.kind == EventKind::NodeAdded));
    }

    /// Transient nodes stay invisible to other sessions until saved
    #[test]
    fn prop_transient_changes_are_private(names in names_strategy()) {
        let repository = MemoryRepository::new();
        let writer = repository.login();
        let reader = repository.login();
        let root = writer.root().unwrap();
        for name in &names {
            writer.add_node(&root, name, "nt:unstructured").unwrap();
        }

        for name in &names {
            let path = format!("/{}", name);
            prop_assert!(writer.resolve(&path).unwrap().is_some());
            prop_assert!(reader.resolve(&path).unwrap().is_none());
        }

        writer.save().unwrap();
        for name in &names {
            let path = format!("/{}", name);
            prop_assert!(reader.resolve(&path).unwrap().is_some());
        }
        prop_assert_eq!(reader.get_children(&reader.root().unwrap()).unwrap().len(), names.len());
    }

    /// A session whose base was overtaken cannot save and keeps its changes
    #[test]
    fn prop_stale_save_is_rejected(names in names_strategy()) {
        let repository = MemoryRepository::new();
        let stale = repository.login();
        let root = stale.root().unwrap();
        stale.add_node(&root, "stale", "nt:unstructured").unwrap();

        let fresh = repository.login();
        let root = fresh.root().unwrap();
        for name in &names {
            fresh.add_node(&root, name, "nt:unstructured").unwrap();
        }
        fresh.save().unwrap();

        prop_assert!(matches!(stale.save(), Err(TreeError::InvalidItemState(_))));
        prop_assert!(stale.has_pending_changes());
        stale.refresh(false).unwrap();
        prop_assert!(!stale.has_pending_changes());
        prop_assert!(repository.resolve("/stale").unwrap().is_none());
    }
}
