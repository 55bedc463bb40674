//! Node storage shared by the persisted repository state and session working copies

use std::collections::{BTreeMap, HashMap};

use super::node_types::NodeTypeRegistry;
use crate::error::{Result, TreeError};
use crate::node::{NodeHandle, NodeId};
use crate::observation::{Event, EventKind};
use crate::path;
use crate::value::Value;

/// Name of the pseudo property reported when the mixins of a node change
pub const MIXIN_TYPES_PROPERTY: &str = "jcr:mixinTypes";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NodeRecord {
    pub id: NodeId,
    pub name: String,
    pub parent: Option<NodeId>,
    pub primary_type: String,
    pub mixins: Vec<String>,
    pub properties: BTreeMap<String, Value>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub(crate) struct Store {
    nodes: HashMap<NodeId, NodeRecord>,
    root: NodeId,
    pub revision: u64,
}

impl Store {
    pub fn new(root_type: &str) -> Self {
        let root = NodeId::new();
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            NodeRecord {
                id: root,
                name: String::new(),
                parent: None,
                primary_type: root_type.to_string(),
                mixins: Vec::new(),
                properties: BTreeMap::new(),
                children: Vec::new(),
            },
        );
        Self {
            nodes,
            root,
            revision: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    #[cfg(test)]
    pub fn record(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    pub fn require(&self, id: &NodeId) -> Result<&NodeRecord> {
        self.nodes
            .get(id)
            .ok_or_else(|| TreeError::ItemNotFound(format!("node {}", id)))
    }

    fn require_mut(&mut self, id: &NodeId) -> Result<&mut NodeRecord> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| TreeError::ItemNotFound(format!("node {}", id)))
    }

    pub fn path_of(&self, id: &NodeId) -> Option<String> {
        let mut segments = Vec::new();
        let mut current = self.nodes.get(id)?;
        while let Some(parent) = current.parent {
            segments.push(current.name.as_str());
            current = self.nodes.get(&parent)?;
        }
        segments.reverse();
        Some(format!("/{}", segments.join("/")))
    }

    pub fn handle(&self, id: &NodeId) -> Option<NodeHandle> {
        self.path_of(id).map(|p| NodeHandle::new(*id, p))
    }

    pub fn require_handle(&self, id: &NodeId) -> Result<NodeHandle> {
        self.handle(id)
            .ok_or_else(|| TreeError::ItemNotFound(format!("node {}", id)))
    }

    pub fn child(&self, id: &NodeId, name: &str) -> Option<NodeId> {
        let record = self.nodes.get(id)?;
        record
            .children
            .iter()
            .find(|child| self.nodes.get(child).is_some_and(|c| c.name == name))
            .copied()
    }

    pub fn resolve(&self, path: &str) -> Result<Option<NodeId>> {
        path::validate(path)?;
        if path == path::ROOT {
            return Ok(Some(self.root));
        }
        let mut current = self.root;
        for segment in path[1..].split('/') {
            match self.child(&current, segment) {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    pub fn effective_types(&self, id: &NodeId, node_types: &NodeTypeRegistry) -> Vec<String> {
        match self.nodes.get(id) {
            Some(record) => node_types.expand(
                std::iter::once(record.primary_type.as_str())
                    .chain(record.mixins.iter().map(String::as_str)),
            ),
            None => Vec::new(),
        }
    }

    pub fn add_node(&mut self, parent: &NodeId, name: &str, primary_type: &str) -> Result<NodeId> {
        path::validate_name(name)?;
        self.require(parent)?;
        if self.child(parent, name).is_some() {
            let parent_path = self.path_of(parent).unwrap_or_default();
            return Err(TreeError::ItemExists(path::join(&parent_path, name)));
        }

        let id = NodeId::new();
        self.nodes.insert(
            id,
            NodeRecord {
                id,
                name: name.to_string(),
                parent: Some(*parent),
                primary_type: primary_type.to_string(),
                mixins: Vec::new(),
                properties: BTreeMap::new(),
                children: Vec::new(),
            },
        );
        self.require_mut(parent)?.children.push(id);
        Ok(id)
    }

    pub fn remove_node(&mut self, id: &NodeId) -> Result<()> {
        let record = self.require(id)?;
        let Some(parent) = record.parent else {
            return Err(TreeError::ConstraintViolation(
                "the root node cannot be removed".to_string(),
            ));
        };

        let mut pending = vec![*id];
        while let Some(next) = pending.pop() {
            if let Some(removed) = self.nodes.remove(&next) {
                pending.extend(removed.children);
            }
        }
        self.require_mut(&parent)?.children.retain(|child| child != id);
        Ok(())
    }

    pub fn add_mixin(&mut self, id: &NodeId, mixin: &str) -> Result<()> {
        let record = self.require_mut(id)?;
        if !record.mixins.iter().any(|m| m == mixin) {
            record.mixins.push(mixin.to_string());
        }
        Ok(())
    }

    pub fn set_property(&mut self, id: &NodeId, name: &str, value: Value) -> Result<()> {
        path::validate_name(name)?;
        if name == MIXIN_TYPES_PROPERTY {
            return Err(TreeError::ConstraintViolation(format!(
                "{} is protected",
                MIXIN_TYPES_PROPERTY
            )));
        }
        self.require_mut(id)?
            .properties
            .insert(name.to_string(), value);
        Ok(())
    }

    pub fn remove_property(&mut self, id: &NodeId, name: &str) -> Result<bool> {
        Ok(self.require_mut(id)?.properties.remove(name).is_some())
    }

    /// Events describing the transition from `self` (persisted) to `next`
    ///
    /// Removals come first, then additions parent before child, then
    /// property changes on nodes present in both states.
    pub fn diff(&self, next: &Store, node_types: &NodeTypeRegistry) -> Vec<Event> {
        let mut removed: Vec<Event> = Vec::new();
        let mut added: Vec<Event> = Vec::new();
        let mut properties: Vec<Event> = Vec::new();

        for (id, record) in &self.nodes {
            if next.nodes.contains_key(id) {
                continue;
            }
            let (Some(path), Some(parent)) = (self.path_of(id), record.parent) else {
                continue;
            };
            removed.push(Event::new(
                EventKind::NodeRemoved,
                path,
                *id,
                self.effective_types(&parent, node_types),
            ));
        }

        for (id, record) in &next.nodes {
            let Some(path) = next.path_of(id) else {
                continue;
            };
            match self.nodes.get(id) {
                None => {
                    let Some(parent) = record.parent else {
                        continue;
                    };
                    added.push(Event::new(
                        EventKind::NodeAdded,
                        path.clone(),
                        *id,
                        next.effective_types(&parent, node_types),
                    ));
                    let own_types = next.effective_types(id, node_types);
                    if !record.mixins.is_empty() {
                        properties.push(Event::new(
                            EventKind::PropertyAdded,
                            path::join(&path, MIXIN_TYPES_PROPERTY),
                            *id,
                            own_types.clone(),
                        ));
                    }
                    for name in record.properties.keys() {
                        properties.push(Event::new(
                            EventKind::PropertyAdded,
                            path::join(&path, name),
                            *id,
                            own_types.clone(),
                        ));
                    }
                }
                Some(previous) => {
                    property_events(previous, record, &path, next, node_types, &mut properties);
                }
            }
        }

        removed.sort_by(|a, b| a.path.cmp(&b.path));
        added.sort_by(|a, b| {
            path::depth(&a.path)
                .cmp(&path::depth(&b.path))
                .then_with(|| a.path.cmp(&b.path))
        });
        properties.sort_by(|a, b| a.path.cmp(&b.path));

        removed.into_iter().chain(added).chain(properties).collect()
    }
}

fn property_events(
    previous: &NodeRecord,
    current: &NodeRecord,
    node_path: &str,
    next: &Store,
    node_types: &NodeTypeRegistry,
    out: &mut Vec<Event>,
) {
    if previous.properties == current.properties && previous.mixins == current.mixins {
        return;
    }
    let own_types = next.effective_types(&current.id, node_types);
    let mut push = |kind: EventKind, name: &str| {
        out.push(Event::new(
            kind,
            path::join(node_path, name),
            current.id,
            own_types.clone(),
        ));
    };

    if previous.mixins != current.mixins {
        if previous.mixins.is_empty() {
            push(EventKind::PropertyAdded, MIXIN_TYPES_PROPERTY);
        } else if current.mixins.is_empty() {
            push(EventKind::PropertyRemoved, MIXIN_TYPES_PROPERTY);
        } else {
            push(EventKind::PropertyChanged, MIXIN_TYPES_PROPERTY);
        }
    }
    for (name, value) in &current.properties {
        match previous.properties.get(name) {
            None => push(EventKind::PropertyAdded, name),
            Some(old) if old != value => push(EventKind::PropertyChanged, name),
            Some(_) => {}
        }
    }
    for name in previous.properties.keys() {
        if !current.properties.contains_key(name) {
            push(EventKind::PropertyRemoved, name);
        }
    }
}
