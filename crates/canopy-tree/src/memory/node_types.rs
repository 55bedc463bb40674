//! Node type inheritance for the in-memory repository

use std::collections::HashMap;

/// Declared supertypes per node type name
#[derive(Debug, Clone)]
pub struct NodeTypeRegistry {
    supertypes: HashMap<String, Vec<String>>,
}

impl NodeTypeRegistry {
    /// Registry without any declared inheritance
    pub fn empty() -> Self {
        Self {
            supertypes: HashMap::new(),
        }
    }

    /// Declare the direct supertypes of a type, replacing earlier declarations
    pub fn register<I, S>(&mut self, type_name: &str, supertypes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supertypes.insert(
            type_name.to_string(),
            supertypes.into_iter().map(Into::into).collect(),
        );
    }

    /// The given types plus all their transitive supertypes, without duplicates
    pub fn expand<'a, I>(&self, types: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut effective: Vec<String> = Vec::new();
        let mut pending: Vec<String> = types.into_iter().map(str::to_string).collect();
        while let Some(type_name) = pending.pop() {
            if effective.contains(&type_name) {
                continue;
            }
            if let Some(supers) = self.supertypes.get(&type_name) {
                pending.extend(supers.iter().cloned());
            }
            effective.push(type_name);
        }
        effective
    }
}

impl Default for NodeTypeRegistry {
    /// Registry knowing the access control entry hierarchy
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("rep:GrantACE", ["rep:ACE"]);
        registry.register("rep:DenyACE", ["rep:ACE"]);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ace_hierarchy() {
        let registry = NodeTypeRegistry::default();
        let types = registry.expand(["rep:GrantACE"]);
        assert!(types.contains(&"rep:GrantACE".to_string()));
        assert!(types.contains(&"rep:ACE".to_string()));
    }

    #[test]
    fn test_transitive_expansion_without_duplicates() {
        let mut registry = NodeTypeRegistry::empty();
        registry.register("c", ["b"]);
        registry.register("b", ["a"]);
        registry.register("d", ["a"]);
        let types = registry.expand(["c", "d"]);
        assert_eq!(types.len(), 4);
        assert_eq!(types.iter().filter(|t| t.as_str() == "a").count(), 1);
    }
}
