//! Principals and ordered principal sets

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// What a principal is, resolved once when the session's principals are gathered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    /// The repository administrator; bypasses all access control
    Admin,
    /// Internal system access; bypasses all access control
    System,
    /// Any other user or group
    Named,
}

/// An authenticated identity an entry can refer to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
    pub kind: PrincipalKind,
}

impl Principal {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PrincipalKind::Named,
        }
    }

    pub fn admin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PrincipalKind::Admin,
        }
    }

    pub fn system() -> Self {
        Self {
            name: "system".to_string(),
            kind: PrincipalKind::System,
        }
    }

    pub fn is_admin_or_system(&self) -> bool {
        matches!(self.kind, PrincipalKind::Admin | PrincipalKind::System)
    }
}

/// Principals of one session in priority order
///
/// The iteration order decides which principal's entries take precedence
/// during evaluation, so two sets with the same members in a different
/// order are different sets. Duplicate names keep their first position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PrincipalSet {
    principals: Vec<Principal>,
}

impl PrincipalSet {
    pub fn new<I>(principals: I) -> Self
    where
        I: IntoIterator<Item = Principal>,
    {
        let mut set = Self::default();
        for principal in principals {
            set.push(principal);
        }
        set
    }

    /// Append a principal; returns `false` if its name is already present
    pub fn push(&mut self, principal: Principal) -> bool {
        if self.contains(&principal.name) {
            return false;
        }
        self.principals.push(principal);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.principals.iter().any(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Principal> {
        self.principals.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.principals.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }

    /// Cache key of the set: names concatenated in iteration order, each
    /// prefixed with its length so distinct sets never share a key
    pub fn signature(&self) -> String {
        self.principals
            .iter()
            .map(|p| format!("{}:{}", p.name.len(), p.name))
            .collect()
    }

    pub fn is_admin_or_system(&self) -> bool {
        self.principals.iter().any(Principal::is_admin_or_system)
    }

    /// Whether the set is exactly the everyone principal alone
    pub fn is_read_only(&self, everyone: &str) -> bool {
        matches!(self.principals.as_slice(), [only] if only.name == everyone && only.kind == PrincipalKind::Named)
    }
}

impl FromIterator<Principal> for PrincipalSet {
    fn from_iter<I: IntoIterator<Item = Principal>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Knows which principals exist in the repository
pub trait PrincipalManager: Send + Sync {
    fn has_principal(&self, name: &str) -> bool;
}

/// Principal manager backed by a fixed list of names
#[derive(Debug, Clone, Default)]
pub struct StaticPrincipalManager {
    names: BTreeSet<String>,
}

impl StaticPrincipalManager {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl PrincipalManager for StaticPrincipalManager {
    fn has_principal(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}
