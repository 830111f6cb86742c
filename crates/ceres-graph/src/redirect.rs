//! Type redirects ("API update" table)
//!
//! When a node type is renamed or moved, a redirect maps the old identity to
//! the new one so previously persisted graphs keep loading. Redirects are
//! consulted before the literal persisted type.
//!
//! ```ignore
//! inventory::submit!(ceres_graph::TypeRedirect {
//!     from: "Game.Nodes.OldBranch",
//!     to: "Ceres.Flow.Branch",
//! });
//! ```

use std::collections::HashMap;

use crate::types::TypeIdentity;

/// Link-time redirect registration collected through `inventory`
pub struct TypeRedirect {
    /// Old type identity string
    pub from: &'static str,
    /// New type identity string
    pub to: &'static str,
}

inventory::collect!(TypeRedirect);

/// Old identity -> new identity mapping
#[derive(Debug, Clone, Default)]
pub struct TypeRedirects {
    // keyed by `Namespace.Class`; several entries may differ by assembly
    entries: HashMap<String, Vec<(TypeIdentity, TypeIdentity)>>,
}

impl TypeRedirects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table filled with every `inventory` submission
    pub fn with_registered() -> Self {
        let mut redirects = Self::new();
        for redirect in inventory::iter::<TypeRedirect> {
            redirects.insert(TypeIdentity::parse(redirect.from), TypeIdentity::parse(redirect.to));
        }
        redirects
    }

    /// Add a redirect; a later entry for the same identity replaces the earlier one
    pub fn insert(&mut self, from: TypeIdentity, to: TypeIdentity) {
        let bucket = self.entries.entry(from.full_name()).or_default();
        bucket.retain(|(existing, _)| existing != &from);
        bucket.push((from, to));
    }

    /// Follow redirects from `identity`
    ///
    /// Chains (`a -> b -> c`) are followed to the end; a chain that loops back
    /// stops at the last identity before the repeat. Returns `None` when no
    /// redirect applies.
    pub fn resolve(&self, identity: &TypeIdentity) -> Option<TypeIdentity> {
        let mut current = self.lookup(identity)?.clone();
        let mut seen = vec![identity.clone()];
        while let Some(next) = self.lookup(&current) {
            if seen.contains(next) || next == &current {
                break;
            }
            seen.push(current.clone());
            current = next.clone();
        }
        Some(current)
    }

    fn lookup(&self, identity: &TypeIdentity) -> Option<&TypeIdentity> {
        self.entries
            .get(&identity.full_name())?
            .iter()
            .find(|(from, _)| from.matches(identity))
            .map(|(_, to)| to)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another table into this one; entries from `other` win
    pub fn merge(&mut self, other: TypeRedirects) {
        for (from, to) in other.entries.into_values().flatten() {
            self.insert(from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_redirect() {
        let mut redirects = TypeRedirects::new();
        redirects.insert("Old.ClassName".into(), "New.ClassName".into());
        assert_eq!(
            redirects.resolve(&"Old.ClassName, Game".into()),
            Some(TypeIdentity::parse("New.ClassName"))
        );
        assert_eq!(redirects.resolve(&"Other.ClassName".into()), None);
    }

    #[test]
    fn test_assembly_qualified_redirect() {
        let mut redirects = TypeRedirects::new();
        redirects.insert("Old.Node, LegacyAsm".into(), "New.Node".into());
        assert!(redirects.resolve(&"Old.Node, OtherAsm".into()).is_none());
        assert!(redirects.resolve(&"Old.Node, LegacyAsm".into()).is_some());
    }

    #[test]
    fn test_chain_and_loop() {
        let mut redirects = TypeRedirects::new();
        redirects.insert("A.X".into(), "B.X".into());
        redirects.insert("B.X".into(), "C.X".into());
        assert_eq!(redirects.resolve(&"A.X".into()), Some(TypeIdentity::parse("C.X")));

        redirects.insert("C.X".into(), "A.X".into());
        assert!(redirects.resolve(&"A.X".into()).is_some());
    }
}
