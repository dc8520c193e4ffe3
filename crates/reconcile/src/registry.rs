//! Kind name to spec lookup

use crate::error::{Error, Result};
use crate::spec::ResourceSpec;
use std::collections::BTreeMap;

/// Registry of resource kinds, populated once at startup
#[derive(Debug, Clone, Default)]
pub struct SpecRegistry {
    specs: BTreeMap<String, ResourceSpec>,
}

impl SpecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a spec; a kind can only be registered once
    pub fn register(&mut self, spec: ResourceSpec) -> Result<()> {
        let kind = spec.kind().to_string();
        if self.specs.contains_key(&kind) {
            return Err(Error::invalid_spec(kind, "kind is already registered"));
        }
        log::debug!("registered kind {kind}");
        self.specs.insert(kind, spec);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Result<&ResourceSpec> {
        self.specs
            .get(kind)
            .ok_or_else(|| Error::UnknownKind(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.specs.contains_key(kind)
    }

    /// Registered kind names, sorted
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_register_and_get() {
        let mut registry = SpecRegistry::new();
        registry.register(fixtures::team_spec()).unwrap();
        registry.register(fixtures::user_spec()).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("team").unwrap().kind(), "team");
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["team", "user"]);
    }

    #[test]
    fn test_unknown_kind() {
        let registry = SpecRegistry::new();
        let err = registry.get("stack").unwrap_err();
        assert!(matches!(err, Error::UnknownKind(ref k) if k == "stack"));
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let mut registry = SpecRegistry::new();
        registry.register(fixtures::team_spec()).unwrap();
        assert!(registry.register(fixtures::team_spec()).is_err());
    }
}
