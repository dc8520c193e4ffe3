//! The declaration file: what the user wants to exist.
//!
//! ```toml
//! [provider]
//! endpoint = "https://portainer.example.com"
//!
//! [[resource]]
//! kind = "team"
//! name = "ops"
//! fields = { name = "ops" }
//!
//! [[resource]]
//! kind = "user"
//! name = "alice"
//! fields = { username = "alice", password = "hunter22", team_id = "@team.ops" }
//! ```
//!
//! A string value of the form `@kind.name` stands for the identity of
//! another declared resource. `@@` escapes a literal leading `@`.

use anyhow::{Context, Result};
use portainer::ProviderSettings;
use reconcile::{DesiredState, FieldType, Identity, ResourceSpec, SpecRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Marks a reference to another resource's identity
pub const REFERENCE_PREFIX: char = '@';

// ============================================================================
// Resource Keys
// ============================================================================

/// `kind.name`, unique within a declaration file and the state file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceKey {
    pub kind: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Parse `kind.name`; kinds never contain a dot, names may.
    pub fn parse(raw: &str) -> Result<Self, DeclarationError> {
        match raw.split_once('.') {
            Some((kind, name)) if !kind.is_empty() && !name.is_empty() => {
                Ok(Self::new(kind, name))
            }
            _ => Err(DeclarationError::InvalidKey(raw.to_string())),
        }
    }

    /// Whether a `--target` value selects this key (exact key or whole kind)
    pub fn matches(&self, target: &str) -> bool {
        target == self.kind || target == self.to_string()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

impl TryFrom<String> for ResourceKey {
    type Error = DeclarationError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<ResourceKey> for String {
    fn from(key: ResourceKey) -> Self {
        key.to_string()
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("invalid resource key '{0}': expected kind.name")]
    InvalidKey(String),

    #[error("resource {0} is declared more than once")]
    Duplicate(ResourceKey),

    #[error("resource {key}: unknown kind '{}'", .key.kind)]
    UnknownKind { key: ResourceKey },

    #[error("field '{field}' of {key} references {target}, which has no identity yet")]
    Unresolved {
        key: ResourceKey,
        field: String,
        target: ResourceKey,
    },
}

// ============================================================================
// Declarations
// ============================================================================

/// A parsed declaration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeclarationFile {
    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default, rename = "resource")]
    pub resources: Vec<Declaration>,
}

/// One `[[resource]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Declaration {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl DeclarationFile {
    /// Load and parse a declaration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read declarations: {}", path.display()))?;
        let file = Self::parse(&content)
            .with_context(|| format!("Failed to parse declarations: {}", path.display()))?;
        log::debug!(
            "Loaded {} declarations from {}",
            file.resources.len(),
            path.display()
        );
        Ok(file)
    }

    /// Load a declaration file, or an empty one when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("{} does not exist, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Reject duplicate keys and kinds the registry does not know
    pub fn check(&self, registry: &SpecRegistry) -> Result<(), DeclarationError> {
        let mut seen = BTreeSet::new();
        for decl in &self.resources {
            let key = decl.key();
            if decl.name.is_empty() || decl.kind.contains('.') {
                return Err(DeclarationError::InvalidKey(key.to_string()));
            }
            if !registry.contains(&decl.kind) {
                return Err(DeclarationError::UnknownKind { key });
            }
            if !seen.insert(key.clone()) {
                return Err(DeclarationError::Duplicate(key));
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&Declaration> {
        self.resources
            .iter()
            .find(|d| d.kind == key.kind && d.name == key.name)
    }

    pub fn keys(&self) -> BTreeSet<ResourceKey> {
        self.resources.iter().map(Declaration::key).collect()
    }

    /// Every declaration with the keys it references
    pub fn nodes(&self) -> Vec<(ResourceKey, BTreeSet<ResourceKey>)> {
        self.resources
            .iter()
            .map(|d| (d.key(), d.references()))
            .collect()
    }
}

impl Declaration {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.kind, &self.name)
    }

    /// Keys referenced anywhere in the field values
    pub fn references(&self) -> BTreeSet<ResourceKey> {
        let mut found = BTreeSet::new();
        for value in self.fields.values() {
            collect_references(value, &mut found);
        }
        found
    }

    /// Build the engine input, substituting references with identities.
    ///
    /// Identities are coerced to the field's type, so `@team.ops` becomes
    /// `7` for an integer field and `"7"` for a string one.
    pub fn resolve<F>(&self, spec: &ResourceSpec, lookup: F) -> Result<DesiredState, DeclarationError>
    where
        F: Fn(&ResourceKey) -> Option<Identity>,
    {
        let mut desired = DesiredState::new();
        for (field, value) in &self.fields {
            let field_type = spec
                .field(field)
                .map_or(FieldType::String, |f| f.field_type);
            let resolved = self.resolve_value(field, value, field_type, &lookup)?;
            desired.insert(field.clone(), resolved);
        }
        Ok(desired)
    }

    fn resolve_value<F>(
        &self,
        field: &str,
        value: &Value,
        field_type: FieldType,
        lookup: &F,
    ) -> Result<Value, DeclarationError>
    where
        F: Fn(&ResourceKey) -> Option<Identity>,
    {
        match value {
            Value::String(s) => {
                if let Some(escaped) = s.strip_prefix("@@") {
                    return Ok(Value::String(format!("{REFERENCE_PREFIX}{escaped}")));
                }
                let Some(target) = parse_reference(s) else {
                    return Ok(value.clone());
                };
                match lookup(&target) {
                    Some(identity) if !identity.is_empty() => {
                        Ok(field_type.coerce_identity(identity.as_str()))
                    }
                    _ => Err(DeclarationError::Unresolved {
                        key: self.key(),
                        field: field.to_string(),
                        target,
                    }),
                }
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(field, item, field_type, lookup))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    out.insert(
                        k.clone(),
                        self.resolve_value(field, v, FieldType::String, lookup)?,
                    );
                }
                Ok(Value::Object(out))
            }
            _ => Ok(value.clone()),
        }
    }
}

/// `@kind.name` -> key; anything else (including `@@...`) is a plain string
pub fn parse_reference(raw: &str) -> Option<ResourceKey> {
    let rest = raw.strip_prefix(REFERENCE_PREFIX)?;
    if rest.starts_with(REFERENCE_PREFIX) {
        return None;
    }
    ResourceKey::parse(rest).ok()
}

fn collect_references(value: &Value, found: &mut BTreeSet<ResourceKey>) {
    match value {
        Value::String(s) => {
            if let Some(key) = parse_reference(s) {
                found.insert(key);
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, found)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, found)),
        _ => {}
    }
}

// ============================================================================
// Tests
// ============================================================================
