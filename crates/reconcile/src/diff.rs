//! Field-level diff between declared and observed state

use crate::spec::{Authority, Mutability, ResourceSpec};
use crate::types::DesiredState;
use serde_json::Value;
use std::fmt;

/// A single field whose declared value differs from the observed one
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub before: Option<Value>,
    pub after: Value,
    pub mutability: Mutability,
    pub sensitive: bool,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sensitive {
            return write!(f, "{}: (sensitive value changed)", self.field);
        }
        match &self.before {
            Some(before) => write!(f, "{}: {} -> {}", self.field, before, self.after),
            None => write!(f, "{}: (unset) -> {}", self.field, self.after),
        }
    }
}

/// Differences between a declaration and the observed projection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDiff {
    pub changes: Vec<FieldChange>,
}

impl StateDiff {
    /// Compare declared fields against the observed state.
    ///
    /// Fields the declaration leaves unset are not managed and never differ.
    /// An immutable local-authoritative field with no known value is adopted
    /// rather than reported, since nothing remote contradicts it. A mutable
    /// one is reported so the next update writes it.
    pub fn compute(spec: &ResourceSpec, desired: &DesiredState, observed: &DesiredState) -> Self {
        let mut changes = Vec::new();
        for field in spec.fields() {
            if field.computed {
                continue;
            }
            let Some(after) = desired.get(&field.name) else {
                continue;
            };
            let before = observed.get(&field.name);
            if before.is_none()
                && field.authority() == Authority::Local
                && field.mutability == Mutability::Immutable
            {
                continue;
            }
            if !equivalent(before, Some(after)) {
                changes.push(FieldChange {
                    field: field.name.clone(),
                    before: before.cloned(),
                    after: after.clone(),
                    mutability: field.mutability,
                    sensitive: field.sensitive,
                });
            }
        }
        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Names of changed fields that cannot be updated in place
    pub fn immutable_fields(&self) -> Vec<String> {
        self.changes
            .iter()
            .filter(|c| c.mutability == Mutability::Immutable)
            .map(|c| c.field.clone())
            .collect()
    }

    /// Names of changed fields that can be updated in place
    pub fn mutable_fields(&self) -> Vec<String> {
        self.changes
            .iter()
            .filter(|c| c.mutability == Mutability::Mutable)
            .map(|c| c.field.clone())
            .collect()
    }

    pub fn requires_replacement(&self) -> bool {
        self.changes
            .iter()
            .any(|c| c.mutability == Mutability::Immutable)
    }
}

impl fmt::Display for StateDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.changes.iter().map(ToString::to_string).collect();
        write!(f, "{}", lines.join("; "))
    }
}

/// Empty strings, lists and maps are interchangeable with an absent value
fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

fn equivalent(a: Option<&Value>, b: Option<&Value>) -> bool {
    if is_blank(a) && is_blank(b) {
        return true;
    }
    a == b
}
