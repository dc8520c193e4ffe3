//! Core types for reconciliation

use crate::lifecycle::LifecycleState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Opaque remote identifier of a resource instance.
///
/// An empty identity means "not yet created" or "known deleted".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The empty identity.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Build an identity from a JSON value returned by the remote.
    ///
    /// Numbers are rendered in decimal; zero and empty strings yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) if n.as_i64() == Some(0) => None,
            Value::Number(n) => Some(Self(n.to_string())),
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(Self(s.clone())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Field name to value map describing one resource instance as the caller wants it.
///
/// Null values are never stored; inserting `Value::Null` removes the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesiredState(BTreeMap<String, Value>);

impl DesiredState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        match value.into() {
            Value::Null => {
                self.0.remove(&field);
            }
            value => {
                self.0.insert(field, value);
            }
        }
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.0.get(field).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.0.get(field).and_then(Value::as_bool)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.0
    }
}

impl From<BTreeMap<String, Value>> for DesiredState {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self(
            fields
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for DesiredState {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<BTreeMap<_, _>>())
    }
}

/// Observed state of a resource instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub identity: Identity,
    pub fields: BTreeMap<String, Value>,
    /// True when the kind cannot be read back and these fields echo the last local write.
    #[serde(default)]
    pub best_effort: bool,
}

impl RemoteRecord {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            fields: BTreeMap::new(),
            best_effort: false,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A message attached to a reconciliation result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// What the host persisted from the previous reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorState {
    pub identity: Identity,
    /// Last DesiredState projection returned by the engine, if any.
    pub last_applied: Option<DesiredState>,
    /// A previous create was sent but its outcome is unknown.
    #[serde(default)]
    pub unresolved: bool,
    /// Compensation steps a previous apply left unfinished.
    #[serde(default)]
    pub pending_steps: Vec<String>,
}

impl PriorState {
    /// Nothing known: the resource has never been created.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(identity: Identity, last_applied: Option<DesiredState>) -> Self {
        Self {
            identity,
            last_applied,
            unresolved: false,
            pending_steps: Vec::new(),
        }
    }

    /// Steps to finish before the instance counts as fully created
    pub fn with_pending_steps(mut self, steps: Vec<String>) -> Self {
        self.pending_steps = steps;
        self
    }

    /// A create whose outcome was never observed
    pub fn unresolved(last_applied: Option<DesiredState>) -> Self {
        Self {
            identity: Identity::empty(),
            last_applied,
            unresolved: true,
            pending_steps: Vec::new(),
        }
    }
}

/// What an operation did to the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Nothing changed remotely
    Unchanged,
    /// A new instance was created
    Created,
    /// An existing instance was updated in place
    Updated,
    /// The instance was removed (or was already gone)
    Deleted,
    /// The instance was dropped from local tracking only
    Forgotten,
    /// An existing instance was adopted
    Imported,
    /// A create was sent but its outcome is unknown
    Unresolved,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unchanged => "unchanged",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Forgotten => "forgotten",
            Self::Imported => "imported",
            Self::Unresolved => "unresolved",
        };
        f.write_str(name)
    }
}

/// Outcome of one engine operation on one resource instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub kind: String,
    pub identity: Identity,
    pub state: LifecycleState,
    pub action: Action,
    /// Snapshot of the remote, possibly partial or best-effort.
    pub record: Option<RemoteRecord>,
    /// State the host should persist and pass back as `PriorState::last_applied`.
    pub desired: DesiredState,
    pub diagnostics: Vec<Diagnostic>,
    /// Every lifecycle state visited during the operation, in order.
    pub history: Vec<LifecycleState>,
    /// Number of remote write requests issued.
    pub writes: usize,
    /// False when the host must reconcile again (partial or unknown outcome).
    pub terminal: bool,
    /// Compensation steps still owed; pass back as `PriorState::pending_steps`.
    #[serde(default)]
    pub pending_steps: Vec<String>,
}

impl ReconciliationResult {
    pub fn is_success(&self) -> bool {
        self.terminal && !self.has_errors()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn is_change(&self) -> bool {
        !matches!(self.action, Action::Unchanged)
    }
}
