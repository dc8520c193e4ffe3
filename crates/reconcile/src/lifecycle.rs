//! Per-operation lifecycle state machine
//!
//! ```text
//! Absent -> Creating -> { Present | PartiallyCreated | Unknown }
//! Present -> Reading -> { Present | Absent }
//! Present -> Updating -> { Present | PartiallyCreated }
//! Present -> Deleting -> Absent
//! PartiallyCreated -> Reading -> PartiallyCreated
//! ```
//!
//! Every transient state may also fall into `Failed`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a resource instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Absent,
    Creating,
    Present,
    PartiallyCreated,
    Reading,
    Updating,
    Deleting,
    /// A create was sent but its outcome is unknown
    Unknown,
    Failed,
}

impl LifecycleState {
    /// Check whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::{
            Absent, Creating, Deleting, Failed, PartiallyCreated, Present, Reading, Unknown,
            Updating,
        };

        match (self, next) {
            (Absent, Creating | Reading) => true,
            (Creating, Present | PartiallyCreated | Unknown | Failed) => true,
            (Present, Reading | Updating | Deleting) => true,
            (PartiallyCreated, Reading | Deleting) => true,
            (Unknown, Reading) => true,
            (Reading, Present | Absent | PartiallyCreated | Failed) => true,
            (Updating, Present | PartiallyCreated | Failed) => true,
            (Deleting, Absent | Failed) => true,
            _ => false,
        }
    }

    /// Whether the host can consider the resource settled in this state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Absent | Self::Present | Self::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Present => "present",
            Self::PartiallyCreated => "partially-created",
            Self::Reading => "reading",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
            Self::Unknown => "unknown",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Records the path an operation takes through the state machine.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    kind: String,
    history: Vec<LifecycleState>,
}

impl Lifecycle {
    pub fn new(kind: impl Into<String>, initial: LifecycleState) -> Self {
        Self {
            kind: kind.into(),
            history: vec![initial],
        }
    }

    pub fn current(&self) -> LifecycleState {
        // history is never empty
        self.history
            .last()
            .copied()
            .unwrap_or(LifecycleState::Absent)
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn advance(&mut self, next: LifecycleState) -> Result<()> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(Error::InvalidTransition { from, to: next });
        }
        log::debug!("{}: {} -> {}", self.kind, from, next);
        self.history.push(next);
        Ok(())
    }

    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    pub fn into_history(self) -> Vec<LifecycleState> {
        self.history
    }
}
