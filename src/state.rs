//! Persisted reconciliation state.
//!
//! One JSON document keyed by `kind.name`. Each entry holds what the engine
//! needs next time (identity and last-applied fields) plus what the last run
//! reported. Last-applied fields include sensitive values, so the file is
//! written owner-only on Unix.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reconcile::{
    Action, Diagnostic, DesiredState, Identity, LifecycleState, PriorState, ReconciliationResult,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::declarations::ResourceKey;

/// Current state file format
pub const STATE_VERSION: u32 = 1;

const fn current_version() -> u32 {
    STATE_VERSION
}

// ============================================================================
// State Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default = "current_version")]
    pub version: u32,

    #[serde(default)]
    pub resources: BTreeMap<ResourceKey, ResourceState>,

    /// Last time the state was saved
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// What is known about one tracked resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Empty while a create is unresolved or never succeeded
    pub identity: Identity,

    #[serde(default)]
    pub last_applied: Option<DesiredState>,

    /// A create was sent but its outcome is unknown
    #[serde(default)]
    pub unresolved: bool,

    pub status: LifecycleState,

    /// Follow-up steps the engine still owes this resource
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_steps: Vec<String>,

    /// Resources this one referenced when it was last applied
    #[serde(default)]
    pub depends_on: BTreeSet<ResourceKey>,

    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,

    pub updated_at: DateTime<Utc>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            resources: BTreeMap::new(),
            last_updated: None,
        }
    }
}

// ============================================================================
// StateFile Implementation
// ============================================================================

impl StateFile {
    /// Load state from disk, or return default if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        if state.version > STATE_VERSION {
            anyhow::bail!(
                "State file {} has version {}, this dockhand understands up to {}",
                path.display(),
                state.version,
                STATE_VERSION
            );
        }

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to disk, replacing the previous file atomically
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        self.last_updated = Some(Utc::now());
        let content =
            serde_json::to_string_pretty(&self).context("Failed to serialize state to JSON")?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &content)
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        restrict_permissions(&tmp)?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&ResourceState> {
        self.resources.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Known identity of a resource, if it has one
    pub fn identity(&self, key: &ResourceKey) -> Option<Identity> {
        self.resources
            .get(key)
            .map(|entry| entry.identity.clone())
            .filter(|id| !id.is_empty())
    }

    /// What the engine should be told about a resource
    pub fn prior(&self, key: &ResourceKey) -> PriorState {
        match self.resources.get(key) {
            None => PriorState::none(),
            Some(entry) if entry.unresolved && entry.identity.is_empty() => {
                PriorState::unresolved(entry.last_applied.clone())
            }
            Some(entry) => PriorState::new(entry.identity.clone(), entry.last_applied.clone())
                .with_pending_steps(entry.pending_steps.clone()),
        }
    }

    /// Record the outcome of an apply or import
    pub fn record(
        &mut self,
        key: &ResourceKey,
        result: &ReconciliationResult,
        depends_on: BTreeSet<ResourceKey>,
    ) {
        let previous = self.resources.remove(key);
        let last_applied = if result.desired.is_empty() {
            previous.and_then(|p| p.last_applied)
        } else {
            Some(result.desired.clone())
        };

        self.resources.insert(
            key.clone(),
            ResourceState {
                identity: result.identity.clone(),
                last_applied,
                unresolved: result.action == Action::Unresolved,
                status: result.state,
                pending_steps: result.pending_steps.clone(),
                depends_on,
                diagnostics: result.diagnostics.clone(),
                updated_at: Utc::now(),
            },
        );
    }

    /// Record an operation that failed without a result.
    ///
    /// Identity and last-applied fields are kept so the next run starts
    /// from what was known before.
    pub fn record_failure(&mut self, key: &ResourceKey, error: &str) {
        let entry = self
            .resources
            .entry(key.clone())
            .or_insert_with(|| ResourceState {
                identity: Identity::empty(),
                last_applied: None,
                unresolved: false,
                status: LifecycleState::Failed,
                pending_steps: Vec::new(),
                depends_on: BTreeSet::new(),
                diagnostics: Vec::new(),
                updated_at: Utc::now(),
            });
        entry.status = LifecycleState::Failed;
        entry.diagnostics = vec![Diagnostic::error(error)];
        entry.updated_at = Utc::now();
    }

    /// Stop tracking a resource
    pub fn remove(&mut self, key: &ResourceKey) -> Option<ResourceState> {
        self.resources.remove(key)
    }

    /// Tracked resources with their recorded dependencies, restricted to
    /// what is still tracked
    pub fn nodes(&self) -> Vec<(ResourceKey, BTreeSet<ResourceKey>)> {
        self.resources
            .iter()
            .map(|(key, entry)| {
                let deps = entry
                    .depends_on
                    .iter()
                    .filter(|d| self.resources.contains_key(*d))
                    .cloned()
                    .collect();
                (key.clone(), deps)
            })
            .collect()
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to restrict permissions: {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
