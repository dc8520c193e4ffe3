//! Dependency ordering of resources.
//!
//! Resources are grouped in levels: every resource in level `n` depends only
//! on resources in levels `< n`, so each level can be reconciled in parallel.

use crate::declarations::ResourceKey;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("{from} references {to}, which is not declared")]
    Dangling { from: ResourceKey, to: ResourceKey },

    #[error("dependency cycle between {}", join(.0))]
    Cycle(Vec<ResourceKey>),

    #[error("no resource matches target '{0}'")]
    UnknownTarget(String),
}

fn join(keys: &[ResourceKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resources in dependency order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Edges towards what must be processed first
    deps: BTreeMap<ResourceKey, BTreeSet<ResourceKey>>,
    levels: Vec<Vec<ResourceKey>>,
}

impl Plan {
    /// Order `(key, depends_on)` nodes.
    ///
    /// Every dependency must itself be a node.
    pub fn build<I>(nodes: I) -> Result<Self, PlanError>
    where
        I: IntoIterator<Item = (ResourceKey, BTreeSet<ResourceKey>)>,
    {
        let deps: BTreeMap<_, _> = nodes.into_iter().collect();
        for (from, targets) in &deps {
            if let Some(to) = targets.iter().find(|t| !deps.contains_key(*t)) {
                return Err(PlanError::Dangling {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
        }
        let levels = levels_of(&deps)?;
        Ok(Self { deps, levels })
    }

    pub fn levels(&self) -> &[Vec<ResourceKey>] {
        &self.levels
    }

    /// What must be processed before `key`
    pub fn blockers(&self, key: &ResourceKey) -> impl Iterator<Item = &ResourceKey> {
        self.deps.get(key).into_iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.levels.iter().flatten()
    }

    /// The teardown order: dependents first.
    pub fn reversed(&self) -> Self {
        let mut deps: BTreeMap<ResourceKey, BTreeSet<ResourceKey>> = self
            .deps
            .keys()
            .map(|k| (k.clone(), BTreeSet::new()))
            .collect();
        for (from, targets) in &self.deps {
            for to in targets {
                deps.entry(to.clone()).or_default().insert(from.clone());
            }
        }
        let mut levels = self.levels.clone();
        levels.reverse();
        Self { deps, levels }
    }

    /// Restrict to the resources matching `target` and everything they wait on.
    pub fn select(&self, target: &str) -> Result<Self, PlanError> {
        let mut keep: BTreeSet<ResourceKey> = self
            .deps
            .keys()
            .filter(|k| k.matches(target))
            .cloned()
            .collect();
        if keep.is_empty() {
            return Err(PlanError::UnknownTarget(target.to_string()));
        }

        let mut stack: Vec<ResourceKey> = keep.iter().cloned().collect();
        while let Some(key) = stack.pop() {
            for dep in self.blockers(&key) {
                if keep.insert(dep.clone()) {
                    stack.push(dep.clone());
                }
            }
        }

        let deps = self
            .deps
            .iter()
            .filter(|(k, _)| keep.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let levels = self
            .levels
            .iter()
            .map(|level| {
                level
                    .iter()
                    .filter(|k| keep.contains(*k))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .filter(|level| !level.is_empty())
            .collect();
        Ok(Self { deps, levels })
    }
}

/// Longest-path layering; fails on cycles
fn levels_of(
    deps: &BTreeMap<ResourceKey, BTreeSet<ResourceKey>>,
) -> Result<Vec<Vec<ResourceKey>>, PlanError> {
    let mut level: BTreeMap<&ResourceKey, usize> = BTreeMap::new();
    let mut remaining: BTreeSet<&ResourceKey> = deps.keys().collect();

    loop {
        let ready: Vec<&ResourceKey> = remaining
            .iter()
            .copied()
            .filter(|k| deps[*k].iter().all(|d| level.contains_key(d)))
            .collect();
        if ready.is_empty() {
            break;
        }
        for key in ready {
            let depth = deps[key]
                .iter()
                .map(|d| level[d] + 1)
                .max()
                .unwrap_or(0);
            level.insert(key, depth);
            remaining.remove(key);
        }
    }

    if !remaining.is_empty() {
        let members = remaining
            .iter()
            .filter(|k| on_cycle(k, deps, &remaining))
            .map(|k| (*k).clone())
            .collect();
        return Err(PlanError::Cycle(members));
    }

    let mut levels: Vec<Vec<ResourceKey>> = Vec::new();
    for (key, depth) in level {
        if levels.len() <= depth {
            levels.resize_with(depth + 1, Vec::new);
        }
        levels[depth].push(key.clone());
    }
    Ok(levels)
}

/// Whether `start` can reach itself through unprocessed nodes
fn on_cycle(
    start: &ResourceKey,
    deps: &BTreeMap<ResourceKey, BTreeSet<ResourceKey>>,
    remaining: &BTreeSet<&ResourceKey>,
) -> bool {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<&ResourceKey> = deps[start].iter().collect();
    while let Some(key) = stack.pop() {
        if key == start {
            return true;
        }
        if remaining.contains(key) && seen.insert(key) {
            stack.extend(deps[key].iter());
        }
    }
    false
}

// ============================================================================
// Tests
// ============================================================================
