//! Runs a plan level by level, reconciling each level in parallel.

use anyhow::{Context as AnyhowContext, Result};
use indicatif::ProgressBar;
use rayon::prelude::*;
use reconcile::{
    Action, DesiredState, LifecycleState, PriorState, ReconciliationResult, Reconciler,
    RemoteClient,
};
use std::collections::BTreeSet;

use crate::declarations::{DeclarationFile, ResourceKey};
use crate::plan::Plan;
use crate::state::StateFile;

/// What happened to one resource
#[derive(Debug, Clone)]
pub enum Outcome {
    Done(Box<ReconciliationResult>),
    Failed(String),
    Skipped(String),
}

impl Outcome {
    /// Whether dependents may proceed
    fn converged(&self) -> bool {
        match self {
            Outcome::Done(result) => result.is_success(),
            Outcome::Failed(_) | Outcome::Skipped(_) => false,
        }
    }
}

/// Outcomes in execution order
#[derive(Debug, Default)]
pub struct Report {
    pub entries: Vec<(ResourceKey, Outcome)>,
}

/// Counts per outcome
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub imported: usize,
    /// Not settled: partially created or unknown outcome
    pub pending: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Summary {
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.pending == 0 && self.skipped == 0
    }
}

impl Report {
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for (_, outcome) in &self.entries {
            match outcome {
                Outcome::Done(result) if !result.terminal => summary.pending += 1,
                Outcome::Done(result) if result.state == LifecycleState::Failed => {
                    summary.failed += 1;
                }
                Outcome::Done(result) => match result.action {
                    Action::Created => summary.created += 1,
                    Action::Updated => summary.updated += 1,
                    Action::Unchanged => summary.unchanged += 1,
                    Action::Deleted | Action::Forgotten => summary.deleted += 1,
                    Action::Imported => summary.imported += 1,
                    Action::Unresolved => summary.pending += 1,
                },
                Outcome::Failed(_) => summary.failed += 1,
                Outcome::Skipped(_) => summary.skipped += 1,
            }
        }
        summary
    }
}

/// Work for one resource in a level
struct Task {
    key: ResourceKey,
    desired: DesiredState,
    prior: PriorState,
}

pub struct Executor<'a, C> {
    engine: &'a Reconciler<C>,
    pool: rayon::ThreadPool,
}

impl<'a, C: RemoteClient> Executor<'a, C> {
    pub fn new(engine: &'a Reconciler<C>, jobs: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .build()
            .context("Failed to create reconcile thread pool")?;
        Ok(Self { engine, pool })
    }

    /// Converge every resource of `plan` to its declaration.
    ///
    /// `checkpoint` is called with the updated state after each level.
    pub fn apply<F>(
        &self,
        plan: &Plan,
        declarations: &DeclarationFile,
        state: &mut StateFile,
        progress: &ProgressBar,
        mut checkpoint: F,
    ) -> Result<Report>
    where
        F: FnMut(&mut StateFile) -> Result<()>,
    {
        let mut report = Report::default();
        let mut blocked: BTreeSet<ResourceKey> = BTreeSet::new();

        for (index, level) in plan.levels().iter().enumerate() {
            log::info!("level {}: {} resources", index + 1, level.len());
            let mut tasks = Vec::new();

            for key in level {
                if let Some(reason) = blocked_reason(plan, key, &blocked) {
                    log::warn!("{key}: skipped, {reason}");
                    blocked.insert(key.clone());
                    progress.inc(1);
                    report.entries.push((key.clone(), Outcome::Skipped(reason)));
                    continue;
                }
                match self.prepare(key, declarations, state) {
                    Ok(task) => tasks.push(task),
                    Err(message) => {
                        state.record_failure(key, &message);
                        blocked.insert(key.clone());
                        progress.inc(1);
                        report.entries.push((key.clone(), Outcome::Failed(message)));
                    }
                }
            }

            let results = self.run_level(&tasks, progress, |task| {
                self.engine.apply(&task.key.kind, &task.desired, &task.prior)
            });

            for (key, result) in results {
                let outcome = match result {
                    Ok(result) => {
                        let depends_on = declarations
                            .get(&key)
                            .map(|d| d.references())
                            .unwrap_or_default();
                        state.record(&key, &result, depends_on);
                        Outcome::Done(Box::new(result))
                    }
                    Err(err) => {
                        let message = err.to_string();
                        state.record_failure(&key, &message);
                        Outcome::Failed(message)
                    }
                };
                if !outcome.converged() {
                    blocked.insert(key.clone());
                }
                report.entries.push((key, outcome));
            }

            checkpoint(state)?;
        }

        Ok(report)
    }

    /// Delete every tracked resource of `plan`, which must be in teardown order.
    pub fn destroy<F>(
        &self,
        plan: &Plan,
        state: &mut StateFile,
        progress: &ProgressBar,
        mut checkpoint: F,
    ) -> Result<Report>
    where
        F: FnMut(&mut StateFile) -> Result<()>,
    {
        let mut report = Report::default();
        let mut blocked: BTreeSet<ResourceKey> = BTreeSet::new();

        for level in plan.levels() {
            let mut tasks = Vec::new();

            for key in level {
                let Some(entry) = state.get(key) else {
                    progress.inc(1);
                    continue;
                };
                if let Some(reason) = blocked_reason(plan, key, &blocked) {
                    log::warn!("{key}: kept, {reason}");
                    blocked.insert(key.clone());
                    progress.inc(1);
                    report.entries.push((key.clone(), Outcome::Skipped(reason)));
                    continue;
                }
                tasks.push(Task {
                    key: key.clone(),
                    desired: entry.last_applied.clone().unwrap_or_default(),
                    prior: PriorState::new(entry.identity.clone(), None),
                });
            }

            let results = self.run_level(&tasks, progress, |task| {
                self.engine
                    .destroy(&task.key.kind, &task.prior.identity, &task.desired)
            });

            for (key, result) in results {
                let outcome = match result {
                    Ok(result) => {
                        state.remove(&key);
                        Outcome::Done(Box::new(result))
                    }
                    Err(err) => {
                        let message = err.to_string();
                        state.record_failure(&key, &message);
                        Outcome::Failed(message)
                    }
                };
                if !outcome.converged() {
                    blocked.insert(key.clone());
                }
                report.entries.push((key, outcome));
            }

            checkpoint(state)?;
        }

        Ok(report)
    }

    fn prepare(
        &self,
        key: &ResourceKey,
        declarations: &DeclarationFile,
        state: &StateFile,
    ) -> std::result::Result<Task, String> {
        let declaration = declarations
            .get(key)
            .ok_or_else(|| format!("{key} is not declared"))?;
        let spec = self
            .engine
            .registry()
            .get(&key.kind)
            .map_err(|e| e.to_string())?;
        let desired = declaration
            .resolve(spec, |target| state.identity(target))
            .map_err(|e| e.to_string())?;
        Ok(Task {
            key: key.clone(),
            desired,
            prior: state.prior(key),
        })
    }

    /// Run one level on the pool, keeping the level's order in the output
    fn run_level<F>(
        &self,
        tasks: &[Task],
        progress: &ProgressBar,
        op: F,
    ) -> Vec<(ResourceKey, reconcile::Result<ReconciliationResult>)>
    where
        F: Fn(&Task) -> reconcile::Result<ReconciliationResult> + Sync,
    {
        self.pool.install(|| {
            tasks
                .par_iter()
                .map(|task| {
                    progress.set_message(task.key.to_string());
                    let result = op(task);
                    match &result {
                        Ok(r) => log::info!("{}: {} ({})", task.key, r.action, r.state),
                        Err(e) => log::warn!("{}: {e}", task.key),
                    }
                    progress.inc(1);
                    (task.key.clone(), result)
                })
                .collect()
        })
    }
}

fn blocked_reason(plan: &Plan, key: &ResourceKey, blocked: &BTreeSet<ResourceKey>) -> Option<String> {
    plan.blockers(key)
        .find(|dep| blocked.contains(*dep))
        .map(|dep| format!("{dep} did not converge"))
}

// ============================================================================
// Tests
// ============================================================================
