//! Compensation steps after a primary create
//!
//! Some resources need follow-up requests once they exist (add the new user
//! to a team, mint an API key for it). Steps run sequentially in declaration
//! order against the committed identity and stop at the first failure.
//! Nothing is rolled back: the primary resource and every earlier step stay
//! committed, and the report says exactly which steps did and did not run.

use crate::client::{RemoteClient, Request};
use crate::error::{Error, Operation};
use crate::route::get_path;
use crate::spec::{CompensationStep, ResourceSpec};
use crate::types::{DesiredState, Identity};
use serde_json::Value;
use std::collections::BTreeMap;

/// The step that stopped the sequence
#[derive(Debug)]
pub struct StepFailure {
    pub step: String,
    pub error: Error,
}

/// Outcome of running a kind's compensation steps
#[derive(Debug, Default)]
pub struct CompensationReport {
    pub succeeded: Vec<String>,
    /// Steps whose inputs were absent
    pub skipped: Vec<String>,
    pub failed: Option<StepFailure>,
    pub not_attempted: Vec<String>,
    /// Computed field values captured from step responses
    pub captured: BTreeMap<String, Value>,
    /// Requests that reached the client, including a failed one
    requests: usize,
}

impl CompensationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_none()
    }

    /// Number of requests actually sent
    pub fn requests_sent(&self) -> usize {
        self.requests
    }

    /// Steps still owed: the failed one and everything after it
    pub fn pending(&self) -> Vec<String> {
        self.failed
            .iter()
            .map(|f| f.step.clone())
            .chain(self.not_attempted.iter().cloned())
            .collect()
    }
}

/// Runs compensation steps against a remote client
pub struct CompensationCoordinator<'a, C: ?Sized> {
    client: &'a C,
}

impl<'a, C: RemoteClient + ?Sized> CompensationCoordinator<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Run every step of the kind in declaration order
    pub fn run(
        &self,
        spec: &ResourceSpec,
        identity: &Identity,
        desired: &DesiredState,
    ) -> CompensationReport {
        self.run_steps(spec, spec.compensation().iter(), identity, desired)
    }

    /// Run only the named steps, still in declaration order
    pub fn resume(
        &self,
        spec: &ResourceSpec,
        identity: &Identity,
        desired: &DesiredState,
        pending: &[String],
    ) -> CompensationReport {
        let steps = spec
            .compensation()
            .iter()
            .filter(|step| pending.contains(&step.name));
        self.run_steps(spec, steps, identity, desired)
    }

    fn run_steps<'s>(
        &self,
        spec: &ResourceSpec,
        steps: impl Iterator<Item = &'s CompensationStep>,
        identity: &Identity,
        desired: &DesiredState,
    ) -> CompensationReport {
        let mut report = CompensationReport::default();

        for step in steps {
            if report.failed.is_some() {
                report.not_attempted.push(step.name.clone());
                continue;
            }
            let outcome = match self.request_for(spec, step, identity, desired) {
                Ok(None) => {
                    log::debug!("{} {}: step '{}' skipped", spec.kind(), identity, step.name);
                    report.skipped.push(step.name.clone());
                    continue;
                }
                Ok(Some(request)) => {
                    report.requests += 1;
                    self.send_step(spec, step, identity, &request)
                }
                Err(error) => Err(error),
            };
            match outcome {
                Ok(captured) => {
                    log::debug!("{} {}: step '{}' done", spec.kind(), identity, step.name);
                    report.captured.extend(captured);
                    report.succeeded.push(step.name.clone());
                }
                Err(error) => {
                    log::warn!(
                        "{} {}: step '{}' failed: {}",
                        spec.kind(),
                        identity,
                        step.name,
                        error
                    );
                    report.failed = Some(StepFailure {
                        step: step.name.clone(),
                        error,
                    });
                }
            }
        }

        report
    }

    /// Build a step's request; `Ok(None)` when its inputs are absent
    fn request_for(
        &self,
        spec: &ResourceSpec,
        step: &CompensationStep,
        identity: &Identity,
        desired: &DesiredState,
    ) -> Result<Option<Request>, Error> {
        let kind = spec.kind();
        let payload = match (step.payload)(identity, desired) {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(None),
            Err(message) => return Err(Error::invalid_desired(kind, message)),
        };
        let path = step
            .route
            .render(Some(identity), desired)
            .map_err(|message| Error::invalid_desired(kind, message))?;

        let mut request = Request::new(step.route.method, path);
        if let Some(body) = payload.into_body() {
            request = request.with_body(body);
        }
        Ok(Some(request))
    }

    fn send_step(
        &self,
        spec: &ResourceSpec,
        step: &CompensationStep,
        identity: &Identity,
        request: &Request,
    ) -> Result<BTreeMap<String, Value>, Error> {
        let kind = spec.kind();
        let response = self
            .client
            .execute(request)
            .map_err(|e| Error::transport(Operation::Compensate, kind, Some(identity), e))?;
        if !response.is_success() {
            return Err(Error::rejection(
                Operation::Compensate,
                kind,
                Some(identity),
                response.status,
                response.body,
            ));
        }

        let mut captured = BTreeMap::new();
        if step.captures.is_empty() {
            return Ok(captured);
        }
        let raw: Value = serde_json::from_str(&response.body).unwrap_or(Value::Null);
        for (field, path) in &step.captures {
            let Some(value) = get_path(&raw, path) else {
                return Err(Error::invalid_response(
                    Operation::Compensate,
                    kind,
                    Some(identity),
                    format!("step '{}' response lacks '{path}'", step.name),
                    response.body,
                ));
            };
            captured.insert(field.clone(), value.clone());
        }
        Ok(captured)
    }
}
