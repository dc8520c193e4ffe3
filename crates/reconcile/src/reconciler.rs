//! Reconciler - the engine's entry point
//!
//! Drives one resource instance through create, read, update, delete and
//! import against a [`RemoteClient`], using the instance's [`ResourceSpec`]
//! for everything kind-specific.
//!
//! Guarantees the host can rely on:
//! - create is sent at most once per apply and never retried; a create
//!   whose response never arrived, or whose identity could not be found
//!   afterwards, is reported as `Unknown`
//! - compensation steps left unfinished are retried by the next apply and
//!   keep the instance `PartiallyCreated` until they succeed
//! - an unchanged declaration costs exactly one read and no writes
//! - an immutable change is refused before anything is written
//! - deleting something already gone succeeds quietly

use crate::client::{RemoteClient, Request, Response};
use crate::compensation::CompensationCoordinator;
use crate::diff::StateDiff;
use crate::drift::DriftReader;
use crate::error::{Error, Operation, Result};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::registry::SpecRegistry;
use crate::resolver::IdentityResolver;
use crate::route::{Payload, Route, get_path};
use crate::spec::{DeleteOp, IdentitySource, ResourceSpec, WriteOp};
use crate::types::{
    Action, DesiredState, Diagnostic, Identity, PriorState, ReconciliationResult, RemoteRecord,
    Severity,
};
use serde_json::Value;

/// Bookkeeping for a single engine operation
struct Run<'s> {
    spec: &'s ResourceSpec,
    lifecycle: Lifecycle,
    diagnostics: Vec<Diagnostic>,
    writes: usize,
    /// Compensation steps left for a later apply
    pending: Vec<String>,
}

impl<'s> Run<'s> {
    fn new(spec: &'s ResourceSpec, initial: LifecycleState) -> Self {
        Self {
            spec,
            lifecycle: Lifecycle::new(spec.kind(), initial),
            diagnostics: Vec::new(),
            writes: 0,
            pending: Vec::new(),
        }
    }

    fn kind(&self) -> &'s str {
        self.spec.kind()
    }

    fn advance(&mut self, next: LifecycleState) -> Result<()> {
        self.lifecycle.advance(next)
    }

    fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Info => log::info!("{}: {}", self.kind(), diagnostic.message),
            _ => log::warn!("{}: {}", self.kind(), diagnostic.message),
        }
        self.diagnostics.push(diagnostic);
    }

    fn finish(
        self,
        identity: Identity,
        action: Action,
        record: Option<RemoteRecord>,
        desired: DesiredState,
    ) -> ReconciliationResult {
        let state = self.lifecycle.current();
        ReconciliationResult {
            kind: self.spec.kind().to_string(),
            identity,
            state,
            action,
            record,
            desired,
            diagnostics: self.diagnostics,
            history: self.lifecycle.into_history(),
            writes: self.writes,
            terminal: state.is_terminal(),
            pending_steps: self.pending,
        }
    }
}

/// Drives resource instances towards their declared state.
///
/// The reconciler holds no per-instance state; one instance can serve many
/// threads as long as each instance is reconciled by one caller at a time.
pub struct Reconciler<C> {
    client: C,
    registry: SpecRegistry,
}

impl<C: RemoteClient> Reconciler<C> {
    pub fn new(client: C, registry: SpecRegistry) -> Self {
        Self { client, registry }
    }

    pub fn registry(&self) -> &SpecRegistry {
        &self.registry
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Converge one instance to `desired`.
    ///
    /// With an empty prior identity the instance is created; otherwise it is
    /// read, diffed and updated in place when the changes allow it.
    pub fn apply(
        &self,
        kind: &str,
        desired: &DesiredState,
        prior: &PriorState,
    ) -> Result<ReconciliationResult> {
        let spec = self.registry.get(kind)?;
        let desired = spec.normalize(desired)?;

        if !prior.identity.is_empty() {
            let run = Run::new(spec, LifecycleState::Present);
            return self.converge(run, &desired, prior);
        }

        let mut run = Run::new(spec, LifecycleState::Absent);
        if prior.unresolved
            && let Some(identity) = self.recover(&mut run, &desired)?
        {
            // the interrupted create never reached its follow-up steps
            let steps = spec.compensation().iter().map(|s| s.name.clone()).collect();
            let prior =
                PriorState::new(identity, prior.last_applied.clone()).with_pending_steps(steps);
            return self.converge(run, &desired, &prior);
        }
        self.create(run, &desired)
    }

    /// Remove one instance.
    ///
    /// `state` supplies values for route placeholders such as a parent id.
    pub fn destroy(
        &self,
        kind: &str,
        identity: &Identity,
        state: &DesiredState,
    ) -> Result<ReconciliationResult> {
        let spec = self.registry.get(kind)?;

        if identity.is_empty() {
            let run = Run::new(spec, LifecycleState::Absent);
            return Ok(run.finish(
                Identity::empty(),
                Action::Unchanged,
                None,
                DesiredState::new(),
            ));
        }

        let mut run = Run::new(spec, LifecycleState::Present);
        run.advance(LifecycleState::Deleting)?;

        match spec.delete() {
            DeleteOp::Forget => {
                run.advance(LifecycleState::Absent)?;
                run.push(Diagnostic::info(format!(
                    "{} has no remote delete; {identity} was removed from local tracking only",
                    spec.kind()
                )));
                Ok(run.finish(identity.clone(), Action::Forgotten, None, DesiredState::new()))
            }
            DeleteOp::Remote(route) => {
                let response = self.send(
                    &mut run,
                    Operation::Delete,
                    route,
                    Some(identity),
                    state,
                    Payload::Empty,
                )?;
                if response.is_not_found() {
                    log::debug!("{} {identity}: already absent", spec.kind());
                } else if !response.is_success() {
                    return Err(Error::rejection(
                        Operation::Delete,
                        spec.kind(),
                        Some(identity),
                        response.status,
                        response.body,
                    ));
                }
                run.advance(LifecycleState::Absent)?;
                Ok(run.finish(identity.clone(), Action::Deleted, None, DesiredState::new()))
            }
        }
    }

    /// Adopt an existing remote instance and return its declared form.
    ///
    /// `hints` supplies route placeholders and values the remote never reports.
    pub fn import(
        &self,
        kind: &str,
        identity: &Identity,
        hints: &DesiredState,
    ) -> Result<ReconciliationResult> {
        let spec = self.registry.get(kind)?;
        if !spec.is_importable() {
            return Err(Error::unsupported(Operation::Import, kind));
        }
        if identity.is_empty() {
            return Err(Error::invalid_desired(kind, "import requires an identity"));
        }

        let mut run = Run::new(spec, LifecycleState::Absent);
        run.advance(LifecycleState::Reading)?;
        let Some(record) = self.read(&mut run, identity, hints)? else {
            return Err(Error::NotFound {
                op: Operation::Import,
                kind: kind.to_string(),
                identity: identity.clone(),
            });
        };
        run.advance(LifecycleState::Present)?;

        let projected = DriftReader::project(spec, &record, Some(hints));
        Ok(run.finish(identity.clone(), Action::Imported, Some(record), projected))
    }

    fn create(&self, mut run: Run<'_>, desired: &DesiredState) -> Result<ReconciliationResult> {
        let spec = run.spec;
        let kind = spec.kind();
        run.advance(LifecycleState::Creating)?;

        let response = match self.write(&mut run, Operation::Create, spec.create(), None, desired) {
            Ok(response) => response,
            Err(Error::Transport { source, .. }) => {
                run.advance(LifecycleState::Unknown)?;
                run.push(Diagnostic::error(format!(
                    "create {kind} sent but no response arrived ({source}); it may exist \
                     remotely, so it is not re-sent. The next apply looks it up before creating."
                )));
                return Ok(run.finish(
                    Identity::empty(),
                    Action::Unresolved,
                    None,
                    desired.clone(),
                ));
            }
            Err(err) => return Err(err),
        };
        if !response.is_success() {
            return Err(Error::rejection(
                Operation::Create,
                kind,
                None,
                response.status,
                response.body,
            ));
        }
        if let Some(consume) = spec.create().on_success {
            consume(desired, &response).map_err(|message| {
                Error::invalid_response(Operation::Create, kind, None, message, "")
            })?;
        }

        let raw: Value = serde_json::from_str(&response.body).unwrap_or(Value::Null);
        let identity = match self.created_identity(spec, &raw, desired) {
            Some(identity) => identity,
            None if !spec.natural_key().is_empty() => {
                log::debug!("{kind}: create response carries no identity, resolving");
                match IdentityResolver::new(&self.client).resolve(spec, desired) {
                    Ok(identity) => identity,
                    Err(err) => {
                        run.advance(LifecycleState::Unknown)?;
                        run.push(Diagnostic::error(format!(
                            "create {kind} succeeded but its identity could not be resolved \
                             ({err}); it is not re-sent. The next apply looks it up again."
                        )));
                        return Ok(run.finish(
                            Identity::empty(),
                            Action::Unresolved,
                            None,
                            desired.clone(),
                        ));
                    }
                }
            }
            None => {
                return Err(Error::invalid_response(
                    Operation::Create,
                    kind,
                    None,
                    "response carries no identity",
                    response.body,
                ));
            }
        };
        log::info!("created {kind} {identity}");

        let mut applied = desired.clone();
        for (field, value) in DriftReader::computed(spec, &identity, &raw, desired) {
            applied.insert(field, value);
        }

        let report = CompensationCoordinator::new(&self.client).run(spec, &identity, &applied);
        run.writes += report.requests_sent();
        for (field, value) in &report.captured {
            applied.insert(field.clone(), value.clone());
        }

        let settled = if let Some(failure) = &report.failed {
            run.push(Diagnostic::error(format!(
                "{kind} {identity} was created but step '{}' failed: {}",
                failure.step, failure.error
            )));
            run.pending = report.pending();
            run.push(Diagnostic::info(format!(
                "committed steps: [{}]; pending: [{}]; the next apply retries the pending steps",
                report.succeeded.join(", "),
                run.pending.join(", ")
            )));
            LifecycleState::PartiallyCreated
        } else {
            LifecycleState::Present
        };
        run.advance(settled)?;

        let record = if spec.read().is_some() {
            run.advance(LifecycleState::Reading)?;
            let record = self.read_back(&mut run, &identity, &applied);
            run.advance(settled)?;
            record
        } else {
            run.push(Diagnostic::warning(format!(
                "{kind} cannot be read back; recorded state echoes this apply and drift \
                 will not be detected"
            )));
            DriftReader::echo(spec, &identity, &applied)
        };

        let projected = DriftReader::project(spec, &record, Some(&applied));
        Ok(run.finish(identity, Action::Created, Some(record), projected))
    }

    fn converge(
        &self,
        mut run: Run<'_>,
        desired: &DesiredState,
        prior: &PriorState,
    ) -> Result<ReconciliationResult> {
        let spec = run.spec;
        let kind = spec.kind();
        let identity = prior.identity.clone();

        // last write plus the new declaration: local fields and computed values
        let mut known = prior.last_applied.clone().unwrap_or_default();
        for (field, value) in desired.iter() {
            known.insert(field.clone(), value.clone());
        }

        let observed_record = if spec.read().is_some() {
            run.advance(LifecycleState::Reading)?;
            match self.read(&mut run, &identity, &known)? {
                Some(record) => {
                    run.advance(LifecycleState::Present)?;
                    Some(record)
                }
                None => {
                    run.advance(LifecycleState::Absent)?;
                    run.push(Diagnostic::warning(format!(
                        "{kind} {identity} no longer exists remotely; creating it again"
                    )));
                    return self.create(run, desired);
                }
            }
        } else {
            None
        };

        let mut finished_steps = false;
        if !prior.pending_steps.is_empty() {
            run.advance(LifecycleState::Updating)?;
            let report = CompensationCoordinator::new(&self.client).resume(
                spec,
                &identity,
                &known,
                &prior.pending_steps,
            );
            run.writes += report.requests_sent();
            for (field, value) in &report.captured {
                known.insert(field.clone(), value.clone());
            }

            if let Some(failure) = &report.failed {
                run.push(Diagnostic::error(format!(
                    "{kind} {identity}: step '{}' failed again: {}",
                    failure.step, failure.error
                )));
                run.pending = report.pending();
                run.push(Diagnostic::info(format!(
                    "pending: [{}]; the next apply retries them",
                    run.pending.join(", ")
                )));
                run.advance(LifecycleState::PartiallyCreated)?;
                let action = if report.succeeded.is_empty() {
                    Action::Unchanged
                } else {
                    Action::Updated
                };
                let record =
                    observed_record.unwrap_or_else(|| DriftReader::echo(spec, &identity, &known));
                let projected = DriftReader::project(spec, &record, Some(&known));
                return Ok(run.finish(identity, action, Some(record), projected));
            }

            run.advance(LifecycleState::Present)?;
            if !report.succeeded.is_empty() {
                run.push(Diagnostic::info(format!(
                    "finished pending steps: [{}]",
                    report.succeeded.join(", ")
                )));
                finished_steps = true;
            }
        }

        let observed = match (&observed_record, &prior.last_applied) {
            (Some(record), last) => DriftReader::project(spec, record, last.as_ref()),
            (None, Some(last)) => last.clone(),
            (None, None) => {
                run.push(Diagnostic::warning(format!(
                    "{kind} {identity} cannot be read back and no previous state is recorded; \
                     assuming it matches the declaration"
                )));
                known.clone()
            }
        };

        let diff = StateDiff::compute(spec, desired, &observed);
        if diff.is_empty() {
            log::debug!("{kind} {identity}: up to date");
            let record = observed_record.unwrap_or_else(|| DriftReader::echo(spec, &identity, &known));
            let projected = DriftReader::project(spec, &record, Some(&known));
            let action = if finished_steps {
                Action::Updated
            } else {
                Action::Unchanged
            };
            return Ok(run.finish(identity, action, Some(record), projected));
        }

        let immutable = diff.immutable_fields();
        if !immutable.is_empty() {
            log::warn!("{kind} {identity}: {diff}");
            return Err(Error::Conflict {
                kind: kind.to_string(),
                identity,
                fields: immutable,
            });
        }
        let Some(update) = spec.update() else {
            return Err(Error::Conflict {
                kind: kind.to_string(),
                identity,
                fields: diff.mutable_fields(),
            });
        };

        log::info!("updating {kind} {identity}: {diff}");
        run.advance(LifecycleState::Updating)?;
        let response = self.write(&mut run, Operation::Update, update, Some(&identity), &known)?;
        if !response.is_success() {
            return Err(Error::rejection(
                Operation::Update,
                kind,
                Some(&identity),
                response.status,
                response.body,
            ));
        }
        if let Some(consume) = update.on_success {
            consume(&known, &response).map_err(|message| {
                Error::invalid_response(Operation::Update, kind, Some(&identity), message, "")
            })?;
        }
        run.advance(LifecycleState::Present)?;

        let record = if spec.read().is_some() {
            run.advance(LifecycleState::Reading)?;
            let record = self.read_back(&mut run, &identity, &known);
            run.advance(LifecycleState::Present)?;
            record
        } else {
            DriftReader::echo(spec, &identity, &known)
        };

        let projected = DriftReader::project(spec, &record, Some(&known));
        Ok(run.finish(identity, Action::Updated, Some(record), projected))
    }

    /// Look for an instance left behind by a create whose response was lost
    fn recover(&self, run: &mut Run<'_>, desired: &DesiredState) -> Result<Option<Identity>> {
        let spec = run.spec;
        let kind = spec.kind();
        if spec.natural_key().is_empty() || spec.list().is_none() {
            run.push(Diagnostic::warning(format!(
                "an earlier create of this {kind} had an unknown outcome and it cannot be \
                 looked up; creating again"
            )));
            return Ok(None);
        }

        run.advance(LifecycleState::Reading)?;
        match IdentityResolver::new(&self.client).resolve(spec, desired) {
            Ok(identity) => {
                run.advance(LifecycleState::Present)?;
                run.push(Diagnostic::info(format!(
                    "adopted {kind} {identity} left by an interrupted create"
                )));
                Ok(Some(identity))
            }
            Err(Error::NotFoundAfterCreate { .. }) => {
                run.advance(LifecycleState::Absent)?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn created_identity(
        &self,
        spec: &ResourceSpec,
        raw: &Value,
        desired: &DesiredState,
    ) -> Option<Identity> {
        match spec.identity_source() {
            IdentitySource::Response(path) => get_path(raw, path).and_then(Identity::from_value),
            IdentitySource::Field(name) => desired.get(name).and_then(Identity::from_value),
            IdentitySource::Fixed(id) => Some(Identity::new(id.clone())),
            IdentitySource::Template(template) => {
                IdentitySource::render_template(template, desired).map(Identity::new)
            }
        }
    }

    /// Read one instance; `Ok(None)` means the remote reports it absent
    fn read(
        &self,
        run: &mut Run<'_>,
        identity: &Identity,
        context: &DesiredState,
    ) -> Result<Option<RemoteRecord>> {
        let spec = run.spec;
        let kind = spec.kind();
        let Some(route) = spec.read() else {
            return Err(Error::unsupported(Operation::Read, kind));
        };

        let response = self.send(run, Operation::Read, route, Some(identity), context, Payload::Empty)?;
        if response.is_not_found() {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(Error::rejection(
                Operation::Read,
                kind,
                Some(identity),
                response.status,
                response.body,
            ));
        }

        let record = serde_json::from_str::<Value>(&response.body)
            .ok()
            .filter(Value::is_object)
            .map(|raw| DriftReader::record(spec, identity, &raw, context));

        if spec.reads_via_list() && record.as_ref().is_none_or(|r| !has_natural_key(spec, r)) {
            log::debug!("{kind} {identity}: read body unusable, scanning list");
            return IdentityResolver::new(&self.client).find_by_identity(spec, identity, context);
        }

        match record {
            Some(record) => Ok(Some(record)),
            None => Err(Error::invalid_response(
                Operation::Read,
                kind,
                Some(identity),
                "expected a JSON object",
                response.body,
            )),
        }
    }

    /// Read after a successful write; failures degrade to a best-effort record
    fn read_back(&self, run: &mut Run<'_>, identity: &Identity, applied: &DesiredState) -> RemoteRecord {
        let spec = run.spec;
        match self.read(run, identity, applied) {
            Ok(Some(record)) => record,
            Ok(None) => {
                run.push(Diagnostic::warning(format!(
                    "{} {identity} was written but is not visible yet; recorded state echoes this apply",
                    spec.kind()
                )));
                DriftReader::echo(spec, identity, applied)
            }
            Err(err) => {
                run.push(Diagnostic::warning(format!(
                    "read after write failed, recorded state echoes this apply: {err}"
                )));
                DriftReader::echo(spec, identity, applied)
            }
        }
    }

    fn send(
        &self,
        run: &mut Run<'_>,
        op: Operation,
        route: &Route,
        identity: Option<&Identity>,
        state: &DesiredState,
        payload: Payload,
    ) -> Result<Response> {
        let request = Self::request(run, route, identity, state, payload)?;
        self.dispatch(run, op, identity, &request)
    }

    /// Build and send a create or update, including any kind-specific headers
    fn write(
        &self,
        run: &mut Run<'_>,
        op: Operation,
        write: &WriteOp,
        identity: Option<&Identity>,
        state: &DesiredState,
    ) -> Result<Response> {
        let kind = run.kind();
        let payload = write
            .payload
            .build(run.spec, state)
            .map_err(|message| Error::invalid_desired(kind, message))?;
        let mut request = Self::request(run, &write.route, identity, state, payload)?;
        let headers = write
            .build_headers(state)
            .map_err(|message| Error::invalid_desired(kind, message))?;
        for (name, value) in headers {
            request = request.with_header(name, value);
        }
        self.dispatch(run, op, identity, &request)
    }

    fn request(
        run: &Run<'_>,
        route: &Route,
        identity: Option<&Identity>,
        state: &DesiredState,
        payload: Payload,
    ) -> Result<Request> {
        let path = route
            .render(identity, state)
            .map_err(|message| Error::invalid_desired(run.kind(), message))?;

        let mut request = Request::new(route.method, path);
        if let Some(body) = payload.into_body() {
            request = request.with_body(body);
        }
        Ok(request)
    }

    fn dispatch(
        &self,
        run: &mut Run<'_>,
        op: Operation,
        identity: Option<&Identity>,
        request: &Request,
    ) -> Result<Response> {
        let kind = run.kind();
        if request.method.is_write() {
            run.writes += 1;
        }
        log::debug!("{op} {kind}: {} {}", request.method, request.path);

        self.client
            .execute(request)
            .map_err(|e| Error::transport(op, kind, identity, e))
    }
}

fn has_natural_key(spec: &ResourceSpec, record: &RemoteRecord) -> bool {
    spec.natural_key().iter().all(|field| match record.get(field) {
        Some(Value::String(s)) => !s.is_empty(),
        Some(value) => !value.is_null(),
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Method, MockClient};
    use crate::error::TransportError;
    use crate::fixtures;
    use serde_json::json;

    fn reconciler(mock: &MockClient) -> Reconciler<MockClient> {
        let mut registry = SpecRegistry::new();
        registry.register(fixtures::team_spec()).unwrap();
        registry.register(fixtures::user_spec()).unwrap();
        registry.register(fixtures::channel_spec()).unwrap();
        registry.register(fixtures::webhook_spec()).unwrap();
        registry.register(fixtures::endpoint_spec()).unwrap();
        registry.register(fixtures::settings_spec()).unwrap();
        Reconciler::new(mock.clone(), registry)
    }

    fn ops() -> DesiredState {
        DesiredState::new().with("name", "ops")
    }

    #[test]
    fn test_team_create_then_idempotent_apply() {
        let mock = MockClient::new();
        mock.respond(Method::Post, "/teams", 200, r#"{"Id":7,"Name":"ops"}"#);
        mock.respond(Method::Get, "/teams/7", 200, r#"{"Id":7,"Name":"ops"}"#);
        let engine = reconciler(&mock);

        let first = engine.apply("team", &ops(), &PriorState::none()).unwrap();
        assert_eq!(first.identity, Identity::new("7"));
        assert_eq!(first.state, LifecycleState::Present);
        assert_eq!(first.action, Action::Created);
        assert_eq!(first.record.as_ref().unwrap().get("name"), Some(&json!("ops")));
        assert!(first.diagnostics.is_empty());
        assert!(first.terminal);

        mock.clear_requests();
        let prior = PriorState::new(first.identity.clone(), Some(first.desired.clone()));
        let second = engine.apply("team", &ops(), &prior).unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[0].path, "/teams/7");
        assert_eq!(second.writes, 0);
        assert_eq!(second.action, Action::Unchanged);
        assert_eq!(second.record, first.record);
        assert!(second.diagnostics.is_empty());
    }

    #[test]
    fn test_create_sends_payload_from_field_table() {
        let mock = MockClient::new();
        mock.respond(Method::Post, "/teams", 200, r#"{"Id":7}"#);
        mock.respond(Method::Get, "/teams/7", 200, r#"{"Id":7,"Name":"ops"}"#);
        reconciler(&mock)
            .apply("team", &ops(), &PriorState::none())
            .unwrap();

        let requests = mock.requests();
        let body = requests[0].body.as_ref().unwrap();
        assert_eq!(body.text(), r#"{"Name":"ops"}"#);
    }

    #[test]
    fn test_user_identity_resolved_by_username() {
        let mock = MockClient::new();
        mock.respond(Method::Post, "/users", 200, "{}");
        mock.respond(
            Method::Get,
            "/users",
            200,
            r#"[{"Id":1,"Username":"admin"},{"Id":12,"Username":"alice"}]"#,
        );
        mock.respond(Method::Get, "/users/12", 200, r#"{"Id":12,"Username":"alice","Role":2}"#);

        let desired = DesiredState::new()
            .with("username", "alice")
            .with("password", "pw");
        let result = reconciler(&mock)
            .apply("user", &desired, &PriorState::none())
            .unwrap();

        assert_eq!(result.identity, Identity::new("12"));
        assert_eq!(result.state, LifecycleState::Present);
        assert_eq!(mock.requests_for(Method::Post).len(), 1);
        // password is local: carried from the declaration
        assert_eq!(result.desired.get_str("password"), Some("pw"));
    }

    #[test]
    fn test_user_identity_ambiguous() {
        let mock = MockClient::new();
        mock.respond(Method::Post, "/users", 200, "{}");
        mock.respond(
            Method::Get,
            "/users",
            200,
            r#"[{"Id":12,"Username":"alice"},{"Id":13,"Username":"alice"}]"#,
        );
        let desired = DesiredState::new()
            .with("username", "alice")
            .with("password", "pw");
        let result = reconciler(&mock)
            .apply("user", &desired, &PriorState::none())
            .unwrap();
        assert_eq!(result.state, LifecycleState::Unknown);
        assert_eq!(result.action, Action::Unresolved);
        assert!(result.identity.is_empty());
        assert!(!result.terminal);
        assert!(result.has_errors());
        assert_eq!(mock.write_count(), 1);
    }

    #[test]
    fn test_identity_lost_after_create_is_looked_up_not_resent() {
        let mock = MockClient::new();
        mock.respond(Method::Post, "/users", 200, "{}");
        mock.respond(Method::Get, "/users", 200, "[]");
        mock.respond(Method::Get, "/users", 200, r#"[{"Id":12,"Username":"alice"}]"#);
        mock.respond(Method::Get, "/users/12", 200, r#"{"Id":12,"Username":"alice","Role":2}"#);
        let engine = reconciler(&mock);
        let desired = DesiredState::new()
            .with("username", "alice")
            .with("password", "pw");

        let first = engine.apply("user", &desired, &PriorState::none()).unwrap();
        assert_eq!(first.state, LifecycleState::Unknown);
        assert_eq!(first.action, Action::Unresolved);
        assert_eq!(first.writes, 1);
        assert!(
            first
                .diagnostics
                .iter()
                .any(|d| d.severity == Severity::Error && d.message.contains("not re-sent"))
        );

        let prior = PriorState::unresolved(Some(first.desired.clone()));
        let second = engine.apply("user", &desired, &prior).unwrap();
        assert_eq!(second.identity, Identity::new("12"));
        assert_eq!(second.state, LifecycleState::Present);
        assert!(second.is_success());
        assert_eq!(mock.requests_for(Method::Post).len(), 1);
    }

    #[test]
    fn test_compensation_failure_is_partially_created() {
        let mock = MockClient::new();
        mock.respond(Method::Post, "/users", 200, r#"{"Id":12}"#);
        mock.respond(Method::Post, "/team_memberships", 200, "{}");
        mock.respond(Method::Post, "/users/12/tokens", 500, "token store unavailable");
        mock.respond(Method::Get, "/users/12", 200, r#"{"Id":12,"Username":"alice","Role":2}"#);

        let desired = DesiredState::new()
            .with("username", "alice")
            .with("password", "pw")
            .with("team_id", 3)
            .with("api_key_description", "ci");
        let result = reconciler(&mock)
            .apply("user", &desired, &PriorState::none())
            .unwrap();

        assert_eq!(result.state, LifecycleState::PartiallyCreated);
        assert_eq!(result.identity, Identity::new("12"));
        assert!(!result.terminal);
        let errors: Vec<_> = result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("generate-api-key"));
        assert!(errors[0].message.contains("token store unavailable"));
        assert_eq!(result.pending_steps, vec!["generate-api-key"]);
        assert_eq!(mock.requests_for(Method::Delete).len(), 0);
        assert_eq!(
            result.history,
            vec![
                LifecycleState::Absent,
                LifecycleState::Creating,
                LifecycleState::PartiallyCreated,
                LifecycleState::Reading,
                LifecycleState::PartiallyCreated,
            ]
        );
    }

    #[test]
    fn test_next_apply_retries_pending_steps() {
        let mock = MockClient::new();
        mock.respond(Method::Post, "/users", 200, r#"{"Id":12}"#);
        mock.respond(Method::Post, "/team_memberships", 500, "boom");
        mock.respond(Method::Post, "/team_memberships", 200, r#"{"Id":1}"#);
        mock.respond(Method::Post, "/users/12/tokens", 200, r#"{"rawAPIKey":"ptr_k"}"#);
        mock.respond(Method::Get, "/users/12", 200, r#"{"Id":12,"Username":"alice","Role":2}"#);
        let engine = reconciler(&mock);
        let desired = DesiredState::new()
            .with("username", "alice")
            .with("password", "pw")
            .with("team_id", 3)
            .with("api_key_description", "ci");

        let first = engine.apply("user", &desired, &PriorState::none()).unwrap();
        assert_eq!(first.state, LifecycleState::PartiallyCreated);
        assert_eq!(first.pending_steps, vec!["assign-team", "generate-api-key"]);

        let prior = PriorState::new(first.identity.clone(), Some(first.desired.clone()))
            .with_pending_steps(first.pending_steps.clone());
        let second = engine.apply("user", &desired, &prior).unwrap();
        assert_eq!(second.state, LifecycleState::Present);
        assert_eq!(second.action, Action::Updated);
        assert!(second.is_success());
        assert!(second.pending_steps.is_empty());
        assert_eq!(second.writes, 2);
        assert_eq!(second.desired.get_str("api_key"), Some("ptr_k"));

        let posts: Vec<String> = mock
            .requests_for(Method::Post)
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(
            posts,
            vec!["/users", "/team_memberships", "/team_memberships", "/users/12/tokens"]
        );
    }

    #[test]
    fn test_pending_step_failing_again_stays_partial() {
        let mock = MockClient::new();
        mock.respond(Method::Get, "/users/12", 200, r#"{"Id":12,"Username":"alice","Role":2}"#);
        mock.respond(Method::Post, "/users/12/tokens", 500, "token store unavailable");
        let last = DesiredState::new()
            .with("username", "alice")
            .with("password", "pw")
            .with("role", 2)
            .with("ldap_user", false)
            .with("api_key_description", "ci");
        let prior = PriorState::new(Identity::new("12"), Some(last.clone()))
            .with_pending_steps(vec!["generate-api-key".to_string()]);

        let result = reconciler(&mock).apply("user", &last, &prior).unwrap();
        assert_eq!(result.state, LifecycleState::PartiallyCreated);
        assert_eq!(result.action, Action::Unchanged);
        assert!(!result.terminal);
        assert_eq!(result.pending_steps, vec!["generate-api-key"]);
        assert!(result.has_errors());
        assert_eq!(mock.requests_for(Method::Post).len(), 1);
    }

    #[test]
    fn test_captured_api_key_is_persisted() {
        let mock = MockClient::new();
        mock.respond(Method::Post, "/users", 200, r#"{"Id":12}"#);
        mock.respond(Method::Post, "/users/12/tokens", 200, r#"{"rawAPIKey":"ptr_k"}"#);
        mock.respond(Method::Get, "/users/12", 200, r#"{"Id":12,"Username":"alice","Role":2}"#);

        let desired = DesiredState::new()
            .with("username", "alice")
            .with("password", "pw")
            .with("api_key_description", "ci");
        let result = reconciler(&mock)
            .apply("user", &desired, &PriorState::none())
            .unwrap();
        assert_eq!(result.state, LifecycleState::Present);
        assert_eq!(result.desired.get_str("api_key"), Some("ptr_k"));
        assert_eq!(result.writes, 2);
    }

    #[test]
    fn test_transport_failure_on_create_is_unknown() {
        let mock = MockClient::new();
        mock.fail(Method::Post, "/teams", TransportError::timeout("deadline exceeded"));

        let result = reconciler(&mock)
            .apply("team", &ops(), &PriorState::none())
            .unwrap();
        assert_eq!(result.state, LifecycleState::Unknown);
        assert_eq!(result.action, Action::Unresolved);
        assert!(result.identity.is_empty());
        assert!(!result.terminal);
        assert!(result.has_errors());
        assert_eq!(mock.requests().len(), 1);
    }

    #[test]
    fn test_unresolved_prior_adopts_existing() {
        let mock = MockClient::new();
        mock.respond(Method::Get, "/teams", 200, r#"[{"Id":7,"Name":"ops"}]"#);
        mock.respond(Method::Get, "/teams/7", 200, r#"{"Id":7,"Name":"ops"}"#);

        let result = reconciler(&mock)
            .apply("team", &ops(), &PriorState::unresolved(None))
            .unwrap();
        assert_eq!(result.identity, Identity::new("7"));
        assert_eq!(result.action, Action::Unchanged);
        assert_eq!(mock.write_count(), 0);
    }

    #[test]
    fn test_unresolved_prior_creates_when_absent() {
        let mock = MockClient::new();
        mock.respond(Method::Get, "/teams", 200, "[]");
        mock.respond(Method::Post, "/teams", 200, r#"{"Id":8}"#);
        mock.respond(Method::Get, "/teams/8", 200, r#"{"Id":8,"Name":"ops"}"#);

        let result = reconciler(&mock)
            .apply("team", &ops(), &PriorState::unresolved(None))
            .unwrap();
        assert_eq!(result.identity, Identity::new("8"));
        assert_eq!(result.action, Action::Created);
    }

    #[test]
    fn test_create_rejection_is_fatal() {
        let mock = MockClient::new();
        mock.respond(Method::Post, "/teams", 409, r#"{"message":"Team already exists"}"#);
        let err = reconciler(&mock)
            .apply("team", &ops(), &PriorState::none())
            .unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert!(err.to_string().contains("Team already exists"));
        assert!(err.to_string().starts_with("create team"));
    }

    #[test]
    fn test_immutable_change_is_conflict_without_writes() {
        let mock = MockClient::new();
        mock.respond(Method::Get, "/teams/7", 200, r#"{"Id":7,"Name":"ops"}"#);
        let prior = PriorState::new(Identity::new("7"), Some(ops()));
        let desired = DesiredState::new().with("name", "platform");

        let err = reconciler(&mock).apply("team", &desired, &prior).unwrap_err();
        match err {
            Error::Conflict { fields, identity, .. } => {
                assert_eq!(fields, vec!["name".to_string()]);
                assert_eq!(identity, Identity::new("7"));
            }
            other => panic!("Expected Conflict, got {other:?}"),
        }
        assert_eq!(mock.write_count(), 0);
    }

    #[test]
    fn test_mutable_change_updates_then_reads() {
        let mock = MockClient::new();
        mock.respond(Method::Get, "/channels/3", 200, r#"{"Id":3,"Name":"general","Topic":"old"}"#);
        mock.respond(Method::Get, "/channels/3", 200, r#"{"Id":3,"Name":"general","Topic":"new"}"#);
        mock.respond(Method::Put, "/channels/3", 200, "{}");

        let prior = PriorState::new(
            Identity::new("3"),
            Some(DesiredState::new().with("name", "general").with("topic", "old")),
        );
        let desired = DesiredState::new().with("name", "general").with("topic", "new");
        let result = reconciler(&mock).apply("channel", &desired, &prior).unwrap();

        assert_eq!(result.action, Action::Updated);
        assert_eq!(result.writes, 1);
        assert_eq!(result.desired.get_str("topic"), Some("new"));
        let puts = mock.requests_for(Method::Put);
        assert_eq!(puts[0].body.as_ref().unwrap().text(), r#"{"Topic":"new"}"#);
        assert_eq!(mock.requests_for(Method::Get).len(), 2);
    }

    #[test]
    fn test_externally_deleted_is_recreated() {
        let mock = MockClient::new();
        mock.respond(Method::Get, "/teams/7", 404, "");
        mock.respond(Method::Post, "/teams", 200, r#"{"Id":9}"#);
        mock.respond(Method::Get, "/teams/9", 200, r#"{"Id":9,"Name":"ops"}"#);

        let prior = PriorState::new(Identity::new("7"), Some(ops()));
        let result = reconciler(&mock).apply("team", &ops(), &prior).unwrap();
        assert_eq!(result.identity, Identity::new("9"));
        assert_eq!(result.action, Action::Created);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].severity, Severity::Warning);
    }

    #[test]
    fn test_read_unsupported_is_best_effort() {
        let mock = MockClient::new();
        mock.respond(Method::Post, "/webhooks", 200, r#"{"Id":5,"Token":"tok-1"}"#);
        let desired = DesiredState::new()
            .with("resource_id", "svc")
            .with("endpoint_id", 2);

        let engine = reconciler(&mock);
        let created = engine.apply("webhook", &desired, &PriorState::none()).unwrap();
        let record = created.record.as_ref().unwrap();
        assert!(record.best_effort);
        assert_eq!(record.get("token"), Some(&json!("tok-1")));
        assert_eq!(created.desired.get_str("token"), Some("tok-1"));
        assert_eq!(created.diagnostics.len(), 1);
        assert_eq!(created.diagnostics[0].severity, Severity::Warning);

        mock.clear_requests();
        let prior = PriorState::new(created.identity.clone(), Some(created.desired.clone()));
        let again = engine.apply("webhook", &desired, &prior).unwrap();
        assert!(mock.requests().is_empty());
        assert_eq!(again.action, Action::Unchanged);
        assert!(again.diagnostics.is_empty());
        assert_eq!(again.desired.get_str("token"), Some("tok-1"));
    }

    #[test]
    fn test_template_identity_and_write_headers() {
        fn token(state: &DesiredState) -> std::result::Result<Vec<(String, String)>, String> {
            Ok(state
                .get_str("token")
                .map(|t| vec![("X-Token".to_string(), t.to_string())])
                .unwrap_or_default())
        }
        use crate::spec::FieldSpec;

        let spec = ResourceSpec::builder("image")
            .field(FieldSpec::int("endpoint_id").required())
            .field(FieldSpec::string("image").required())
            .field(FieldSpec::string("token").sensitive())
            .identity(IdentitySource::template("{endpoint_id}-{image}"))
            .create(
                WriteOp::with_payload(
                    Route::post("/endpoints/{endpoint_id}/images").query_field("from", "image"),
                    crate::route::PayloadBuilder::Empty,
                )
                .headers(token),
            )
            .delete(DeleteOp::Forget)
            .build()
            .unwrap();
        let mut registry = SpecRegistry::new();
        registry.register(spec).unwrap();
        let mock = MockClient::new();
        mock.respond(Method::Post, "/endpoints/2/images?from=nginx%3A1.27", 200, "");
        let engine = Reconciler::new(mock.clone(), registry);

        let desired = DesiredState::new()
            .with("endpoint_id", 2)
            .with("image", "nginx:1.27")
            .with("token", "t0k");
        let created = engine.apply("image", &desired, &PriorState::none()).unwrap();
        assert_eq!(created.action, Action::Created);
        assert_eq!(created.identity, Identity::new("2-nginx:1.27"));

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].body.is_none());
        assert_eq!(
            requests[0].headers,
            vec![("X-Token".to_string(), "t0k".to_string())]
        );
    }

    #[test]
    fn test_read_unsupported_immutable_change_conflicts() {
        let mock = MockClient::new();
        let last = DesiredState::new()
            .with("resource_id", "svc")
            .with("endpoint_id", 2)
            .with("token", "tok-1");
        let prior = PriorState::new(Identity::new("5"), Some(last));
        let desired = DesiredState::new()
            .with("resource_id", "other")
            .with("endpoint_id", 2);
        let err = reconciler(&mock).apply("webhook", &desired, &prior).unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_destroy_treats_404_as_success() {
        let mock = MockClient::new();
        mock.respond(Method::Delete, "/teams/7", 404, "");
        let result = reconciler(&mock)
            .destroy("team", &Identity::new("7"), &DesiredState::new())
            .unwrap();
        assert_eq!(result.state, LifecycleState::Absent);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mock = MockClient::new();
        mock.respond(Method::Delete, "/teams/7", 204, "");
        mock.respond(Method::Delete, "/teams/7", 404, "");
        let engine = reconciler(&mock);
        let first = engine
            .destroy("team", &Identity::new("7"), &DesiredState::new())
            .unwrap();
        let second = engine
            .destroy("team", &Identity::new("7"), &DesiredState::new())
            .unwrap();
        assert_eq!(first.state, LifecycleState::Absent);
        assert_eq!(second.state, LifecycleState::Absent);
        assert!(second.diagnostics.is_empty());
    }

    #[test]
    fn test_destroy_failure_is_verbatim() {
        let mock = MockClient::new();
        mock.respond(Method::Delete, "/teams/7", 500, "database is locked");
        let err = reconciler(&mock)
            .destroy("team", &Identity::new("7"), &DesiredState::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "delete team 7: HTTP 500: database is locked");
    }

    #[test]
    fn test_destroy_empty_identity_is_noop() {
        let mock = MockClient::new();
        let result = reconciler(&mock)
            .destroy("team", &Identity::empty(), &DesiredState::new())
            .unwrap();
        assert_eq!(result.state, LifecycleState::Absent);
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_destroy_forget_is_local_only() {
        let mock = MockClient::new();
        let result = reconciler(&mock)
            .destroy("settings", &Identity::new("settings"), &DesiredState::new())
            .unwrap();
        assert_eq!(result.state, LifecycleState::Absent);
        assert_eq!(result.action, Action::Forgotten);
        assert_eq!(result.diagnostics[0].severity, Severity::Info);
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_import_round_trip() {
        let mock = MockClient::new();
        mock.respond(Method::Post, "/teams", 200, r#"{"Id":7}"#);
        mock.respond(Method::Get, "/teams/7", 200, r#"{"Id":7,"Name":"ops"}"#);
        let engine = reconciler(&mock);

        let created = engine.apply("team", &ops(), &PriorState::none()).unwrap();
        let imported = engine
            .import("team", &created.identity, &DesiredState::new())
            .unwrap();
        assert_eq!(imported.action, Action::Imported);
        assert_eq!(imported.desired, ops());

        mock.clear_requests();
        let prior = PriorState::new(created.identity.clone(), Some(imported.desired.clone()));
        let again = engine.apply("team", &imported.desired, &prior).unwrap();
        assert_eq!(again.action, Action::Unchanged);
        assert_eq!(mock.write_count(), 0);
    }

    #[test]
    fn test_import_absent_is_not_found() {
        let mock = MockClient::new();
        let err = reconciler(&mock)
            .import("team", &Identity::new("99"), &DesiredState::new())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_import_unsupported_without_read() {
        let mock = MockClient::new();
        let err = reconciler(&mock)
            .import("webhook", &Identity::new("5"), &DesiredState::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Unsupported {
                op: Operation::Import,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_declaration_sends_nothing() {
        let mock = MockClient::new();
        let desired = DesiredState::new().with("name", "ops").with("colour", "red");
        let err = reconciler(&mock)
            .apply("team", &desired, &PriorState::none())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDesiredState { .. }));
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_unknown_kind() {
        let mock = MockClient::new();
        let err = reconciler(&mock)
            .apply("stack", &DesiredState::new(), &PriorState::none())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownKind(_)));
    }

    #[test]
    fn test_fixed_identity_singleton() {
        let mock = MockClient::new();
        mock.respond(Method::Put, "/settings", 200, "");
        let desired = DesiredState::new().with("motd", "hello");
        let result = reconciler(&mock)
            .apply("settings", &desired, &PriorState::none())
            .unwrap();
        assert_eq!(result.identity, Identity::new("settings"));
        assert!(result.record.unwrap().best_effort);
    }

    #[test]
    fn test_discriminated_projection_through_apply() {
        let mock = MockClient::new();
        mock.respond(Method::Post, "/endpoints", 200, r#"{"Id":4}"#);
        mock.respond(
            Method::Get,
            "/endpoints/4",
            200,
            r#"{"Id":4,"Name":"edge","Type":2,"URL":"tcp://10.0.0.4:9001","PublicURL":"tcp://10.0.0.4:9001"}"#,
        );
        let desired = DesiredState::new()
            .with("name", "edge")
            .with("type", 2)
            .with("address", "tcp://10.0.0.4:9001");
        let result = reconciler(&mock)
            .apply("endpoint", &desired, &PriorState::none())
            .unwrap();
        assert_eq!(result.desired.get_str("address"), Some("tcp://10.0.0.4:9001"));
    }
}
