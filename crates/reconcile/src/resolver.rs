//! Identity resolution by natural key
//!
//! Some control planes accept a create but do not return the new resource's
//! identity. The resolver lists the collection and matches entries against
//! the declared natural key. It never guesses: no match and several matches
//! are both errors, and it never issues writes.

use crate::client::{Method, RemoteClient, Request};
use crate::drift::DriftReader;
use crate::error::{Error, Operation, Result};
use crate::route::get_path;
use crate::spec::{IdentitySource, ResourceSpec};
use crate::types::{DesiredState, Identity, RemoteRecord};
use serde_json::Value;

/// Recovers identities by listing and matching
pub struct IdentityResolver<'a, C: ?Sized> {
    client: &'a C,
}

impl<'a, C: RemoteClient + ?Sized> IdentityResolver<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Find the single listed entry whose natural key equals the desired values
    pub fn resolve(&self, spec: &ResourceSpec, desired: &DesiredState) -> Result<Identity> {
        let key = spec.natural_key();
        if key.is_empty() {
            return Err(Error::invalid_spec(
                spec.kind(),
                "identity resolution requires a natural key",
            ));
        }

        let mut wanted = Vec::with_capacity(key.len());
        for field in key {
            let Some(value) = desired.get(field) else {
                return Err(Error::invalid_desired(
                    spec.kind(),
                    format!("natural key field '{field}' is not set"),
                ));
            };
            wanted.push(value);
        }

        let entries = self.list(spec, desired)?;
        let matches: Vec<&RemoteRecord> = entries
            .iter()
            .filter(|record| {
                key.iter()
                    .zip(&wanted)
                    .all(|(field, value)| record.get(field) == Some(*value))
            })
            .collect();

        let values = || wanted.iter().map(|v| display(v)).collect::<Vec<_>>();
        match matches.as_slice() {
            [] => Err(Error::NotFoundAfterCreate {
                kind: spec.kind().to_string(),
                natural_key: key.to_vec(),
                values: values(),
            }),
            [record] if record.identity.is_empty() => Err(Error::invalid_response(
                Operation::List,
                spec.kind(),
                None,
                "matching entry has no identity",
                "",
            )),
            [record] => {
                log::debug!(
                    "{}: resolved {} = {} to {}",
                    spec.kind(),
                    key.join("+"),
                    values().join("+"),
                    record.identity
                );
                Ok(record.identity.clone())
            }
            many => Err(Error::AmbiguousIdentity {
                kind: spec.kind().to_string(),
                natural_key: key.to_vec(),
                values: values(),
                count: many.len(),
            }),
        }
    }

    /// Find a listed entry by identity
    pub fn find_by_identity(
        &self,
        spec: &ResourceSpec,
        identity: &Identity,
        context: &DesiredState,
    ) -> Result<Option<RemoteRecord>> {
        let entries = self.list(spec, context)?;
        Ok(entries.into_iter().find(|r| &r.identity == identity))
    }

    /// List the collection and map every entry to a record
    pub fn list(&self, spec: &ResourceSpec, context: &DesiredState) -> Result<Vec<RemoteRecord>> {
        let kind = spec.kind();
        let Some(route) = spec.list() else {
            return Err(Error::unsupported(Operation::List, kind));
        };
        let path = route
            .render(None, context)
            .map_err(|message| Error::invalid_desired(kind, message))?;

        let response = self
            .client
            .execute(&Request::new(Method::Get, path))
            .map_err(|e| Error::transport(Operation::List, kind, None, e))?;
        if !response.is_success() {
            return Err(Error::rejection(
                Operation::List,
                kind,
                None,
                response.status,
                response.body,
            ));
        }

        let raw: Value = serde_json::from_str(&response.body).map_err(|e| {
            Error::invalid_response(Operation::List, kind, None, e.to_string(), &response.body)
        })?;
        let Value::Array(items) = raw else {
            return Err(Error::invalid_response(
                Operation::List,
                kind,
                None,
                "expected a JSON array",
                response.body,
            ));
        };

        Ok(items
            .iter()
            .map(|item| {
                let identity = entry_identity(spec, item).unwrap_or_default();
                DriftReader::record(spec, &identity, item, context)
            })
            .collect())
    }
}

fn entry_identity(spec: &ResourceSpec, item: &Value) -> Option<Identity> {
    match spec.identity_source() {
        IdentitySource::Response(path) => get_path(item, path).and_then(Identity::from_value),
        IdentitySource::Field(name) => {
            let field = spec.field(name)?;
            let record = DriftReader::record(spec, &Identity::empty(), item, &DesiredState::new());
            record.get(&field.name).and_then(Identity::from_value)
        }
        IdentitySource::Fixed(id) => Some(Identity::new(id.clone())),
        IdentitySource::Template(template) => {
            let record = DriftReader::record(spec, &Identity::empty(), item, &DesiredState::new());
            let fields: DesiredState = record.fields.into_iter().collect();
            IdentitySource::render_template(template, &fields).map(Identity::new)
        }
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
