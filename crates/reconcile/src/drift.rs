//! Drift reader - maps remote payloads onto a kind's field table
//!
//! Remote payloads differ from the declared shape: attribute names differ,
//! some fields are nested, some live under a different attribute depending on
//! a discriminant, and some are never reported at all. The drift reader turns
//! a raw payload into a [`RemoteRecord`] and projects records back into
//! [`DesiredState`] form so they can be diffed against a declaration.

use crate::route::get_path;
use crate::spec::{FieldSpec, ResourceSpec, Source};
use crate::types::{DesiredState, Identity, RemoteRecord};
use serde_json::Value;
use std::collections::BTreeMap;

/// Stateless mapping between remote payloads and declared state
pub struct DriftReader;

impl DriftReader {
    /// Build a record from a raw remote payload.
    ///
    /// For discriminated fields the discriminant's observed value selects the
    /// branch; when the payload does not report it, `context` (the desired or
    /// last-known state) supplies it. Local fields are never present.
    pub fn record(
        spec: &ResourceSpec,
        identity: &Identity,
        raw: &Value,
        context: &DesiredState,
    ) -> RemoteRecord {
        let mut record = RemoteRecord::new(identity.clone());
        for field in spec.fields() {
            if let Some(value) = Self::observe(spec, field, raw, context) {
                record.fields.insert(field.name.clone(), value.clone());
            }
        }
        record
    }

    fn observe<'a>(
        spec: &ResourceSpec,
        field: &FieldSpec,
        raw: &'a Value,
        context: &DesiredState,
    ) -> Option<&'a Value> {
        match &field.source {
            Source::Remote(path) => get_path(raw, path),
            Source::Discriminated(branch) => {
                let observed = spec
                    .field(branch.discriminant())
                    .and_then(|d| match &d.source {
                        Source::Remote(path) => get_path(raw, path),
                        _ => None,
                    });
                let discriminant = observed.or_else(|| context.get(branch.discriminant()));
                let path = branch.select(discriminant)?;
                get_path(raw, path)
            }
            Source::Local => None,
        }
    }

    /// Best-effort record for kinds that cannot be read back.
    ///
    /// Echoes every remote-authoritative field of the last write.
    pub fn echo(spec: &ResourceSpec, identity: &Identity, applied: &DesiredState) -> RemoteRecord {
        let fields: BTreeMap<String, Value> = spec
            .fields()
            .iter()
            .filter(|f| !matches!(f.source, Source::Local))
            .filter_map(|f| applied.get(&f.name).map(|v| (f.name.clone(), v.clone())))
            .collect();
        RemoteRecord {
            identity: identity.clone(),
            fields,
            best_effort: true,
        }
    }

    /// Project a record into declared shape.
    ///
    /// Fields the remote reported win; anything else falls back to
    /// `last_known` (the last local write), then to the declared default.
    pub fn project(
        spec: &ResourceSpec,
        record: &RemoteRecord,
        last_known: Option<&DesiredState>,
    ) -> DesiredState {
        let mut state = DesiredState::new();
        for field in spec.fields() {
            let value = record
                .get(&field.name)
                .or_else(|| last_known.and_then(|known| known.get(&field.name)))
                .or(field.default.as_ref());
            if let Some(value) = value {
                state.insert(field.name.clone(), value.clone());
            }
        }
        state
    }

    /// Values of computed fields found in a write response
    pub fn computed(
        spec: &ResourceSpec,
        identity: &Identity,
        raw: &Value,
        context: &DesiredState,
    ) -> BTreeMap<String, Value> {
        let record = Self::record(spec, identity, raw, context);
        spec.fields()
            .iter()
            .filter(|f| f.computed)
            .filter_map(|f| record.get(&f.name).map(|v| (f.name.clone(), v.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use serde_json::json;

    #[test]
    fn test_record_maps_remote_names() {
        let spec = fixtures::team_spec();
        let raw = json!({"Id": 7, "Name": "ops", "Extra": true});
        let record = DriftReader::record(&spec, &Identity::new("7"), &raw, &DesiredState::new());
        assert_eq!(record.get("name"), Some(&json!("ops")));
        assert_eq!(record.fields.len(), 1);
        assert!(!record.best_effort);
    }

    #[test]
    fn test_discriminant_selects_branch() {
        let spec = fixtures::endpoint_spec();
        let raw = json!({
            "Id": 4, "Name": "edge", "Type": 1,
            "URL": "unix:///var/run/docker.sock", "PublicURL": "10.0.0.4"
        });
        let record = DriftReader::record(&spec, &Identity::new("4"), &raw, &DesiredState::new());
        assert_eq!(record.get("address"), Some(&json!("unix:///var/run/docker.sock")));

        let raw = json!({
            "Id": 5, "Name": "agent", "Type": 2,
            "URL": "tcp://10.0.0.5:9001", "PublicURL": "10.0.0.5"
        });
        let record = DriftReader::record(&spec, &Identity::new("5"), &raw, &DesiredState::new());
        assert_eq!(record.get("address"), Some(&json!("10.0.0.5")));
    }

    #[test]
    fn test_discriminant_wins_over_other_fields() {
        // The desired context says type 2, but the remote reports type 1:
        // the observed discriminant selects the branch.
        let spec = fixtures::endpoint_spec();
        let raw = json!({"Name": "x", "Type": 1, "URL": "unix:///sock", "PublicURL": "pub"});
        let context = DesiredState::new().with("type", 2);
        let record = DriftReader::record(&spec, &Identity::new("1"), &raw, &context);
        assert_eq!(record.get("address"), Some(&json!("unix:///sock")));
    }

    #[test]
    fn test_discriminant_from_context_when_unreported() {
        let spec = fixtures::endpoint_spec();
        let raw = json!({"Name": "x", "URL": "unix:///sock", "PublicURL": "pub"});
        let context = DesiredState::new().with("type", 2);
        let record = DriftReader::record(&spec, &Identity::new("1"), &raw, &context);
        assert_eq!(record.get("address"), Some(&json!("pub")));
    }

    #[test]
    fn test_project_keeps_local_fields() {
        let spec = fixtures::user_spec();
        let raw = json!({"Id": 12, "Username": "alice", "Role": 2});
        let record = DriftReader::record(&spec, &Identity::new("12"), &raw, &DesiredState::new());
        let last = DesiredState::new()
            .with("username", "alice")
            .with("password", "s3cret")
            .with("role", 2)
            .with("ldap_user", false)
            .with("api_key", "ptr_abc");

        let projected = DriftReader::project(&spec, &record, Some(&last));
        assert_eq!(projected.get_str("password"), Some("s3cret"));
        assert_eq!(projected.get_str("api_key"), Some("ptr_abc"));
        assert_eq!(projected.get_str("username"), Some("alice"));
    }

    #[test]
    fn test_project_remote_wins() {
        let spec = fixtures::user_spec();
        let raw = json!({"Id": 12, "Username": "alice", "Role": 1});
        let record = DriftReader::record(&spec, &Identity::new("12"), &raw, &DesiredState::new());
        let last = DesiredState::new().with("username", "alice").with("role", 2);
        let projected = DriftReader::project(&spec, &record, Some(&last));
        assert_eq!(projected.get_i64("role"), Some(1));
    }

    #[test]
    fn test_project_fills_defaults() {
        let spec = fixtures::user_spec();
        let record = RemoteRecord::new(Identity::new("1"));
        let projected = DriftReader::project(&spec, &record, None);
        assert_eq!(projected.get_i64("role"), Some(2));
        assert_eq!(projected.get_bool("ldap_user"), Some(false));
    }

    #[test]
    fn test_echo_skips_local_fields() {
        let spec = fixtures::webhook_spec();
        let applied = DesiredState::new()
            .with("resource_id", "svc-1")
            .with("endpoint_id", 3)
            .with("token", "abc");
        let record = DriftReader::echo(&spec, &Identity::new("9"), &applied);
        assert!(record.best_effort);
        assert_eq!(record.get("token"), Some(&json!("abc")));
        assert_eq!(record.get("resource_id"), Some(&json!("svc-1")));
    }

    #[test]
    fn test_computed_from_response() {
        let spec = fixtures::webhook_spec();
        let raw = json!({"Id": 9, "Token": "abc", "ResourceID": "svc-1"});
        let computed = DriftReader::computed(&spec, &Identity::new("9"), &raw, &DesiredState::new());
        assert_eq!(computed.len(), 1);
        assert_eq!(computed.get("token"), Some(&json!("abc")));
    }
}
