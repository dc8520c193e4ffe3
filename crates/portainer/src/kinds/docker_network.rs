//! `docker_network`: a Docker network inside one environment.
//!
//! Requests go through Portainer's Docker proxy, so every path carries the
//! environment id. Destroying a network needs `endpoint_id` from the
//! recorded state.

use reconcile::{DeleteOp, FieldSpec, IdentitySource, ResourceSpec, Result, Route, WriteOp};

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("docker_network")
        .describe("Docker network in a Portainer environment")
        .field(
            FieldSpec::int("endpoint_id")
                .required()
                .describe("Environment the network lives in"),
        )
        .field(FieldSpec::string("name").required().wire("Name"))
        .field(FieldSpec::string("driver").default("bridge").wire("Driver"))
        .field(FieldSpec::string("scope").wire("Scope"))
        .field(FieldSpec::bool("internal").default(false).wire("Internal"))
        .field(FieldSpec::bool("attachable").default(false).wire("Attachable"))
        .field(FieldSpec::bool("ingress").default(false).wire("Ingress"))
        .field(FieldSpec::bool("config_only").default(false).wire("ConfigOnly"))
        .field(
            FieldSpec::string("config_from")
                .wire("ConfigFrom.Network")
                .describe("Config-only network to copy settings from"),
        )
        .field(FieldSpec::string_map("options").wire("Options"))
        .field(FieldSpec::string_map("labels").wire("Labels"))
        .identity(IdentitySource::response("Id"))
        .create(WriteOp::new(Route::post(
            "/endpoints/{endpoint_id}/docker/networks/create",
        )))
        .delete(DeleteOp::Remote(Route::delete(
            "/endpoints/{endpoint_id}/docker/networks/{id}",
        )))
        .build()
}

#[cfg(test)]
mod tests {
    use crate::kinds::engine;
    use reconcile::{DesiredState, Error, Identity, LifecycleState, Method, MockClient, PriorState};
    use serde_json::json;

    const NETWORK_ID: &str = "9c1d1e4b7f2a";

    #[test]
    fn test_create_under_endpoint() {
        let mock = MockClient::new();
        mock.respond(
            Method::Post,
            "/endpoints/2/docker/networks/create",
            201,
            r#"{"Id":"9c1d1e4b7f2a","Warning":""}"#,
        );
        let engine = engine(&mock);

        let desired = DesiredState::new()
            .with("endpoint_id", 2)
            .with("name", "backend")
            .with("config_from", "base")
            .with("labels", json!({"team": "ops"}));
        let result = engine
            .apply("docker_network", &desired, &PriorState::none())
            .unwrap();
        assert_eq!(result.identity, Identity::new(NETWORK_ID));
        assert_eq!(result.desired.get_i64("endpoint_id"), Some(2));

        let posts = mock.requests_for(Method::Post);
        let body: serde_json::Value =
            serde_json::from_str(&posts[0].body.as_ref().unwrap().text()).unwrap();
        assert_eq!(
            body,
            json!({
                "Name": "backend",
                "Driver": "bridge",
                "Internal": false,
                "Attachable": false,
                "Ingress": false,
                "ConfigOnly": false,
                "ConfigFrom": {"Network": "base"},
                "Labels": {"team": "ops"}
            })
        );
    }

    #[test]
    fn test_destroy_uses_recorded_endpoint() {
        let mock = MockClient::new();
        mock.respond(
            Method::Delete,
            "/endpoints/2/docker/networks/9c1d1e4b7f2a",
            204,
            "",
        );
        let engine = engine(&mock);

        let recorded = DesiredState::new().with("endpoint_id", 2).with("name", "backend");
        let result = engine
            .destroy("docker_network", &Identity::new(NETWORK_ID), &recorded)
            .unwrap();
        assert_eq!(result.state, LifecycleState::Absent);
    }

    #[test]
    fn test_destroy_without_endpoint_fails_cleanly() {
        let mock = MockClient::new();
        let engine = engine(&mock);
        let err = engine
            .destroy("docker_network", &Identity::new(NETWORK_ID), &DesiredState::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDesiredState { .. }));
        assert!(mock.requests().is_empty());
    }
}
