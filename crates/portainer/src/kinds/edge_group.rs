//! `edge_group`: a static or dynamic group of edge environments.

use reconcile::{DeleteOp, FieldSpec, IdentitySource, ResourceSpec, Result, Route, WriteOp};

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("edge_group")
        .describe("Group of edge environments, by explicit list or by tags")
        .field(FieldSpec::string("name").required().wire("name").reads("Name"))
        .field(
            FieldSpec::bool("dynamic")
                .required()
                .wire("dynamic")
                .reads("Dynamic")
                .describe("Membership follows tag_ids instead of endpoints"),
        )
        .field(
            FieldSpec::bool("partial_match")
                .default(false)
                .wire("partialMatch")
                .reads("PartialMatch"),
        )
        .field(
            FieldSpec::int_list("endpoints")
                .wire("endpoints")
                .reads("Endpoints"),
        )
        .field(FieldSpec::int_list("tag_ids").wire("tagIDs").reads("TagIds"))
        .identity(IdentitySource::response("Id"))
        .create(WriteOp::new(Route::post("/edge_groups")))
        .read(Route::get("/edge_groups/{id}"))
        .delete(DeleteOp::Remote(Route::delete("/edge_groups/{id}")))
        .importable()
        .build()
}

#[cfg(test)]
mod tests {
    use crate::kinds::engine;
    use reconcile::{Action, DesiredState, Error, Identity, Method, MockClient, PriorState};
    use serde_json::json;

    fn edge() -> DesiredState {
        DesiredState::new()
            .with("name", "edge-eu")
            .with("dynamic", true)
            .with("tag_ids", json!([1, 2]))
    }

    const READ: &str = r#"{"Id":6,"Name":"edge-eu","Dynamic":true,"PartialMatch":false,"TagIds":[1,2],"Endpoints":[]}"#;

    #[test]
    fn test_create_payload_uses_api_keys() {
        let mock = MockClient::new();
        mock.respond(Method::Post, "/edge_groups", 200, r#"{"Id":6}"#);
        mock.respond(Method::Get, "/edge_groups/6", 200, READ);
        let engine = engine(&mock);

        let result = engine.apply("edge_group", &edge(), &PriorState::none()).unwrap();
        assert_eq!(result.identity, Identity::new("6"));

        let posts = mock.requests_for(Method::Post);
        let body: serde_json::Value =
            serde_json::from_str(&posts[0].body.as_ref().unwrap().text()).unwrap();
        assert_eq!(
            body,
            json!({"name": "edge-eu", "dynamic": true, "partialMatch": false, "tagIDs": [1, 2]})
        );
    }

    #[test]
    fn test_empty_endpoint_list_is_not_drift() {
        let mock = MockClient::new();
        mock.respond(Method::Get, "/edge_groups/6", 200, READ);
        let engine = engine(&mock);

        let prior = PriorState::new(Identity::new("6"), Some(edge().with("partial_match", false)));
        let result = engine.apply("edge_group", &edge(), &prior).unwrap();
        assert_eq!(result.action, Action::Unchanged);
    }

    #[test]
    fn test_tag_change_is_a_conflict() {
        let mock = MockClient::new();
        mock.respond(Method::Get, "/edge_groups/6", 200, READ);
        let engine = engine(&mock);

        let prior = PriorState::new(Identity::new("6"), Some(edge()));
        let desired = edge().with("tag_ids", json!([1, 3]));
        let err = engine.apply("edge_group", &desired, &prior).unwrap_err();
        assert!(matches!(err, Error::Conflict { ref fields, .. } if fields == &["tag_ids"]));
    }
}
