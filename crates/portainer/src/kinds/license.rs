//! `license`: a Portainer Business license key.
//!
//! The key is its own identity. Licenses cannot be read back or detached
//! through the API, so destroy only stops tracking them.

use reconcile::{DeleteOp, FieldSpec, IdentitySource, ResourceSpec, Result, Route, WriteOp};

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("license")
        .describe("Portainer license key")
        .field(FieldSpec::string("key").required().sensitive().wire("key"))
        .field(
            FieldSpec::bool("force")
                .default(false)
                .describe("Attach even when it conflicts with installed licenses"),
        )
        .field(
            FieldSpec::string_list("conflicting_keys")
                .computed()
                .reads("conflictingKeys"),
        )
        .identity(IdentitySource::field("key"))
        .create(WriteOp::new(Route::post("/licenses/add").flag("force", "force")))
        .delete(DeleteOp::Forget)
        .build()
}

#[cfg(test)]
mod tests {
    use crate::kinds::engine;
    use reconcile::{Action, DesiredState, Error, Identity, Method, MockClient, PriorState};
    use serde_json::json;

    #[test]
    fn test_forced_attach() {
        let mock = MockClient::new();
        mock.respond(
            Method::Post,
            "/licenses/add?force=true",
            200,
            r#"{"conflictingKeys":["old-key"]}"#,
        );
        let engine = engine(&mock);

        let desired = DesiredState::new().with("key", "new-key").with("force", true);
        let result = engine.apply("license", &desired, &PriorState::none()).unwrap();
        assert_eq!(result.identity, Identity::new("new-key"));
        assert_eq!(result.desired.get("conflicting_keys"), Some(&json!(["old-key"])));

        let posts = mock.requests_for(Method::Post);
        assert_eq!(posts[0].body.as_ref().unwrap().text(), r#"{"key":"new-key"}"#);
    }

    #[test]
    fn test_plain_attach_has_no_query() {
        let mock = MockClient::new();
        mock.respond(Method::Post, "/licenses/add", 200, r#"{"conflictingKeys":[]}"#);
        let engine = engine(&mock);

        let desired = DesiredState::new().with("key", "new-key");
        engine.apply("license", &desired, &PriorState::none()).unwrap();
        assert_eq!(mock.requests()[0].path, "/licenses/add");
    }

    #[test]
    fn test_rejected_key_reports_body() {
        let mock = MockClient::new();
        mock.respond(
            Method::Post,
            "/licenses/add",
            400,
            r#"{"message":"license conflicts"}"#,
        );
        let engine = engine(&mock);

        let desired = DesiredState::new().with("key", "new-key");
        let err = engine.apply("license", &desired, &PriorState::none()).unwrap_err();
        assert!(matches!(err, Error::RemoteRejection { status: 400, .. }));
        assert!(err.to_string().contains("license conflicts"));
    }

    #[test]
    fn test_destroy_forgets() {
        let mock = MockClient::new();
        let result = engine(&mock)
            .destroy("license", &Identity::new("new-key"), &DesiredState::new())
            .unwrap();
        assert_eq!(result.action, Action::Forgotten);
        assert!(mock.requests().is_empty());
    }
}
