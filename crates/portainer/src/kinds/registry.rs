//! `registry`: a container registry Portainer can pull from.
//!
//! The registry `type` decides which payload keys apply:
//!
//! | type | provider  | extra keys            | authentication |
//! |------|-----------|-----------------------|----------------|
//! | 1    | Quay.io   |                       | always         |
//! | 2    | Azure     | `baseURL`             | always         |
//! | 3    | Custom    | `baseURL`             | optional       |
//! | 4    | GitLab    | `gitlab.InstanceURL`  | always         |
//! | 5    | ProGet    | `baseURL`             | always         |
//! | 6    | DockerHub |                       | always         |
//! | 7    | AWS ECR   | `ecr.Region`          | optional       |
//!
//! Registries cannot be read back individually.

use reconcile::{
    Branch, DeleteOp, DesiredState, FieldSpec, IdentitySource, Payload, PayloadBuilder,
    ResourceSpec, Result, Route, WriteOp, json_payload,
};
use serde_json::{Map, Value};

const AZURE: i64 = 2;
const CUSTOM: i64 = 3;
const GITLAB: i64 = 4;
const PROGET: i64 = 5;
const ECR: i64 = 7;

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("registry")
        .describe("Container registry")
        .field(FieldSpec::string("name").required().wire("name"))
        .field(FieldSpec::string("url").required().wire("url"))
        .field(
            FieldSpec::string("base_url").wire_by(
                Branch::on("type")
                    .case(AZURE, "baseURL")
                    .case(CUSTOM, "baseURL")
                    .case(PROGET, "baseURL"),
            ),
        )
        .field(
            FieldSpec::int("type")
                .required()
                .wire("type")
                .describe("1 Quay, 2 Azure, 3 custom, 4 GitLab, 5 ProGet, 6 DockerHub, 7 ECR"),
        )
        .field(
            FieldSpec::bool("authentication")
                .default(false)
                .wire("authentication")
                .describe("Only honoured for custom and ECR registries; others always authenticate"),
        )
        .field(FieldSpec::string("username").wire("username"))
        .field(FieldSpec::string("password").sensitive().wire("password"))
        .field(
            FieldSpec::string("instance_url")
                .wire_by(Branch::on("type").case(GITLAB, "gitlab.InstanceURL")),
        )
        .field(FieldSpec::string("aws_region").wire_by(Branch::on("type").case(ECR, "ecr.Region")))
        .identity(IdentitySource::response("Id"))
        .create(WriteOp::with_payload(
            Route::post("/registries"),
            PayloadBuilder::Custom(payload),
        ))
        .delete(DeleteOp::Remote(Route::delete("/registries/{id}")))
        .validate(validate)
        .build()
}

fn validate(desired: &DesiredState) -> std::result::Result<(), String> {
    match desired.get_i64("type") {
        Some(1..=7) => Ok(()),
        Some(other) => Err(format!("unsupported registry type: {other}")),
        None => Err("type is required".to_string()),
    }
}

fn payload(spec: &ResourceSpec, desired: &DesiredState) -> std::result::Result<Payload, String> {
    let Value::Object(mut body) = json_payload(spec, desired, |_| true) else {
        return Err("registry payload is not an object".to_string());
    };

    let registry_type = desired.get_i64("type").unwrap_or_default();
    let optional_auth = matches!(registry_type, CUSTOM | ECR);
    if !optional_auth {
        body.insert("authentication".to_string(), Value::Bool(true));
    } else if !desired.get_bool("authentication").unwrap_or(false) {
        body.remove("username");
        body.remove("password");
    }
    if registry_type == ECR {
        body.entry("ecr").or_insert_with(|| Value::Object(Map::new()));
    }

    Ok(Payload::Json(Value::Object(body)))
}

#[cfg(test)]
mod tests {
    use crate::kinds::engine;
    use reconcile::{DesiredState, Error, Identity, Method, MockClient, PriorState};
    use serde_json::{Value, json};

    fn create(desired: &DesiredState) -> Value {
        let mock = MockClient::new();
        mock.respond(Method::Post, "/registries", 200, r#"{"Id":2}"#);
        let engine = engine(&mock);
        let result = engine.apply("registry", desired, &PriorState::none()).unwrap();
        assert_eq!(result.identity, Identity::new("2"));
        assert!(result.record.unwrap().best_effort);

        let posts = mock.requests_for(Method::Post);
        serde_json::from_str(&posts[0].body.as_ref().unwrap().text()).unwrap()
    }

    #[test]
    fn test_gitlab_payload_nests_instance_url() {
        let desired = DesiredState::new()
            .with("name", "gitlab")
            .with("url", "registry.gitlab.com")
            .with("type", 4)
            .with("username", "deploy")
            .with("password", "glpat")
            .with("instance_url", "https://gitlab.com")
            .with("base_url", "ignored");
        assert_eq!(
            create(&desired),
            json!({
                "name": "gitlab",
                "url": "registry.gitlab.com",
                "type": 4,
                "authentication": true,
                "username": "deploy",
                "password": "glpat",
                "gitlab": {"InstanceURL": "https://gitlab.com"}
            })
        );
    }

    #[test]
    fn test_custom_without_auth_drops_credentials() {
        let desired = DesiredState::new()
            .with("name", "internal")
            .with("url", "registry.local:5000")
            .with("base_url", "registry.local")
            .with("type", 3)
            .with("username", "unused");
        assert_eq!(
            create(&desired),
            json!({
                "name": "internal",
                "url": "registry.local:5000",
                "baseURL": "registry.local",
                "type": 3,
                "authentication": false
            })
        );
    }

    #[test]
    fn test_ecr_always_sends_ecr_object() {
        let desired = DesiredState::new()
            .with("name", "ecr")
            .with("url", "1234.dkr.ecr.eu-west-1.amazonaws.com")
            .with("type", 7);
        let body = create(&desired);
        assert_eq!(body["ecr"], json!({}));

        let with_region = desired.with("aws_region", "eu-west-1");
        assert_eq!(create(&with_region)["ecr"], json!({"Region": "eu-west-1"}));
    }

    #[test]
    fn test_unknown_type_rejected_before_any_request() {
        let mock = MockClient::new();
        let engine = engine(&mock);
        let desired = DesiredState::new()
            .with("name", "x")
            .with("url", "x")
            .with("type", 8);
        let err = engine.apply("registry", &desired, &PriorState::none()).unwrap_err();
        assert!(matches!(err, Error::InvalidDesiredState { .. }));
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_destroy_rejection_keeps_body() {
        let mock = MockClient::new();
        mock.respond(Method::Delete, "/registries/2", 500, r#"{"message":"in use"}"#);
        let engine = engine(&mock);
        let err = engine
            .destroy("registry", &Identity::new("2"), &DesiredState::new())
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().contains(r#"{"message":"in use"}"#));
    }
}
