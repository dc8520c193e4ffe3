//! `environment`: a Docker, agent, Azure, edge or Kubernetes environment
//! (an "endpoint" in the Portainer API).
//!
//! Creation is a multipart form. On read the address comes back as `URL`
//! for local Docker environments and as `PublicURL` for everything else.

use crate::multipart::Form;
use reconcile::{
    Branch, DeleteOp, DesiredState, FieldSpec, IdentitySource, Payload, PayloadBuilder,
    ResourceSpec, Result, Route, WriteOp,
};

/// Environment type whose address is reported as `URL`
const DOCKER: i64 = 1;

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("environment")
        .describe("Portainer environment (endpoint)")
        .field(FieldSpec::string("name").required().wire("Name").reads("Name"))
        .field(
            FieldSpec::string("environment_address")
                .required()
                .wire("URL")
                .reads_by(Branch::on("type").case(DOCKER, "URL").otherwise("PublicURL")),
        )
        .field(
            FieldSpec::int("type")
                .required()
                .wire("EndpointCreationType")
                .reads("Type")
                .describe("1 = Docker, 2 = Agent, 3 = Azure, 4 = Edge Agent, 5 = Kubernetes"),
        )
        .field(
            FieldSpec::int("group_id")
                .default(1)
                .wire("GroupID")
                .reads("GroupId")
                .describe("Endpoint group; 1 is Unassigned"),
        )
        .field(FieldSpec::int_list("tag_ids").wire("TagIds").reads("TagIds"))
        .identity(IdentitySource::response("Id"))
        .create(WriteOp::with_payload(
            Route::post("/endpoints"),
            PayloadBuilder::Custom(form_payload),
        ))
        .read(Route::get("/endpoints/{id}"))
        .delete(DeleteOp::Remote(Route::delete("/endpoints/{id}")))
        .importable()
        .validate(validate)
        .build()
}

fn validate(desired: &DesiredState) -> std::result::Result<(), String> {
    match desired.get_i64("type") {
        Some(1..=5) => Ok(()),
        _ => Err("type must be between 1 and 5".to_string()),
    }
}

fn form_payload(
    _spec: &ResourceSpec,
    desired: &DesiredState,
) -> std::result::Result<Payload, String> {
    let text = |field: &str| -> std::result::Result<String, String> {
        match desired.get(field) {
            Some(serde_json::Value::String(s)) => Ok(s.clone()),
            Some(value) => Ok(value.to_string()),
            None => Err(format!("missing '{field}'")),
        }
    };

    // agents commonly run with self-signed certificates
    let mut form = Form::new()
        .text("Name", text("name")?)
        .text("URL", text("environment_address")?)
        .text("EndpointCreationType", text("type")?)
        .text("GroupID", text("group_id")?)
        .text("TLS", "true")
        .text("TLSSkipVerify", "true")
        .text("TLSSkipClientVerify", "true");
    if let Some(tags) = desired.get("tag_ids") {
        form = form.text("TagIds", tags.to_string());
    }
    Ok(Payload::Raw(form.into_body()))
}
