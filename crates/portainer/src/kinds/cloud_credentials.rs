//! `cloud_credentials`: provider credentials for provisioning KaaS clusters.
//!
//! Portainer stores them write-only: there is no read endpoint, so every
//! field is tracked from the last apply and a change means destroy and
//! re-create.

use reconcile::{DeleteOp, FieldSpec, IdentitySource, ResourceSpec, Result, Route, WriteOp};

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("cloud_credentials")
        .describe("Cloud provider credentials used to provision environments")
        .field(
            FieldSpec::string("provider")
                .required()
                .wire("provider")
                .describe("civo, digitalocean, linode, amazon, azure or gke"),
        )
        .field(FieldSpec::string("name").required().wire("name"))
        .field(
            FieldSpec::string_map("credentials")
                .required()
                .sensitive()
                .wire("credentials")
                .describe("Provider-specific keys such as apiKey"),
        )
        .identity(IdentitySource::response("id"))
        .create(WriteOp::new(Route::post("/cloud/credentials")))
        .delete(DeleteOp::Remote(Route::delete("/cloud/credentials/{id}")))
        .validate(|desired| match desired.get("credentials") {
            Some(serde_json::Value::Object(map)) if map.is_empty() => {
                Err("credentials must not be empty".to_string())
            }
            _ => Ok(()),
        })
        .build()
}
