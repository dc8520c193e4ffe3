//! `webhook`: a service or container webhook.
//!
//! The token is generated by Portainer and only returned on creation.

use reconcile::{DeleteOp, FieldSpec, IdentitySource, ResourceSpec, Result, Route, WriteOp};

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("webhook")
        .describe("Webhook that redeploys a service or container")
        .field(FieldSpec::int("endpoint_id").required().wire("endpointID"))
        .field(FieldSpec::int("registry_id").wire("registryID"))
        .field(FieldSpec::string("resource_id").required().wire("resourceID"))
        .field(
            FieldSpec::int("webhook_type")
                .required()
                .wire("webhookType")
                .describe("1 = service, 2 = container"),
        )
        .field(FieldSpec::string("token").computed().reads("Token"))
        .identity(IdentitySource::response("Id"))
        .create(WriteOp::new(Route::post("/webhooks")))
        .delete(DeleteOp::Remote(Route::delete("/webhooks/{id}")))
        .build()
}
