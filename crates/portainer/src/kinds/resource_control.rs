//! `resource_control`: access control on a Docker resource.
//!
//! The controlled resource is fixed at creation; who may access it can be
//! changed in place.

use reconcile::{
    DeleteOp, FieldSpec, IdentitySource, PayloadBuilder, ResourceSpec, Result, Route, WriteOp,
};

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("resource_control")
        .describe("Access control on a container, service, volume or stack")
        .field(FieldSpec::string("resource_id").required().wire("resourceID"))
        .field(FieldSpec::string_list("sub_resource_ids").wire("subResourceIDs"))
        .field(
            FieldSpec::int("type")
                .required()
                .wire("type")
                .describe("Kind of the controlled resource, e.g. 1 = container"),
        )
        .field(
            FieldSpec::bool("administrators_only")
                .default(false)
                .mutable()
                .wire("administratorsOnly"),
        )
        .field(FieldSpec::bool("public").default(false).mutable().wire("public"))
        .field(FieldSpec::int_list("teams").mutable().wire("teams"))
        .field(FieldSpec::int_list("users").mutable().wire("users"))
        .identity(IdentitySource::response("Id"))
        .create(WriteOp::new(Route::post("/resource_controls")))
        .update(WriteOp::with_payload(
            Route::put("/resource_controls/{id}"),
            PayloadBuilder::MutableFields,
        ))
        .delete(DeleteOp::Remote(Route::delete("/resource_controls/{id}")))
        .build()
}
