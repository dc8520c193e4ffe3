//! `team`: a Portainer team.

use reconcile::{
    DeleteOp, FieldSpec, IdentitySource, ResourceSpec, Result, Route, WriteOp,
};

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("team")
        .describe("Portainer team")
        .field(
            FieldSpec::string("name")
                .required()
                .wire("Name")
                .reads("Name")
                .describe("Team name"),
        )
        .identity(IdentitySource::response("Id"))
        .natural_key(["name"])
        .create(WriteOp::new(Route::post("/teams")))
        .read(Route::get("/teams/{id}"))
        .list(Route::get("/teams"))
        .delete(DeleteOp::Remote(Route::delete("/teams/{id}")))
        .importable()
        .build()
}
