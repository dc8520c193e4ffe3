//! `tag`: an environment tag.
//!
//! Some Portainer versions answer `GET /tags/{id}` with a body that carries
//! no name; the read then falls back to scanning `GET /tags`.

use reconcile::{DeleteOp, FieldSpec, IdentitySource, ResourceSpec, Result, Route, WriteOp};

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("tag")
        .describe("Environment tag")
        .field(FieldSpec::string("name").required().wire("name").reads("Name"))
        .identity(IdentitySource::response("Id"))
        .natural_key(["name"])
        .create(WriteOp::new(Route::post("/tags")))
        .read(Route::get("/tags/{id}"))
        .read_via_list()
        .list(Route::get("/tags"))
        .delete(DeleteOp::Remote(Route::delete("/tags/{id}")))
        .importable()
        .build()
}
