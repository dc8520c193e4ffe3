//! `ssl`: the instance's TLS certificate and HTTP listener setting.
//!
//! A singleton: creating and updating are the same `PUT /ssl`, and there is
//! nothing to delete remotely. Portainer reports only the HTTP flag back;
//! certificate and key are tracked from the last apply.

use reconcile::{DeleteOp, FieldSpec, IdentitySource, ResourceSpec, Result, Route, WriteOp};

/// Identity of the singleton
pub const SSL_IDENTITY: &str = "portainer-ssl";

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("ssl")
        .describe("TLS certificate and HTTP listener of the Portainer instance")
        .field(
            FieldSpec::string("cert")
                .required()
                .mutable()
                .sensitive()
                .wire("cert")
                .describe("PEM certificate"),
        )
        .field(
            FieldSpec::string("key")
                .required()
                .mutable()
                .sensitive()
                .wire("key")
                .describe("PEM private key"),
        )
        .field(
            FieldSpec::bool("http_enabled")
                .required()
                .mutable()
                .wire("httpenabled")
                .reads("httpEnabled"),
        )
        .identity(IdentitySource::fixed(SSL_IDENTITY))
        .create(WriteOp::new(Route::put("/ssl")))
        .read(Route::get("/ssl"))
        .update(WriteOp::new(Route::put("/ssl")))
        .delete(DeleteOp::Forget)
        .build()
}
