//! `open_amt`: Intel OpenAMT integration settings.
//!
//! A singleton enabled through `POST /open_amt`. Portainer offers neither a
//! read nor a disable endpoint here, so the settings are tracked from the
//! last apply and destroy only stops tracking them.

use reconcile::{DeleteOp, FieldSpec, IdentitySource, ResourceSpec, Result, Route, WriteOp};

/// Identity of the singleton
pub const OPEN_AMT_IDENTITY: &str = "openamt-enabled";

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("open_amt")
        .describe("Intel OpenAMT integration of the Portainer instance")
        .field(FieldSpec::bool("enabled").required().wire("enabled"))
        .field(
            FieldSpec::string("domain_name")
                .required()
                .wire("domainName"),
        )
        .field(
            FieldSpec::string("cert_file_name")
                .required()
                .wire("certFileName"),
        )
        .field(
            FieldSpec::string("cert_file_content")
                .required()
                .sensitive()
                .wire("certFileContent")
                .describe("Base64-encoded provisioning certificate"),
        )
        .field(
            FieldSpec::string("cert_file_password")
                .required()
                .sensitive()
                .wire("certFilePassword"),
        )
        .field(FieldSpec::string("mps_server").required().wire("mpsserver"))
        .field(FieldSpec::string("mps_user").required().wire("mpsuser"))
        .field(
            FieldSpec::string("mps_password")
                .required()
                .sensitive()
                .wire("mpspassword"),
        )
        .identity(IdentitySource::fixed(OPEN_AMT_IDENTITY))
        .create(WriteOp::new(Route::post("/open_amt")))
        .delete(DeleteOp::Forget)
        .build()
}
