//! `auth`: a username/password login that yields a JWT.
//!
//! Applying it calls `POST /auth` once and records the returned token as a
//! computed field, for declarations that need a session token rather than
//! an API key. Tokens expire on Portainer's side; destroy and apply again
//! to log in afresh.

use reconcile::{DeleteOp, FieldSpec, IdentitySource, ResourceSpec, Result, Route, WriteOp};

/// Identity of the login result
pub const AUTH_IDENTITY: &str = "auth-result";

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("auth")
        .describe("Login with username and password, recording the issued JWT")
        .field(
            FieldSpec::string("username")
                .required()
                .sensitive()
                .wire("username"),
        )
        .field(
            FieldSpec::string("password")
                .required()
                .sensitive()
                .wire("password"),
        )
        .field(FieldSpec::string("jwt").computed().sensitive().reads("jwt"))
        .identity(IdentitySource::fixed(AUTH_IDENTITY))
        .create(WriteOp::new(Route::post("/auth")))
        .delete(DeleteOp::Forget)
        .build()
}
