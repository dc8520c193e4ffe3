//! `team_membership`: a user's membership in a team.
//!
//! Portainer has no endpoint to read a single membership, so recorded state
//! echoes the last apply.

use reconcile::{DeleteOp, FieldSpec, IdentitySource, ResourceSpec, Result, Route, WriteOp};

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("team_membership")
        .describe("Membership of a user in a team")
        .field(
            FieldSpec::int("role")
                .required()
                .wire("role")
                .describe("1 = team leader, 2 = regular member"),
        )
        .field(FieldSpec::int("team_id").required().wire("teamID"))
        .field(FieldSpec::int("user_id").required().wire("userID"))
        .identity(IdentitySource::response("Id"))
        .create(WriteOp::new(Route::post("/team_memberships")))
        .delete(DeleteOp::Remote(Route::delete("/team_memberships/{id}")))
        .build()
}
