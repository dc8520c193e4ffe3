//! `user`: a Portainer user account.
//!
//! Creating a user can take up to three requests: the user itself, an
//! optional team membership and an optional API key. The create response
//! does not always carry the new id, in which case it is resolved by
//! username. The follow-up requests are compensation steps; when one fails
//! the user stays in place, is reported as partially created, and the next
//! apply retries the steps that did not complete.

use reconcile::{
    CompensationStep, DeleteOp, DesiredState, FieldSpec, Identity, IdentitySource, Payload,
    ResourceSpec, Result, Route, WriteOp,
};
use serde_json::json;

/// Role of a standard (non-admin) user
const STANDARD_ROLE: i64 = 2;

/// Membership role for regular team members
const MEMBER_ROLE: i64 = 2;

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("user")
        .describe("Portainer user, optionally joined to a team and given an API key")
        .field(
            FieldSpec::string("username")
                .required()
                .wire("Username")
                .reads("Username"),
        )
        .field(
            FieldSpec::string("password")
                .sensitive()
                .wire("Password")
                .describe("Required unless ldap_user is set"),
        )
        .field(
            FieldSpec::int("role")
                .default(STANDARD_ROLE)
                .wire("Role")
                .reads("Role")
                .describe("1 = administrator, 2 = standard user"),
        )
        .field(FieldSpec::bool("ldap_user").default(false))
        .field(
            FieldSpec::int("team_id").describe("Team to join after creation (standard users only)"),
        )
        .field(
            FieldSpec::string("api_key_description")
                .describe("When set, an API key with this description is generated"),
        )
        .field(FieldSpec::string("api_key").computed().sensitive())
        .identity(IdentitySource::response("Id"))
        .natural_key(["username"])
        .create(WriteOp::new(Route::post("/users")))
        .read(Route::get("/users/{id}"))
        .list(Route::get("/users"))
        .delete(DeleteOp::Remote(Route::delete("/users/{id}")))
        .importable()
        .compensate(CompensationStep::new(
            "assign-team",
            Route::post("/team_memberships"),
            assign_team,
        ))
        .compensate(
            CompensationStep::new(
                "generate-api-key",
                Route::post("/users/{id}/tokens"),
                generate_api_key,
            )
            .capture("api_key", "rawAPIKey"),
        )
        .validate(validate)
        .build()
}

fn validate(desired: &DesiredState) -> std::result::Result<(), String> {
    let ldap = desired.get_bool("ldap_user").unwrap_or(false);
    let has_password = desired.get_str("password").is_some_and(|p| !p.is_empty());

    if ldap && has_password {
        return Err("cannot set a password for an LDAP user".to_string());
    }
    if !ldap && !has_password {
        return Err("password is required for non-LDAP users".to_string());
    }
    if desired.contains("team_id") && desired.get_i64("role") != Some(STANDARD_ROLE) {
        return Err("team_id can only be used with standard users (role = 2)".to_string());
    }
    if desired.contains("api_key_description") && !has_password {
        return Err("api_key_description requires the user's password".to_string());
    }
    Ok(())
}

fn numeric(id: &Identity) -> std::result::Result<i64, String> {
    id.as_str()
        .parse()
        .map_err(|_| format!("user id '{id}' is not numeric"))
}

fn assign_team(
    id: &Identity,
    desired: &DesiredState,
) -> std::result::Result<Option<Payload>, String> {
    let Some(team) = desired.get_i64("team_id") else {
        return Ok(None);
    };
    Ok(Some(Payload::Json(json!({
        "UserID": numeric(id)?,
        "TeamID": team,
        "Role": MEMBER_ROLE,
    }))))
}

fn generate_api_key(
    _id: &Identity,
    desired: &DesiredState,
) -> std::result::Result<Option<Payload>, String> {
    let Some(description) = desired.get_str("api_key_description") else {
        return Ok(None);
    };
    let password = desired.get_str("password").unwrap_or_default();
    Ok(Some(Payload::Json(json!({
        "description": description,
        "password": password,
    }))))
}
