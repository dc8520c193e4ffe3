//! Resource specs shared by the unit tests

use crate::route::{Payload, PayloadBuilder, Route};
use crate::spec::{
    Branch, CompensationStep, DeleteOp, FieldSpec, IdentitySource, ResourceSpec, WriteOp,
};
use crate::types::{DesiredState, Identity};
use serde_json::json;

/// Identity returned by create, natural key `name`, full CRUD minus update.
pub fn team_spec() -> ResourceSpec {
    ResourceSpec::builder("team")
        .field(FieldSpec::string("name").required().wire("Name").reads("Name"))
        .identity(IdentitySource::response("Id"))
        .natural_key(["name"])
        .create(WriteOp::new(Route::post("/teams")))
        .read(Route::get("/teams/{id}"))
        .list(Route::get("/teams"))
        .delete(DeleteOp::Remote(Route::delete("/teams/{id}")))
        .importable()
        .build()
        .unwrap()
}

fn assign_team(id: &Identity, desired: &DesiredState) -> Result<Option<Payload>, String> {
    let Some(team) = desired.get_i64("team_id") else {
        return Ok(None);
    };
    let user: i64 = id.as_str().parse().map_err(|_| format!("non-numeric user id {id}"))?;
    Ok(Some(Payload::Json(json!({"UserID": user, "TeamID": team, "Role": 2}))))
}

fn generate_api_key(_id: &Identity, desired: &DesiredState) -> Result<Option<Payload>, String> {
    let Some(description) = desired.get_str("api_key_description") else {
        return Ok(None);
    };
    let password = desired.get_str("password").unwrap_or_default();
    Ok(Some(Payload::Json(
        json!({"description": description, "password": password}),
    )))
}

fn validate_user(desired: &DesiredState) -> Result<(), String> {
    let ldap = desired.get_bool("ldap_user").unwrap_or(false);
    if !ldap && desired.get_str("password").is_none_or(str::is_empty) {
        return Err("password is required unless ldap_user is true".to_string());
    }
    Ok(())
}

/// Create response omits the identity; two compensation steps.
pub fn user_spec() -> ResourceSpec {
    ResourceSpec::builder("user")
        .field(FieldSpec::string("username").required().wire("Username").reads("Username"))
        .field(FieldSpec::string("password").sensitive().wire("Password"))
        .field(FieldSpec::int("role").default(2).wire("Role").reads("Role"))
        .field(FieldSpec::bool("ldap_user").default(false))
        .field(FieldSpec::int("team_id"))
        .field(FieldSpec::string("api_key_description"))
        .field(FieldSpec::string("api_key").computed().sensitive())
        .identity(IdentitySource::response("Id"))
        .natural_key(["username"])
        .create(WriteOp::new(Route::post("/users")))
        .read(Route::get("/users/{id}"))
        .list(Route::get("/users"))
        .delete(DeleteOp::Remote(Route::delete("/users/{id}")))
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
        .validate(validate_user)
        .build()
        .unwrap()
}

/// Has an in-place update for `topic`.
pub fn channel_spec() -> ResourceSpec {
    ResourceSpec::builder("channel")
        .field(FieldSpec::string("name").required().wire("Name").reads("Name"))
        .field(FieldSpec::string("topic").mutable().wire("Topic").reads("Topic"))
        .identity(IdentitySource::response("Id"))
        .create(WriteOp::new(Route::post("/channels")))
        .read(Route::get("/channels/{id}"))
        .update(WriteOp::with_payload(
            Route::put("/channels/{id}"),
            PayloadBuilder::MutableFields,
        ))
        .delete(DeleteOp::Remote(Route::delete("/channels/{id}")))
        .importable()
        .build()
        .unwrap()
}

/// No read; computed token from the create response.
pub fn webhook_spec() -> ResourceSpec {
    ResourceSpec::builder("webhook")
        .field(FieldSpec::string("resource_id").required().wire("ResourceID").reads("ResourceID"))
        .field(FieldSpec::int("endpoint_id").required().wire("EndpointID"))
        .field(FieldSpec::string("token").computed().reads("Token"))
        .identity(IdentitySource::response("Id"))
        .create(WriteOp::new(Route::post("/webhooks")))
        .delete(DeleteOp::Remote(Route::delete("/webhooks/{id}")))
        .build()
        .unwrap()
}

/// Address is read from `URL` or `PublicURL` depending on `type`.
pub fn endpoint_spec() -> ResourceSpec {
    ResourceSpec::builder("endpoint")
        .field(FieldSpec::string("name").required().wire("Name").reads("Name"))
        .field(FieldSpec::int("type").required().wire("Type").reads("Type"))
        .field(
            FieldSpec::string("address")
                .required()
                .wire("URL")
                .reads_by(Branch::on("type").case(1, "URL").otherwise("PublicURL")),
        )
        .identity(IdentitySource::response("Id"))
        .create(WriteOp::new(Route::post("/endpoints")))
        .read(Route::get("/endpoints/{id}"))
        .delete(DeleteOp::Remote(Route::delete("/endpoints/{id}")))
        .build()
        .unwrap()
}

/// Singleton without remote delete.
pub fn settings_spec() -> ResourceSpec {
    ResourceSpec::builder("settings")
        .field(FieldSpec::string("motd").mutable().wire("Motd"))
        .identity(IdentitySource::fixed("settings"))
        .create(WriteOp::new(Route::put("/settings")))
        .update(WriteOp::new(Route::put("/settings")))
        .delete(DeleteOp::Forget)
        .build()
        .unwrap()
}
