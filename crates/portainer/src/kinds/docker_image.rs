//! `docker_image`: an image pulled into one environment.
//!
//! The pull goes through Portainer's Docker proxy as
//! `POST .../images/create?fromImage=<image>` with no body. Private registry
//! credentials travel in `X-Registry-Auth` as base64-encoded JSON. The
//! identity is `<endpoint_id>-<image>`, and destroy removes the image by
//! reference.

use reconcile::{
    DeleteOp, DesiredState, FieldSpec, IdentitySource, PayloadBuilder, ResourceSpec, Result, Route,
    WriteOp,
};
use serde_json::json;

const REGISTRY_AUTH_HEADER: &str = "X-Registry-Auth";

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("docker_image")
        .describe("Docker image pulled into a Portainer environment")
        .field(
            FieldSpec::int("endpoint_id")
                .required()
                .describe("Environment to pull into"),
        )
        .field(
            FieldSpec::string("image")
                .required()
                .describe("Image reference, e.g. nginx:1.27"),
        )
        .field(
            FieldSpec::string("registry_auth")
                .sensitive()
                .describe("user:password for a private registry"),
        )
        .identity(IdentitySource::template("{endpoint_id}-{image}"))
        .create(
            WriteOp::with_payload(
                Route::post("/endpoints/{endpoint_id}/docker/images/create")
                    .query_field("fromImage", "image"),
                PayloadBuilder::Empty,
            )
            .headers(registry_auth),
        )
        .delete(DeleteOp::Remote(Route::delete(
            "/endpoints/{endpoint_id}/docker/images/{image}",
        )))
        .validate(|desired| match desired.get_str("registry_auth") {
            Some(auth) if !auth.contains(':') => {
                Err("registry_auth must be user:password".to_string())
            }
            _ => Ok(()),
        })
        .build()
}

fn registry_auth(desired: &DesiredState) -> std::result::Result<Vec<(String, String)>, String> {
    let Some(auth) = desired.get_str("registry_auth") else {
        return Ok(Vec::new());
    };
    let (username, password) = auth
        .split_once(':')
        .ok_or("registry_auth must be user:password")?;
    let config = json!({"username": username, "password": password}).to_string();
    Ok(vec![(
        REGISTRY_AUTH_HEADER.to_string(),
        base64(config.as_bytes()),
    )])
}

/// Standard alphabet with padding, as the Docker engine expects
fn base64(input: &[u8]) -> String {
    const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(input.len().div_ceil(3) * 4);
    for chunk in input.chunks(3) {
        let b = [
            chunk[0],
            chunk.get(1).copied().unwrap_or(0),
            chunk.get(2).copied().unwrap_or(0),
        ];
        let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
        for i in 0..4 {
            if i <= chunk.len() {
                out.push(char::from(ALPHABET[(n >> (18 - 6 * i)) as usize & 63]));
            } else {
                out.push('=');
            }
        }
    }
    out
}
