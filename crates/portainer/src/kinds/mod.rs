//! Portainer resource kinds.
//!
//! Each module describes one kind as a [`ResourceSpec`]. Field names follow
//! the declaration file (snake_case); wire keys and read paths follow the
//! Portainer API, which is not consistent about casing between requests and
//! responses.

pub mod auth;
pub mod backup;
pub mod cloud_credentials;
pub mod docker_image;
pub mod docker_network;
pub mod edge_group;
pub mod environment;
pub mod kubernetes_namespace_services;
pub mod license;
pub mod open_amt;
pub mod registry;
pub mod resource_control;
pub mod ssl;
pub mod tag;
pub mod team;
pub mod team_membership;
pub mod user;
pub mod webhook;

use reconcile::{ResourceSpec, Result, SpecRegistry};

/// Every kind this binding supports
pub fn specs() -> Result<Vec<ResourceSpec>> {
    Ok(vec![
        auth::spec()?,
        backup::spec()?,
        cloud_credentials::spec()?,
        docker_image::spec()?,
        docker_network::spec()?,
        edge_group::spec()?,
        environment::spec()?,
        kubernetes_namespace_services::spec()?,
        license::spec()?,
        open_amt::spec()?,
        registry::spec()?,
        resource_control::spec()?,
        ssl::spec()?,
        tag::spec()?,
        team::spec()?,
        team_membership::spec()?,
        user::spec()?,
        webhook::spec()?,
    ])
}

/// Registry with every Portainer kind
pub fn spec_registry() -> Result<SpecRegistry> {
    let mut registry = SpecRegistry::new();
    for spec in specs()? {
        registry.register(spec)?;
    }
    Ok(registry)
}

#[cfg(test)]
pub(crate) fn engine(mock: &reconcile::MockClient) -> reconcile::Reconciler<reconcile::MockClient> {
    reconcile::Reconciler::new(mock.clone(), spec_registry().unwrap())
}
