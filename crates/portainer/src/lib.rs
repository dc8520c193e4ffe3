//! # Portainer
//!
//! Portainer resource kinds and HTTP transport for the [`reconcile`] engine.
//!
//! ## Example
//!
//! ```no_run
//! use portainer::{ClientConfig, connect};
//! use reconcile::{DesiredState, PriorState};
//!
//! let config = ClientConfig::new("https://portainer.example.com", "ptr_xxx").unwrap();
//! let engine = connect(&config).unwrap();
//!
//! let team = DesiredState::new().with("name", "ops");
//! let result = engine.apply("team", &team, &PriorState::none()).unwrap();
//! println!("team {} is {}", result.identity, result.state);
//! ```

pub mod config;
pub mod http;
pub mod kinds;
pub mod multipart;

pub use config::{ClientConfig, ConfigError, ProviderSettings, normalize_endpoint};
pub use http::HttpClient;
pub use kinds::spec_registry;

use reconcile::Reconciler;

/// Build an engine talking to the configured Portainer instance.
pub fn connect(config: &ClientConfig) -> reconcile::Result<Reconciler<HttpClient>> {
    log::debug!("connecting to {}", config.endpoint);
    Ok(Reconciler::new(HttpClient::new(config), spec_registry()?))
}
