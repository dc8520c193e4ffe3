//! HTTP transport for the Portainer API.
//!
//! [`HttpClient`] implements [`RemoteClient`] on a blocking `ureq` agent.
//! Every request carries the `X-API-Key` header. HTTP error statuses are
//! returned as responses so the engine can interpret them; only connection
//! failures and timeouts become [`TransportError`]s.

use crate::config::ClientConfig;
use reconcile::{Method, RemoteClient, Request, Response, TransportError};
use std::time::Duration;
use ureq::{Agent, RequestBuilder};

const API_KEY_HEADER: &str = "X-API-Key";

/// Backup archives can be large; JSON bodies are far below this
const MAX_BODY_BYTES: u64 = 1 << 30;

/// Authenticated client bound to one Portainer instance
pub struct HttpClient {
    /// HTTP agent for requests.
    agent: Agent,
    /// Base URL ending in `/api`.
    base: String,
    api_key: String,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Self {
        let agent_config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build();
        Self {
            agent: Agent::new_with_config(agent_config),
            base: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Base URL requests are resolved against.
    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, request: &Request) -> String {
        format!("{}{}", self.base, request.path)
    }

    fn decorate<B>(&self, builder: RequestBuilder<B>, request: &Request) -> RequestBuilder<B> {
        let mut builder = builder
            .header(API_KEY_HEADER, self.api_key.as_str())
            .header("Accept", "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl RemoteClient for HttpClient {
    fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        let url = self.url(request);
        log::trace!("{} {url}", request.method);

        let result = match request.method {
            Method::Get => self.decorate(self.agent.get(url.as_str()), request).call(),
            Method::Delete => self
                .decorate(self.agent.delete(url.as_str()), request)
                .call(),
            Method::Post | Method::Put => {
                let builder = if request.method == Method::Post {
                    self.agent.post(url.as_str())
                } else {
                    self.agent.put(url.as_str())
                };
                let builder = self.decorate(builder, request);
                match &request.body {
                    Some(body) => builder
                        .header("Content-Type", body.content_type.as_str())
                        .send(&body.bytes[..]),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(|err| transport_error(request, &err))?;
        let status = response.status().as_u16();
        let bytes = response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_vec()
            .map_err(|err| transport_error(request, &err))?;

        log::trace!("{} {url} -> {status} ({} bytes)", request.method, bytes.len());
        Ok(Response::from_bytes(status, bytes))
    }
}

fn transport_error(request: &Request, err: &ureq::Error) -> TransportError {
    let message = format!("{} {}: {err}", request.method, request.path);
    match err {
        ureq::Error::Timeout(_) => TransportError::timeout(message),
        _ => TransportError::new(message),
    }
}
