//! Remote client abstraction.
//!
//! The engine never talks HTTP itself. Every request goes through a
//! [`RemoteClient`], which the host supplies (with authentication already
//! wired in). [`MockClient`] is an in-memory implementation for tests:
//!
//! ```
//! use reconcile::{Method, MockClient, RemoteClient, Request};
//!
//! let mock = MockClient::new();
//! mock.respond(Method::Get, "/teams/7", 200, r#"{"Id":7,"Name":"ops"}"#);
//!
//! let response = mock.execute(&Request::new(Method::Get, "/teams/7")).unwrap();
//! assert_eq!(response.status, 200);
//! assert_eq!(mock.requests().len(), 1);
//! ```

use crate::error::TransportError;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// HTTP method of a remote request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Whether the request changes remote state
    pub fn is_write(self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Encoded request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Body {
    pub fn json(value: &serde_json::Value) -> Self {
        Self {
            content_type: "application/json".to_string(),
            bytes: value.to_string().into_bytes(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// A request to the control plane, relative to its base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Path including any query string, e.g. `/licenses/add?force=true`
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Body>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Status and raw body of a control-plane response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    /// Body as text; invalid UTF-8 is replaced
    pub body: String,
    /// Body exactly as received, for archives and other binary payloads
    pub bytes: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            status,
            bytes: body.as_bytes().to_vec(),
            body,
        }
    }

    pub fn from_bytes(status: u16, bytes: Vec<u8>) -> Self {
        Self {
            status,
            body: String::from_utf8_lossy(&bytes).into_owned(),
            bytes,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// Issues requests against the control plane.
///
/// Implementations inject authentication and report only transport-level
/// failures as errors; every HTTP status, including 4xx/5xx, is returned as a
/// [`Response`].
pub trait RemoteClient: Send + Sync {
    fn execute(&self, request: &Request) -> Result<Response, TransportError>;
}

impl<T: RemoteClient + ?Sized> RemoteClient for &T {
    fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        (**self).execute(request)
    }
}

impl<T: RemoteClient + ?Sized> RemoteClient for Box<T> {
    fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        (**self).execute(request)
    }
}

impl<T: RemoteClient + ?Sized> RemoteClient for Arc<T> {
    fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        (**self).execute(request)
    }
}

type Scripted = Result<Response, TransportError>;

/// In-memory client for testing without a control plane.
///
/// Responses are scripted per `(method, path)`. Each key holds a queue:
/// responses are consumed in order and the last one repeats. Unscripted
/// requests get a 404. Every request is recorded.
#[derive(Debug, Clone, Default)]
pub struct MockClient {
    routes: Arc<Mutex<HashMap<(Method, String), VecDeque<Scripted>>>>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl MockClient {
    /// Create a new mock with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `method path`.
    pub fn respond(&self, method: Method, path: &str, status: u16, body: &str) {
        self.push(method, path, Ok(Response::new(status, body)));
    }

    /// Queue a transport failure for `method path`.
    pub fn fail(&self, method: Method, path: &str, error: TransportError) {
        self.push(method, path, Err(error));
    }

    fn push(&self, method: Method, path: &str, scripted: Scripted) {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        routes
            .entry((method, path.to_string()))
            .or_default()
            .push_back(scripted);
    }

    /// All requests received so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Requests received for a given method.
    pub fn requests_for(&self, method: Method) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method)
            .collect()
    }

    /// Number of state-changing requests received.
    pub fn write_count(&self) -> usize {
        self.requests().iter().filter(|r| r.method.is_write()).count()
    }

    /// Forget recorded requests, keeping scripted responses.
    pub fn clear_requests(&self) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl RemoteClient for MockClient {
    fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(queue) = routes.get_mut(&(request.method, request.path.clone())) else {
            return Ok(Response::new(404, "no scripted response"));
        };
        let scripted = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        scripted.unwrap_or_else(|| Ok(Response::new(404, "no scripted response")))
    }
}
