//! # Reconcile
//!
//! A declarative resource reconciliation engine.
//!
//! Given the desired configuration of a remote resource (a user, a team, a
//! registry...) and what is known about it from the previous run, the engine
//! drives the control plane's create/read/update/delete API until the remote
//! matches the declaration, and reports what it did.
//!
//! ## Core Concepts
//!
//! - **ResourceSpec**: one resource kind described as data (fields, routes, identity)
//! - **RemoteClient**: the injected transport; the engine never opens connections
//! - **Reconciler**: the entry point, with `apply`, `destroy` and `import`
//! - **IdentityResolver**: recovers identities the control plane does not return
//! - **CompensationCoordinator**: follow-up steps after a create, without rollback
//! - **DriftReader**: maps remote payloads back into declared shape
//!
//! ## Example
//!
//! ```
//! use reconcile::{
//!     DeleteOp, DesiredState, FieldSpec, IdentitySource, Method, MockClient, PriorState,
//!     Reconciler, ResourceSpec, Route, SpecRegistry, WriteOp,
//! };
//!
//! let mut registry = SpecRegistry::new();
//! registry
//!     .register(
//!         ResourceSpec::builder("team")
//!             .field(FieldSpec::string("name").required().wire("Name").reads("Name"))
//!             .identity(IdentitySource::response("Id"))
//!             .create(WriteOp::new(Route::post("/teams")))
//!             .read(Route::get("/teams/{id}"))
//!             .delete(DeleteOp::Remote(Route::delete("/teams/{id}")))
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let client = MockClient::new();
//! client.respond(Method::Post, "/teams", 200, r#"{"Id":7}"#);
//! client.respond(Method::Get, "/teams/7", 200, r#"{"Id":7,"Name":"ops"}"#);
//!
//! let engine = Reconciler::new(client, registry);
//! let desired = DesiredState::new().with("name", "ops");
//! let result = engine.apply("team", &desired, &PriorState::none()).unwrap();
//! assert_eq!(result.identity.as_str(), "7");
//! ```

pub mod client;
pub mod compensation;
pub mod diff;
pub mod drift;
pub mod error;
pub mod lifecycle;
pub mod reconciler;
pub mod registry;
pub mod resolver;
pub mod route;
pub mod spec;
pub mod types;

#[cfg(test)]
mod fixtures;

// Re-export main types at crate root
pub use client::{Body, Method, MockClient, RemoteClient, Request, Response};
pub use compensation::{CompensationCoordinator, CompensationReport, StepFailure};
pub use diff::{FieldChange, StateDiff};
pub use drift::DriftReader;
pub use error::{Error, ErrorCategory, Operation, Result, TransportError};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use reconciler::Reconciler;
pub use registry::SpecRegistry;
pub use resolver::IdentityResolver;
pub use route::{Payload, PayloadBuilder, PayloadFn, QueryParam, Route, json_payload};
pub use spec::{
    Authority, Branch, CompensationStep, DeleteOp, FieldSpec, FieldType, HeaderFn, IdentitySource,
    Mutability, ResourceSpec, ResourceSpecBuilder, ResponseFn, Source, StepPayloadFn, ValidateFn,
    WireKey, WriteOp,
};
pub use types::{
    Action, DesiredState, Diagnostic, Identity, PriorState, ReconciliationResult, RemoteRecord,
    Severity,
};
