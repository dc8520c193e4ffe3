//! Error types for reconciliation.
//!
//! Every error carries enough context to act on without a debugger: the
//! operation that was attempted, the resource kind, the identity (when one
//! exists) and, for remote failures, the body the control plane sent back.
//! Errors are categorized so callers can decide whether a retry makes sense.

use crate::lifecycle::LifecycleState;
use crate::types::Identity;
use std::fmt;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The remote operation an error relates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    List,
    Import,
    Compensate,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Import => "import",
            Self::Compensate => "compensate",
        };
        f.write_str(name)
    }
}

/// Categories of reconciliation errors for retry logic and operator feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection failure or timeout; the remote outcome is unknown.
    Transport,
    /// The control plane answered with a non-success status.
    Rejected,
    /// The resource does not exist remotely.
    NotFound,
    /// The requested change cannot be expressed as an in-place update.
    Conflict,
    /// A created resource could not be located by its natural key.
    IdentityPending,
    /// More than one remote entry matched a natural key.
    Ambiguous,
    /// Some steps of a multi-step create are committed, others are not.
    PartialFailure,
    /// The caller's input or a resource descriptor is invalid.
    Invalid,
    /// The operation is not available for this kind.
    Unsupported,
    /// Engine bug or unparseable remote payload.
    Internal,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport | Self::IdentityPending)
    }

    /// Whether the remote may be in a state the caller does not know about.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Transport | Self::PartialFailure)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transport => "Transport failure",
            Self::Rejected => "Rejected by the control plane",
            Self::NotFound => "Resource not found",
            Self::Conflict => "Immutable field changed",
            Self::IdentityPending => "Identity not yet visible",
            Self::Ambiguous => "Ambiguous identity",
            Self::PartialFailure => "Partially created",
            Self::Invalid => "Invalid input",
            Self::Unsupported => "Unsupported operation",
            Self::Internal => "Internal error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Transport => {
                "Check connectivity, then import the resource before applying again"
            }
            Self::Rejected => "Inspect the response body for the control plane's reason",
            Self::NotFound => "Verify the identity, or remove the resource from state",
            Self::Conflict => "Destroy and re-create the resource to change this field",
            Self::IdentityPending => "Wait for the control plane to list the resource, then retry",
            Self::Ambiguous => "Remove the duplicates remotely or import the right identity",
            Self::PartialFailure => "Apply again once the failing step's cause is fixed",
            Self::Invalid => "Fix the declaration and try again",
            Self::Unsupported => "This kind does not support the requested operation",
            Self::Internal => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Failure reported by a [`RemoteClient`](crate::RemoteClient) when no response was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    /// Error message from the transport.
    pub message: String,
    /// Whether the request timed out (it may still have been applied).
    pub timed_out: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: true,
        }
    }
}

/// Errors that can occur while reconciling a resource.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No response was received; the remote outcome is unknown.
    #[error("{op} {kind}{}: transport error: {source}", at(.identity))]
    Transport {
        /// Operation being attempted.
        op: Operation,
        /// Resource kind.
        kind: String,
        /// Identity, if one was known.
        identity: Option<Identity>,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// The control plane answered with a non-success status.
    #[error("{op} {kind}{}: HTTP {status}: {body}", at(.identity))]
    RemoteRejection {
        /// Operation being attempted.
        op: Operation,
        /// Resource kind.
        kind: String,
        /// Identity, if one was known.
        identity: Option<Identity>,
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },

    /// The resource does not exist remotely.
    #[error("{op} {kind} {identity}: not found")]
    NotFound {
        /// Operation being attempted.
        op: Operation,
        /// Resource kind.
        kind: String,
        /// Identity that was looked up.
        identity: Identity,
    },

    /// Immutable fields differ between desired and observed state.
    #[error(
        "update {kind} {identity}: immutable field(s) changed: {}; destroy and re-create to apply",
        .fields.join(", ")
    )]
    Conflict {
        /// Resource kind.
        kind: String,
        /// Identity of the existing resource.
        identity: Identity,
        /// Names of the changed immutable fields.
        fields: Vec<String>,
    },

    /// Create succeeded but no listed entry matched the natural key.
    #[error("create {kind}: no entry matching {} = {} after create", .natural_key.join("+"), .values.join("+"))]
    NotFoundAfterCreate {
        /// Resource kind.
        kind: String,
        /// Natural-key field names.
        natural_key: Vec<String>,
        /// Natural-key values that were searched for.
        values: Vec<String>,
    },

    /// More than one listed entry matched the natural key.
    #[error("create {kind}: {count} entries match {} = {}", .natural_key.join("+"), .values.join("+"))]
    AmbiguousIdentity {
        /// Resource kind.
        kind: String,
        /// Natural-key field names.
        natural_key: Vec<String>,
        /// Natural-key values that were searched for.
        values: Vec<String>,
        /// Number of matches.
        count: usize,
    },

    /// A success response could not be interpreted.
    #[error("{op} {kind}{}: unexpected response: {message}: {body}", at(.identity))]
    InvalidResponse {
        /// Operation being attempted.
        op: Operation,
        /// Resource kind.
        kind: String,
        /// Identity, if one was known.
        identity: Option<Identity>,
        /// What was wrong with the response.
        message: String,
        /// Response body, verbatim.
        body: String,
    },

    /// The caller's desired state does not satisfy the kind's field table.
    #[error("invalid {kind} declaration: {message}")]
    InvalidDesiredState {
        /// Resource kind.
        kind: String,
        /// Validation failure.
        message: String,
    },

    /// A resource descriptor is malformed.
    #[error("invalid resource spec for {kind}: {message}")]
    InvalidSpec {
        /// Resource kind.
        kind: String,
        /// Validation failure.
        message: String,
    },

    /// No descriptor is registered for the kind.
    #[error("unknown resource kind: {0}")]
    UnknownKind(String),

    /// The kind does not support the operation.
    #[error("{op} is not supported for {kind}")]
    Unsupported {
        /// Operation requested.
        op: Operation,
        /// Resource kind.
        kind: String,
    },

    /// The lifecycle state machine was asked to take an illegal step.
    #[error("illegal lifecycle transition {from} -> {to}")]
    InvalidTransition {
        /// State before the transition.
        from: LifecycleState,
        /// Requested state.
        to: LifecycleState,
    },
}

fn at(identity: &Option<Identity>) -> String {
    match identity {
        Some(id) if !id.is_empty() => format!(" {id}"),
        _ => String::new(),
    }
}

impl Error {
    pub fn transport(
        op: Operation,
        kind: impl Into<String>,
        identity: Option<&Identity>,
        source: TransportError,
    ) -> Self {
        Self::Transport {
            op,
            kind: kind.into(),
            identity: identity.cloned(),
            source,
        }
    }

    pub fn rejection(
        op: Operation,
        kind: impl Into<String>,
        identity: Option<&Identity>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self::RemoteRejection {
            op,
            kind: kind.into(),
            identity: identity.cloned(),
            status,
            body: body.into(),
        }
    }

    pub fn invalid_response(
        op: Operation,
        kind: impl Into<String>,
        identity: Option<&Identity>,
        message: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::InvalidResponse {
            op,
            kind: kind.into(),
            identity: identity.cloned(),
            message: message.into(),
            body: body.into(),
        }
    }

    pub fn invalid_desired(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDesiredState {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn invalid_spec(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(op: Operation, kind: impl Into<String>) -> Self {
        Self::Unsupported {
            op,
            kind: kind.into(),
        }
    }

    /// Get the error category for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Transport { .. } => ErrorCategory::Transport,
            Error::RemoteRejection { .. } => ErrorCategory::Rejected,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Conflict { .. } => ErrorCategory::Conflict,
            Error::NotFoundAfterCreate { .. } => ErrorCategory::IdentityPending,
            Error::AmbiguousIdentity { .. } => ErrorCategory::Ambiguous,
            Error::InvalidDesiredState { .. } | Error::InvalidSpec { .. } => ErrorCategory::Invalid,
            Error::UnknownKind(_) => ErrorCategory::Invalid,
            Error::Unsupported { .. } => ErrorCategory::Unsupported,
            Error::InvalidResponse { .. } | Error::InvalidTransition { .. } => {
                ErrorCategory::Internal
            }
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// HTTP status of a remote rejection, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::RemoteRejection { status, .. } => Some(*status),
            _ => None,
        }
    }
}
