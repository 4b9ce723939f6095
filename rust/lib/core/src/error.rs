use thiserror::Error;

// ── Error codes ─────────────────────────────────────────────────────
//
// Stable, machine-readable identifiers. Callers match on these,
// never on the human-readable message string.

/// Stable error code constants.
pub mod error_code {
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const NOT_CONFIGURED: &str = "NOT_CONFIGURED";
    pub const AUTH_FAILED: &str = "AUTH_FAILED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const RESOURCE_NOT_FOUND: &str = "RESOURCE_NOT_FOUND";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const SERVER_ERROR: &str = "SERVER_ERROR";
    pub const NETWORK: &str = "NETWORK";
    pub const DECODE: &str = "DECODE";
    pub const UNSYNCED: &str = "UNSYNCED";
}

// ── CardError ───────────────────────────────────────────────────────

/// Unified error type for the card workflow, the store client and the
/// token provider.
///
/// Transport variants carry `op`, the name of the operation that was
/// attempted (`"get_cards"`, `"update_card"`, ...), so a message surfaced
/// to the user always says what failed. Each variant maps to a stable
/// code (see [`error_code`]).
#[derive(Error, Debug)]
pub enum CardError {
    /// Local, pre-network rejection. Lists every invalid field.
    #[error("invalid fields: {}", fields.join(", "))]
    Validation { fields: Vec<String> },

    /// Store unreachable by configuration: no token set, or invalid
    /// site/list settings.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// Token acquisition failed (no account, silent and interactive both
    /// failed).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Card absent locally or remotely. HTTP 404.
    #[error("{0}")]
    NotFound(String),

    /// A named site resource (list, image library) does not exist.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// HTTP 429. The only variant a caller may retry as-is.
    #[error("{op}: rate limited: {message}")]
    RateLimited { op: String, message: String },

    /// HTTP 401. Caller should re-authenticate.
    #[error("{op}: unauthorized: {message}")]
    Unauthorized { op: String, message: String },

    /// HTTP 403.
    #[error("{op}: forbidden: {message}")]
    Forbidden { op: String, message: String },

    /// HTTP 400.
    #[error("{op}: bad request: {message}")]
    BadRequest { op: String, message: String },

    /// HTTP 5xx, or any other unexpected non-success status.
    #[error("{op}: server error (HTTP {status}): {message}")]
    Server {
        op: String,
        status: u16,
        message: String,
    },

    /// No response received.
    #[error("{op}: network error: {message}")]
    Network { op: String, message: String },

    /// Response received but its body could not be understood.
    #[error("{op}: decode error: {message}")]
    Decode { op: String, message: String },

    /// The write reached the store but the follow-up read did not, so the
    /// local collection may lag behind the store.
    #[error("{op}: card {id} was saved but local state could not be refreshed: {source}")]
    Unsynced {
        op: String,
        id: String,
        #[source]
        source: Box<CardError>,
    },
}

impl CardError {
    /// Classify a non-success HTTP status for operation `op`.
    pub fn from_status(op: &str, status: u16, message: impl Into<String>) -> Self {
        let op = op.to_string();
        let message = message.into();
        match status {
            400 => CardError::BadRequest { op, message },
            401 => CardError::Unauthorized { op, message },
            403 => CardError::Forbidden { op, message },
            404 => CardError::NotFound(format!("{op}: {message}")),
            429 => CardError::RateLimited { op, message },
            _ => CardError::Server {
                op,
                status,
                message,
            },
        }
    }

    /// Build a `Validation` error from field names.
    pub fn validation<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CardError::Validation {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn network(op: &str, message: impl Into<String>) -> Self {
        CardError::Network {
            op: op.to_string(),
            message: message.into(),
        }
    }

    pub fn decode(op: &str, message: impl Into<String>) -> Self {
        CardError::Decode {
            op: op.to_string(),
            message: message.into(),
        }
    }

    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            CardError::Validation { .. } => error_code::VALIDATION_FAILED,
            CardError::NotConfigured(_) => error_code::NOT_CONFIGURED,
            CardError::Auth(_) => error_code::AUTH_FAILED,
            CardError::NotFound(_) => error_code::NOT_FOUND,
            CardError::ResourceNotFound(_) => error_code::RESOURCE_NOT_FOUND,
            CardError::RateLimited { .. } => error_code::RATE_LIMITED,
            CardError::Unauthorized { .. } => error_code::UNAUTHENTICATED,
            CardError::Forbidden { .. } => error_code::PERMISSION_DENIED,
            CardError::BadRequest { .. } => error_code::BAD_REQUEST,
            CardError::Server { .. } => error_code::SERVER_ERROR,
            CardError::Network { .. } => error_code::NETWORK,
            CardError::Decode { .. } => error_code::DECODE,
            CardError::Unsynced { .. } => error_code::UNSYNCED,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CardError::RateLimited { .. })
    }

    /// Whether the caller should prompt for credentials again.
    pub fn needs_reauth(&self) -> bool {
        matches!(self, CardError::Unauthorized { .. } | CardError::Auth(_))
    }
}
