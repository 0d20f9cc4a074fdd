use http::StatusCode;
use serde::Serialize;

/// A single field failure reported by input or output validation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub code: String,
}

/// Error type shared by the registries, the router builder, the aggregation
/// service and procedure handlers.
///
/// Every variant maps to an HTTP status through [`RpcError::status`] and to a
/// transport error code through [`RpcError::code`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RpcError {
    #[error("Controller {class} is not marked as an rpc router")]
    NotARouter { class: String },

    #[error("invalid controller declaration: {0}")]
    Declaration(String),

    #[error("auto router service is not initialized")]
    NotInitialized,

    #[error("Router '{router}' not found. Available: {}", .available.join(", "))]
    RouterNotFound {
        router: String,
        available: Vec<String>,
    },

    #[error(
        "Procedure '{procedure}' not found in controller '{router}'. Available procedures: {}",
        .available.join(", ")
    )]
    ProcedureNotFound {
        router: String,
        procedure: String,
        available: Vec<String>,
    },

    #[error("Invalid procedure format '{0}'. Use: routerName.procedureName")]
    InvalidProcedurePath(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    #[error("{message}")]
    Status { status: StatusCode, message: String },

    #[error("error calling {router}.{procedure}: {source}")]
    Call {
        router: String,
        procedure: String,
        #[source]
        source: Box<RpcError>,
    },

    #[error("{0}")]
    Internal(String),
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| {
            if e.field.is_empty() {
                e.message.clone()
            } else {
                format!("{}: {}", e.field, e.message)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl RpcError {
    /// An error carrying an explicit HTTP status, for handlers that want to
    /// answer 401, 403, 404 and friends.
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        RpcError::Status {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::FORBIDDEN, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        RpcError::Internal(message.into())
    }

    /// HTTP status for this error. Wrapped call errors keep the status of
    /// the error they wrap.
    pub fn status(&self) -> StatusCode {
        match self {
            RpcError::RouterNotFound { .. } | RpcError::ProcedureNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            RpcError::InvalidProcedurePath(_)
            | RpcError::InvalidInput(_)
            | RpcError::Validation(_) => StatusCode::BAD_REQUEST,
            RpcError::Status { status, .. } => *status,
            RpcError::Call { source, .. } => source.status(),
            RpcError::NotARouter { .. }
            | RpcError::Declaration(_)
            | RpcError::NotInitialized
            | RpcError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Transport error code derived from the status.
    pub fn code(&self) -> &'static str {
        match self.status() {
            StatusCode::BAD_REQUEST => "BAD_REQUEST",
            StatusCode::NOT_FOUND => "NOT_FOUND",
            StatusCode::UNAUTHORIZED => "UNAUTHORIZED",
            StatusCode::FORBIDDEN => "FORBIDDEN",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Names a caller could have used instead, when the error is a lookup miss.
    pub fn available(&self) -> Option<&[String]> {
        match self {
            RpcError::RouterNotFound { available, .. }
            | RpcError::ProcedureNotFound { available, .. } => Some(available),
            RpcError::Call { source, .. } => source.available(),
            _ => None,
        }
    }

    /// The innermost error, skipping `Call` wrappers.
    pub fn root(&self) -> &RpcError {
        match self {
            RpcError::Call { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<String> for RpcError {
    fn from(message: String) -> Self {
        RpcError::Internal(message)
    }
}

impl From<&str> for RpcError {
    fn from(message: &str) -> Self {
        RpcError::Internal(message.to_string())
    }
}

impl From<std::convert::Infallible> for RpcError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

impl From<garde::Report> for RpcError {
    fn from(report: garde::Report) -> Self {
        RpcError::Validation(crate::schema::convert_garde_report(&report))
    }
}
