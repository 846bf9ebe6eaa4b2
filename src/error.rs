use serde_json::{json, Value};

/// Request-level error type. Every variant is raised before the response
/// stream opens and is rendered as a single JSON body.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RelayError {
    #[error("Server configuration missing: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Validation(String),
    #[error("Backend request failed: {status}")]
    Backend { status: u16, details: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// HTTP status for this error. Backend failures mirror the backend's own
    /// status; anything unrepresentable falls back to 502.
    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        match self {
            RelayError::InvalidRequest(_) | RelayError::Validation(_) => {
                http::StatusCode::BAD_REQUEST
            }
            RelayError::Backend { status, .. } => {
                http::StatusCode::from_u16(*status).unwrap_or(http::StatusCode::BAD_GATEWAY)
            }
            RelayError::Config(_) | RelayError::Transport(_) | RelayError::Internal(_) => {
                http::StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Render the `{"error": ..., "details"?: ...}` body.
    #[must_use]
    pub fn to_body(&self) -> Value {
        match self {
            RelayError::Backend { details, .. } => json!({
                "error": self.to_string(),
                "details": details,
            }),
            _ => json!({ "error": self.to_string() }),
        }
    }
}

// ---------------------------------------------------------------------------
// Axum integration
// ---------------------------------------------------------------------------

/// Convert a `RelayError` into a JSON axum response.
#[must_use]
pub fn into_axum_response(err: &RelayError) -> axum::response::Response {
    use axum::response::IntoResponse;
    (err.status(), axum::Json(err.to_body())).into_response()
}

impl axum::response::IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        into_axum_response(&self)
    }
}

/// Failure that ends an already-open response stream. The body yields it as
/// an error item so the transport aborts the connection instead of finishing
/// cleanly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamAbortError {
    #[error("failed to read backend stream: {0}")]
    Read(String),
    #[error("backend stream is not valid UTF-8: {0}")]
    Decode(String),
}
