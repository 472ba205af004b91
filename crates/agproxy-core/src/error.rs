use agproxy_protocol::openai::error::ErrorResponse;
use agproxy_transform::failure::BackendFailure;
use bytes::Bytes;
use http::StatusCode;

/// Failure to obtain a backend credential.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no Antigravity credential found; sign in with the desktop client first")]
    Unavailable,
    #[error("credential store failed: {0}")]
    Store(String),
}

/// A response the engine could not produce, already rendered for the client.
#[derive(Debug)]
pub struct ProxyError {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ProxyError {
    pub fn json(status: StatusCode, error: &ErrorResponse) -> Self {
        let body = serde_json::to_vec(error)
            .map(Bytes::from)
            .unwrap_or_else(|_| Bytes::from_static(b"{\"error\":{}}"));
        Self { status, body }
    }

    pub fn backend(failure: &BackendFailure) -> Self {
        let status = match failure {
            BackendFailure::Status { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            BackendFailure::Transport { .. } => StatusCode::BAD_GATEWAY,
        };
        Self::json(status, &failure.to_error_response())
    }
}

impl From<AuthError> for ProxyError {
    fn from(err: AuthError) -> Self {
        Self::json(
            StatusCode::INTERNAL_SERVER_ERROR,
            &ErrorResponse::new(err.to_string(), "auth_unavailable", None),
        )
    }
}
