use agproxy_protocol::openai::error::ErrorResponse;

pub const SESSION_EXPIRED_MESSAGE: &str = "🔒 Antigravity Session Expired. Please sign out and sign in again in the Antigravity VSCode/Cursor extension to refresh your token.";

/// Why the backend exchange did not produce a usable stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendFailure {
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend transport error: {message}")]
    Transport { message: String },
}

impl BackendFailure {
    pub fn client_message(&self) -> String {
        match self {
            Self::Status { status: 401, .. } => SESSION_EXPIRED_MESSAGE.to_string(),
            Self::Status { status, body } => format!("Remote API error {status}: {body}"),
            Self::Transport { message } => message.clone(),
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        match self {
            Self::Status { status, .. } => {
                ErrorResponse::new(self.client_message(), "remote_api_error", Some(*status))
            }
            Self::Transport { .. } => {
                ErrorResponse::new(self.client_message(), "transport_error", None)
            }
        }
    }
}
