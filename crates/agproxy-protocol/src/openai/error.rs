use serde::{Deserialize, Serialize};

/// Error payload used both as a JSON response body and as an in-band SSE frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, kind: impl Into<String>, code: Option<u16>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                r#type: kind.into(),
                code,
            },
        }
    }
}
