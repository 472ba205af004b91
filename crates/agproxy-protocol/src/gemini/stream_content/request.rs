use serde::{Deserialize, Serialize};

use crate::gemini::generate_content::request::GenerateContentRequestBody;

/// The `v1internal:streamGenerateContent` envelope wrapping a generate content body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamGenerateContentRequest {
    pub project: String,
    pub model: String,
    pub request: GenerateContentRequestBody,
    pub user_agent: String,
    pub request_type: String,
    pub request_id: String,
}
