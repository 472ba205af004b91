use serde::{Deserialize, Serialize};

use crate::gemini::generate_content::response::GenerateContentResponse;

/// One decoded SSE `data:` payload from `v1internal:streamGenerateContent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamGenerateContentFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<GenerateContentResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}
