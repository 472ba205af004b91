use agproxy_protocol::gemini::stream_content::request::StreamGenerateContentRequest;
use agproxy_transform::request::TranslatedRequest;
use bytes::Bytes;

use crate::config::{
    BACKEND_API_CLIENT, BACKEND_USER_AGENT, CLIENT_METADATA, ENVELOPE_REQUEST_TYPE,
    ENVELOPE_USER_AGENT,
};
use crate::upstream_client::{HttpMethod, UpstreamHttpRequest};

pub fn build_envelope(project: &str, translated: TranslatedRequest) -> StreamGenerateContentRequest {
    StreamGenerateContentRequest {
        project: project.to_string(),
        model: translated.model,
        request: translated.body,
        user_agent: ENVELOPE_USER_AGENT.to_string(),
        request_type: ENVELOPE_REQUEST_TYPE.to_string(),
        request_id: format!("agent-{}", uuid::Uuid::new_v4()),
    }
}

/// The backend always answers in SSE, whether or not the client streams.
pub fn backend_request(url: &str, token: &str, body: Bytes, is_stream: bool) -> UpstreamHttpRequest {
    UpstreamHttpRequest {
        method: HttpMethod::Post,
        url: url.to_string(),
        headers: vec![
            ("authorization".to_string(), format!("Bearer {token}")),
            ("content-type".to_string(), "application/json".to_string()),
            ("accept".to_string(), "text/event-stream".to_string()),
            ("user-agent".to_string(), BACKEND_USER_AGENT.to_string()),
            ("x-goog-api-client".to_string(), BACKEND_API_CLIENT.to_string()),
            ("client-metadata".to_string(), CLIENT_METADATA.to_string()),
        ],
        body: Some(body),
        is_stream,
    }
}
