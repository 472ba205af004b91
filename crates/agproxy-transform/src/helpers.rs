use agproxy_protocol::gemini::generate_content::types::{FinishReason, UsageMetadata};
use agproxy_protocol::gemini::stream_content::response::StreamGenerateContentFrame;
use agproxy_protocol::openai::create_chat_completions::types::{
    ChatCompletionFinishReason, CompletionUsage,
};

/// Appended to the final text of every completed answer.
pub const ATTRIBUTION_SUFFIX: &str = " \n\n*(via Antigravity Proxy)*";

/// Decodes one SSE payload. A payload that is not a valid frame is logged and skipped.
pub fn decode_frame(payload: &str) -> Option<StreamGenerateContentFrame> {
    match serde_json::from_str(payload) {
        Ok(frame) => Some(frame),
        Err(err) => {
            tracing::warn!(
                event = "backend_frame_decode_failed",
                error = %err,
                payload_len = payload.len()
            );
            None
        }
    }
}

pub fn map_finish_reason(reason: &FinishReason) -> ChatCompletionFinishReason {
    match reason {
        FinishReason::Stop => ChatCompletionFinishReason::Stop,
        FinishReason::ToolUse => ChatCompletionFinishReason::ToolCalls,
        FinishReason::MaxTokens => ChatCompletionFinishReason::Length,
        FinishReason::Other(other) => ChatCompletionFinishReason::Other(other.clone()),
    }
}

pub fn map_usage(usage: &UsageMetadata) -> CompletionUsage {
    let prompt_tokens = usage.prompt_token_count.unwrap_or(0);
    let completion_tokens = usage.candidates_token_count.unwrap_or(0);
    CompletionUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens: usage
            .total_token_count
            .unwrap_or(prompt_tokens + completion_tokens),
    }
}

pub fn new_completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4())
}

pub fn new_call_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("call_{}", &uuid[..8])
}

pub fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
