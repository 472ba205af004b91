use std::collections::HashSet;

use agproxy_protocol::gemini::generate_content::types::{
    Candidate, FinishReason, FunctionCall, UsageMetadata,
};
use agproxy_protocol::gemini::stream_content::response::StreamGenerateContentFrame;
use agproxy_protocol::openai::create_chat_completions::stream::{
    ChatCompletionChunkChoice, ChatCompletionChunkObjectType, ChatCompletionFunctionCallChunk,
    ChatCompletionMessageToolCallChunk, ChatCompletionStreamResponseDelta,
    CreateChatCompletionStreamResponse,
};
use agproxy_protocol::openai::create_chat_completions::types::{
    ChatCompletionFinishReason, ChatCompletionToolCallType,
};
use agproxy_protocol::openai::error::ErrorResponse;
use agproxy_protocol::sse::SseParser;
use serde_json::Value as JsonValue;

use crate::failure::BackendFailure;
use crate::helpers::{
    ATTRIBUTION_SUFFIX, decode_frame, map_finish_reason, map_usage, new_call_id,
    new_completion_id, unix_now,
};

/// Size, in characters, of each tool argument fragment sent to the client.
pub const ARGUMENT_SLICE_CHARS: usize = 120;

const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Receives the backend body as it arrives. Implementations are transport
/// agnostic: the caller feeds bytes and forwards whatever comes back.
pub trait StreamSink {
    type Output;

    fn on_bytes(&mut self, chunk: &[u8]) -> Vec<Self::Output>;
    fn on_end(&mut self) -> Vec<Self::Output>;
    fn on_error(&mut self, failure: BackendFailure) -> Vec<Self::Output>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Chunk(CreateChatCompletionStreamResponse),
    Error(ErrorResponse),
    Done,
}

impl StreamFrame {
    /// Renders the frame as one SSE event.
    pub fn to_sse(&self) -> String {
        let json = match self {
            Self::Chunk(chunk) => serde_json::to_string(chunk),
            Self::Error(error) => serde_json::to_string(error),
            Self::Done => return DONE_FRAME.to_string(),
        };
        match json {
            Ok(json) => format!("data: {json}\n\n"),
            Err(err) => {
                tracing::error!(event = "stream_frame_encode_failed", error = %err);
                String::new()
            }
        }
    }
}

/// Converts the backend SSE stream into OpenAI `chat.completion.chunk` frames.
#[derive(Debug)]
pub struct ChatCompletionStreamAdapter {
    id: String,
    created: i64,
    model: String,
    attribution: String,
    parser: SseParser,
    emitted_calls: HashSet<blake3::Hash>,
    next_tool_index: i64,
    usage: Option<UsageMetadata>,
    finished: bool,
}

impl ChatCompletionStreamAdapter {
    /// `model` is echoed back to the client as sent in the request.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: new_completion_id(),
            created: unix_now(),
            model: model.into(),
            attribution: ATTRIBUTION_SUFFIX.to_string(),
            parser: SseParser::new(),
            emitted_calls: HashSet::new(),
            next_tool_index: 0,
            usage: None,
            finished: false,
        }
    }

    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = attribution.into();
        self
    }

    fn handle_payload(&mut self, payload: &str, out: &mut Vec<StreamFrame>) {
        let Some(frame) = decode_frame(payload) else {
            return;
        };
        self.handle_frame(frame, out);
    }

    fn handle_frame(&mut self, frame: StreamGenerateContentFrame, out: &mut Vec<StreamFrame>) {
        let Some(response) = frame.response else {
            return;
        };
        if let Some(usage) = response.usage_metadata {
            self.usage = Some(usage);
        }
        for candidate in &response.candidates {
            self.handle_candidate(candidate, out);
        }
    }

    fn handle_candidate(&mut self, candidate: &Candidate, out: &mut Vec<StreamFrame>) {
        let finish_reason = candidate.finish_reason.as_ref().map(map_finish_reason);
        let is_stop = candidate.finish_reason == Some(FinishReason::Stop);
        let parts = candidate.parts();
        let last = parts.len().saturating_sub(1);
        let emitted_before = out.len();

        for (idx, part) in parts.iter().enumerate() {
            if let Some(text) = part.text.as_deref().filter(|text| !text.is_empty()) {
                let mut content = text.to_string();
                if is_stop && idx == last {
                    content.push_str(&self.attribution);
                }
                let delta = ChatCompletionStreamResponseDelta {
                    content: Some(content),
                    tool_calls: None,
                };
                out.push(self.chunk(delta, finish_reason.clone()));
            }
            if let Some(call) = &part.function_call {
                self.emit_function_call(call, finish_reason.clone(), out);
            }
        }

        // Keep the finish reason visible even when the final frame has no content.
        if out.len() == emitted_before && finish_reason.is_some() {
            out.push(self.chunk(ChatCompletionStreamResponseDelta::default(), finish_reason));
        }
    }

    fn emit_function_call(
        &mut self,
        call: &FunctionCall,
        finish_reason: Option<ChatCompletionFinishReason>,
        out: &mut Vec<StreamFrame>,
    ) {
        let arguments = call
            .args
            .as_ref()
            .map(JsonValue::to_string)
            .unwrap_or_else(|| "{}".to_string());

        let mut hasher = blake3::Hasher::new();
        hasher.update(call.name.as_bytes());
        hasher.update(&[0]);
        hasher.update(arguments.as_bytes());
        if !self.emitted_calls.insert(hasher.finalize()) {
            tracing::debug!(event = "duplicate_function_call_skipped", name = %call.name);
            return;
        }

        let index = self.next_tool_index;
        self.next_tool_index += 1;

        let start = ChatCompletionMessageToolCallChunk {
            index,
            id: Some(new_call_id()),
            r#type: Some(ChatCompletionToolCallType::Function),
            function: ChatCompletionFunctionCallChunk {
                name: Some(call.name.clone()),
                arguments: Some(String::new()),
            },
        };
        out.push(self.chunk(tool_call_delta(start), finish_reason.clone()));

        for slice in slice_chars(&arguments, ARGUMENT_SLICE_CHARS) {
            let fragment = ChatCompletionMessageToolCallChunk {
                index,
                id: None,
                r#type: None,
                function: ChatCompletionFunctionCallChunk {
                    name: None,
                    arguments: Some(slice.to_string()),
                },
            };
            out.push(self.chunk(tool_call_delta(fragment), finish_reason.clone()));
        }
    }

    fn chunk(
        &self,
        delta: ChatCompletionStreamResponseDelta,
        finish_reason: Option<ChatCompletionFinishReason>,
    ) -> StreamFrame {
        StreamFrame::Chunk(CreateChatCompletionStreamResponse {
            id: self.id.clone(),
            object: ChatCompletionChunkObjectType::ChatCompletionChunk,
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChatCompletionChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage: None,
        })
    }

    fn usage_chunk(&self, usage: &UsageMetadata) -> StreamFrame {
        StreamFrame::Chunk(CreateChatCompletionStreamResponse {
            id: self.id.clone(),
            object: ChatCompletionChunkObjectType::ChatCompletionChunk,
            created: self.created,
            model: self.model.clone(),
            choices: Vec::new(),
            usage: Some(map_usage(usage)),
        })
    }
}

impl StreamSink for ChatCompletionStreamAdapter {
    type Output = StreamFrame;

    fn on_bytes(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        for payload in self.parser.push_bytes(chunk) {
            self.handle_payload(&payload, &mut out);
        }
        out
    }

    fn on_end(&mut self) -> Vec<StreamFrame> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        self.finished = true;
        if let Some(payload) = self.parser.finish() {
            self.handle_payload(&payload, &mut out);
        }
        if let Some(usage) = self.usage.take() {
            out.push(self.usage_chunk(&usage));
        }
        out.push(StreamFrame::Done);
        out
    }

    fn on_error(&mut self, failure: BackendFailure) -> Vec<StreamFrame> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        vec![StreamFrame::Error(failure.to_error_response()), StreamFrame::Done]
    }
}

fn tool_call_delta(call: ChatCompletionMessageToolCallChunk) -> ChatCompletionStreamResponseDelta {
    ChatCompletionStreamResponseDelta {
        content: None,
        tool_calls: Some(vec![call]),
    }
}

/// Splits `text` into pieces of at most `size` characters without breaking a character.
fn slice_chars(text: &str, size: usize) -> Vec<&str> {
    let mut slices = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == size {
            slices.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        slices.push(&text[start..]);
    }
    slices
}

#[cfg(test)]
mod tests;
