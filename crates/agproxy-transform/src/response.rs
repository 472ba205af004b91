use agproxy_protocol::gemini::generate_content::types::{Candidate, UsageMetadata};
use agproxy_protocol::openai::create_chat_completions::response::{
    ChatCompletionChoice, ChatCompletionObjectType, ChatCompletionResponseMessage,
    CreateChatCompletionResponse,
};
use agproxy_protocol::openai::create_chat_completions::types::{
    ChatCompletionFinishReason, ChatCompletionFunctionCall, ChatCompletionMessageToolCall,
    ChatCompletionResponseRole, ChatCompletionToolCallType,
};
use agproxy_protocol::sse::SseParser;
use serde_json::{Map, Value as JsonValue};

use crate::helpers::{
    ATTRIBUTION_SUFFIX, decode_frame, map_usage, new_call_id, new_completion_id, unix_now,
};
use crate::tool_expression::tool_code_calls;

/// Collects a whole backend SSE body into one `chat.completion` object.
#[derive(Debug)]
pub struct ChatCompletionAssembler {
    model: String,
    attribution: String,
    parser: SseParser,
    text: String,
    structured_calls: Vec<(String, JsonValue)>,
    usage: Option<UsageMetadata>,
}

impl ChatCompletionAssembler {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            attribution: ATTRIBUTION_SUFFIX.to_string(),
            parser: SseParser::new(),
            text: String::new(),
            structured_calls: Vec::new(),
            usage: None,
        }
    }

    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = attribution.into();
        self
    }

    pub fn push_bytes(&mut self, chunk: &[u8]) {
        for payload in self.parser.push_bytes(chunk) {
            self.handle_payload(&payload);
        }
    }

    fn handle_payload(&mut self, payload: &str) {
        let Some(response) = decode_frame(payload).and_then(|frame| frame.response) else {
            return;
        };
        if let Some(usage) = response.usage_metadata {
            self.usage = Some(usage);
        }
        // Only the first candidate is answered; n > 1 is never requested.
        if let Some(candidate) = response.candidates.first() {
            self.absorb_candidate(candidate);
        }
    }

    fn absorb_candidate(&mut self, candidate: &Candidate) {
        for part in candidate.parts() {
            if let Some(text) = &part.text {
                self.text.push_str(text);
            }
            if let Some(call) = &part.function_call {
                let args = call
                    .args
                    .clone()
                    .unwrap_or_else(|| JsonValue::Object(Map::new()));
                self.structured_calls.push((call.name.clone(), args));
            }
        }
    }

    pub fn finish(mut self) -> CreateChatCompletionResponse {
        if let Some(payload) = self.parser.finish() {
            self.handle_payload(&payload);
        }

        let embedded = tool_code_calls(&self.text)
            .into_iter()
            .map(|call| (call.name, JsonValue::Object(call.args)));
        let tool_calls: Vec<ChatCompletionMessageToolCall> = self
            .structured_calls
            .drain(..)
            .chain(embedded)
            .map(|(name, args)| ChatCompletionMessageToolCall {
                id: Some(new_call_id()),
                r#type: Some(ChatCompletionToolCallType::Function),
                function: ChatCompletionFunctionCall {
                    name,
                    arguments: args.to_string(),
                },
            })
            .collect();

        let finish_reason = if tool_calls.is_empty() {
            ChatCompletionFinishReason::Stop
        } else {
            ChatCompletionFinishReason::ToolCalls
        };
        tracing::debug!(
            event = "completion_assembled",
            text_len = self.text.len(),
            tool_calls = tool_calls.len()
        );

        let mut content = std::mem::take(&mut self.text);
        content.push_str(&self.attribution);

        CreateChatCompletionResponse {
            id: new_completion_id(),
            object: ChatCompletionObjectType::ChatCompletion,
            created: unix_now(),
            model: self.model,
            choices: vec![ChatCompletionChoice {
                index: 0,
                message: ChatCompletionResponseMessage {
                    role: ChatCompletionResponseRole::Assistant,
                    content: Some(content),
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                },
                finish_reason,
            }],
            usage: self.usage.as_ref().map(map_usage),
        }
    }
}

/// Assembles a body that is already fully buffered.
pub fn assemble_completion(model: &str, body: &[u8]) -> CreateChatCompletionResponse {
    let mut assembler = ChatCompletionAssembler::new(model);
    assembler.push_bytes(body);
    assembler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_text_frame_gets_attribution_and_stop() {
        let body = br#"data: {"response":{"candidates":[{"content":{"parts":[{"text":"Hi"}]},"finishReason":"STOP"}]}}"#;
        let response = assemble_completion("ag-flash", body);

        assert!(response.id.starts_with("chatcmpl-"));
        assert_eq!(response.model, "ag-flash");
        let choice = &response.choices[0];
        assert_eq!(
            choice.message.content.as_deref(),
            Some(format!("Hi{ATTRIBUTION_SUFFIX}").as_str())
        );
        assert_eq!(choice.finish_reason, ChatCompletionFinishReason::Stop);
        assert!(choice.message.tool_calls.is_none());
        assert!(response.usage.is_none());

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert!(value["choices"][0]["message"].get("tool_calls").is_none());
    }

    #[test]
    fn text_accumulates_across_frames_and_chunks() {
        let body = concat!(
            "data: {\"response\":{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}}\n\n",
            "data: not json\n\n",
            "data: {\"response\":{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]}}],",
            "\"usageMetadata\":{\"promptTokenCount\":3,\"candidatesTokenCount\":2}}}\n\n",
        );
        let mut assembler = ChatCompletionAssembler::new("m").with_attribution("");
        for chunk in body.as_bytes().chunks(5) {
            assembler.push_bytes(chunk);
        }
        let response = assembler.finish();
        assert_eq!(response.choices[0].message.content.as_deref(), Some("Hello"));
        let usage = response.usage.unwrap();
        assert_eq!(usage.total_tokens, 5);
    }

    #[test]
    fn usage_from_frame_without_candidates() {
        let body = concat!(
            "data: {\"response\":{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"ok\"}]}}]}}\n",
            "data: {\"response\":{\"candidates\":null,",
            "\"usageMetadata\":{\"promptTokenCount\":4,\"candidatesTokenCount\":1,\"totalTokenCount\":5}}}\n",
        );
        let response = assemble_completion("m", body.as_bytes());
        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some(format!("ok{ATTRIBUTION_SUFFIX}").as_str())
        );
        let usage = response.usage.unwrap();
        assert_eq!((usage.prompt_tokens, usage.total_tokens), (4, 5));
    }

    #[test]
    fn structured_calls_come_before_embedded_ones() {
        let frame = json!({"response": {"candidates": [{"content": {"parts": [
            {"text": "Checking.<tool_code>ls(path=\".\")</tool_code>"},
            {"functionCall": {"name": "read_file", "args": {"path": "a.txt"}}}
        ]}, "finishReason": "STOP"}]}});
        let body = format!("data: {frame}\n");
        let response = assemble_completion("m", body.as_bytes());

        let choice = &response.choices[0];
        assert_eq!(choice.finish_reason, ChatCompletionFinishReason::ToolCalls);
        let calls = choice.message.tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].function.name, "read_file");
        assert_eq!(calls[0].function.arguments, r#"{"path":"a.txt"}"#);
        assert_eq!(calls[1].function.name, "ls");
        assert_eq!(calls[1].function.arguments, r#"{"path":"."}"#);
        assert!(calls.iter().all(|call| call.is_function()));
        assert_ne!(calls[0].id, calls[1].id);
    }

    #[test]
    fn empty_body_still_answers() {
        let response = assemble_completion("m", b"");
        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some(ATTRIBUTION_SUFFIX)
        );
        assert_eq!(response.choices[0].finish_reason, ChatCompletionFinishReason::Stop);
    }
}
