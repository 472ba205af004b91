use agproxy_protocol::openai::create_chat_completions::response::CreateChatCompletionResponse;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Media type of streamed replies.
pub const SSE_CONTENT_TYPE: &str = "text/event-stream";

/// What a chat completion produced for the client.
#[derive(Debug)]
pub enum ChatReply {
    Json(CreateChatCompletionResponse),
    /// Ready-to-send SSE frames, ending with `data: [DONE]`.
    Stream(mpsc::Receiver<Bytes>),
}
