//! Translation between the OpenAI chat-completions dialect and the
//! Antigravity `v1internal` streaming dialect.

pub mod arguments;
pub mod failure;
pub mod helpers;
pub mod model_catalog;
pub mod request;
pub mod resilient_json;
pub mod response;
pub mod stream;
pub mod tool_catalog;
pub mod tool_expression;
