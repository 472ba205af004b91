pub mod create_chat_completions;
pub mod error;
pub mod list_models;
