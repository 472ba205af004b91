pub mod generate_content;
pub mod stream_content;
