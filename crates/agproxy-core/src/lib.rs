pub mod auth;
pub mod config;
pub mod credential;
pub mod discovery;
pub mod error;
pub mod proxy_engine;
pub mod upstream_client;

pub use auth::{AuthCache, AuthSnapshot};
pub use config::ProxyConfig;
pub use error::{AuthError, ProxyError};
pub use proxy_engine::{ChatReply, ProxyEngine};
