use std::path::PathBuf;
use std::time::Duration;

pub use agproxy_transform::request::{BYPASS_THOUGHT_SIGNATURE, IDENTITY_PREAMBLE};

pub const DEFAULT_BACKEND_URL: &str = "https://daily-cloudcode-pa.googleapis.com";
pub const DEFAULT_DISCOVERY_URLS: &[&str] = &[
    "https://daily-cloudcode-pa.googleapis.com",
    "https://cloudcode-pa.googleapis.com",
];
/// Used when every discovery endpoint fails. Only valid for the account it was
/// taken from; treat it as a last resort.
pub const DEFAULT_FALLBACK_PROJECT: &str = "rising-fact-p41fc";
pub const DEFAULT_AUTH_TTL: Duration = Duration::from_secs(5 * 60);

pub const BACKEND_USER_AGENT: &str = "antigravity/1.11.5 darwin/arm64";
pub const BACKEND_API_CLIENT: &str = "google-cloud-sdk vscode_cloudshelleditor/0.1";
pub const CLIENT_METADATA: &str =
    r#"{"ideType":"IDE_UNSPECIFIED","platform":"PLATFORM_UNSPECIFIED","pluginType":"GEMINI"}"#;
pub const ENVELOPE_USER_AGENT: &str = "antigravity";
pub const ENVELOPE_REQUEST_TYPE: &str = "agent";

/// Location of the desktop client's state database, relative to the home directory.
const STATE_DB_RELATIVE: &str =
    "Library/Application Support/Antigravity/User/globalStorage/state.vscdb";

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub backend_url: String,
    pub discovery_urls: Vec<String>,
    pub fallback_project: String,
    pub state_db: PathBuf,
    /// Bypasses the state database when set.
    pub static_token: Option<String>,
    pub proxy: Option<String>,
    pub thought_signature: String,
    pub identity_preamble: String,
    pub auth_ttl: Duration,
    pub connect_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            discovery_urls: DEFAULT_DISCOVERY_URLS
                .iter()
                .map(|url| url.to_string())
                .collect(),
            fallback_project: DEFAULT_FALLBACK_PROJECT.to_string(),
            state_db: default_state_db(),
            static_token: None,
            proxy: None,
            thought_signature: BYPASS_THOUGHT_SIGNATURE.to_string(),
            identity_preamble: IDENTITY_PREAMBLE.to_string(),
            auth_ttl: DEFAULT_AUTH_TTL,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ProxyConfig {
    pub fn stream_url(&self) -> String {
        format!(
            "{}/v1internal:streamGenerateContent?alt=sse",
            self.backend_url.trim_end_matches('/')
        )
    }
}

pub fn default_state_db() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(STATE_DB_RELATIVE)
}

pub fn load_code_assist_url(endpoint: &str) -> String {
    format!(
        "{}/v1internal:loadCodeAssist",
        endpoint.trim_end_matches('/')
    )
}
