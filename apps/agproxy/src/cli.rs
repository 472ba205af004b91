use std::path::PathBuf;
use std::time::Duration;

use agproxy_core::ProxyConfig;
use agproxy_core::config::{
    BYPASS_THOUGHT_SIGNATURE, DEFAULT_BACKEND_URL, DEFAULT_DISCOVERY_URLS,
    DEFAULT_FALLBACK_PROJECT, default_state_db,
};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "agproxy",
    version,
    about = "OpenAI-compatible chat completions on top of an Antigravity sign-in"
)]
pub(crate) struct Cli {
    /// Bind host.
    #[arg(long, env = "AGPROXY_HOST", default_value = "127.0.0.1")]
    pub(crate) host: String,

    /// Bind port.
    #[arg(long, env = "AGPROXY_PORT", default_value_t = 3000)]
    pub(crate) port: u16,

    /// Base URL of the cloudcode backend.
    #[arg(long, env = "AGPROXY_BACKEND_URL", default_value = DEFAULT_BACKEND_URL)]
    pub(crate) backend_url: String,

    /// Project discovery endpoints, tried in order.
    #[arg(
        long = "discovery-url",
        env = "AGPROXY_DISCOVERY_URLS",
        value_delimiter = ',',
        default_values = DEFAULT_DISCOVERY_URLS.iter().copied()
    )]
    pub(crate) discovery_urls: Vec<String>,

    /// Project used when discovery fails.
    #[arg(long, env = "AGPROXY_FALLBACK_PROJECT", default_value = DEFAULT_FALLBACK_PROJECT)]
    pub(crate) fallback_project: String,

    /// Desktop client state database holding the sign-in.
    #[arg(long, env = "AGPROXY_STATE_DB")]
    pub(crate) state_db: Option<PathBuf>,

    /// Static bearer token; skips the state database.
    #[arg(long, env = "AGPROXY_TOKEN")]
    pub(crate) token: Option<String>,

    /// Optional outbound proxy for backend requests.
    #[arg(long, env = "AGPROXY_PROXY")]
    pub(crate) proxy: Option<String>,

    /// Thought signature attached to replayed function calls.
    #[arg(long, env = "AGPROXY_THOUGHT_SIGNATURE", default_value = BYPASS_THOUGHT_SIGNATURE)]
    pub(crate) thought_signature: String,

    /// Seconds a discovered credential stays fresh.
    #[arg(long, env = "AGPROXY_AUTH_TTL_SECS", default_value_t = 300)]
    pub(crate) auth_ttl_secs: u64,
}

impl Cli {
    pub(crate) fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub(crate) fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            backend_url: self.backend_url.clone(),
            discovery_urls: self.discovery_urls.clone(),
            fallback_project: self.fallback_project.clone(),
            state_db: self.state_db.clone().unwrap_or_else(default_state_db),
            static_token: self.token.clone().filter(|token| !token.trim().is_empty()),
            proxy: self.proxy.clone(),
            thought_signature: self.thought_signature.clone(),
            auth_ttl: Duration::from_secs(self.auth_ttl_secs),
            ..ProxyConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_desktop_config() {
        let cli = Cli::try_parse_from(["agproxy"]).unwrap();
        assert_eq!(cli.bind_addr(), "127.0.0.1:3000");
        let config = cli.proxy_config();
        assert_eq!(config.discovery_urls.len(), 2);
        assert_eq!(config.fallback_project, DEFAULT_FALLBACK_PROJECT);
        assert_eq!(config.auth_ttl, Duration::from_secs(300));
        assert!(config.static_token.is_none());
    }

    #[test]
    fn discovery_urls_are_repeatable() {
        let cli = Cli::try_parse_from([
            "agproxy",
            "--discovery-url",
            "http://a",
            "--discovery-url",
            "http://b",
            "--token",
            "tok",
        ])
        .unwrap();
        let config = cli.proxy_config();
        assert_eq!(config.discovery_urls, vec!["http://a", "http://b"]);
        assert_eq!(config.static_token.as_deref(), Some("tok"));
    }
}
