use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::AuthError;

const AUTH_STATUS_QUERY: &str =
    "SELECT value FROM ItemTable WHERE key = 'antigravityAuthStatus';";

/// What the desktop client stores after sign-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredential {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` when nobody is signed in.
    async fn load(&self) -> Result<Option<StoredCredential>, AuthError>;
}

/// Reads the desktop client's state database through the `sqlite3` CLI.
#[derive(Debug, Clone)]
pub struct SqliteCliCredentialStore {
    db_path: PathBuf,
    binary: String,
}

impl SqliteCliCredentialStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            binary: "sqlite3".to_string(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

#[async_trait]
impl CredentialStore for SqliteCliCredentialStore {
    async fn load(&self) -> Result<Option<StoredCredential>, AuthError> {
        let output = match Command::new(&self.binary)
            .arg(&self.db_path)
            .arg(AUTH_STATUS_QUERY)
            .output()
            .await
        {
            Ok(output) => output,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::error!(
                    event = "credential_store_unreadable",
                    binary = %self.binary,
                    error = %err
                );
                return Ok(None);
            }
            Err(err) => return Err(AuthError::Store(err.to_string())),
        };
        if !output.status.success() {
            tracing::error!(
                event = "credential_store_query_failed",
                db = %self.db_path.display(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }
        Ok(parse_auth_status(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_auth_status(raw: &str) -> Option<StoredCredential> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str(raw) {
        Ok(credential) => Some(credential),
        Err(err) => {
            tracing::error!(event = "credential_decode_failed", error = %err);
            None
        }
    }
}

/// A fixed token from the command line, for hosts without the desktop client.
#[derive(Debug, Clone)]
pub struct StaticCredentialStore {
    credential: StoredCredential,
}

impl StaticCredentialStore {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            credential: StoredCredential {
                api_key: Some(token.into()),
                email: None,
            },
        }
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn load(&self) -> Result<Option<StoredCredential>, AuthError> {
        Ok(Some(self.credential.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_status_row_decodes() {
        let credential = parse_auth_status("{\"apiKey\":\"ya29.x\",\"email\":\"a@b.c\",\"name\":\"A\"}\n");
        assert_eq!(
            credential,
            Some(StoredCredential {
                api_key: Some("ya29.x".to_string()),
                email: Some("a@b.c".to_string()),
            })
        );
    }

    #[test]
    fn empty_or_invalid_rows_are_absent() {
        assert_eq!(parse_auth_status("\n"), None);
        assert_eq!(parse_auth_status("not json"), None);
    }

    #[tokio::test]
    async fn missing_binary_reads_as_absent() {
        let store = SqliteCliCredentialStore::new("/nonexistent/state.vscdb")
            .with_binary("agproxy-test-no-such-binary");
        assert_eq!(store.load().await.unwrap(), None);
    }
}
