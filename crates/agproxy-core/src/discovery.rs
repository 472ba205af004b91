use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

use crate::config::{
    BACKEND_API_CLIENT, BACKEND_USER_AGENT, CLIENT_METADATA, load_code_assist_url,
};
use crate::upstream_client::{HttpMethod, UpstreamClient, UpstreamHttpRequest};

#[async_trait]
pub trait ProjectDiscovery: Send + Sync {
    /// Always yields a project id; falls back to a fixed one when discovery fails.
    async fn discover(&self, token: &str) -> String;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadCodeAssistResponse {
    #[serde(default)]
    cloudaicompanion_project: Option<CompanionProject>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CompanionProject {
    Id(String),
    Object {
        #[serde(default)]
        id: Option<String>,
    },
}

impl CompanionProject {
    fn into_id(self) -> Option<String> {
        match self {
            Self::Id(id) => Some(id),
            Self::Object { id } => id,
        }
        .filter(|id| !id.trim().is_empty())
    }
}

/// Asks `loadCodeAssist` which project the signed-in account belongs to.
pub struct CodeAssistDiscovery {
    client: Arc<dyn UpstreamClient>,
    endpoints: Vec<String>,
    fallback: String,
}

impl CodeAssistDiscovery {
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        endpoints: Vec<String>,
        fallback: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoints,
            fallback: fallback.into(),
        }
    }

    async fn try_endpoint(&self, endpoint: &str, token: &str) -> Result<String, String> {
        let body = format!("{{\"metadata\":{CLIENT_METADATA}}}");
        let req = UpstreamHttpRequest {
            method: HttpMethod::Post,
            url: load_code_assist_url(endpoint),
            headers: vec![
                ("authorization".to_string(), format!("Bearer {token}")),
                ("content-type".to_string(), "application/json".to_string()),
                ("user-agent".to_string(), BACKEND_USER_AGENT.to_string()),
                ("x-goog-api-client".to_string(), BACKEND_API_CLIENT.to_string()),
                ("client-metadata".to_string(), CLIENT_METADATA.to_string()),
            ],
            body: Some(Bytes::from(body)),
            is_stream: false,
        };

        let resp = self.client.send(req).await.map_err(|err| err.to_string())?;
        let status = resp.status;
        let body = resp.collect_body().await.map_err(|err| err.to_string())?;
        if !(200..300).contains(&status) {
            return Err(format!(
                "status {status}: {}",
                String::from_utf8_lossy(&body)
            ));
        }
        let parsed: LoadCodeAssistResponse =
            serde_json::from_slice(&body).map_err(|err| err.to_string())?;
        parsed
            .cloudaicompanion_project
            .and_then(CompanionProject::into_id)
            .ok_or_else(|| "response carries no project".to_string())
    }
}

#[async_trait]
impl ProjectDiscovery for CodeAssistDiscovery {
    async fn discover(&self, token: &str) -> String {
        for endpoint in &self.endpoints {
            match self.try_endpoint(endpoint, token).await {
                Ok(project) => {
                    tracing::debug!(event = "project_discovered", endpoint = %endpoint, project = %project);
                    return project;
                }
                Err(error) => {
                    tracing::warn!(event = "project_discovery_failed", endpoint = %endpoint, error = %error);
                }
            }
        }
        tracing::warn!(event = "project_discovery_fallback", project = %self.fallback);
        self.fallback.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn companion_project_accepts_both_shapes() {
        let as_string: LoadCodeAssistResponse =
            serde_json::from_str(r#"{"cloudaicompanionProject":"proj-a"}"#).unwrap();
        assert_eq!(
            as_string.cloudaicompanion_project.and_then(CompanionProject::into_id),
            Some("proj-a".to_string())
        );

        let as_object: LoadCodeAssistResponse =
            serde_json::from_str(r#"{"cloudaicompanionProject":{"id":"proj-b","name":"x"}}"#)
                .unwrap();
        assert_eq!(
            as_object.cloudaicompanion_project.and_then(CompanionProject::into_id),
            Some("proj-b".to_string())
        );

        let missing: LoadCodeAssistResponse =
            serde_json::from_str(r#"{"currentTier":{}}"#).unwrap();
        assert!(missing.cloudaicompanion_project.is_none());
    }
}
