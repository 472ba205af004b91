use std::sync::Arc;

use agproxy_protocol::openai::create_chat_completions::request::CreateChatCompletionRequestBody;
use agproxy_protocol::openai::list_models::response::ListModelsResponse;
use agproxy_transform::failure::BackendFailure;
use agproxy_transform::helpers::unix_now;
use agproxy_transform::model_catalog::ModelCard;
use agproxy_transform::request::RequestTranslator;
use agproxy_transform::response::assemble_completion;
use agproxy_transform::stream::{ChatCompletionStreamAdapter, StreamFrame, StreamSink};
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::auth::AuthCache;
use crate::config::ProxyConfig;
use crate::credential::{CredentialStore, SqliteCliCredentialStore, StaticCredentialStore};
use crate::discovery::CodeAssistDiscovery;
use crate::error::ProxyError;
use crate::upstream_client::{
    ReqwestUpstreamClient, UpstreamBody, UpstreamClient, UpstreamClientConfig, UpstreamFailure,
    UpstreamHttpResponse,
};

mod types;
mod wire;

pub use types::{ChatReply, SSE_CONTENT_TYPE};

use wire::{backend_request, build_envelope};

/// Drives one chat completion from client request to client reply.
pub struct ProxyEngine {
    client: Arc<dyn UpstreamClient>,
    auth: AuthCache,
    translator: RequestTranslator,
    stream_url: String,
}

impl ProxyEngine {
    pub fn new(config: &ProxyConfig, client: Arc<dyn UpstreamClient>, auth: AuthCache) -> Self {
        let translator = RequestTranslator::default()
            .with_identity_preamble(config.identity_preamble.clone())
            .with_thought_signature(config.thought_signature.clone());
        Self {
            client,
            auth,
            translator,
            stream_url: config.stream_url(),
        }
    }

    /// Wires the production collaborators described by `config`.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, reqwest::Error> {
        let client: Arc<dyn UpstreamClient> =
            Arc::new(ReqwestUpstreamClient::new(UpstreamClientConfig {
                proxy: config.proxy.clone(),
                connect_timeout: config.connect_timeout,
            })?);
        let store: Arc<dyn CredentialStore> = match &config.static_token {
            Some(token) => Arc::new(StaticCredentialStore::new(token.clone())),
            None => Arc::new(SqliteCliCredentialStore::new(config.state_db.clone())),
        };
        let discovery = Arc::new(CodeAssistDiscovery::new(
            client.clone(),
            config.discovery_urls.clone(),
            config.fallback_project.clone(),
        ));
        let auth = AuthCache::new(store, discovery).with_ttl(config.auth_ttl);
        Ok(Self::new(config, client, auth))
    }

    pub fn list_models(&self) -> ListModelsResponse {
        self.translator.models().list(unix_now())
    }

    pub fn model_cards(&self) -> &'static [ModelCard] {
        self.translator.models().cards()
    }

    pub async fn chat_completions(
        &self,
        body: CreateChatCompletionRequestBody,
    ) -> Result<ChatReply, ProxyError> {
        let auth = self.auth.ensure().await?;
        let alias = body.model.clone();
        let is_stream = body.is_stream();

        let translated = self.translator.translate(body);
        tracing::info!(
            event = "backend_request",
            model = %alias,
            backend_model = %translated.model,
            stream = is_stream
        );
        let envelope = build_envelope(&auth.project, translated);
        let payload = serde_json::to_vec(&envelope).map_err(|err| {
            ProxyError::backend(&BackendFailure::Transport {
                message: format!("request encode failed: {err}"),
            })
        })?;
        tracing::debug!(
            event = "backend_payload",
            payload = %String::from_utf8_lossy(&payload)
        );

        let req = backend_request(&self.stream_url, &auth.token, Bytes::from(payload), is_stream);
        let resp = self.client.send(req).await;

        if is_stream {
            let (tx, rx) = mpsc::channel::<Bytes>(32);
            let adapter = ChatCompletionStreamAdapter::new(alias);
            tokio::spawn(pump_stream(resp, adapter, tx));
            return Ok(ChatReply::Stream(rx));
        }

        let body = read_success_body(resp).await.map_err(|failure| {
            let failure = BackendFailure::from(failure);
            ProxyError::backend(&failure)
        })?;
        Ok(ChatReply::Json(assemble_completion(&alias, &body)))
    }
}

/// Reads a complete backend body, turning a non-success status into a failure.
async fn read_success_body(
    resp: Result<UpstreamHttpResponse, UpstreamFailure>,
) -> Result<Bytes, UpstreamFailure> {
    let resp = resp?;
    let status = resp.status;
    let success = resp.is_success();
    let body = resp.collect_body().await?;
    if !success {
        tracing::error!(
            event = "backend_status",
            status,
            body = %String::from_utf8_lossy(&body)
        );
        return Err(UpstreamFailure::Status { status, body });
    }
    Ok(body)
}

/// Feeds the backend body through `sink` and forwards its frames to the client.
/// Returns early once the client has gone away; dropping the backend receiver
/// then tears down the backend connection.
async fn pump_stream<S>(
    resp: Result<UpstreamHttpResponse, UpstreamFailure>,
    mut sink: S,
    tx: mpsc::Sender<Bytes>,
) where
    S: StreamSink<Output = StreamFrame>,
{
    let resp = match resp {
        Ok(resp) if resp.is_success() => resp,
        failed => {
            let failure = match read_success_body(failed).await {
                Err(failure) => failure,
                Ok(_) => return,
            };
            tracing::warn!(event = "backend_stream_failed", error = %failure);
            forward(&tx, sink.on_error(failure.into())).await;
            return;
        }
    };

    match resp.body {
        UpstreamBody::Bytes(bytes) => {
            if forward(&tx, sink.on_bytes(&bytes)).await {
                forward(&tx, sink.on_end()).await;
            }
        }
        UpstreamBody::Stream(mut rx) => {
            while let Some(item) = rx.recv().await {
                let frames = match item {
                    Ok(chunk) => {
                        tracing::trace!(event = "backend_chunk", len = chunk.len());
                        sink.on_bytes(&chunk)
                    }
                    Err(failure) => {
                        tracing::warn!(event = "backend_stream_failed", error = %failure);
                        forward(&tx, sink.on_error(failure.into())).await;
                        return;
                    }
                };
                if !forward(&tx, frames).await {
                    tracing::debug!(event = "client_disconnected");
                    return;
                }
            }
            forward(&tx, sink.on_end()).await;
        }
    }
}

async fn forward(tx: &mpsc::Sender<Bytes>, frames: Vec<StreamFrame>) -> bool {
    for frame in frames {
        if tx.send(Bytes::from(frame.to_sse())).await.is_err() {
            return false;
        }
    }
    true
}
