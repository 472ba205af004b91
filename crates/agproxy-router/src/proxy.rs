use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use agproxy_core::proxy_engine::SSE_CONTENT_TYPE;
use agproxy_core::{ChatReply, ProxyEngine, ProxyError};
use agproxy_protocol::openai::create_chat_completions::request::CreateChatCompletionRequestBody;

use crate::status::render_status_page;

#[derive(Clone)]
pub struct ProxyState {
    pub engine: Arc<ProxyEngine>,
}

const SSE_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const SSE_HEARTBEAT_FRAME: &[u8] = b": keep-alive\n\n";
const MAX_REQUEST_BODY_BYTES: usize = 50 * 1024 * 1024;

const CORS_ALLOW_ORIGIN: &str = "*";
const CORS_ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Requested-With";

pub fn proxy_router(engine: Arc<ProxyEngine>) -> Router {
    let state = ProxyState { engine };

    Router::new()
        .route("/", get(status_page))
        .route("/v1/models", get(models_list))
        .route("/models", get(models_list))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/chat/completions", post(chat_completions))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(cors))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn log_request(req: Request, next: Next) -> Response {
    tracing::info!(
        event = "downstream_received",
        method = %req.method(),
        uri = %req.uri()
    );
    next.run(req).await
}

/// Every origin is allowed; preflight requests never reach a handler.
async fn cors(req: Request, next: Next) -> Response {
    let mut resp = if req.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(req).await
    };
    let headers = resp.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(CORS_ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    resp
}

async fn status_page(State(state): State<ProxyState>) -> Html<String> {
    Html(render_status_page(state.engine.model_cards()))
}

async fn models_list(State(state): State<ProxyState>) -> Response {
    Json(state.engine.list_models()).into_response()
}

async fn chat_completions(
    State(state): State<ProxyState>,
    Json(body): Json<CreateChatCompletionRequestBody>,
) -> Response {
    to_axum_response(state.engine.chat_completions(body).await)
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "not_found").into_response()
}

// ---- Helpers ----

fn to_axum_response(reply: Result<ChatReply, ProxyError>) -> Response {
    let reply = match reply {
        Ok(reply) => reply,
        Err(err) => return error_response(err),
    };

    match reply {
        ChatReply::Json(response) => Json(response).into_response(),
        ChatReply::Stream(rx) => {
            let stream =
                ReceiverStream::new(wrap_sse_stream_with_heartbeat(rx)).map(Ok::<_, Infallible>);
            let mut builder = Response::builder().status(StatusCode::OK);
            if let Some(h) = builder.headers_mut() {
                h.insert(header::CONTENT_TYPE, HeaderValue::from_static(SSE_CONTENT_TYPE));
                // Hint common reverse proxies to avoid buffering SSE responses.
                h.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
                h.insert(
                    HeaderName::from_static("x-accel-buffering"),
                    HeaderValue::from_static("no"),
                );
            }
            builder.body(Body::from_stream(stream)).unwrap_or_else(|_| {
                (StatusCode::INTERNAL_SERVER_ERROR, "response_build_failed").into_response()
            })
        }
    }
}

fn error_response(err: ProxyError) -> Response {
    let mut resp = Response::new(Body::from(err.body));
    *resp.status_mut() = err.status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp
}

pub(crate) fn wrap_sse_stream_with_heartbeat(
    mut upstream_rx: tokio::sync::mpsc::Receiver<Bytes>,
) -> tokio::sync::mpsc::Receiver<Bytes> {
    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(32);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SSE_HEARTBEAT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip immediate tick; first heartbeat should be sent after the interval.
        ticker.tick().await;

        loop {
            tokio::select! {
                maybe_chunk = upstream_rx.recv() => {
                    let Some(chunk) = maybe_chunk else {
                        break;
                    };
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if tx.send(Bytes::from_static(SSE_HEARTBEAT_FRAME)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}
