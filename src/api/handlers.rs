//! HTTP handlers (spec.md §6).
//!
//! Thin translation layer between `OrchestratorCore` and the wire: parse
//! the request, call the core, map `CoreError` to a status code the same
//! way the teacher's `impl IntoResponse for ErrorResponse` does in the
//! original `api/handlers.rs`, and for `/stream`, forward tokens over SSE
//! using the same manually-driven `Body::channel()` loop the teacher uses
//! in `handle_streaming_completion`.

use std::collections::HashMap;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::Json;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::circuit::CircuitState;
use crate::error::CoreError;
use crate::fanout::FanOutMode;
use crate::orchestrator::{OrchestratorCore, ProviderHealth};

use super::types::{
    AutoSelectRequest, AutoSelectResponse, CompleteRequest, CompleteResponse, ErrorBody, HealthResponse,
};

fn error_status(err: &CoreError) -> StatusCode {
    match err {
        CoreError::UnknownProvider(_) => StatusCode::NOT_FOUND,
        CoreError::NoEligibleProvider => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        CoreError::ShortCircuited(_) | CoreError::AllEndpointsUnhealthy(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        CoreError::Upstream4xx(_) => StatusCode::BAD_GATEWAY,
        CoreError::Upstream5xx(_) | CoreError::TransportError(_) => StatusCode::BAD_GATEWAY,
        CoreError::Cancelled => StatusCode::REQUEST_TIMEOUT,
        CoreError::FusionEmpty => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::Configuration(_) | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for &CoreError {
    fn into_response(self) -> AxumResponse {
        let status = error_status(self);
        (status, Json(ErrorBody::from(self))).into_response()
    }
}

/// Aggregates per-provider breakdowns into the top-level `status` spec.md
/// §6.2 requires: `"ok"` when every provider is healthy with a closed
/// circuit, `"down"` when none is usable, `"degraded"` otherwise.
fn aggregate_status(providers: &HashMap<String, ProviderHealth>) -> &'static str {
    if providers.is_empty() {
        return "down";
    }
    let usable = |p: &ProviderHealth| p.healthy && p.circuit_state != CircuitState::Open;
    if providers.values().all(usable) {
        "ok"
    } else if providers.values().any(usable) {
        "degraded"
    } else {
        "down"
    }
}

pub async fn health_check(State(core): State<OrchestratorCore>) -> impl IntoResponse {
    let providers = core.health_report().await;
    let status = aggregate_status(&providers);
    Json(HealthResponse {
        status,
        metrics: core.metrics(),
        providers,
    })
}

pub async fn complete(
    State(core): State<OrchestratorCore>,
    Json(req): Json<CompleteRequest>,
) -> AxumResponse {
    let explicit_multi = matches!(&req.providers, Some(ids) if ids.len() > 1);
    let options = req.options();

    if explicit_multi || req.fan_out.is_some() {
        let (mode, width) = match &req.fan_out {
            Some(fan_out) => (fan_out.mode, fan_out.width),
            None => (FanOutMode::All, options.providers.as_ref().map(Vec::len).unwrap_or(3)),
        };
        return match core.complete_fanout(&req.prompt, req.preferences, mode, width, options).await {
            Ok(fused) => Json(CompleteResponse::Fused(fused)).into_response(),
            Err(err) => {
                error!(error = %err, "fanout completion failed");
                (&err).into_response()
            }
        };
    }

    match core.complete(&req.prompt, req.preferences, options).await {
        Ok(response) => Json(CompleteResponse::Single(response)).into_response(),
        Err(err) => {
            error!(error = %err, "completion failed");
            (&err).into_response()
        }
    }
}

pub async fn auto_select(
    State(core): State<OrchestratorCore>,
    Json(req): Json<AutoSelectRequest>,
) -> AxumResponse {
    let options = req.options();
    match core.auto_select(&req.prompt, req.preferences, options).await {
        Ok(rankings) => Json(AutoSelectResponse { rankings }).into_response(),
        Err(err) => (&err).into_response(),
    }
}

pub async fn stream(
    State(core): State<OrchestratorCore>,
    Json(req): Json<CompleteRequest>,
) -> AxumResponse {
    let cancel = CancellationToken::new();
    let options = req.options();
    let mut token_stream = match core.stream(&req.prompt, req.preferences, cancel.clone(), options).await {
        Ok(stream) => stream,
        Err(err) => return (&err).into_response(),
    };

    let (mut sender, body) = Body::channel();
    let start = Instant::now();

    tokio::spawn(async move {
        let mut ended_cleanly = false;
        while let Some(token) = token_stream.next().await {
            match &token {
                crate::model::Token::Text(text) => {
                    let line = format!("data: {}\n\n", serde_json::json!({"type": "token", "text": text}));
                    if sender.send_data(bytes::Bytes::from(line)).await.is_err() {
                        cancel.cancel();
                        return;
                    }
                }
                crate::model::Token::End { total_tokens, .. } => {
                    ended_cleanly = true;
                    let payload = serde_json::json!({
                        "type": "end",
                        "outcome": "success",
                        "total_tokens": total_tokens,
                        "elapsed_ms": start.elapsed().as_millis() as u64,
                    });
                    let _ = sender.send_data(bytes::Bytes::from(format!("data: {}\n\n", payload))).await;
                }
                crate::model::Token::Error { kind, message } => {
                    let payload = serde_json::json!({"type": "error", "kind": kind, "message": message});
                    let _ = sender.send_data(bytes::Bytes::from(format!("data: {}\n\n", payload))).await;
                    info!(kind = %kind, "stream finished with error");
                    return;
                }
            }
        }
        if ended_cleanly {
            let _ = sender.send_data(bytes::Bytes::from_static(b"data: [DONE]\n\n")).await;
        }
        info!("stream finished");
    });

    AxumResponse::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .unwrap()
        .into_response()
}
