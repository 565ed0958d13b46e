use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{Extension, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use security::{CallbackEnvelope, CryptoErrorKind};
use serde::Deserialize;
use serde_json::json;
use tracing::{Instrument, error, info, warn};
use wecom_core::{
    CallbackOutcome, CallbackPipeline, Outbound, PipelineError, SharedMessageSink, WeComApi,
    WeComConfig,
};
use wecom_telemetry::{
    TelemetryLabels, install as init_telemetry, record_callback_latency, record_dropped,
    record_ingress, record_rejected, start_ingress_span, with_common_fields,
};

mod reqid;
mod settings;
mod sink;

use reqid::{RequestId, with_request_id};
use settings::IngressSettings;
use sink::{ForwardSink, LogSink};

const SUCCESS_BODY: &str = "success";

#[derive(Clone)]
struct AppState {
    pipeline: CallbackPipeline,
    outbound: Outbound,
    tenant: String,
}

impl AppState {
    fn labels(&self) -> TelemetryLabels {
        TelemetryLabels::new(self.tenant.clone())
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/ingress/wecom", get(handle_verify).post(handle_callback))
        .route("/egress/wecom/send", post(handle_send))
        .route("/healthz", get(healthz))
        .layer(middleware::from_fn(with_request_id))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry("wecom-ingress")?;
    let config = WeComConfig::from_env()?;
    let settings = IngressSettings::from_env()?;
    let http = reqwest::Client::new();

    let sink: SharedMessageSink = match &settings.forward_url {
        Some(url) => {
            info!(url = %url, "forwarding canonical messages");
            Arc::new(ForwardSink::new(http.clone(), url.clone()))
        }
        None => Arc::new(LogSink),
    };
    let pipeline = CallbackPipeline::from_config(&config)?.with_sink(sink);
    let api = WeComApi::new(http, &config, Some(settings.api_base.clone()));

    let state = AppState {
        pipeline,
        outbound: Outbound::new(Arc::new(api)),
        tenant: config.corp_id.clone(),
    };

    info!("ingress-wecom listening on {}", settings.bind);
    let listener = tokio::net::TcpListener::bind(settings.bind).await?;
    axum::serve(listener, router(state).into_make_service()).await?;
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    msg_signature: String,
    timestamp: String,
    nonce: String,
    echostr: String,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    msg_signature: String,
    timestamp: String,
    nonce: String,
}

/// URL-ownership handshake issued when the callback URL is saved.
async fn handle_verify(
    State(state): State<AppState>,
    Extension(rid): Extension<RequestId>,
    Query(query): Query<VerifyQuery>,
) -> Result<String, StatusCode> {
    let labels = state.labels();
    start_ingress_span(&labels, rid.as_str()).in_scope(|| {
        let echo = state
            .pipeline
            .verify_url(
                &query.msg_signature,
                &query.timestamp,
                &query.nonce,
                &query.echostr,
            )
            .map_err(|err| reject(&labels, &err))?;
        info!("wecom callback url verified");
        Ok(echo)
    })
}

async fn handle_callback(
    State(state): State<AppState>,
    Extension(rid): Extension<RequestId>,
    Query(query): Query<CallbackQuery>,
    body: String,
) -> Result<&'static str, StatusCode> {
    let started = Instant::now();
    let labels = state.labels();
    let span = start_ingress_span(&labels, rid.as_str());
    let envelope = CallbackEnvelope {
        signature: query.msg_signature,
        timestamp: query.timestamp,
        nonce: query.nonce,
        body,
    };

    let result = process_callback(&state, &labels, &span, envelope)
        .instrument(span.clone())
        .await;
    record_callback_latency(&labels, started.elapsed());
    result
}

async fn process_callback(
    state: &AppState,
    labels: &TelemetryLabels,
    span: &tracing::Span,
    envelope: CallbackEnvelope,
) -> Result<&'static str, StatusCode> {
    let outcome = state
        .pipeline
        .handle_callback(&envelope)
        .await
        .map_err(|err| reject(labels, &err))?;

    match outcome {
        CallbackOutcome::Dispatched(message) => {
            with_common_fields(
                span,
                &labels.tenant,
                message.chat_id.as_deref(),
                Some(&message.id),
            );
            record_ingress(labels);
            info!("wecom callback accepted");
        }
        CallbackOutcome::Dropped(raw) => {
            record_dropped(labels);
            info!(msg_type = %raw.msg_type, event = %raw.event, "wecom callback ignored");
        }
    }
    Ok(SUCCESS_BODY)
}

fn status_for(err: &PipelineError) -> (StatusCode, &'static str) {
    match err {
        PipelineError::Crypto(err) => match err.kind() {
            CryptoErrorKind::Authentication => (StatusCode::UNAUTHORIZED, "authentication"),
            CryptoErrorKind::Decryption => (StatusCode::BAD_REQUEST, "decryption"),
            CryptoErrorKind::Configuration => {
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration")
            }
        },
        PipelineError::Normalize(_) => (StatusCode::BAD_REQUEST, "normalize"),
        PipelineError::Handler(_) => (StatusCode::INTERNAL_SERVER_ERROR, "handler"),
    }
}

fn reject(labels: &TelemetryLabels, err: &PipelineError) -> StatusCode {
    let (status, reason) = status_for(err);
    record_rejected(labels, reason);
    if status.is_server_error() {
        error!(error = %err, reason, "wecom callback failed");
    } else {
        warn!(error = %err, reason, "wecom callback rejected");
    }
    status
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    user_id: String,
    content: String,
}

async fn handle_send(State(state): State<AppState>, Json(req): Json<SendRequest>) -> Response {
    match state.outbound.send(&req.user_id, &req.content).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            error!(error = %err, user_id = %req.user_id, "wecom send failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}
