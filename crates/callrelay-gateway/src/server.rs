//! Axum-based webhook server.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Form, Router,
    extract::{State, rejection::FormRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use callrelay_core::types::SpeechEvent;

use crate::relay::{HANDLE_SPEECH_PATH, VOICE_PATH};
use crate::state::GatewayState;
use crate::sweeper::run_idle_sweeper;
use crate::twiml::VoiceResponse;

/// Liveness text served at `/`.
pub const LIVENESS_TEXT: &str = "AI receptionist running";

/// Fields the relay reads from Twilio voice webhooks. Everything else in the
/// form body is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct VoiceWebhook {
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "SpeechResult", default)]
    pub speech_result: Option<String>,
    #[serde(rename = "From", default)]
    pub from: Option<String>,
}

impl From<VoiceWebhook> for SpeechEvent {
    fn from(form: VoiceWebhook) -> Self {
        SpeechEvent {
            call_sid: form.call_sid,
            transcript: form.speech_result,
            caller: form.from,
        }
    }
}

/// Build the webhook router.
pub fn router(state: Arc<GatewayState>) -> Router {
    let app = Router::new()
        .route("/", get(liveness_handler))
        .route("/health", get(health_handler))
        .route(VOICE_PATH, post(voice_handler))
        .route(HANDLE_SPEECH_PATH, post(handle_speech_handler))
        .route("/call-complete", post(call_complete_handler));

    #[cfg(feature = "metrics")]
    let app = app.route("/metrics", get(metrics_handler));

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Start the webhook server and the idle session sweeper.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let bind_addr = state.config.bind_addr();

    let idle_timeout = Duration::from_secs(state.config.idle_timeout_secs());
    tokio::spawn(run_idle_sweeper(state.relay.sessions().clone(), idle_timeout));

    let app = router(state);

    let addr = format!("{bind_addr}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("AI Receptionist running on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Unwrap a webhook form, falling back to an empty one so handlers can
/// always answer with TwiML.
fn webhook_fields(form: Result<Form<VoiceWebhook>, FormRejection>, path: &str) -> VoiceWebhook {
    match form {
        Ok(Form(fields)) => fields,
        Err(e) => {
            warn!(path, error = %e, "Unreadable webhook body");
            VoiceWebhook::default()
        }
    }
}

fn twiml_response(doc: VoiceResponse) -> Response {
    match doc.render() {
        Ok(xml) => ([(header::CONTENT_TYPE, "text/xml")], xml).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render TwiML");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn liveness_handler() -> &'static str {
    LIVENESS_TEXT
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");
    let active_calls = state.relay.sessions().len().await;

    axum::Json(json!({
        "status": "ok",
        "version": version,
        "active_calls": active_calls,
        "uptime_secs": state.uptime_secs(),
    }))
}

async fn voice_handler(
    State(state): State<Arc<GatewayState>>,
    form: Result<Form<VoiceWebhook>, FormRejection>,
) -> Response {
    let fields = webhook_fields(form, VOICE_PATH);
    twiml_response(state.relay.start_call(fields.call_sid.as_deref()))
}

async fn handle_speech_handler(
    State(state): State<Arc<GatewayState>>,
    form: Result<Form<VoiceWebhook>, FormRejection>,
) -> Response {
    let event = SpeechEvent::from(webhook_fields(form, HANDLE_SPEECH_PATH));
    twiml_response(state.relay.handle_speech(&event).await)
}

async fn call_complete_handler(
    State(state): State<Arc<GatewayState>>,
    form: Result<Form<VoiceWebhook>, FormRejection>,
) -> StatusCode {
    let fields = webhook_fields(form, "/call-complete");
    state.relay.end_call(fields.call_sid.as_deref()).await;
    StatusCode::OK
}

#[cfg(feature = "metrics")]
async fn metrics_handler(State(state): State<Arc<GatewayState>>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
