//! HTTP API for the saria relay.
//!
//! Mirrors the upstream surface: voice upload, chat, interrupt, and a
//! long-lived SSE event stream. CORS-permissive so a local web client can
//! connect directly.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::Stream;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::debug;

use saria_core::error::RelayError;
use saria_core::types::TurnOutcome;

use crate::relay::Relay;

/// Build the axum router over a shared [`Relay`].
pub fn router(relay: Arc<Relay>) -> Router {
    Router::new()
        .route("/voice", post(voice))
        .route("/chat", post(chat))
        .route("/interrupt", post(interrupt))
        .route("/stream", get(stream))
        .route("/status", get(status))
        // Recorded clips routinely exceed axum's 2 MB default
        .layer(DefaultBodyLimit::max(25 * 1024 * 1024))
        .layer(CorsLayer::permissive())
        .with_state(relay)
}

/// HTTP projection of [`RelayError`].
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        let status = match err {
            RelayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(serde::Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
}

#[derive(serde::Serialize)]
struct TurnBody {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cancelled: Option<bool>,
}

impl From<TurnOutcome> for TurnBody {
    fn from(outcome: TurnOutcome) -> Self {
        if outcome.cancelled {
            Self {
                ok: true,
                text: None,
                cancelled: Some(true),
            }
        } else {
            Self {
                ok: true,
                text: Some(outcome.text),
                cancelled: None,
            }
        }
    }
}

async fn voice(
    State(relay): State<Arc<Relay>>,
    mut multipart: Multipart,
) -> Result<Json<TurnBody>, ApiError> {
    let mut file: Option<Vec<u8>> = None;
    let mut mime_type = String::from("audio/webm");

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read upload: {e}")))?;
                file = Some(bytes.to_vec());
            }
            Some("mimeType") => {
                if let Ok(value) = field.text().await {
                    mime_type = value;
                }
            }
            _ => {}
        }
    }

    let Some(bytes) = file else {
        return Err(ApiError::bad_request("No file uploaded"));
    };

    debug!("voice: {} byte upload ({mime_type})", bytes.len());
    let outcome = relay.handle_voice(bytes, &mime_type).await?;
    Ok(Json(outcome.into()))
}

async fn chat(
    State(relay): State<Arc<Relay>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<TurnBody>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::bad_request("Message required"));
    }
    let outcome = relay.handle_text(&req.message).await?;
    Ok(Json(outcome.into()))
}

async fn interrupt(State(relay): State<Arc<Relay>>) -> Json<serde_json::Value> {
    let message = if relay.interrupt() {
        "Interrupted"
    } else {
        "Nothing to interrupt"
    };
    Json(json!({ "ok": true, "message": message }))
}

/// Long-lived event stream. The subscription's connected ack is already
/// queued, so it is the first event every client sees. Dropping the
/// connection drops the listener, which unsubscribes it.
async fn stream(
    State(relay): State<Arc<Relay>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let listener = relay.hub().subscribe();
    let stream = futures_util::stream::unfold(listener, |mut listener| async move {
        listener
            .recv()
            .await
            .map(|line| (Ok::<_, Infallible>(Event::default().data(line)), listener))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn status(State(relay): State<Arc<Relay>>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "listeners": relay.hub().listener_count(),
        "tokens": relay.tokens_available(),
    }))
}
