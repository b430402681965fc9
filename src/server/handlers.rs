//! HTTP API handlers

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use crate::error::VoiceError;
use crate::library::Track;
use crate::pipeline::Phase;
use crate::server::messages::{Message, DEFAULT_HOST};
use crate::server::AppState;

/// Date in the past so no proxy caches the stream
const EXPIRED: &str = "Mon, 26 Jul 1997 05:00:00 GMT";

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Attach a listener to the live stream
///
/// The subscription lives inside the response body; when the client goes
/// away the body is dropped and the listener unsubscribed.
pub async fn stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let subscription = state.radio.subscribe();
    tracing::info!(
        "Listener {} connected, {} listening",
        subscription.id(),
        state.radio.listeners()
    );

    let body = Body::from_stream(subscription.into_stream().map(Ok::<_, Infallible>));
    (
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CACHE_CONTROL, "no-cache, no-store"),
            (header::EXPIRES, EXPIRED),
        ],
        body,
    )
}

/// What the player page polls
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationInfo {
    pub current_track: Option<String>,
    pub listeners: usize,
    pub phase: Phase,
    pub voice_active: bool,
}

pub async fn get_info(State(state): State<Arc<AppState>>) -> Json<StationInfo> {
    let status = state.radio.status();
    Json(StationInfo {
        current_track: status.current_track,
        listeners: state.radio.listeners(),
        phase: status.phase,
        voice_active: status.voice_active,
    })
}

/// Skip to another track
pub async fn next_track(State(state): State<Arc<AppState>>) -> Json<ApiResponse<()>> {
    state.radio.next();
    Json(ApiResponse::ok(()))
}

#[derive(Deserialize)]
pub struct VoiceRequest {
    pub message: String,
    #[serde(default)]
    pub voice: Option<String>,
}

/// Trigger a voice interjection
pub async fn trigger_voice(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VoiceRequest>,
) -> (StatusCode, Json<ApiResponse<Message>>) {
    match state.radio.trigger_voice(req.message.clone(), req.voice).await {
        Ok(()) => {
            let message = state.messages.lock().add(req.message.trim(), DEFAULT_HOST);
            (StatusCode::ACCEPTED, Json(ApiResponse::ok(message)))
        }
        Err(e) => (voice_error_status(&e), Json(ApiResponse::error(e.to_string()))),
    }
}

fn voice_error_status(error: &VoiceError) -> StatusCode {
    match error {
        VoiceError::EmptyMessage | VoiceError::InvalidVoice(_) => StatusCode::BAD_REQUEST,
        VoiceError::AlreadyActive => StatusCode::CONFLICT,
        VoiceError::Spawn(_) => StatusCode::INTERNAL_SERVER_ERROR,
        VoiceError::PipelineStopped => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub async fn get_messages(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<Message>>> {
    Json(ApiResponse::ok(state.messages.lock().messages()))
}

pub async fn get_tracks(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<Vec<Track>>>) {
    match state.radio.tracks() {
        Ok(tracks) => (StatusCode::OK, Json(ApiResponse::ok(tracks))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}
