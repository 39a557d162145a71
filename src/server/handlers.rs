use std::future::ready;
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};

use super::AppState;
use crate::codec::InboundMessage;
use crate::detect::AnalysisResult;
use crate::frame::{ImageEncoding, RawFrame};
use crate::session::StreamSession;

/// Headroom above the frame limit for base64 expansion and the JSON envelope.
const ENVELOPE_OVERHEAD: usize = 64 * 1024;

pub async fn root() -> Json<Value> {
    Json(json!({"status": "online", "mode": "websocket"}))
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    detectors: Vec<&'static str>,
    active_sessions: usize,
    workers: usize,
    workers_busy: usize,
    pool_saturation_events: u64,
    detector_timeout_ms: u64,
    frame_deadline_ms: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let pool = state.orchestrator.pool();
    let limits = state.orchestrator.limits();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        detectors: state.orchestrator.registry().list(),
        active_sessions: state.connections.active(),
        workers: pool.size(),
        workers_busy: pool.in_use(),
        pool_saturation_events: pool.saturation_events(),
        detector_timeout_ms: limits.detector_timeout.as_millis() as u64,
        frame_deadline_ms: limits.frame_deadline.as_millis() as u64,
    })
}

/// One-shot analysis of a raw image body.
pub async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<AnalysisResult> {
    let encoding = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(ImageEncoding::from_mime)
        .unwrap_or_default();
    let raw = RawFrame::new(body.to_vec(), encoding);
    log::debug!("analyze request ({} bytes, {})", raw.len(), raw.digest());
    Json(state.orchestrator.analyze(raw).await)
}

pub async fn stream(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    upgrade: WebSocketUpgrade,
) -> Response {
    let max_message = state
        .session
        .max_frame_bytes
        .saturating_mul(2)
        .saturating_add(ENVELOPE_OVERHEAD);
    upgrade
        .max_message_size(max_message)
        .on_upgrade(move |socket| run_socket(state, socket, peer))
}

async fn run_socket(state: AppState, socket: WebSocket, peer: SocketAddr) {
    let guard = state.connections.open(Some(peer.to_string()));
    log::info!("session {} connected from {}", guard.id(), peer);

    let (sink, stream) = socket.split();
    let inbound = stream.filter_map(|message| {
        ready(match message {
            Ok(Message::Binary(bytes)) => Some(InboundMessage::Binary(bytes.to_vec())),
            Ok(Message::Text(text)) => Some(InboundMessage::Text(text.as_str().to_owned())),
            Ok(Message::Close(_)) => Some(InboundMessage::Close),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
            Err(err) => {
                log::debug!("websocket receive error: {}", err);
                Some(InboundMessage::Close)
            }
        })
    });
    let outbound = sink.with(|text: String| ready(Ok::<_, axum::Error>(Message::Text(text.into()))));

    let mut session = StreamSession::new(guard.id(), state.orchestrator.clone(), state.session);
    session.run(inbound, outbound).await;
}
