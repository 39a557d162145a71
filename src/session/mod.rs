//! Per-connection stream sessions.
//!
//! A session owns both halves of one connection and moves through
//! `Idle -> Processing -> Idle`, ending in `Closed`. At most one frame is
//! analyzed at a time; frames that arrive meanwhile are handled by the
//! configured `BackpressurePolicy`. Replies go out in the order their frames
//! were received.

mod registry;

pub use registry::{ConnectionRegistry, SessionGuard, SessionInfo};

use std::fmt::Display;
use std::pin::pin;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::anyhow;
use futures::future::BoxFuture;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::codec::{self, InboundError, InboundFormat, InboundMessage};
use crate::detect::AnalysisResult;
use crate::error::SessionTerminated;
use crate::frame::RawFrame;
use crate::orchestrator::DetectionOrchestrator;

/// What to do with a frame that arrives while another one is being analyzed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Hold one frame and analyze it next; drop any further overlap.
    #[default]
    QueueOne,
    /// Drop every overlapping frame.
    Reject,
}

impl FromStr for BackpressurePolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "queue_one" | "queue" => Ok(BackpressurePolicy::QueueOne),
            "reject" | "drop" => Ok(BackpressurePolicy::Reject),
            other => Err(anyhow!(
                "unknown backpressure policy '{}'; expected queue_one or reject",
                other
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Processing,
    Closed,
}

/// Per-session counters, logged when the session closes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Messages that carried a well-formed frame.
    pub frames_received: u64,
    pub frames_analyzed: u64,
    /// Messages dropped by the backpressure policy.
    pub frames_rejected: u64,
    pub protocol_violations: u64,
    pub results_sent: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub inbound_format: InboundFormat,
    pub backpressure: BackpressurePolicy,
    pub max_frame_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inbound_format: InboundFormat::Binary,
            backpressure: BackpressurePolicy::QueueOne,
            max_frame_bytes: 8 * 1024 * 1024,
        }
    }
}

/// An inbound message after parsing: a frame to analyze, or a message that
/// only earns an error reply.
enum Admission {
    Frame { seq: u64, raw: RawFrame },
    Invalid(InboundError),
}

impl Admission {
    fn describe(&self) -> String {
        match self {
            Admission::Frame { seq, .. } => format!("frame #{}", seq),
            Admission::Invalid(_) => "invalid message".to_string(),
        }
    }
}

enum Event {
    Finished(AnalysisResult),
    Inbound(Option<InboundMessage>),
}

type Analysis = BoxFuture<'static, AnalysisResult>;

pub struct StreamSession {
    id: u64,
    orchestrator: Arc<DetectionOrchestrator>,
    config: SessionConfig,
    state: watch::Sender<SessionState>,
    stats: SessionStats,
    next_seq: u64,
}

impl StreamSession {
    pub fn new(id: u64, orchestrator: Arc<DetectionOrchestrator>, config: SessionConfig) -> Self {
        Self {
            id,
            orchestrator,
            config,
            state: watch::channel(SessionState::Idle).0,
            stats: SessionStats::default(),
            next_seq: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Follow state transitions from outside the task running the session.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Drive the session until the peer closes, the transport ends, or a send fails.
    ///
    /// A result still being computed at that point is discarded; the detector
    /// calls behind it run to completion on the worker pool.
    pub async fn run<I, O>(&mut self, inbound: I, outbound: O) -> SessionStats
    where
        I: Stream<Item = InboundMessage>,
        O: Sink<String>,
        O::Error: Display,
    {
        let mut inbound = pin!(inbound);
        let mut outbound = pin!(outbound);
        let mut in_flight: Option<Analysis> = None;
        let mut pending: Option<Admission> = None;

        log::info!(
            "session {} open ({:?} frames, {:?})",
            self.id,
            self.config.inbound_format,
            self.config.backpressure
        );

        let terminated = loop {
            let event = match in_flight.as_mut() {
                Some(analysis) => tokio::select! {
                    biased;
                    result = analysis => Event::Finished(result),
                    message = inbound.next() => Event::Inbound(message),
                },
                None => Event::Inbound(inbound.next().await),
            };

            match event {
                Event::Finished(result) => {
                    in_flight = None;
                    self.set_state(SessionState::Idle);
                    self.stats.frames_analyzed += 1;
                    if let Err(err) = self.emit(&mut outbound, &result).await {
                        break err;
                    }
                    if let Some(next) = pending.take() {
                        match self.dispatch(next, &mut outbound).await {
                            Ok(analysis) => in_flight = analysis,
                            Err(err) => break err,
                        }
                    }
                }
                Event::Inbound(None) => {
                    break SessionTerminated {
                        reason: "transport ended".to_string(),
                    }
                }
                Event::Inbound(Some(InboundMessage::Close)) => {
                    break SessionTerminated {
                        reason: "peer closed".to_string(),
                    }
                }
                Event::Inbound(Some(message)) => {
                    let admission = self.admit(message);
                    if in_flight.is_some() {
                        self.hold(admission, &mut pending);
                    } else {
                        match self.dispatch(admission, &mut outbound).await {
                            Ok(analysis) => in_flight = analysis,
                            Err(err) => break err,
                        }
                    }
                }
            }
        };

        self.set_state(SessionState::Closed);
        if in_flight.take().is_some() {
            log::info!("session {}: discarding result of the frame in flight", self.id);
        }
        if let Some(dropped) = pending.take() {
            log::debug!("session {}: dropping queued {}", self.id, dropped.describe());
        }
        let _ = outbound.close().await;

        log::info!(
            "session {} closed: {} ({} received, {} analyzed, {} rejected, {} protocol violations)",
            self.id,
            terminated.reason,
            self.stats.frames_received,
            self.stats.frames_analyzed,
            self.stats.frames_rejected,
            self.stats.protocol_violations
        );
        self.stats
    }

    fn admit(&mut self, message: InboundMessage) -> Admission {
        match codec::frame_from_message(
            message,
            self.config.inbound_format,
            self.config.max_frame_bytes,
        ) {
            Ok(raw) => {
                self.next_seq += 1;
                self.stats.frames_received += 1;
                Admission::Frame {
                    seq: self.next_seq,
                    raw,
                }
            }
            Err(err) => {
                if matches!(err, InboundError::Protocol(_)) {
                    self.stats.protocol_violations += 1;
                }
                log::warn!("session {}: {}", self.id, err);
                Admission::Invalid(err)
            }
        }
    }

    /// Start analyzing a frame, or answer an invalid message right away.
    async fn dispatch<S>(
        &mut self,
        admission: Admission,
        outbound: &mut S,
    ) -> Result<Option<Analysis>, SessionTerminated>
    where
        S: Sink<String> + Unpin,
        S::Error: Display,
    {
        match admission {
            Admission::Frame { seq, raw } => {
                log::debug!(
                    "session {} frame #{} ({} bytes, {}) dispatched",
                    self.id,
                    seq,
                    raw.len(),
                    raw.digest()
                );
                self.set_state(SessionState::Processing);
                let orchestrator = Arc::clone(&self.orchestrator);
                let analysis: Analysis = Box::pin(async move { orchestrator.analyze(raw).await });
                Ok(Some(analysis))
            }
            Admission::Invalid(err) => {
                let result = self.orchestrator.failure_result(err.to_string());
                self.emit(outbound, &result).await?;
                Ok(None)
            }
        }
    }

    fn hold(&mut self, admission: Admission, pending: &mut Option<Admission>) {
        if self.config.backpressure == BackpressurePolicy::QueueOne && pending.is_none() {
            log::debug!("session {}: queued {}", self.id, admission.describe());
            *pending = Some(admission);
            return;
        }
        self.stats.frames_rejected += 1;
        log::warn!(
            "session {}: dropped {} while busy ({} dropped so far)",
            self.id,
            admission.describe(),
            self.stats.frames_rejected
        );
    }

    async fn emit<S>(&mut self, outbound: &mut S, result: &AnalysisResult) -> Result<(), SessionTerminated>
    where
        S: Sink<String> + Unpin,
        S::Error: Display,
    {
        let text = result.to_json().map_err(|e| SessionTerminated {
            reason: format!("serialize result: {}", e),
        })?;
        outbound.send(text).await.map_err(|e| SessionTerminated {
            reason: format!("send failed: {}", e),
        })?;
        self.stats.results_sent += 1;
        Ok(())
    }
}
