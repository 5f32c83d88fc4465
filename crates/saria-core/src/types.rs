//! Shared types for the saria assistant relay.
//!
//! These types are used across saria-lib and saria-cli. Keeping them here
//! means consumers can depend on the wire shapes without pulling in tokio,
//! axum, or reqwest.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─── Broadcast events ──────────────────────────────────────────────────────

/// Events pushed to every connected stream listener.
///
/// Serialized as `{"type": "...", ...}` records. `response_audio` carries
/// the synthesized clip as base64 MP3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    /// Subscription acknowledgement, delivered before any other event.
    Connected,
    /// Human-readable progress or degradation notice.
    Status { message: String },
    /// The assistant's reply text.
    Assistant { text: String },
    /// Synthesized speech for the most recent reply.
    ResponseAudio { audio: String },
    /// In-flight playback and processing should cease.
    Stop,
}

// ─── Jobs ──────────────────────────────────────────────────────────────────

/// Origin of a request turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Voice,
    Text,
}

// ─── Orchestrator I/O ──────────────────────────────────────────────────────

/// Input handed to the generation collaborator.
#[derive(Debug, Clone)]
pub enum GenerateRequest {
    /// A recorded utterance to transcribe and answer.
    Audio { bytes: Vec<u8>, mime_type: String },
    /// A plain chat message.
    Text { message: String },
}

/// Result of one request turn.
///
/// Returned to the direct caller whether or not anything was broadcast —
/// the HTTP response and the event stream are independent delivery paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub text: String,
    /// True when the turn was superseded or interrupted before completion.
    pub cancelled: bool,
}

// ─── Configuration ─────────────────────────────────────────────────────────

/// Relay tuning knobs.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Token bucket capacity (burst size).
    pub capacity: f64,
    /// Time to refill the bucket from empty back to capacity.
    pub refill_period: Duration,
    /// Admission wait budget for voice requests. Voice callers already sat
    /// through an upload, so they tolerate a longer queue.
    pub voice_wait: Duration,
    /// Admission wait budget for text requests.
    pub text_wait: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            capacity: 6.0,
            refill_period: Duration::from_secs(10),
            voice_wait: Duration::from_millis(2000),
            text_wait: Duration::from_millis(1000),
        }
    }
}
