//! Recording state management
//!
//! State machines, lifecycle events and timing for a recording session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;
use uuid::Uuid;

/// Lifecycle of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Not started yet
    #[default]
    Idle,
    /// Encoder active, chunks accumulating
    Recording,
    /// Stop requested, waiting for the encoder's final flush
    Stopping,
    /// Flush complete, resources released
    Stopped,
    /// Buffer cleared by `reset`; the session must be discarded
    Disposed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Recording => write!(f, "recording"),
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Stopped => write!(f, "stopped"),
            SessionState::Disposed => write!(f, "disposed"),
        }
    }
}

/// Lifecycle of an encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderState {
    #[default]
    Idle,
    Active,
    Stopped,
}

impl fmt::Display for EncoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncoderState::Idle => write!(f, "idle"),
            EncoderState::Active => write!(f, "active"),
            EncoderState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Why a session left the recording state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum StopReason {
    /// `stop` was called
    Requested,
    /// A source or surface track ended mid-recording
    SourceEnded { track: String },
    /// The platform encoder reported an error
    EncoderError { message: String },
    /// The session handle was dropped while recording
    Dropped,
}

/// Events emitted during recording
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// Recording started with the negotiated format
    Started { format: String },
    /// A chunk was appended to the buffer
    ChunkCaptured { index: usize, size: usize },
    /// A chunk arrived after the buffer closed and was rejected
    ChunkRejected { size: usize },
    /// Stop in progress, waiting for the final flush
    Stopping { reason: StopReason },
    /// A track ended unexpectedly
    SourceEnded { track: String },
    /// Recording stopped and the final artifact is available
    Stopped {
        reason: StopReason,
        chunk_count: usize,
        byte_len: usize,
    },
    /// Error occurred
    Error(String),
}

/// Wall-clock and process timing of a session
#[derive(Debug, Clone, Default)]
pub struct SessionTiming {
    started: Option<Instant>,
    ended: Option<Instant>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl SessionTiming {
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.started_at = Some(Utc::now());
    }

    pub fn end(&mut self) {
        self.ended = Some(Instant::now());
        self.ended_at = Some(Utc::now());
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Elapsed recording time; keeps growing until `end`
    pub fn duration_ms(&self) -> f64 {
        match (self.started, self.ended) {
            (Some(start), Some(end)) => end.duration_since(start).as_secs_f64() * 1000.0,
            (Some(start), None) => start.elapsed().as_secs_f64() * 1000.0,
            _ => 0.0,
        }
    }
}

/// Serializable snapshot of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: Uuid,
    pub state: SessionState,
    pub format: Option<String>,
    pub chunk_count: usize,
    pub byte_len: usize,
    pub duration_ms: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}
