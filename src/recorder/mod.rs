//! Recording system module
//!
//! This module implements the session side of the pipeline:
//! - Encoder state machine over a platform `EncoderBackend`
//! - ChunkBuffer holding emitted chunks in order
//! - ArtifactAssembler turning chunks into a downloadable artifact
//! - RecordingSession driving one recording end to end
//! - StudioRecorder keeping one session live at a time

pub mod artifact;
pub mod buffer;
pub mod encoder;
pub mod manager;
pub mod session;
pub mod state;

pub use artifact::{Artifact, ArtifactAssembler, ArtifactFinisher, ArtifactInfo};
pub use buffer::{BufferState, Chunk, ChunkBuffer};
pub use encoder::{
    Encoder, EncoderBackend, EncoderEvent, EncoderOptions, EncoderSink, MediaEncoder, MediaStream,
};
pub use manager::StudioRecorder;
pub use session::RecordingSession;
pub use state::{EncoderState, RecordingEvent, SessionState, SessionSummary, StopReason};
