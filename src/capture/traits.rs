//! Capture trait definitions
//!
//! Platform-agnostic traits for the collaborators the pipeline consumes: the
//! compositing surface and the audio-processing backend.

use crate::utils::error::RecorderResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A rendered visual surface that can be sampled
pub trait RenderSurface: Send + Sync {
    /// Current size in pixels
    fn size(&self) -> (u32, u32);

    /// Whether the surface is attached to a renderable target
    fn is_attached(&self) -> bool;

    /// Current RGBA8 pixels, `width * height * 4` bytes
    ///
    /// Returns `None` when the surface cannot be read right now.
    fn read_pixels(&self) -> Option<Vec<u8>>;
}

/// Parameters for a new audio-processing context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioContextOptions {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Channel count of the destination bus
    pub channels: u16,
}

/// Factory for platform audio-processing contexts
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Allocate a new context
    ///
    /// May suspend while the platform resumes or grants the audio device.
    async fn create_context(
        &self,
        options: AudioContextOptions,
    ) -> RecorderResult<Box<dyn AudioContext>>;
}

/// A live platform audio-processing context
pub trait AudioContext: Send {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Release the context. Called exactly once by the owning mix graph.
    fn close(&mut self);
}
