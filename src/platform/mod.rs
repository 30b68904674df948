//! Platform bindings
//!
//! A `MediaPlatform` bundles the audio and encoder backends a recording
//! session runs on.

pub mod loopback;

use crate::capture::traits::AudioBackend;
use crate::recorder::encoder::EncoderBackend;
use std::sync::Arc;

/// Audio and encoder backends for a session
#[derive(Clone)]
pub struct MediaPlatform {
    audio: Arc<dyn AudioBackend>,
    encoders: Arc<dyn EncoderBackend>,
}

impl MediaPlatform {
    pub fn new(audio: Arc<dyn AudioBackend>, encoders: Arc<dyn EncoderBackend>) -> Self {
        Self { audio, encoders }
    }

    pub fn audio(&self) -> &dyn AudioBackend {
        self.audio.as_ref()
    }

    pub fn encoders(&self) -> &dyn EncoderBackend {
        self.encoders.as_ref()
    }
}
