//! Loopback platform
//!
//! In-process implementations of every platform seam: a paintable surface,
//! an audio backend that counts its contexts, and an encoder that muxes into
//! a small interleaved container. Used for headless runs and tests.

pub mod audio;
pub mod container;
pub mod encoder;
pub mod surface;

pub use audio::{tone, LoopbackAudioBackend};
pub use container::SeekIndexFinisher;
pub use encoder::LoopbackEncoderBackend;
pub use surface::LoopbackSurface;

use super::MediaPlatform;
use crate::capture::source::{DeviceSource, SourceKind};
use crate::capture::track::{Track, TrackKind};
use std::sync::Arc;

/// A loopback platform plus handles to its concrete backends
#[derive(Clone)]
pub struct LoopbackPlatform {
    pub platform: MediaPlatform,
    pub audio: Arc<LoopbackAudioBackend>,
    pub encoders: Arc<LoopbackEncoderBackend>,
}

impl LoopbackPlatform {
    /// Platform whose encoder supports exactly `formats`
    pub fn new<I, S>(formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let audio = Arc::new(LoopbackAudioBackend::new());
        let encoders = Arc::new(LoopbackEncoderBackend::new(formats));
        Self {
            platform: MediaPlatform::new(audio.clone(), encoders.clone()),
            audio,
            encoders,
        }
    }
}

/// Camera source with a microphone track and a video track
pub fn camera(label: &str) -> DeviceSource {
    DeviceSource::new(SourceKind::Camera, label)
        .with_track(Track::new(TrackKind::Audio, format!("{label}-mic")))
        .with_track(Track::new(TrackKind::Video, format!("{label}-video")))
}

/// Screen-share source; `system_audio` adds a system audio track
pub fn screen(label: &str, system_audio: bool) -> DeviceSource {
    let source = DeviceSource::new(SourceKind::Screen, label)
        .with_track(Track::new(TrackKind::Video, format!("{label}-video")));
    if system_audio {
        source.with_track(Track::new(TrackKind::Audio, format!("{label}-system-audio")))
    } else {
        source
    }
}
