//! Device sources
//!
//! A `DeviceSource` groups the tracks of one acquired stream (camera and
//! microphone, screen share and system audio, or a rendered surface). It is
//! owned by whoever acquired it; the pipeline only holds track handles.

use super::track::{Track, TrackKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Origin of a device source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Camera with optional microphone
    Camera,
    /// Screen share with optional system audio
    Screen,
    /// Rendered compositing surface
    Surface,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Camera => write!(f, "camera"),
            SourceKind::Screen => write!(f, "screen"),
            SourceKind::Surface => write!(f, "surface"),
        }
    }
}

/// One live audio/video stream obtained from a capture API
#[derive(Debug, Clone)]
pub struct DeviceSource {
    id: Uuid,
    kind: SourceKind,
    label: String,
    audio_tracks: Vec<Track>,
    video_tracks: Vec<Track>,
}

impl DeviceSource {
    pub fn new(kind: SourceKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            label: label.into(),
            audio_tracks: Vec::new(),
            video_tracks: Vec::new(),
        }
    }

    /// Attach a track, routed by its kind
    pub fn with_track(mut self, track: Track) -> Self {
        match track.kind() {
            TrackKind::Audio => self.audio_tracks.push(track),
            TrackKind::Video => self.video_tracks.push(track),
        }
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn audio_tracks(&self) -> &[Track] {
        &self.audio_tracks
    }

    pub fn video_tracks(&self) -> &[Track] {
        &self.video_tracks
    }

    /// All tracks, audio first
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.audio_tracks.iter().chain(self.video_tracks.iter())
    }

    pub fn live_audio_tracks(&self) -> impl Iterator<Item = &Track> {
        self.audio_tracks.iter().filter(|t| t.is_live())
    }

    pub fn has_live_audio(&self) -> bool {
        self.live_audio_tracks().next().is_some()
    }

    /// Release the source, ending every track
    pub fn stop(&self) {
        tracing::info!("Releasing {} source '{}'", self.kind, self.label);
        for track in self.tracks() {
            track.stop();
        }
    }
}
