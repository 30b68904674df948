//! Surface tap
//!
//! Samples a rendered surface into a live video track at a fixed frame rate.
//! The tap does not schedule itself; the owning session calls
//! `capture_frame` once per `frame_interval`.

use super::track::{MediaPacket, Track, TrackKind, VideoFrame};
use super::traits::RenderSurface;
use crate::config::MAX_FRAME_RATE;
use crate::utils::error::{RecorderError, RecorderResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Live video track sourced from a render surface
pub struct SurfaceTap {
    surface: Arc<dyn RenderSurface>,
    track: Track,
    frame_rate: u32,
    started: Instant,
    frames_captured: u64,
}

impl SurfaceTap {
    /// Tap `surface` at `frame_rate` frames per second
    pub fn tap(surface: Arc<dyn RenderSurface>, frame_rate: u32) -> RecorderResult<Self> {
        if frame_rate == 0 || frame_rate > MAX_FRAME_RATE {
            return Err(RecorderError::InvalidConfig(format!(
                "frame rate must be between 1 and {MAX_FRAME_RATE}, got {frame_rate}"
            )));
        }

        let (width, height) = surface.size();
        if width == 0 || height == 0 {
            return Err(RecorderError::SurfaceUnavailable(format!(
                "surface has zero dimensions ({width}x{height})"
            )));
        }
        if !surface.is_attached() {
            return Err(RecorderError::SurfaceUnavailable(
                "surface is not attached to a render target".to_string(),
            ));
        }

        tracing::info!("Tapping {}x{} surface at {}fps", width, height, frame_rate);

        Ok(Self {
            surface,
            track: Track::new(TrackKind::Video, "surface"),
            frame_rate,
            started: Instant::now(),
            frames_captured: 0,
        })
    }

    /// The live video track fed by this tap
    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate as f64)
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    /// Sample the surface's current pixels into the track
    ///
    /// A surface that has detached, collapsed to zero size, or returned
    /// malformed pixels ends the track. Returns whether a frame was pushed.
    pub fn capture_frame(&mut self) -> bool {
        if !self.track.is_live() {
            return false;
        }

        let (width, height) = self.surface.size();
        if !self.surface.is_attached() || width == 0 || height == 0 {
            tracing::warn!("Surface detached, ending tap after {} frames", self.frames_captured);
            self.track.stop();
            return false;
        }

        let expected = width as usize * height as usize * 4;
        let pixels = match self.surface.read_pixels() {
            Some(pixels) if pixels.len() == expected => pixels,
            Some(pixels) => {
                tracing::warn!(
                    "Surface returned {} bytes, expected {} ({}x{}x4); ending tap",
                    pixels.len(),
                    expected,
                    width,
                    height
                );
                self.track.stop();
                return false;
            }
            None => {
                tracing::warn!("Surface could not be read; ending tap");
                self.track.stop();
                return false;
            }
        };

        let frame = VideoFrame {
            width,
            height,
            data: pixels.into(),
            timestamp_ms: self.started.elapsed().as_secs_f64() * 1000.0,
        };

        if self.track.push(MediaPacket::Video(frame)) {
            self.frames_captured += 1;
            true
        } else {
            false
        }
    }

    /// End the tap's track
    pub fn stop(&mut self) {
        if self.track.is_live() {
            tracing::debug!("Stopping surface tap after {} frames", self.frames_captured);
            self.track.stop();
        }
    }
}

impl Drop for SurfaceTap {
    fn drop(&mut self) {
        self.stop();
    }
}
