//! Audio mix graph
//!
//! Combines the audio tracks of several device sources into one mixed track
//! on a session-owned audio-processing context. One context is created per
//! graph and closed exactly once, either by `teardown` or on drop.

use super::source::DeviceSource;
use super::track::{AudioBuffer, MediaPacket, Track, TrackKind};
use super::traits::{AudioBackend, AudioContext, AudioContextOptions};
use crate::utils::error::{RecorderError, RecorderResult};

/// Mixes live audio inputs into a single output track
pub struct AudioMixGraph {
    inputs: Vec<Track>,
    output: Track,
    context: Option<Box<dyn AudioContext>>,
    frames_mixed: u64,
}

impl AudioMixGraph {
    /// Build a graph from every live audio track of `sources`
    ///
    /// Fails with `NoAudioSource` before any context is allocated when no
    /// source supplies a live audio track.
    pub async fn create(
        backend: &dyn AudioBackend,
        sources: &[DeviceSource],
        options: AudioContextOptions,
    ) -> RecorderResult<Self> {
        let inputs: Vec<Track> = sources
            .iter()
            .flat_map(|s| s.live_audio_tracks())
            .cloned()
            .collect();

        if inputs.is_empty() {
            return Err(RecorderError::NoAudioSource);
        }

        let context = backend.create_context(options).await?;

        tracing::info!(
            "Audio mix graph created: {} input(s) at {}Hz, {}ch",
            inputs.len(),
            context.sample_rate(),
            context.channels()
        );

        Ok(Self {
            inputs,
            output: Track::new(TrackKind::Audio, "mixed-audio"),
            context: Some(context),
            frames_mixed: 0,
        })
    }

    /// The single combined output track
    pub fn output(&self) -> &Track {
        &self.output
    }

    pub fn inputs(&self) -> &[Track] {
        &self.inputs
    }

    /// Whether the processing context is still allocated
    pub fn is_active(&self) -> bool {
        self.context.is_some()
    }

    pub fn frames_mixed(&self) -> u64 {
        self.frames_mixed
    }

    /// Mix everything queued on the inputs into one output buffer
    ///
    /// Returns the number of frames emitted. A torn-down graph emits nothing.
    pub fn process(&mut self) -> usize {
        let Some(context) = self.context.as_ref() else {
            return 0;
        };
        let sample_rate = context.sample_rate();
        let channels = context.channels();

        let mut mix: Vec<f32> = Vec::new();
        let mut timestamp_ms: Option<f64> = None;

        for input in &self.inputs {
            // Buffers from one input are consecutive in time
            let mut lane: Vec<f32> = Vec::new();
            for packet in input.drain() {
                let MediaPacket::Audio(buffer) = packet else {
                    continue;
                };
                if buffer.sample_rate != sample_rate {
                    tracing::warn!(
                        "Dropping {}Hz buffer from '{}' (context runs at {}Hz)",
                        buffer.sample_rate,
                        input.label(),
                        sample_rate
                    );
                    continue;
                }
                timestamp_ms = Some(match timestamp_ms {
                    Some(t) => t.min(buffer.timestamp_ms),
                    None => buffer.timestamp_ms,
                });
                lane.extend(convert_channels(&buffer, channels));
            }

            if mix.len() < lane.len() {
                mix.resize(lane.len(), 0.0);
            }
            for (acc, sample) in mix.iter_mut().zip(lane) {
                *acc += sample;
            }
        }

        if mix.is_empty() {
            return 0;
        }

        for sample in mix.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        let buffer = AudioBuffer {
            sample_rate,
            channels,
            samples: mix,
            timestamp_ms: timestamp_ms.unwrap_or_default(),
        };
        let frames = buffer.frames();
        self.output.push(MediaPacket::Audio(buffer));
        self.frames_mixed += frames as u64;
        frames
    }

    /// Close the processing context and end the output track
    ///
    /// Idempotent: the context is closed on the first call only.
    pub fn teardown(&mut self) {
        if let Some(mut context) = self.context.take() {
            context.close();
            self.output.stop();
            tracing::info!(
                "Audio mix graph torn down after {} mixed frames",
                self.frames_mixed
            );
        }
    }
}

impl Drop for AudioMixGraph {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Map an interleaved buffer onto `target` channels
fn convert_channels(buffer: &AudioBuffer, target: u16) -> Vec<f32> {
    let source = buffer.channels as usize;
    let target = target as usize;

    if source == 0 || target == 0 {
        return Vec::new();
    }
    if source == target {
        return buffer.samples.clone();
    }

    let mut out = Vec::with_capacity(buffer.frames() * target);
    for frame in buffer.samples.chunks_exact(source) {
        if target == 1 {
            out.push(frame.iter().sum::<f32>() / source as f32);
        } else if source == 1 {
            out.extend(std::iter::repeat(frame[0]).take(target));
        } else {
            out.extend((0..target).map(|c| frame[c % source]));
        }
    }
    out
}
