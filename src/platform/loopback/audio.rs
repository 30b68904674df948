//! In-process audio backend
//!
//! Hands out contexts that only count their own lifetime, so callers can
//! check that every context created was closed exactly once.

use crate::capture::track::AudioBuffer;
use crate::capture::traits::{AudioBackend, AudioContext, AudioContextOptions};
use crate::utils::error::{RecorderError, RecorderResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct ContextCounters {
    created: AtomicUsize,
    closed: AtomicUsize,
}

/// Audio backend that tracks context allocation
#[derive(Debug, Default)]
pub struct LoopbackAudioBackend {
    counters: Arc<ContextCounters>,
    unavailable: AtomicBool,
}

impl LoopbackAudioBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `create_context` calls fail
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn contexts_created(&self) -> usize {
        self.counters.created.load(Ordering::SeqCst)
    }

    pub fn contexts_closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Contexts created and not yet closed
    pub fn live_contexts(&self) -> usize {
        self.contexts_created() - self.contexts_closed()
    }
}

#[async_trait]
impl AudioBackend for LoopbackAudioBackend {
    async fn create_context(
        &self,
        options: AudioContextOptions,
    ) -> RecorderResult<Box<dyn AudioContext>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RecorderError::Platform(
                "audio device unavailable".to_string(),
            ));
        }
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LoopbackAudioContext {
            options,
            counters: self.counters.clone(),
            closed: false,
        }))
    }
}

struct LoopbackAudioContext {
    options: AudioContextOptions,
    counters: Arc<ContextCounters>,
    closed: bool,
}

impl AudioContext for LoopbackAudioContext {
    fn sample_rate(&self) -> u32 {
        self.options.sample_rate
    }

    fn channels(&self) -> u16 {
        self.options.channels
    }

    fn close(&mut self) {
        if self.closed {
            tracing::warn!("Audio context closed twice");
            return;
        }
        self.closed = true;
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// A sine tone, for feeding loopback microphone tracks
pub fn tone(
    sample_rate: u32,
    channels: u16,
    duration_ms: u32,
    frequency: f32,
    timestamp_ms: f64,
) -> AudioBuffer {
    let frames = (sample_rate as u64 * duration_ms as u64 / 1000) as usize;
    let step = std::f32::consts::TAU * frequency / sample_rate as f32;
    let samples = (0..frames)
        .flat_map(|i| std::iter::repeat((i as f32 * step).sin() * 0.5).take(channels as usize))
        .collect();

    AudioBuffer {
        sample_rate,
        channels,
        samples,
        timestamp_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_context_counting() {
        let backend = LoopbackAudioBackend::new();
        let options = AudioContextOptions {
            sample_rate: 44_100,
            channels: 1,
        };

        let mut context = backend.create_context(options).await.unwrap();
        assert_eq!(context.sample_rate(), 44_100);
        assert_eq!(backend.live_contexts(), 1);

        context.close();
        context.close();
        assert_eq!(backend.contexts_closed(), 1);
        assert_eq!(backend.live_contexts(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_backend() {
        let backend = LoopbackAudioBackend::new();
        backend.set_unavailable(true);
        let result = backend
            .create_context(AudioContextOptions {
                sample_rate: 48_000,
                channels: 2,
            })
            .await;
        assert!(matches!(result, Err(RecorderError::Platform(_))));
        assert_eq!(backend.contexts_created(), 0);
    }

    #[test]
    fn test_tone_length() {
        let buffer = tone(48_000, 2, 10, 440.0, 0.0);
        assert_eq!(buffer.frames(), 480);
        assert_eq!(buffer.samples.len(), 960);
        assert!(buffer.samples.iter().all(|s| s.abs() <= 0.5));
    }
}
