//! Incremental encoder
//!
//! Wraps a platform encoder in the `idle -> active -> stopped` state machine.
//! The platform reports through an `EncoderSink` as discrete messages, which
//! the owning session consumes in emission order.

use super::state::EncoderState;
use crate::capture::track::{Track, TrackKind};
use crate::utils::error::{RecorderError, RecorderResult};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// The tracks an encoder is bound to
#[derive(Debug, Clone)]
pub struct MediaStream {
    tracks: Vec<Track>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }
}

/// Options handed to the platform encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Negotiated media type
    pub mime_type: String,

    /// Target bitrate
    pub video_bits_per_second: u32,
}

/// Messages from a platform encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// One encoded segment
    Chunk(Vec<u8>),
    /// Final flush delivered; no further chunks follow
    Stopped,
    /// Encoding failed
    Error(String),
}

/// Reporting channel given to a platform encoder
#[derive(Debug, Clone)]
pub struct EncoderSink {
    tx: mpsc::UnboundedSender<EncoderEvent>,
}

impl EncoderSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EncoderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn chunk(&self, data: Vec<u8>) {
        let _ = self.tx.send(EncoderEvent::Chunk(data));
    }

    pub fn stopped(&self) {
        let _ = self.tx.send(EncoderEvent::Stopped);
    }

    pub fn error(&self, message: impl Into<String>) {
        let _ = self.tx.send(EncoderEvent::Error(message.into()));
    }
}

/// Platform encoder bound to one media stream
pub trait MediaEncoder: Send {
    fn start(&mut self) -> RecorderResult<()>;

    /// Emit whatever is buffered now as one chunk
    fn request_data(&mut self);

    /// Emit remaining data as one last chunk, then report `Stopped`
    fn stop(&mut self);
}

/// Platform encoder capability query and factory
pub trait EncoderBackend: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    fn create(
        &self,
        stream: MediaStream,
        options: EncoderOptions,
        sink: EncoderSink,
    ) -> RecorderResult<Box<dyn MediaEncoder>>;
}

/// First format in `preferred` the backend supports
pub fn negotiate_format(
    backend: &dyn EncoderBackend,
    preferred: &[String],
) -> RecorderResult<String> {
    preferred
        .iter()
        .find(|format| backend.is_type_supported(format))
        .cloned()
        .ok_or_else(|| RecorderError::UnsupportedFormat(preferred.to_vec()))
}

/// Session-owned encoder state machine
pub struct Encoder {
    state: EncoderState,
    bitrate: u32,
    chunk_interval: Duration,
    format: Option<String>,
    inner: Option<Box<dyn MediaEncoder>>,
    ticker: Option<Interval>,
}

impl Encoder {
    pub fn new(bitrate: u32, chunk_interval: Duration) -> Self {
        Self {
            state: EncoderState::Idle,
            bitrate,
            chunk_interval,
            format: None,
            inner: None,
            ticker: None,
        }
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    /// Negotiated media type, once started
    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    /// Negotiate a format, bind to exactly `video` and `audio`, and start
    ///
    /// Returns the receiving end of the encoder's event channel.
    pub fn start(
        &mut self,
        backend: &dyn EncoderBackend,
        preferred: &[String],
        video: Track,
        audio: Track,
    ) -> RecorderResult<mpsc::UnboundedReceiver<EncoderEvent>> {
        if self.state != EncoderState::Idle {
            return Err(RecorderError::invalid_state("start encoder", self.state));
        }

        let format = negotiate_format(backend, preferred)?;
        let (sink, events) = EncoderSink::channel();
        let options = EncoderOptions {
            mime_type: format.clone(),
            video_bits_per_second: self.bitrate,
        };

        let mut inner = backend.create(MediaStream::new(vec![video, audio]), options, sink)?;
        inner.start()?;

        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.chunk_interval,
            self.chunk_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Encoder started: {} at {} bps, chunk every {:?}",
            format,
            self.bitrate,
            self.chunk_interval
        );

        self.format = Some(format);
        self.inner = Some(inner);
        self.ticker = Some(ticker);
        self.state = EncoderState::Active;
        Ok(events)
    }

    /// Resolves at the next chunk deadline; never resolves unless active
    pub async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Ask the platform to emit buffered data now
    pub fn request_data(&mut self) {
        if self.state != EncoderState::Active {
            return;
        }
        if let Some(inner) = self.inner.as_mut() {
            inner.request_data();
        }
    }

    /// Request the final flush
    ///
    /// The platform emits the flush chunk and `Stopped` on the event channel.
    pub fn stop(&mut self) -> RecorderResult<()> {
        if self.state != EncoderState::Active {
            return Err(RecorderError::invalid_state("stop encoder", self.state));
        }

        self.ticker = None;
        self.state = EncoderState::Stopped;
        if let Some(inner) = self.inner.as_mut() {
            inner.stop();
        }
        tracing::info!("Encoder stop requested, awaiting final flush");
        Ok(())
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        if self.state == EncoderState::Active {
            tracing::warn!("Encoder dropped while active, stopping");
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::loopback::LoopbackEncoderBackend;

    fn formats(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn tracks() -> (Track, Track) {
        (
            Track::new(TrackKind::Video, "surface"),
            Track::new(TrackKind::Audio, "mixed-audio"),
        )
    }

    #[test]
    fn test_negotiation_picks_first_supported() {
        let backend = LoopbackEncoderBackend::new(["video/webm;codecs=vp8", "video/webm"]);
        let chosen = negotiate_format(
            &backend,
            &formats(&["video/mp4", "video/webm", "video/webm;codecs=vp8"]),
        )
        .unwrap();
        assert_eq!(chosen, "video/webm");
    }

    #[test]
    fn test_negotiation_fails_when_nothing_supported() {
        let backend = LoopbackEncoderBackend::new(["video/webm"]);
        let result = negotiate_format(&backend, &formats(&["video/mp4"]));
        assert!(matches!(result, Err(RecorderError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let backend = LoopbackEncoderBackend::new(["video/webm"]);
        let mut encoder = Encoder::new(12_000_000, Duration::from_millis(1000));
        assert!(matches!(encoder.stop(), Err(RecorderError::InvalidState { .. })));

        let (video, audio) = tracks();
        let mut events = encoder
            .start(&backend, &formats(&["video/webm"]), video.clone(), audio.clone())
            .unwrap();
        assert_eq!(encoder.state(), EncoderState::Active);
        assert_eq!(encoder.format(), Some("video/webm"));

        let again = encoder.start(&backend, &formats(&["video/webm"]), video, audio);
        assert!(matches!(again, Err(RecorderError::InvalidState { .. })));
        assert_eq!(encoder.state(), EncoderState::Active);

        encoder.stop().unwrap();
        assert_eq!(encoder.state(), EncoderState::Stopped);

        // Flush chunk first, then the stop notice
        assert!(matches!(events.recv().await, Some(EncoderEvent::Chunk(data)) if !data.is_empty()));
        assert_eq!(events.recv().await, Some(EncoderEvent::Stopped));
    }

    #[tokio::test]
    async fn test_unsupported_format_leaves_idle() {
        let backend = LoopbackEncoderBackend::new(["video/webm"]);
        let mut encoder = Encoder::new(12_000_000, Duration::from_millis(1000));
        let (video, audio) = tracks();

        let result = encoder.start(&backend, &formats(&["video/mp4"]), video, audio);
        assert!(matches!(result, Err(RecorderError::UnsupportedFormat(_))));
        assert_eq!(encoder.state(), EncoderState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_follows_chunk_interval() {
        let backend = LoopbackEncoderBackend::new(["video/webm"]);
        let mut encoder = Encoder::new(12_000_000, Duration::from_millis(1000));
        let (video, audio) = tracks();
        let _events = encoder
            .start(&backend, &formats(&["video/webm"]), video, audio)
            .unwrap();

        let started = Instant::now();
        encoder.tick().await;
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
        encoder.tick().await;
        assert_eq!(started.elapsed(), Duration::from_millis(2000));
    }
}
