//! Live media tracks
//!
//! A `Track` is a cheap, cloneable handle to one elementary audio or video
//! stream. Producers push packets into it, consumers drain them, and the
//! owner ends it. Ending is one-way and notifies every registered listener
//! exactly once.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Packets held per track before the oldest are dropped
pub const MAX_QUEUED_PACKETS: usize = 256;

/// Unique track identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(Uuid);

impl TrackId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of elementary stream carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Interleaved f32 PCM audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of interleaved channels
    pub channels: u16,

    /// Interleaved samples in [-1.0, 1.0]
    pub samples: Vec<f32>,

    /// Capture time in milliseconds, relative to the producer's start
    pub timestamp_ms: f64,
}

impl AudioBuffer {
    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Duration of the buffer in milliseconds
    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 * 1000.0 / self.sample_rate as f64
    }
}

/// RGBA8 video frame
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,

    /// Tightly packed RGBA pixels
    pub data: Arc<[u8]>,

    /// Capture time in milliseconds, relative to the producer's start
    pub timestamp_ms: f64,
}

/// A unit of media flowing through a track
#[derive(Debug, Clone, PartialEq)]
pub enum MediaPacket {
    Audio(AudioBuffer),
    Video(VideoFrame),
}

impl MediaPacket {
    pub fn kind(&self) -> TrackKind {
        match self {
            MediaPacket::Audio(_) => TrackKind::Audio,
            MediaPacket::Video(_) => TrackKind::Video,
        }
    }
}

#[derive(Debug)]
struct TrackShared {
    live: AtomicBool,
    queue: Mutex<VecDeque<MediaPacket>>,
    ended_listeners: Mutex<Vec<mpsc::UnboundedSender<TrackId>>>,
}

/// Handle to a single live audio or video stream
#[derive(Clone)]
pub struct Track {
    id: TrackId,
    kind: TrackKind,
    label: Arc<str>,
    shared: Arc<TrackShared>,
}

impl Track {
    /// Create a new live track
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        let label: String = label.into();
        Self {
            id: TrackId::new(),
            kind,
            label: label.into(),
            shared: Arc::new(TrackShared {
                live: AtomicBool::new(true),
                queue: Mutex::new(VecDeque::new()),
                ended_listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_live(&self) -> bool {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Queue a packet for consumers
    ///
    /// Returns false if the track has ended or the packet kind does not match
    /// the track kind.
    pub fn push(&self, packet: MediaPacket) -> bool {
        if !self.is_live() {
            return false;
        }
        if packet.kind() != self.kind {
            tracing::warn!(
                "Dropping {} packet pushed to {} track '{}'",
                packet.kind(),
                self.kind,
                self.label
            );
            return false;
        }

        let mut queue = self.shared.queue.lock();
        if queue.len() >= MAX_QUEUED_PACKETS {
            queue.pop_front();
            tracing::warn!("Track '{}' queue full, dropped oldest packet", self.label);
        }
        queue.push_back(packet);
        true
    }

    /// Take every queued packet in push order
    pub fn drain(&self) -> Vec<MediaPacket> {
        self.shared.queue.lock().drain(..).collect()
    }

    /// Number of packets waiting to be drained
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// End the track
    ///
    /// Idempotent. Packets already queued stay drainable.
    pub fn stop(&self) {
        if !self.shared.live.swap(false, Ordering::SeqCst) {
            return;
        }

        let listeners = std::mem::take(&mut *self.shared.ended_listeners.lock());
        tracing::debug!(
            "Track '{}' ({}) ended, notifying {} listener(s)",
            self.label,
            self.kind,
            listeners.len()
        );
        for listener in listeners {
            let _ = listener.send(self.id);
        }
    }

    /// Register for a single end-of-track notification
    ///
    /// If the track has already ended the notification is sent immediately.
    /// Listeners whose receiver is gone are dropped on each registration.
    pub fn on_ended(&self, listener: mpsc::UnboundedSender<TrackId>) {
        let mut listeners = self.shared.ended_listeners.lock();
        listeners.retain(|l| !l.is_closed());
        if self.is_live() {
            listeners.push(listener);
        } else {
            let _ = listener.send(self.id);
        }
    }

    /// Number of registered end-of-track listeners
    pub fn ended_listener_count(&self) -> usize {
        self.shared.ended_listeners.lock().len()
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("live", &self.is_live())
            .finish()
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(timestamp_ms: f64) -> MediaPacket {
        MediaPacket::Audio(AudioBuffer {
            sample_rate: 48_000,
            channels: 1,
            samples: vec![0.5; 480],
            timestamp_ms,
        })
    }

    #[test]
    fn test_push_and_drain_preserves_order() {
        let track = Track::new(TrackKind::Audio, "mic");
        assert!(track.push(audio(0.0)));
        assert!(track.push(audio(10.0)));

        let packets = track.drain();
        assert_eq!(packets, vec![audio(0.0), audio(10.0)]);
        assert_eq!(track.queued(), 0);
    }

    #[test]
    fn test_rejects_mismatched_kind() {
        let track = Track::new(TrackKind::Video, "camera");
        assert!(!track.push(audio(0.0)));
        assert_eq!(track.queued(), 0);
    }

    #[test]
    fn test_queue_is_bounded() {
        let track = Track::new(TrackKind::Audio, "mic");
        for i in 0..(MAX_QUEUED_PACKETS + 10) {
            track.push(audio(i as f64));
        }
        let packets = track.drain();
        assert_eq!(packets.len(), MAX_QUEUED_PACKETS);
        assert_eq!(packets[0], audio(10.0));
    }

    #[test]
    fn test_stop_notifies_once_and_blocks_pushes() {
        let track = Track::new(TrackKind::Audio, "mic");
        let (tx, mut rx) = mpsc::unbounded_channel();
        track.on_ended(tx);

        track.stop();
        track.stop();

        assert_eq!(rx.try_recv().unwrap(), track.id());
        assert!(rx.try_recv().is_err());
        assert!(!track.is_live());
        assert!(!track.push(audio(0.0)));
    }

    #[test]
    fn test_on_ended_after_stop_fires_immediately() {
        let track = Track::new(TrackKind::Video, "screen");
        track.stop();

        let (tx, mut rx) = mpsc::unbounded_channel();
        track.on_ended(tx);
        assert_eq!(rx.try_recv().unwrap(), track.id());
    }

    #[test]
    fn test_closed_listeners_are_pruned() {
        let track = Track::new(TrackKind::Audio, "mic");
        for _ in 0..10 {
            let (tx, rx) = mpsc::unbounded_channel();
            track.on_ended(tx);
            drop(rx);
        }
        assert_eq!(track.ended_listener_count(), 1);

        let (tx, mut rx) = mpsc::unbounded_channel();
        track.on_ended(tx);
        assert_eq!(track.ended_listener_count(), 1);

        track.stop();
        assert_eq!(rx.try_recv().unwrap(), track.id());
    }

    #[test]
    fn test_clones_share_liveness() {
        let track = Track::new(TrackKind::Audio, "mic");
        let handle = track.clone();
        handle.stop();
        assert!(!track.is_live());
        assert_eq!(track, handle);
    }
}
