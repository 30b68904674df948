//! In-process encoder backend
//!
//! Muxes raw frames and quantized PCM into the loopback container. The
//! container header is written into the first chunk, so even a recording
//! stopped before any media arrived flushes a non-empty chunk.

use super::container;
use crate::capture::track::MediaPacket;
use crate::recorder::encoder::{
    EncoderBackend, EncoderOptions, EncoderSink, MediaEncoder, MediaStream,
};
use crate::utils::error::{RecorderError, RecorderResult};
use std::sync::atomic::{AtomicBool, Ordering};

/// Encoder backend advertising a fixed set of media types
#[derive(Debug)]
pub struct LoopbackEncoderBackend {
    supported: Vec<String>,
    fail_start: AtomicBool,
}

impl LoopbackEncoderBackend {
    pub fn new<I, S>(supported: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            supported: supported.into_iter().map(Into::into).collect(),
            fail_start: AtomicBool::new(false),
        }
    }

    /// Make subsequently created encoders fail to start
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }
}

fn normalize(mime_type: &str) -> String {
    mime_type
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

impl EncoderBackend for LoopbackEncoderBackend {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        let wanted = normalize(mime_type);
        self.supported.iter().any(|s| normalize(s) == wanted)
    }

    fn create(
        &self,
        stream: MediaStream,
        options: EncoderOptions,
        sink: EncoderSink,
    ) -> RecorderResult<Box<dyn MediaEncoder>> {
        if !self.is_type_supported(&options.mime_type) {
            return Err(RecorderError::UnsupportedFormat(vec![options.mime_type]));
        }
        Ok(Box::new(LoopbackEncoder {
            stream,
            options,
            sink,
            fail_start: self.fail_start.load(Ordering::SeqCst),
            header_written: false,
            running: false,
            chunks_emitted: 0,
        }))
    }
}

struct LoopbackEncoder {
    stream: MediaStream,
    options: EncoderOptions,
    sink: EncoderSink,
    fail_start: bool,
    header_written: bool,
    running: bool,
    chunks_emitted: u64,
}

impl LoopbackEncoder {
    /// Mux everything queued on the stream's tracks
    fn encode_pending(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        if !self.header_written {
            container::write_header(
                &mut out,
                &self.options.mime_type,
                self.options.video_bits_per_second,
            );
            self.header_written = true;
        }

        for track in self.stream.tracks() {
            for packet in track.drain() {
                match packet {
                    MediaPacket::Video(frame) => container::write_video_block(&mut out, &frame),
                    MediaPacket::Audio(buffer) => container::write_audio_block(&mut out, &buffer),
                }
            }
        }
        out
    }

    fn emit(&mut self) {
        let data = self.encode_pending();
        if data.is_empty() {
            return;
        }
        self.chunks_emitted += 1;
        tracing::trace!(
            "Loopback encoder emitting chunk #{} ({} bytes)",
            self.chunks_emitted,
            data.len()
        );
        self.sink.chunk(data);
    }
}

impl MediaEncoder for LoopbackEncoder {
    fn start(&mut self) -> RecorderResult<()> {
        if self.fail_start {
            return Err(RecorderError::Encoder(
                "loopback encoder refused to start".to_string(),
            ));
        }
        self.running = true;
        Ok(())
    }

    fn request_data(&mut self) {
        if self.running {
            self.emit();
        }
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.emit();
        self.sink.stopped();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::track::{AudioBuffer, Track, TrackKind};
    use crate::recorder::encoder::EncoderEvent;

    fn options() -> EncoderOptions {
        EncoderOptions {
            mime_type: "video/webm".to_string(),
            video_bits_per_second: 1_000_000,
        }
    }

    #[test]
    fn test_type_support_ignores_case_and_spaces() {
        let backend = LoopbackEncoderBackend::new(["video/webm;codecs=vp8"]);
        assert!(backend.is_type_supported("video/WebM; codecs=vp8"));
        assert!(!backend.is_type_supported("video/mp4"));
    }

    #[tokio::test]
    async fn test_emits_header_then_media() {
        let backend = LoopbackEncoderBackend::new(["video/webm"]);
        let audio = Track::new(TrackKind::Audio, "mixed-audio");
        let (sink, mut events) = EncoderSink::channel();
        let mut encoder = backend
            .create(MediaStream::new(vec![audio.clone()]), options(), sink)
            .unwrap();
        encoder.start().unwrap();

        encoder.request_data();
        let Some(EncoderEvent::Chunk(first)) = events.recv().await else {
            panic!("expected header chunk");
        };
        assert_eq!(&first[..4], container::MAGIC);

        // Nothing queued and header already written: no chunk
        encoder.request_data();
        assert!(events.try_recv().is_err());

        audio.push(MediaPacket::Audio(AudioBuffer {
            sample_rate: 48_000,
            channels: 2,
            samples: vec![0.0; 8],
            timestamp_ms: 0.0,
        }));
        encoder.stop();
        let Some(EncoderEvent::Chunk(last)) = events.recv().await else {
            panic!("expected flush chunk");
        };
        assert_eq!(last.len(), 13 + 6 + 16);
        assert_eq!(events.recv().await, Some(EncoderEvent::Stopped));

        let mut whole = first.clone();
        whole.extend_from_slice(&last);
        let layout = container::parse(&whole).unwrap();
        assert_eq!(layout.mime_type, "video/webm");
        assert_eq!(layout.blocks.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_start() {
        let backend = LoopbackEncoderBackend::new(["video/webm"]);
        backend.set_fail_start(true);
        let (sink, _events) = EncoderSink::channel();
        let mut encoder = backend.create(MediaStream::new(vec![]), options(), sink).unwrap();
        assert!(matches!(encoder.start(), Err(RecorderError::Encoder(_))));
    }
}
