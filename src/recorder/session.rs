//! Recording session
//!
//! Orchestrates one recording: builds the capture stages, drives the encoder
//! and owns every resource for the session's lifetime. Once started, all
//! state transitions happen in a single driver task that consumes commands,
//! encoder events, track-ended notices and timer ticks as discrete messages.

use super::artifact::{Artifact, ArtifactAssembler, ArtifactFinisher};
use super::buffer::ChunkBuffer;
use super::encoder::{Encoder, EncoderEvent};
use super::state::{RecordingEvent, SessionState, SessionSummary, SessionTiming, StopReason};
use crate::capture::{
    AudioContextOptions, AudioMixGraph, DeviceSource, RenderSurface, SurfaceTap, TrackId,
};
use crate::config::RecorderConfig;
use crate::platform::MediaPlatform;
use crate::utils::error::{RecorderError, RecorderResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use uuid::Uuid;

/// Capacity of the lifecycle event broadcast
const EVENT_CAPACITY: usize = 100;

/// Requests from the session handle to its driver
enum Command {
    Stop {
        reply: oneshot::Sender<RecorderResult<()>>,
    },
}

/// State visible to both the handle and the driver
struct Shared {
    state: watch::Sender<SessionState>,
    format: Mutex<Option<String>>,
    final_artifact: Mutex<Option<Artifact>>,
    termination: Mutex<Option<RecorderError>>,
    timing: Mutex<SessionTiming>,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }
}

type Pipeline = (
    AudioMixGraph,
    SurfaceTap,
    Encoder,
    mpsc::UnboundedReceiver<EncoderEvent>,
);

/// One recording, from `start` to `reset`
pub struct RecordingSession {
    id: Uuid,
    config: RecorderConfig,
    platform: MediaPlatform,
    assembler: ArtifactAssembler,
    shared: Arc<Shared>,
    buffer: Option<Arc<ChunkBuffer>>,
    commands: Option<mpsc::Sender<Command>>,
    driver: Option<JoinHandle<()>>,
    events: broadcast::Sender<RecordingEvent>,
}

impl RecordingSession {
    /// Create an idle session
    pub fn new(config: RecorderConfig, platform: MediaPlatform) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            id: Uuid::new_v4(),
            config,
            platform,
            assembler: ArtifactAssembler::new(),
            shared: Arc::new(Shared {
                state,
                format: Mutex::new(None),
                final_artifact: Mutex::new(None),
                termination: Mutex::new(None),
                timing: Mutex::new(SessionTiming::default()),
            }),
            buffer: None,
            commands: None,
            driver: None,
            events,
        }
    }

    /// Install a finishing pass, used only when `seekable` is configured
    pub fn with_finisher(mut self, finisher: Arc<dyn ArtifactFinisher>) -> Self {
        if self.config.seekable {
            self.assembler = ArtifactAssembler::with_finisher(finisher);
        } else {
            tracing::debug!(
                "Finisher '{}' not installed: seekable output is disabled",
                finisher.name()
            );
        }
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Negotiated media type, once started
    pub fn format(&self) -> Option<String> {
        self.shared.format.lock().clone()
    }

    /// Artifact assembled when the session stopped
    pub fn final_artifact(&self) -> Option<Artifact> {
        self.shared.final_artifact.lock().clone()
    }

    /// The error that ended the session on its own, if any
    pub fn termination(&self) -> Option<RecorderError> {
        self.shared.termination.lock().clone()
    }

    /// The session's chunk buffer, once started
    ///
    /// `snapshot` is safe to call on it from any task.
    pub fn buffer(&self) -> Option<Arc<ChunkBuffer>> {
        self.buffer.clone()
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.events.subscribe()
    }

    /// Recording time in milliseconds
    pub fn duration_ms(&self) -> f64 {
        self.shared.timing.lock().duration_ms()
    }

    pub fn summary(&self) -> SessionSummary {
        let timing = self.shared.timing.lock().clone();
        SessionSummary {
            id: self.id,
            state: self.state(),
            format: self.format(),
            chunk_count: self.buffer.as_ref().map(|b| b.len()).unwrap_or(0),
            byte_len: self.buffer.as_ref().map(|b| b.byte_len()).unwrap_or(0),
            duration_ms: timing.duration_ms(),
            started_at: timing.started_at(),
            ended_at: timing.ended_at(),
        }
    }

    /// Start recording `surface` with the audio of `sources`
    ///
    /// Valid only from `idle`. On failure every partially created resource
    /// is released and the session stays `idle`.
    pub async fn start(
        &mut self,
        surface: Arc<dyn RenderSurface>,
        sources: &[DeviceSource],
    ) -> RecorderResult<()> {
        let current_state = self.state();
        if current_state != SessionState::Idle {
            return Err(RecorderError::invalid_state("start", current_state));
        }
        self.config
            .validate()
            .map_err(|e| RecorderError::InvalidConfig(e.to_string()))?;

        tracing::info!(
            "Starting recording session {} with {} source(s)",
            self.id,
            sources.len()
        );

        let (mix, tap, encoder, encoder_events) =
            match self.build_pipeline(surface, sources).await {
                Ok(pipeline) => pipeline,
                Err(e) => {
                    tracing::warn!("Session {} failed to start: {}", self.id, e);
                    return Err(e);
                }
            };

        let format = encoder.format().unwrap_or_default().to_string();
        let buffer = Arc::new(ChunkBuffer::new(format.clone()));

        // Any live source or surface track ending is an unexpected end-of-stream
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let mut watched = HashMap::new();
        for track in sources
            .iter()
            .flat_map(|s| s.tracks())
            .chain(std::iter::once(tap.track()))
        {
            if track.is_live() {
                track.on_ended(ended_tx.clone());
                watched.insert(track.id(), track.label().to_string());
            }
        }

        let mut frame_ticker = tokio::time::interval(tap.frame_interval());
        frame_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let (command_tx, command_rx) = mpsc::channel(8);

        *self.shared.format.lock() = Some(format.clone());
        self.shared.timing.lock().start();
        self.shared.set_state(SessionState::Recording);
        let _ = self.events.send(RecordingEvent::Started {
            format: format.clone(),
        });

        let driver = SessionDriver {
            id: self.id,
            shared: self.shared.clone(),
            buffer: buffer.clone(),
            assembler: self.assembler.clone(),
            mix,
            tap,
            encoder,
            encoder_events,
            ended: ended_rx,
            watched,
            commands: command_rx,
            frame_ticker,
            events: self.events.clone(),
            handle_alive: true,
            stop_reason: None,
            pending_reply: None,
            done: false,
        };
        self.driver = Some(tokio::spawn(driver.run()));
        self.commands = Some(command_tx);
        self.buffer = Some(buffer);

        tracing::info!("Recording session {} started ({})", self.id, format);
        Ok(())
    }

    /// Build mix graph, surface tap and encoder, rolling back on failure
    async fn build_pipeline(
        &self,
        surface: Arc<dyn RenderSurface>,
        sources: &[DeviceSource],
    ) -> RecorderResult<Pipeline> {
        let options = AudioContextOptions {
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
        };
        let mut mix = AudioMixGraph::create(self.platform.audio(), sources, options).await?;

        let mut tap = match SurfaceTap::tap(surface, self.config.frame_rate) {
            Ok(tap) => tap,
            Err(e) => {
                mix.teardown();
                return Err(e);
            }
        };

        let mut encoder = Encoder::new(
            self.config.video_bits_per_second,
            self.config.chunk_interval(),
        );
        match encoder.start(
            self.platform.encoders(),
            &self.config.preferred_formats,
            tap.track().clone(),
            mix.output().clone(),
        ) {
            Ok(events) => Ok((mix, tap, encoder, events)),
            Err(e) => {
                tap.stop();
                mix.teardown();
                Err(e)
            }
        }
    }

    /// Stop recording and wait for the encoder's final flush
    ///
    /// Valid only from `recording`.
    pub async fn stop(&mut self) -> RecorderResult<()> {
        let current_state = self.state();
        if current_state != SessionState::Recording {
            return Err(RecorderError::invalid_state("stop", current_state));
        }
        let Some(commands) = self.commands.clone() else {
            return Err(RecorderError::invalid_state("stop", current_state));
        };

        tracing::info!("Stopping recording session {}", self.id);

        let (reply, response) = oneshot::channel();
        if commands.send(Command::Stop { reply }).await.is_err() {
            return Err(RecorderError::invalid_state("stop", self.state()));
        }
        match response.await {
            Ok(result) => result?,
            Err(_) => return Err(RecorderError::invalid_state("stop", self.state())),
        }

        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                tracing::error!("Session {} driver failed: {}", self.id, e);
            }
        }

        tracing::info!(
            "Recording session {} stopped. Duration: {:.0}ms",
            self.id,
            self.duration_ms()
        );
        Ok(())
    }

    /// Assemble an artifact from the chunks buffered so far
    ///
    /// While recording this is a best-effort snapshot. While a stop is in
    /// flight it waits for the final flush. Never changes session state.
    pub async fn finalize(&self) -> RecorderResult<Artifact> {
        let mut state_rx = self.shared.state.subscribe();
        loop {
            let current_state = *state_rx.borrow_and_update();
            match current_state {
                SessionState::Recording | SessionState::Stopped => {
                    return self.assemble_current();
                }
                SessionState::Stopping => {
                    if state_rx.changed().await.is_err() {
                        return Err(RecorderError::invalid_state("finalize", self.state()));
                    }
                }
                SessionState::Idle | SessionState::Disposed => {
                    return Err(RecorderError::invalid_state("finalize", current_state));
                }
            }
        }
    }

    fn assemble_current(&self) -> RecorderResult<Artifact> {
        let buffer = self
            .buffer
            .as_ref()
            .ok_or_else(|| RecorderError::invalid_state("finalize", self.state()))?;
        Ok(self.assembler.assemble(&buffer.snapshot(), buffer.format()))
    }

    /// Clear the buffer and dispose of the session
    ///
    /// Valid only from `stopped`. Every later operation fails.
    pub async fn reset(&mut self) -> RecorderResult<()> {
        let current_state = self.state();
        if current_state != SessionState::Stopped {
            return Err(RecorderError::invalid_state("reset", current_state));
        }

        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                tracing::error!("Session {} driver failed: {}", self.id, e);
            }
        }
        if let Some(buffer) = self.buffer.as_ref() {
            buffer.reset()?;
        }
        *self.shared.final_artifact.lock() = None;
        self.commands = None;
        self.shared.set_state(SessionState::Disposed);

        tracing::info!("Recording session {} reset", self.id);
        Ok(())
    }
}

/// What woke the driver
enum Wake {
    Command(Option<Command>),
    Encoder(Option<EncoderEvent>),
    TrackEnded(TrackId),
    Frame,
    Chunk,
}

/// Owns the running pipeline and applies every state transition
struct SessionDriver {
    id: Uuid,
    shared: Arc<Shared>,
    buffer: Arc<ChunkBuffer>,
    assembler: ArtifactAssembler,
    mix: AudioMixGraph,
    tap: SurfaceTap,
    encoder: Encoder,
    encoder_events: mpsc::UnboundedReceiver<EncoderEvent>,
    ended: mpsc::UnboundedReceiver<TrackId>,
    watched: HashMap<TrackId, String>,
    commands: mpsc::Receiver<Command>,
    frame_ticker: Interval,
    events: broadcast::Sender<RecordingEvent>,
    handle_alive: bool,
    stop_reason: Option<StopReason>,
    pending_reply: Option<oneshot::Sender<RecorderResult<()>>>,
    done: bool,
}

impl SessionDriver {
    async fn run(mut self) {
        while !self.done {
            let capturing = self.stop_reason.is_none();
            let accepting = self.handle_alive;

            // Encoder output is drained before anything that could start a stop
            let wake = tokio::select! {
                biased;
                event = self.encoder_events.recv() => Wake::Encoder(event),
                command = self.commands.recv(), if accepting => Wake::Command(command),
                Some(track) = self.ended.recv() => Wake::TrackEnded(track),
                _ = self.frame_ticker.tick(), if capturing => Wake::Frame,
                _ = self.encoder.tick(), if capturing => Wake::Chunk,
            };

            match wake {
                Wake::Command(Some(Command::Stop { reply })) => self.on_stop_requested(reply),
                Wake::Command(None) => self.on_handle_dropped(),
                Wake::Encoder(Some(EncoderEvent::Chunk(data))) => self.on_chunk(data),
                Wake::Encoder(Some(EncoderEvent::Error(message))) => self.on_encoder_error(message),
                Wake::Encoder(Some(EncoderEvent::Stopped)) | Wake::Encoder(None) => {
                    self.on_encoder_stopped()
                }
                Wake::TrackEnded(track) => self.on_track_ended(track),
                Wake::Frame => {
                    self.tap.capture_frame();
                    self.mix.process();
                }
                Wake::Chunk => {
                    self.mix.process();
                    self.encoder.request_data();
                }
            }
        }
        tracing::debug!("Session {} driver exited", self.id);
    }

    fn on_stop_requested(&mut self, reply: oneshot::Sender<RecorderResult<()>>) {
        if self.stop_reason.is_some() {
            let _ = reply.send(Err(RecorderError::invalid_state(
                "stop",
                self.shared.state(),
            )));
            return;
        }
        self.pending_reply = Some(reply);
        self.begin_stop(StopReason::Requested);
    }

    fn on_handle_dropped(&mut self) {
        self.handle_alive = false;
        if self.stop_reason.is_none() {
            tracing::warn!("Session {} handle dropped while recording", self.id);
            self.begin_stop(StopReason::Dropped);
        }
    }

    fn on_chunk(&mut self, data: Vec<u8>) {
        let size = data.len();
        match self.buffer.append(data.into()) {
            Ok(true) => {
                let index = self.buffer.len() - 1;
                tracing::debug!("Session {} captured chunk #{} ({} bytes)", self.id, index, size);
                let _ = self.events.send(RecordingEvent::ChunkCaptured { index, size });
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Session {} rejected {}-byte chunk: {}", self.id, size, e);
                let _ = self.events.send(RecordingEvent::ChunkRejected { size });
            }
        }
    }

    fn on_encoder_error(&mut self, message: String) {
        tracing::error!("Session {} encoder error: {}", self.id, message);
        let _ = self.events.send(RecordingEvent::Error(message.clone()));
        self.record_termination(RecorderError::Encoder(message.clone()));

        if self.stop_reason.is_none() {
            self.begin_stop(StopReason::EncoderError { message });
        } else {
            // The flush will not complete; keep what was captured
            self.finish();
        }
    }

    fn on_encoder_stopped(&mut self) {
        if self.stop_reason.is_none() {
            let message = "encoder stopped unexpectedly".to_string();
            tracing::warn!("Session {}: {}", self.id, message);
            self.record_termination(RecorderError::Encoder(message.clone()));
            self.stop_reason = Some(StopReason::EncoderError { message });
        }
        self.finish();
    }

    fn on_track_ended(&mut self, track: TrackId) {
        if self.stop_reason.is_some() {
            return;
        }
        let label = self
            .watched
            .get(&track)
            .cloned()
            .unwrap_or_else(|| track.to_string());

        tracing::warn!(
            "Track '{}' ended unexpectedly, stopping session {}",
            label,
            self.id
        );
        self.record_termination(RecorderError::SourceEnded(label.clone()));
        let _ = self.events.send(RecordingEvent::SourceEnded {
            track: label.clone(),
        });
        self.begin_stop(StopReason::SourceEnded { track: label });
    }

    fn record_termination(&self, error: RecorderError) {
        let mut termination = self.shared.termination.lock();
        if termination.is_none() {
            *termination = Some(error);
        }
    }

    /// Leave `recording` and ask the encoder for its final flush
    fn begin_stop(&mut self, reason: StopReason) {
        tracing::info!("Session {} stopping: {:?}", self.id, reason);
        self.shared.set_state(SessionState::Stopping);
        let _ = self.events.send(RecordingEvent::Stopping {
            reason: reason.clone(),
        });
        self.stop_reason = Some(reason);

        // Hand the last mixed audio to the encoder before it flushes
        self.mix.process();
        self.buffer.begin_flush();

        if let Err(e) = self.encoder.stop() {
            tracing::warn!("Session {}: {}", self.id, e);
            self.finish();
        }
    }

    /// Release resources, assemble the final artifact, enter `stopped`
    fn finish(&mut self) {
        if self.done {
            return;
        }
        self.done = true;

        self.buffer.close();
        self.mix.teardown();
        self.tap.stop();

        let reason = self.stop_reason.take().unwrap_or(StopReason::Requested);
        let artifact = self
            .assembler
            .assemble(&self.buffer.snapshot(), self.buffer.format());
        let chunk_count = self.buffer.len();
        let byte_len = self.buffer.byte_len();

        *self.shared.final_artifact.lock() = Some(artifact);
        self.shared.timing.lock().end();
        self.shared.set_state(SessionState::Stopped);

        tracing::info!(
            "Session {} stopped ({:?}): {} chunks, {} bytes",
            self.id,
            reason,
            chunk_count,
            byte_len
        );
        let _ = self.events.send(RecordingEvent::Stopped {
            reason,
            chunk_count,
            byte_len,
        });

        if let Some(reply) = self.pending_reply.take() {
            let _ = reply.send(Ok(()));
        }
    }
}
