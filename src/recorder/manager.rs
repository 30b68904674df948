//! Studio recorder
//!
//! Caller-facing holder that keeps at most one live recording session.

use super::artifact::{Artifact, ArtifactFinisher};
use super::session::RecordingSession;
use super::state::{RecordingEvent, SessionState, SessionSummary};
use crate::capture::{DeviceSource, RenderSurface};
use crate::config::RecorderConfig;
use crate::platform::MediaPlatform;
use crate::utils::error::{RecorderError, RecorderResult};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

/// Owns the current recording session and replaces it between recordings
#[derive(Clone)]
pub struct StudioRecorder {
    config: RecorderConfig,
    platform: MediaPlatform,
    finisher: Option<Arc<dyn ArtifactFinisher>>,
    session: Arc<Mutex<RecordingSession>>,
}

impl StudioRecorder {
    pub fn new(config: RecorderConfig, platform: MediaPlatform) -> Self {
        let session = RecordingSession::new(config.clone(), platform.clone());
        Self {
            config,
            platform,
            finisher: None,
            session: Arc::new(Mutex::new(session)),
        }
    }

    /// Finishing pass for sessions created from now on
    pub fn with_finisher(mut self, finisher: Arc<dyn ArtifactFinisher>) -> Self {
        self.finisher = Some(finisher);
        self.session = Arc::new(Mutex::new(self.fresh_session()));
        self
    }

    fn fresh_session(&self) -> RecordingSession {
        let session = RecordingSession::new(self.config.clone(), self.platform.clone());
        match &self.finisher {
            Some(finisher) => session.with_finisher(finisher.clone()),
            None => session,
        }
    }

    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state()
    }

    pub async fn session_id(&self) -> Uuid {
        self.session.lock().await.id()
    }

    pub async fn summary(&self) -> SessionSummary {
        self.session.lock().await.summary()
    }

    /// Subscribe to the current session's events
    pub async fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.session.lock().await.subscribe()
    }

    /// Start a new recording, replacing a finished session
    pub async fn start_recording(
        &self,
        surface: Arc<dyn RenderSurface>,
        sources: &[DeviceSource],
    ) -> RecorderResult<Uuid> {
        let mut session = self.session.lock().await;
        match session.state() {
            state @ (SessionState::Recording | SessionState::Stopping) => {
                return Err(RecorderError::invalid_state("start_recording", state));
            }
            SessionState::Stopped | SessionState::Disposed => {
                tracing::debug!("Replacing finished session {}", session.id());
                *session = self.fresh_session();
            }
            SessionState::Idle => {}
        }

        session.start(surface, sources).await?;
        Ok(session.id())
    }

    /// Stop the current recording and return its artifact
    pub async fn stop_recording(&self) -> RecorderResult<Artifact> {
        let mut session = self.session.lock().await;
        session.stop().await?;
        session.finalize().await
    }

    /// Artifact of the current session's buffered chunks
    pub async fn artifact(&self) -> RecorderResult<Artifact> {
        self.session.lock().await.finalize().await
    }

    /// Artifact plus a file name suitable for saving it
    pub async fn download(&self, stem: &str) -> RecorderResult<(String, Artifact)> {
        let artifact = self.artifact().await?;
        let file_name = artifact.file_name(stem);
        tracing::info!("Prepared {} ({} bytes)", file_name, artifact.len());
        Ok((file_name, artifact))
    }

    pub async fn final_artifact(&self) -> Option<Artifact> {
        self.session.lock().await.final_artifact()
    }

    /// Why the current session ended on its own, if it did
    pub async fn termination(&self) -> Option<RecorderError> {
        self.session.lock().await.termination()
    }

    /// Dispose of a stopped session and its chunks
    pub async fn reset(&self) -> RecorderResult<()> {
        self.session.lock().await.reset().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::loopback::{self, container, LoopbackPlatform, LoopbackSurface};
    use std::time::Duration;

    fn recorder() -> (LoopbackPlatform, StudioRecorder) {
        let loopback = LoopbackPlatform::new(["video/webm"]);
        let recorder = StudioRecorder::new(RecorderConfig::default(), loopback.platform.clone());
        (loopback, recorder)
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_download_reset_cycle() {
        let (loopback, recorder) = recorder();
        let surface = Arc::new(LoopbackSurface::new(16, 9));

        let first = recorder
            .start_recording(surface.clone(), &[loopback::camera("camera")])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let artifact = recorder.stop_recording().await.unwrap();
        assert!(artifact.len() > 0);
        assert_eq!(recorder.state().await, SessionState::Stopped);

        let (file_name, downloaded) = recorder.download("take-1").await.unwrap();
        assert_eq!(file_name, "take-1.webm");
        assert_eq!(downloaded.bytes(), artifact.bytes());
        assert_eq!(
            recorder.final_artifact().await.unwrap().len(),
            artifact.len()
        );

        recorder.reset().await.unwrap();
        assert_eq!(recorder.state().await, SessionState::Disposed);
        assert!(recorder.final_artifact().await.is_none());

        let second = recorder
            .start_recording(surface, &[loopback::camera("camera")])
            .await
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(recorder.state().await, SessionState::Recording);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_live_session() {
        let (loopback, recorder) = recorder();
        let surface = Arc::new(LoopbackSurface::new(16, 9));

        recorder
            .start_recording(surface.clone(), &[loopback::camera("camera")])
            .await
            .unwrap();
        let result = recorder
            .start_recording(surface, &[loopback::camera("camera")])
            .await;
        assert!(matches!(
            result,
            Err(RecorderError::InvalidState {
                operation: "start_recording",
                ..
            })
        ));
        assert_eq!(loopback.audio.live_contexts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_session_is_replaced_on_start() {
        let (loopback, recorder) = recorder();
        let surface = Arc::new(LoopbackSurface::new(16, 9));

        let first = recorder
            .start_recording(surface.clone(), &[loopback::camera("camera")])
            .await
            .unwrap();
        recorder.stop_recording().await.unwrap();

        let second = recorder
            .start_recording(surface, &[loopback::camera("camera")])
            .await
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(recorder.session_id().await, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reused_camera_keeps_listeners_bounded() {
        let (loopback, recorder) = recorder();
        let surface = Arc::new(LoopbackSurface::new(16, 9));
        let camera = loopback::camera("camera");
        let mic = camera.audio_tracks()[0].clone();

        for _ in 0..20 {
            recorder
                .start_recording(surface.clone(), &[camera.clone()])
                .await
                .unwrap();
            recorder.stop_recording().await.unwrap();
            assert!(mic.ended_listener_count() <= 1);
        }
        assert!(mic.is_live());
        assert_eq!(loopback.audio.live_contexts(), 0);
    }

    #[tokio::test]
    async fn test_stop_without_recording() {
        let (_loopback, recorder) = recorder();
        assert!(matches!(
            recorder.stop_recording().await,
            Err(RecorderError::InvalidState { .. })
        ));
        assert!(matches!(
            recorder.download("nothing").await,
            Err(RecorderError::InvalidState { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seekable_recorder_applies_finisher() {
        let loopback = LoopbackPlatform::new(["video/webm"]);
        let config = RecorderConfig {
            seekable: true,
            ..RecorderConfig::default()
        };
        let recorder = StudioRecorder::new(config, loopback.platform.clone())
            .with_finisher(Arc::new(loopback::SeekIndexFinisher));

        recorder
            .start_recording(
                Arc::new(LoopbackSurface::new(16, 9)),
                &[loopback::camera("camera")],
            )
            .await
            .unwrap();
        let artifact = recorder.stop_recording().await.unwrap();
        assert!(container::parse(artifact.bytes()).unwrap().has_index);
    }
}
