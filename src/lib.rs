//! studio-capture - record a composited studio surface with mixed audio.
//!
//! This is the main library crate. It provides the capture stages, the
//! recording session and the platform seams, plus a headless entry point
//! that records from the in-process loopback platform.

pub mod capture;
pub mod config;
pub mod platform;
pub mod recorder;
pub mod utils;

use anyhow::Context;
use capture::MediaPacket;
use config::RecorderConfig;
use platform::loopback::{self, LoopbackPlatform, LoopbackSurface, SeekIndexFinisher};
use recorder::StudioRecorder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Length of the headless demo recording
const DEMO_STEPS: u32 = 30;
const DEMO_STEP: Duration = Duration::from_millis(100);

/// Initialize tracing/logging
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studio_capture=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Record a short loopback session
///
/// Arguments: `[config.json] [output-dir]`. The artifact is written to
/// `output-dir` when one is given.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();
    tracing::info!("Starting studio-capture v{}", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => RecorderConfig::load(Path::new(&path))
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => RecorderConfig::default(),
    };
    let output_dir = args.next().map(PathBuf::from);
    config.validate()?;

    let loopback = LoopbackPlatform::new(config.preferred_formats.clone());
    let recorder = StudioRecorder::new(config.clone(), loopback.platform.clone())
        .with_finisher(Arc::new(SeekIndexFinisher));

    let surface = Arc::new(LoopbackSurface::new(64, 36));
    let camera = loopback::camera("camera");
    let mic = camera
        .audio_tracks()
        .first()
        .cloned()
        .context("Loopback camera has no microphone track")?;

    let session_id = recorder
        .start_recording(surface.clone(), &[camera.clone()])
        .await?;
    tracing::info!("Recording session {}", session_id);

    let mut ticker = tokio::time::interval(DEMO_STEP);
    for step in 0..DEMO_STEPS {
        ticker.tick().await;
        let at_ms = (step as u64 * DEMO_STEP.as_millis() as u64) as f64;
        mic.push(MediaPacket::Audio(loopback::tone(
            config.sample_rate,
            config.channels,
            DEMO_STEP.as_millis() as u32,
            440.0,
            at_ms,
        )));
        let shade = (step * 255 / DEMO_STEPS) as u8;
        surface.fill([shade, 64, 255 - shade, 255]);
    }

    recorder.stop_recording().await?;
    let (file_name, artifact) = recorder.download("studio-recording").await?;
    tracing::info!(
        "Recorded {}: {} bytes in {} chunks ({})",
        file_name,
        artifact.len(),
        artifact.chunk_count(),
        artifact.media_type()
    );
    tracing::debug!("{}", serde_json::to_string(&recorder.summary().await)?);

    if let Some(dir) = output_dir {
        let path = dir.join(&file_name);
        tokio::fs::write(&path, artifact.bytes())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Saved {}", path.display());
    }

    Ok(())
}
