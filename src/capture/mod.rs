//! Capture layer
//!
//! Live tracks, the device sources that carry them, and the two capture
//! stages of the pipeline: the audio mix graph and the surface tap.

pub mod mixer;
pub mod source;
pub mod surface;
pub mod track;
pub mod traits;

pub use mixer::AudioMixGraph;
pub use source::{DeviceSource, SourceKind};
pub use surface::SurfaceTap;
pub use track::{AudioBuffer, MediaPacket, Track, TrackId, TrackKind, VideoFrame};
pub use traits::{AudioBackend, AudioContext, AudioContextOptions, RenderSurface};
