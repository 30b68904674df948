//! Artifact assembly
//!
//! Concatenates buffered chunks into one immutable media object. An optional
//! finishing pass (for example re-indexing the container for seeking) can be
//! installed; when it fails the raw concatenation is returned.

use super::buffer::Chunk;
use crate::utils::error::RecorderResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Finalized binary media object
#[derive(Debug, Clone)]
pub struct Artifact {
    bytes: Arc<[u8]>,
    media_type: String,
    chunk_count: usize,
    created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>, chunk_count: usize) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
            chunk_count,
            created_at: Utc::now(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Number of chunks the artifact was assembled from
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// File extension for the media type, without the dot
    pub fn extension(&self) -> &'static str {
        extension_for(&self.media_type)
    }

    /// Suggested download name, e.g. `recording.webm`
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.extension())
    }

    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            media_type: self.media_type.clone(),
            byte_len: self.len(),
            chunk_count: self.chunk_count,
            created_at: self.created_at,
        }
    }
}

/// Serializable description of an artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInfo {
    pub media_type: String,
    pub byte_len: usize,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Map a media type (parameters ignored) to a file extension
pub fn extension_for(media_type: &str) -> &'static str {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "video/webm" | "audio/webm" => "webm",
        "video/mp4" | "audio/mp4" => "mp4",
        "video/x-matroska" => "mkv",
        "video/ogg" | "audio/ogg" => "ogg",
        "video/quicktime" => "mov",
        "audio/wav" | "audio/wave" => "wav",
        _ => "bin",
    }
}

/// Optional post-processing applied to assembled artifacts
pub trait ArtifactFinisher: Send + Sync {
    fn name(&self) -> &str;

    fn finish(&self, artifact: &Artifact) -> RecorderResult<Artifact>;
}

/// Builds artifacts from chunk sequences
#[derive(Clone, Default)]
pub struct ArtifactAssembler {
    finisher: Option<Arc<dyn ArtifactFinisher>>,
}

impl ArtifactAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `finisher` on every assembled artifact
    pub fn with_finisher(finisher: Arc<dyn ArtifactFinisher>) -> Self {
        Self {
            finisher: Some(finisher),
        }
    }

    pub fn has_finisher(&self) -> bool {
        self.finisher.is_some()
    }

    /// Concatenate `chunks` in order into one artifact
    pub fn assemble(&self, chunks: &[Chunk], media_type: &str) -> Artifact {
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        let mut bytes = Vec::with_capacity(total);
        for chunk in chunks {
            bytes.extend_from_slice(chunk);
        }

        let artifact = Artifact::new(bytes, media_type, chunks.len());
        tracing::debug!(
            "Assembled {} chunks into {} bytes ({})",
            chunks.len(),
            artifact.len(),
            media_type
        );

        match &self.finisher {
            Some(finisher) => match finisher.finish(&artifact) {
                Ok(finished) => finished,
                Err(e) => {
                    tracing::warn!(
                        "Finishing pass '{}' failed, keeping raw artifact: {}",
                        finisher.name(),
                        e
                    );
                    artifact
                }
            },
            None => artifact,
        }
    }
}

impl std::fmt::Debug for ArtifactAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactAssembler")
            .field("finisher", &self.finisher.as_ref().map(|fin| fin.name().to_string()))
            .finish()
    }
}
