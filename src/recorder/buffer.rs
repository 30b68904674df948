//! Chunk buffer
//!
//! Append-only accumulator for the encoder's output during one session.
//! Insertion order is emission order. Chunks are reference counted, so a
//! snapshot is a cheap clone taken under a short read lock.

use crate::utils::error::{RecorderError, RecorderResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One immutable encoder output segment
pub type Chunk = Arc<[u8]>;

/// Append policy of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferState {
    /// Accepting appends
    Open,
    /// Stop requested; accepting chunks until the encoder reports it stopped
    Flushing,
    /// No further appends
    Closed,
}

impl fmt::Display for BufferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferState::Open => write!(f, "open"),
            BufferState::Flushing => write!(f, "flushing"),
            BufferState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug)]
struct BufferInner {
    chunks: Vec<Chunk>,
    byte_len: usize,
    state: BufferState,
}

/// Ordered, thread-safe chunk accumulator
#[derive(Debug)]
pub struct ChunkBuffer {
    format: String,
    inner: RwLock<BufferInner>,
}

impl ChunkBuffer {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            inner: RwLock::new(BufferInner {
                chunks: Vec::new(),
                byte_len: 0,
                state: BufferState::Open,
            }),
        }
    }

    /// Media type of the chunks
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Append a chunk
    ///
    /// Empty chunks are ignored (`Ok(false)`). Appends are accepted while
    /// open and while flushing, so late data and the flush chunk are kept.
    /// Once closed, appends fail with `BufferClosed`.
    pub fn append(&self, chunk: Chunk) -> RecorderResult<bool> {
        let mut inner = self.inner.write();
        if inner.state == BufferState::Closed {
            return Err(RecorderError::BufferClosed);
        }
        if chunk.is_empty() {
            return Ok(false);
        }

        inner.byte_len += chunk.len();
        inner.chunks.push(chunk);
        Ok(true)
    }

    /// Mark the encoder's final flush as in flight
    pub fn begin_flush(&self) {
        let mut inner = self.inner.write();
        if inner.state == BufferState::Open {
            inner.state = BufferState::Flushing;
        }
    }

    /// Reject every further append
    pub fn close(&self) {
        self.inner.write().state = BufferState::Closed;
    }

    /// Chunks accumulated so far, in append order
    pub fn snapshot(&self) -> Vec<Chunk> {
        self.inner.read().chunks.clone()
    }

    /// Drop every chunk
    ///
    /// Only valid once the buffer is closed, i.e. no session is appending.
    pub fn reset(&self) -> RecorderResult<()> {
        let mut inner = self.inner.write();
        if inner.state != BufferState::Closed {
            return Err(RecorderError::invalid_state("reset buffer", inner.state));
        }
        inner.chunks.clear();
        inner.byte_len = 0;
        Ok(())
    }

    pub fn state(&self) -> BufferState {
        self.inner.read().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == BufferState::Closed
    }

    /// Number of chunks
    pub fn len(&self) -> usize {
        self.inner.read().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes across all chunks
    pub fn byte_len(&self) -> usize {
        self.inner.read().byte_len
    }
}
