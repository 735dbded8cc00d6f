//! Chunk store. Buffers script fragments until the final one arrives.
//!
//! Fragments are kept strictly in arrival order. Names are diagnostic only:
//! two fragments with the same name are two separate program units.

use bytes::Bytes;

use pipeline_core::wire::FILENAME_LEN;

/// Longest fragment name kept, in bytes.
pub const MAX_NAME_LEN: usize = FILENAME_LEN - 1;

/// One buffered upload fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadChunk {
    pub name: String,
    pub payload: Bytes,
}

impl UploadChunk {
    pub fn new(name: &str, payload: Bytes) -> Self {
        Self {
            name: truncate_name(name).to_string(),
            payload,
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

fn truncate_name(name: &str) -> &str {
    let name = name.split('\0').next().unwrap_or("");
    if name.len() <= MAX_NAME_LEN {
        return name;
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Append-only buffer of fragments, flushed by the installer.
#[derive(Debug, Default)]
pub struct ChunkStore {
    chunks: Vec<UploadChunk>,
    bytes: usize,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer one fragment. Empty payloads are accepted but not stored.
    /// Returns whether a fragment was stored.
    pub fn append(&mut self, name: &str, payload: Bytes) -> bool {
        if payload.is_empty() {
            return false;
        }
        let chunk = UploadChunk::new(name, payload);
        self.bytes += chunk.len();
        tracing::debug!(
            name = %chunk.name,
            bytes = chunk.len(),
            digest = hex::encode(&blake3::hash(&chunk.payload).as_bytes()[..8]),
            "uploaded Lua chunk"
        );
        self.chunks.push(chunk);
        true
    }

    /// Take every fragment in arrival order, leaving the store empty.
    pub fn drain(&mut self) -> Vec<UploadChunk> {
        self.bytes = 0;
        std::mem::take(&mut self.chunks)
    }

    /// Discard everything buffered.
    pub fn reset(&mut self) {
        if !self.chunks.is_empty() {
            tracing::debug!(
                chunks = self.chunks.len(),
                bytes = self.bytes,
                "discarding buffered Lua chunks"
            );
        }
        self.chunks.clear();
        self.bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total payload bytes buffered.
    pub fn total_bytes(&self) -> usize {
        self.bytes
    }
}
