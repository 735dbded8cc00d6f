//! Commits buffered fragments into the running interpreter.
//!
//! Fragments are compiled and executed one at a time in arrival order. The
//! first failure stops the install; fragments already executed stay in
//! effect and later ones are discarded. The store is empty afterwards
//! whatever the outcome.

use std::fmt;

use crate::chunk_store::ChunkStore;
use crate::runtime::ScriptRuntime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFailure {
    CompileFailed,
    ExecuteFailed,
}

impl fmt::Display for UploadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadFailure::CompileFailed => f.write_str("failed to load"),
            UploadFailure::ExecuteFailed => f.write_str("failed to execute"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{reason} Lua code {fragment}: {message}")]
pub struct UploadError {
    pub reason: UploadFailure,
    /// Name of the fragment that failed.
    pub fragment: String,
    pub message: String,
    /// Fragments executed before the failure.
    pub executed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub fragments: usize,
    pub bytes: usize,
}

pub fn install_all(
    runtime: &ScriptRuntime,
    store: &mut ChunkStore,
) -> Result<InstallReport, UploadError> {
    let chunks = store.drain();
    let mut report = InstallReport::default();

    for chunk in &chunks {
        let failed = |reason, e: mlua::Error| UploadError {
            reason,
            fragment: chunk.name.clone(),
            message: e.to_string(),
            executed: report.fragments,
        };

        tracing::debug!(name = %chunk.name, bytes = chunk.len(), "loading Lua chunk");
        let unit = runtime
            .compile(&chunk.name, &chunk.payload)
            .map_err(|e| failed(UploadFailure::CompileFailed, e))?;
        unit.call::<()>(())
            .map_err(|e| failed(UploadFailure::ExecuteFailed, e))?;

        report.fragments += 1;
        report.bytes += chunk.len();
    }

    Ok(report)
}
