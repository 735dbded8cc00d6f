//! Counters a pipeline publishes for the status endpoint.
//!
//! Written from the dispatch thread, read from the API task; everything is
//! an atomic or behind a short-lived lock.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Lifecycle of a pipeline's script runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PipelineState {
    Uninitialized = 0,
    Ready = 1,
    Stopped = 2,
}

impl From<u8> for PipelineState {
    fn from(v: u8) -> Self {
        match v {
            1 => PipelineState::Ready,
            2 => PipelineState::Stopped,
            _ => PipelineState::Uninitialized,
        }
    }
}

#[derive(Debug, Default)]
pub struct PipelineCounters {
    state: AtomicU8,
    packets: AtomicU64,
    faults: AtomicU64,
    chunks_received: AtomicU64,
    installs: AtomicU64,
    install_failures: AtomicU64,
    fragments_executed: AtomicU64,
    tables: RwLock<Vec<String>>,
}

/// Point-in-time copy of [`PipelineCounters`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersSnapshot {
    pub state: PipelineState,
    pub packets: u64,
    pub faults: u64,
    pub chunks_received: u64,
    pub installs: u64,
    pub install_failures: u64,
    pub fragments_executed: u64,
    pub tables: Vec<String>,
}

impl PipelineCounters {
    pub fn set_state(&self, state: PipelineState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from(self.state.load(Ordering::Relaxed))
    }

    pub fn packet(&self) {
        self.packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_received(&self) {
        self.chunks_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one install attempt.
    pub fn install(&self, executed: usize, ok: bool) {
        self.fragments_executed
            .fetch_add(executed as u64, Ordering::Relaxed);
        if ok {
            self.installs.fetch_add(1, Ordering::Relaxed);
        } else {
            self.install_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_tables(&self, names: Vec<String>) {
        if let Ok(mut tables) = self.tables.write() {
            *tables = names;
        }
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            state: self.state(),
            packets: self.packets.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            installs: self.installs.load(Ordering::Relaxed),
            install_failures: self.install_failures.load(Ordering::Relaxed),
            fragments_executed: self.fragments_executed.load(Ordering::Relaxed),
            tables: self
                .tables
                .read()
                .map(|t| t.clone())
                .unwrap_or_default(),
        }
    }
}
