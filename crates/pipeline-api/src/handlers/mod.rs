//! HTTP API handlers. Exposes pipeline state as JSON.

mod status;

pub use status::{handle_status, StatusResponse};

use std::sync::Arc;
use std::time::Instant;

use pipeline_core::PipelineCounters;

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: String,
    pub counters: Arc<PipelineCounters>,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(pipeline: impl Into<String>, counters: Arc<PipelineCounters>) -> Self {
        Self {
            pipeline: pipeline.into(),
            counters,
            started_at: Instant::now(),
        }
    }
}
