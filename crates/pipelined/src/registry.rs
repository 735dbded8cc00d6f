//! Pipelines compiled into this daemon.

use pipeline_core::PipelineRegistry;
use pipeline_lua::{LuaPipeline, PIPELINE_NAME};

pub fn builtin() -> PipelineRegistry {
    let mut registry = PipelineRegistry::new();
    registry.register(PIPELINE_NAME, LuaPipeline::create);
    registry
}
