//! pipeline-core: wire format, packet field model, actions, configuration and
//! the pipeline registration interface. Every other crate depends on this one.

pub mod action;
pub mod config;
pub mod counters;
pub mod fields;
pub mod pipeline;
pub mod wire;

pub use action::{Action, ActionSink, StatsHandle, StatsSink, Verdict};
pub use counters::{CountersSnapshot, PipelineCounters, PipelineState};
pub use fields::{Field, FieldValue, PacketFields, ParsedKey};
pub use pipeline::{
    ConnectionId, ListenerResult, Pipeline, PipelineError, PipelineRegistry, ReplySink,
};
