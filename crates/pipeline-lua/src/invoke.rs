//! Per-packet entry from the forwarding path into the script.

use pipeline_core::{ActionSink, ParsedKey, StatsSink};

use crate::runtime::ScriptRuntime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// The script raised an error. It has been logged; the packet keeps
    /// whatever actions were emitted before the error.
    Faulted,
}

pub fn invoke(
    runtime: &ScriptRuntime,
    key: &ParsedKey,
    stats: &mut dyn StatsSink,
    actions: &mut dyn ActionSink,
) -> Outcome {
    match runtime.invoke(key, stats, actions) {
        Ok(()) => Outcome::Completed,
        Err(fault) => {
            tracing::error!(in_port = key.in_port, error = %fault, "failed to execute script");
            Outcome::Faulted
        }
    }
}
