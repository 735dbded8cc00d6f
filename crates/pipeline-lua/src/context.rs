//! The per-packet record shared between the pipeline and the script runtime.
//!
//! Exactly one `PacketContext` exists per runtime. It lives in the Lua
//! state's app data so host functions called from scripts can reach it, and
//! it is overwritten at the start of every invocation.

use pipeline_core::{Action, ActionSink, PacketFields, ParsedKey, StatsHandle, StatsSink};

#[derive(Debug, Default)]
pub struct PacketContext {
    pub fields: PacketFields,
    /// Statistics handles recorded by the current invocation.
    pub stats: Vec<StatsHandle>,
    /// Actions emitted by the current invocation.
    pub actions: Vec<Action>,
}

impl PacketContext {
    /// Reset for a new packet.
    pub fn begin(&mut self, key: &ParsedKey) {
        self.fields = PacketFields::from_key(key);
        self.stats.clear();
        self.actions.clear();
    }

    /// Hand everything the invocation emitted to the caller's sinks.
    pub fn flush(&mut self, stats: &mut dyn StatsSink, actions: &mut dyn ActionSink) {
        for handle in self.stats.drain(..) {
            stats.record(handle);
        }
        for action in self.actions.drain(..) {
            actions.push(action);
        }
    }
}
