//! Pipeline registration interface.
//!
//! A pipeline module registers a constructor under a fixed name. The daemon
//! instantiates the configured pipeline once and drives it from a single
//! dispatch thread: `init`, then any interleaving of `process` and
//! `handle_message`, then `finish`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::action::{ActionSink, StatsSink};
use crate::counters::PipelineCounters;
use crate::fields::ParsedKey;
use crate::wire::Message;

/// Identifies one control-channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cxn-{}", self.0)
    }
}

/// Whether a message listener consumed a control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerResult {
    /// Not ours; offer it to the next handler.
    Pass,
    /// Handled; stop here.
    Drop,
}

/// Where a pipeline sends replies to control-channel requesters.
pub trait ReplySink {
    /// Send an `OFPT_ERROR` referencing `request` back over `cxn`.
    fn send_error_reply(&mut self, cxn: ConnectionId, request: &Message, err_type: u16, code: u16);
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The pipeline cannot run. The process must not continue with it.
    #[error("fatal pipeline error: {0}")]
    Fatal(String),

    #[error("no pipeline registered under {0:?}")]
    Unknown(String),
}

/// Operations every pipeline module provides.
pub trait Pipeline {
    fn init(&mut self, name: &str) -> Result<(), PipelineError>;

    fn finish(&mut self);

    /// Run one packet. Implementations decide whether script faults are
    /// errors; the Lua pipeline never returns one.
    fn process(
        &mut self,
        key: &ParsedKey,
        stats: &mut dyn StatsSink,
        actions: &mut dyn ActionSink,
    ) -> Result<(), PipelineError>;

    /// Offered every control message before the daemon's own handling.
    fn handle_message(
        &mut self,
        _cxn: ConnectionId,
        _msg: &Message,
        _replies: &mut dyn ReplySink,
    ) -> ListenerResult {
        ListenerResult::Pass
    }
}

pub type PipelineConstructor = fn(Arc<PipelineCounters>) -> Box<dyn Pipeline>;

/// Name → constructor table.
#[derive(Default)]
pub struct PipelineRegistry {
    constructors: BTreeMap<&'static str, PipelineConstructor>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor. A later registration under the same name wins.
    pub fn register(&mut self, name: &'static str, ctor: PipelineConstructor) {
        self.constructors.insert(name, ctor);
    }

    pub fn create(
        &self,
        name: &str,
        counters: Arc<PipelineCounters>,
    ) -> Result<Box<dyn Pipeline>, PipelineError> {
        self.constructors
            .get(name)
            .map(|ctor| ctor(counters))
            .ok_or_else(|| PipelineError::Unknown(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }
}
