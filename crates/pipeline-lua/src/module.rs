//! The `lua` pipeline: ties the runtime, the upload store and the installer
//! to the daemon's pipeline interface.

use std::sync::Arc;

use pipeline_core::wire::{LuaUpload, Message, MessageBody, OFPBRC_EPERM, OFPET_BAD_REQUEST};
use pipeline_core::{
    ActionSink, ConnectionId, ListenerResult, ParsedKey, Pipeline, PipelineCounters,
    PipelineError, PipelineState, ReplySink, StatsSink,
};

use crate::builtin::{Builtin, BUILTINS};
use crate::chunk_store::ChunkStore;
use crate::installer;
use crate::invoke::{self, Outcome};
use crate::runtime::ScriptRuntime;
use crate::tables::{TableError, TableOp};

pub const PIPELINE_NAME: &str = "lua";

pub struct LuaPipeline {
    state: PipelineState,
    runtime: Option<ScriptRuntime>,
    uploads: ChunkStore,
    counters: Arc<PipelineCounters>,
    builtins: &'static [Builtin],
}

impl LuaPipeline {
    pub fn new(counters: Arc<PipelineCounters>) -> Self {
        Self::with_builtins(counters, BUILTINS)
    }

    pub fn with_builtins(counters: Arc<PipelineCounters>, builtins: &'static [Builtin]) -> Self {
        counters.set_state(PipelineState::Uninitialized);
        Self {
            state: PipelineState::Uninitialized,
            runtime: None,
            uploads: ChunkStore::new(),
            counters,
            builtins,
        }
    }

    /// Registry constructor.
    pub fn create(counters: Arc<PipelineCounters>) -> Box<dyn Pipeline> {
        Box::new(Self::new(counters))
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Fragments buffered and not yet committed.
    pub fn pending_chunks(&self) -> usize {
        self.uploads.len()
    }

    pub fn apply_table_op(&mut self, table: &str, op: TableOp) -> Result<(), TableError> {
        match &self.runtime {
            Some(runtime) => runtime.apply_table_op(table, op),
            None => Err(TableError::UnknownTable(table.to_string())),
        }
    }

    fn set_state(&mut self, state: PipelineState) {
        self.state = state;
        self.counters.set_state(state);
    }

    fn handle_upload(
        &mut self,
        cxn: ConnectionId,
        msg: &Message,
        upload: &LuaUpload,
        replies: &mut dyn ReplySink,
    ) {
        if self.uploads.append(&upload.filename, upload.data.clone()) {
            self.counters.chunk_received();
        }
        if !upload.has_more() {
            self.commit(cxn, msg, replies);
        }
    }

    fn commit(&mut self, cxn: ConnectionId, msg: &Message, replies: &mut dyn ReplySink) {
        let Some(runtime) = self.runtime.as_ref() else {
            tracing::error!(%cxn, state = ?self.state, "Lua upload committed while pipeline is not running");
            self.uploads.reset();
            replies.send_error_reply(cxn, msg, OFPET_BAD_REQUEST, OFPBRC_EPERM);
            return;
        };
        if self.uploads.is_empty() {
            tracing::debug!(%cxn, "empty Lua upload");
            return;
        }

        match installer::install_all(runtime, &mut self.uploads) {
            Ok(report) => {
                tracing::info!(
                    %cxn,
                    fragments = report.fragments,
                    bytes = report.bytes,
                    used_memory = runtime.used_memory(),
                    "installed Lua upload"
                );
                self.counters.install(report.fragments, true);
            }
            Err(e) => {
                tracing::error!(
                    %cxn,
                    fragment = %e.fragment,
                    executed = e.executed,
                    "{}",
                    e
                );
                self.counters.install(e.executed, false);
                replies.send_error_reply(cxn, msg, OFPET_BAD_REQUEST, OFPBRC_EPERM);
            }
        }
        self.counters.set_tables(runtime.table_names());
    }
}

impl Pipeline for LuaPipeline {
    fn init(&mut self, name: &str) -> Result<(), PipelineError> {
        if self.state != PipelineState::Uninitialized {
            return Err(PipelineError::Fatal(format!(
                "pipeline {name} cannot be initialised from state {:?}",
                self.state
            )));
        }
        match ScriptRuntime::start(self.builtins) {
            Ok(runtime) => {
                self.runtime = Some(runtime);
                self.set_state(PipelineState::Ready);
                tracing::info!(pipeline = name, "pipeline ready");
                Ok(())
            }
            Err(e) => {
                tracing::error!(pipeline = name, error = %e, "failed to start Lua runtime");
                Err(PipelineError::Fatal(e.to_string()))
            }
        }
    }

    fn finish(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.stop();
        }
        self.uploads.reset();
        self.set_state(PipelineState::Stopped);
    }

    fn process(
        &mut self,
        key: &ParsedKey,
        stats: &mut dyn StatsSink,
        actions: &mut dyn ActionSink,
    ) -> Result<(), PipelineError> {
        self.counters.packet();
        match &self.runtime {
            Some(runtime) => {
                if invoke::invoke(runtime, key, stats, actions) == Outcome::Faulted {
                    self.counters.fault();
                }
            }
            None => tracing::trace!(state = ?self.state, "packet while pipeline is not running"),
        }
        Ok(())
    }

    fn handle_message(
        &mut self,
        cxn: ConnectionId,
        msg: &Message,
        replies: &mut dyn ReplySink,
    ) -> ListenerResult {
        match &msg.body {
            MessageBody::LuaUpload(upload) => {
                self.handle_upload(cxn, msg, upload, replies);
                ListenerResult::Drop
            }
            _ => ListenerResult::Pass,
        }
    }
}
