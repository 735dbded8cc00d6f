//! pipeline integration test harness.
//!
//! Each test drives a real `lua` pipeline in-process the way the daemon's
//! dispatch thread does: control messages are wire-encoded, decoded and
//! offered to the pipeline; packets go through `process` with fresh sinks.

use std::sync::Arc;

use bytes::Bytes;

use pipeline_core::wire::{self, Message, LUA_UPLOAD_MORE};
use pipeline_core::{
    ConnectionId, ListenerResult, ParsedKey, Pipeline, PipelineCounters, ReplySink, Verdict,
};
use pipeline_lua::{LuaPipeline, PIPELINE_NAME};

mod invoke;
mod lifecycle;
mod sandbox;
mod upload;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const CXN: ConnectionId = ConnectionId(1);

/// An error reply the pipeline sent, decoded back off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReply {
    pub xid: u32,
    pub err_type: u16,
    pub code: u16,
}

#[derive(Default)]
pub struct RecordingReplies {
    pub frames: Vec<Bytes>,
}

impl ReplySink for RecordingReplies {
    fn send_error_reply(&mut self, _cxn: ConnectionId, request: &Message, err_type: u16, code: u16) {
        self.frames.push(wire::encode_error(request, err_type, code));
    }
}

impl RecordingReplies {
    pub fn take(&mut self) -> Vec<ErrorReply> {
        self.frames
            .drain(..)
            .map(|frame| {
                let msg = wire::decode(frame).expect("reply decodes");
                match msg.body {
                    wire::MessageBody::Error { err_type, code, .. } => ErrorReply {
                        xid: msg.xid,
                        err_type,
                        code,
                    },
                    other => panic!("unexpected reply {other:?}"),
                }
            })
            .collect()
    }
}

pub struct Harness {
    pub pipeline: LuaPipeline,
    pub counters: Arc<PipelineCounters>,
    pub replies: RecordingReplies,
    next_xid: u32,
}

impl Harness {
    /// A pipeline that has completed `init`.
    pub fn ready() -> Self {
        let counters = Arc::new(PipelineCounters::default());
        let mut pipeline = LuaPipeline::new(counters.clone());
        pipeline.init(PIPELINE_NAME).expect("pipeline starts");
        Self {
            pipeline,
            counters,
            replies: RecordingReplies::default(),
            next_xid: 1,
        }
    }

    /// Send one upload fragment; returns its xid.
    pub fn fragment(&mut self, name: &str, source: &str, more: bool) -> u32 {
        let xid = self.next_xid;
        self.next_xid += 1;
        let flags = if more { LUA_UPLOAD_MORE } else { 0 };
        let frame = wire::encode_lua_upload(xid, flags, name, source.as_bytes()).expect("encodes");
        let msg = wire::decode(frame).expect("decodes");
        let result = self.pipeline.handle_message(CXN, &msg, &mut self.replies);
        assert_eq!(result, ListenerResult::Drop);
        xid
    }

    /// Upload `source` as a single final fragment.
    pub fn install(&mut self, name: &str, source: &str) -> Vec<ErrorReply> {
        self.fragment(name, source, false);
        self.replies.take()
    }

    pub fn packet(&mut self, key: &ParsedKey) -> Verdict {
        let mut verdict = Verdict::default();
        self.pipeline
            .process(key, &mut verdict.stats, &mut verdict.actions)
            .expect("process never fails");
        verdict
    }
}
