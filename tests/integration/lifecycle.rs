use std::sync::Arc;

use pipeline_core::wire::{OFPBRC_EPERM, OFPET_BAD_REQUEST};
use pipeline_core::{Action, ParsedKey, Pipeline, PipelineCounters, PipelineError, PipelineState};
use pipeline_lua::builtin::Builtin;
use pipeline_lua::LuaPipeline;

use crate::*;

#[test]
fn redefinition_keeps_runtime_state() {
    let mut h = Harness::ready();
    assert!(h
        .install(
            "v1.lua",
            "count = 0\nfunction process() count = count + 1 actions.output(count) end",
        )
        .is_empty());
    assert_eq!(h.packet(&ParsedKey::default()).actions, vec![Action::Output { port: 1 }]);
    assert_eq!(h.packet(&ParsedKey::default()).actions, vec![Action::Output { port: 2 }]);

    assert!(h
        .install(
            "v2.lua",
            "function process() count = count + 10 actions.output(count) end",
        )
        .is_empty());
    assert_eq!(h.packet(&ParsedKey::default()).actions, vec![Action::Output { port: 12 }]);
}

#[test]
fn builtin_failure_is_fatal() {
    static BROKEN: &[Builtin] = &[
        Builtin {
            name: "first.lua",
            source: "function process() end",
        },
        Builtin {
            name: "second.lua",
            source: "local x = nil; x.y = 1",
        },
    ];

    let counters = Arc::new(PipelineCounters::default());
    let mut pipeline = LuaPipeline::with_builtins(counters.clone(), BROKEN);
    match pipeline.init(PIPELINE_NAME) {
        Err(PipelineError::Fatal(msg)) => assert!(msg.contains("second.lua"), "{msg}"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(pipeline.state(), PipelineState::Uninitialized);
    assert_eq!(counters.state(), PipelineState::Uninitialized);

    let mut replies = RecordingReplies::default();
    let frame = wire::encode_lua_upload(5, 0, "a.lua", b"x = 1").unwrap();
    let msg = wire::decode(frame).unwrap();
    pipeline.handle_message(CXN, &msg, &mut replies);
    assert_eq!(
        replies.take(),
        vec![ErrorReply {
            xid: 5,
            err_type: OFPET_BAD_REQUEST,
            code: OFPBRC_EPERM
        }]
    );
}

#[test]
fn finish_stops_the_pipeline() {
    let mut h = Harness::ready();
    assert!(h
        .install("p.lua", "function process() actions.output(1) end")
        .is_empty());
    h.fragment("pending.lua", "x = 1", true);

    h.pipeline.finish();
    assert_eq!(h.pipeline.state(), PipelineState::Stopped);
    assert_eq!(h.counters.state(), PipelineState::Stopped);
    assert_eq!(h.pipeline.pending_chunks(), 0);

    // packets are still accepted but nothing runs
    assert!(h.packet(&ParsedKey::default()).actions.is_empty());

    let last = h.fragment("late.lua", "x = 2", false);
    assert_eq!(
        h.replies.take(),
        vec![ErrorReply {
            xid: last,
            err_type: OFPET_BAD_REQUEST,
            code: OFPBRC_EPERM
        }]
    );

    assert!(matches!(h.pipeline.init(PIPELINE_NAME), Err(PipelineError::Fatal(_))));
}

#[test]
fn non_upload_messages_pass_through() {
    let mut h = Harness::ready();
    for frame in [
        wire::encode_barrier_request(1),
        wire::encode_echo_request(2, b"ping").unwrap(),
    ] {
        let msg = wire::decode(frame).unwrap();
        assert_eq!(
            h.pipeline.handle_message(CXN, &msg, &mut h.replies),
            ListenerResult::Pass
        );
    }
    assert!(h.replies.take().is_empty());
}
