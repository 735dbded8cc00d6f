use pipeline_core::wire::{OFPBRC_EPERM, OFPET_BAD_REQUEST};
use pipeline_core::{Action, ParsedKey};

use crate::*;

const MARKERS: &str = r#"
function process()
    if a_ran then actions.output(1) end
    if c_ran then actions.output(3) end
end
"#;

fn eperm(xid: u32) -> ErrorReply {
    ErrorReply {
        xid,
        err_type: OFPET_BAD_REQUEST,
        code: OFPBRC_EPERM,
    }
}

#[test]
fn store_is_empty_after_a_successful_final_fragment() {
    let mut h = Harness::ready();
    h.fragment("a.lua", "a_ran = true", true);
    h.fragment("b.lua", "b_ran = true", true);
    assert_eq!(h.pipeline.pending_chunks(), 2);
    h.fragment("c.lua", "c_ran = true", false);
    assert_eq!(h.pipeline.pending_chunks(), 0);
    assert!(h.replies.take().is_empty());
}

#[test]
fn compile_failure_halts_later_fragments() {
    let mut h = Harness::ready();
    h.fragment("a.lua", "a_ran = true", true);
    h.fragment("b.lua", "b_ran = = true", true);
    let last = h.fragment("c.lua", "c_ran = true", false);

    assert_eq!(h.replies.take(), vec![eperm(last)]);
    assert_eq!(h.pipeline.pending_chunks(), 0);

    assert!(h.install("markers.lua", MARKERS).is_empty());
    assert_eq!(h.packet(&ParsedKey::default()).actions, vec![Action::Output { port: 1 }]);

    let snap = h.counters.snapshot();
    assert_eq!(snap.install_failures, 1);
    assert_eq!(snap.installs, 1);
}

#[test]
fn execution_failure_is_reported_and_halts() {
    let mut h = Harness::ready();
    h.fragment("a.lua", "a_ran = true", true);
    h.fragment("b.lua", "error('refusing to load')", true);
    let last = h.fragment("c.lua", "c_ran = true", false);

    assert_eq!(h.replies.take(), vec![eperm(last)]);
    assert_eq!(h.pipeline.pending_chunks(), 0);
    assert!(h.install("markers.lua", MARKERS).is_empty());
    assert_eq!(h.packet(&ParsedKey::default()).actions, vec![Action::Output { port: 1 }]);
}

#[test]
fn empty_final_fragment_with_nothing_buffered_is_silent() {
    let mut h = Harness::ready();
    h.fragment("", "", false);
    assert!(h.replies.take().is_empty());
    let snap = h.counters.snapshot();
    assert_eq!(snap.installs, 0);
    assert_eq!(snap.install_failures, 0);
    assert_eq!(snap.chunks_received, 0);
}

#[test]
fn empty_final_fragment_commits_what_is_buffered() {
    let mut h = Harness::ready();
    h.fragment("a.lua", "function process() actions.output_local() end", true);
    h.fragment("", "", false);
    assert!(h.replies.take().is_empty());
    assert_eq!(h.packet(&ParsedKey::default()).actions, vec![Action::OutputLocal]);
}

#[test]
fn good_then_broken_keeps_the_good_entry_point() {
    let mut h = Harness::ready();
    h.fragment("A", "function process() actions.output(1) end", true);
    let b = h.fragment("B", "function process( actions.output(2) end", false);

    assert_eq!(h.replies.take(), vec![eperm(b)]);
    assert_eq!(h.pipeline.pending_chunks(), 0);
    assert_eq!(h.packet(&ParsedKey::default()).actions, vec![Action::Output { port: 1 }]);

    let snap = h.counters.snapshot();
    assert_eq!(snap.fragments_executed, 1);
    assert_eq!(snap.chunks_received, 2);
}

#[test]
fn same_name_fragments_each_run_in_arrival_order() {
    let mut h = Harness::ready();
    h.fragment("x.lua", "n = (n or 0) + 1", true);
    h.fragment("x.lua", "n = n * 10", true);
    h.fragment("x.lua", "n = n + 1", true);
    h.fragment("p.lua", "function process() actions.output(n) end", false);
    assert!(h.replies.take().is_empty());
    assert_eq!(h.packet(&ParsedKey::default()).actions, vec![Action::Output { port: 11 }]);
}

#[test]
fn later_upload_starts_with_an_empty_store() {
    let mut h = Harness::ready();
    h.fragment("bad.lua", "this is not lua", false);
    assert_eq!(h.replies.take().len(), 1);

    // nothing from the failed batch is replayed
    assert!(h.install("ok.lua", "function process() actions.pop_vlan() end").is_empty());
    assert_eq!(h.packet(&ParsedKey::default()).actions, vec![Action::PopVlan]);
}

#[test]
fn script_larger_than_32k_installs_as_one_fragment() {
    let mut h = Harness::ready();
    let mut source = String::from("function process() actions.output(7) end\n");
    while source.len() <= 33 * 1024 {
        source.push_str("local pad = 'padding padding padding padding'\n");
    }
    assert!(source.len() <= pipeline_core::wire::MAX_UPLOAD_DATA);

    assert!(h.install("big.lua", &source).is_empty());
    assert_eq!(h.packet(&ParsedKey::default()).actions, vec![Action::Output { port: 7 }]);
}
