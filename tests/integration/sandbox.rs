use bytes::Bytes;

use pipeline_core::{Action, ParsedKey};
use pipeline_lua::TableOp;

use crate::*;

#[test]
fn installed_code_cannot_reach_the_host() {
    let mut h = Harness::ready();
    for source in [
        "os.exit(1)",
        "io.open('/etc/passwd')",
        "require('os')",
        "load('return 1')()",
        "dofile('/etc/passwd')",
        "debug.getinfo(1)",
        "sandbox.process = nil",
    ] {
        assert_eq!(h.install("escape.lua", source).len(), 1, "{source} should fail");
    }
}

#[test]
fn fields_cannot_be_written_from_scripts() {
    let mut h = Harness::ready();
    assert!(h
        .install(
            "w.lua",
            r#"
            function process()
                local ok = pcall(function() fields.in_port = 99 end)
                if not ok then actions.output(fields.in_port) end
            end
            "#,
        )
        .is_empty());
    let key = ParsedKey {
        in_port: 4,
        ..Default::default()
    };
    assert_eq!(h.packet(&key).actions, vec![Action::Output { port: 4 }]);
}

#[test]
fn field_names_are_exposed_in_order() {
    let mut h = Harness::ready();
    assert!(h
        .install(
            "n.lua",
            r#"
            function process()
                for i, name in ipairs(field_names) do
                    if name == "tp_dst" then actions.output(i) end
                end
            end
            "#,
        )
        .is_empty());
    let position = pipeline_core::fields::field_names()
        .position(|n| n == "tp_dst")
        .unwrap() as u32
        + 1;
    assert_eq!(h.packet(&ParsedKey::default()).actions, vec![Action::Output { port: position }]);
}

#[test]
fn script_tables_feed_packet_decisions() {
    let mut h = Harness::ready();
    assert!(h
        .install(
            "t.lua",
            r#"
            local ports = {}
            register_table("port_map", {
                add = function(k, v) ports[tonumber(k)] = tonumber(v) end,
                modify = function(k, v) ports[tonumber(k)] = tonumber(v) + 100 end,
                delete = function(k) ports[tonumber(k)] = nil end,
            })
            function process()
                local out = ports[fields.in_port]
                if out then actions.output(out) end
            end
            "#,
        )
        .is_empty());
    assert_eq!(h.counters.snapshot().tables, vec!["port_map".to_string()]);

    let key = ParsedKey {
        in_port: 1,
        ..Default::default()
    };
    assert!(h.packet(&key).actions.is_empty());

    h.pipeline
        .apply_table_op(
            "port_map",
            TableOp::Add {
                key: Bytes::from_static(b"1"),
                value: Bytes::from_static(b"5"),
            },
        )
        .unwrap();
    assert_eq!(h.packet(&key).actions, vec![Action::Output { port: 5 }]);

    h.pipeline
        .apply_table_op(
            "port_map",
            TableOp::Modify {
                key: Bytes::from_static(b"1"),
                value: Bytes::from_static(b"6"),
            },
        )
        .unwrap();
    assert_eq!(h.packet(&key).actions, vec![Action::Output { port: 106 }]);

    h.pipeline
        .apply_table_op(
            "port_map",
            TableOp::Delete {
                key: Bytes::from_static(b"1"),
            },
        )
        .unwrap();
    assert!(h.packet(&key).actions.is_empty());
}
