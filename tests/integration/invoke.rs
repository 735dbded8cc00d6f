use std::net::Ipv4Addr;

use pipeline_core::fields::{Ipv4Key, TransportKey, VlanKey};
use pipeline_core::{Action, ParsedKey, StatsHandle};

use crate::*;

#[test]
fn faulting_entry_point_does_not_block_the_next_call() {
    let mut h = Harness::ready();
    assert!(h
        .install(
            "f.lua",
            r#"
            function process()
                if fields.in_port == 13 then
                    error("unlucky port")
                end
                actions.output(fields.in_port)
            end
            "#,
        )
        .is_empty());

    let bad = ParsedKey {
        in_port: 13,
        ..Default::default()
    };
    let good = ParsedKey {
        in_port: 2,
        ..Default::default()
    };

    assert!(h.packet(&bad).actions.is_empty());
    assert_eq!(h.packet(&good).actions, vec![Action::Output { port: 2 }]);
    assert!(h.packet(&bad).actions.is_empty());
    assert_eq!(h.packet(&good).actions, vec![Action::Output { port: 2 }]);

    let snap = h.counters.snapshot();
    assert_eq!(snap.packets, 4);
    assert_eq!(snap.faults, 2);
}

#[test]
fn each_invocation_sees_only_its_own_fields() {
    let mut h = Harness::ready();
    assert!(h
        .install(
            "echo.lua",
            r#"
            function process()
                actions.output(fields.in_port)
                stats.add(fields.tp_dst)
                stats.add(fields.ipv4_src)
                if fields.vlan_vid ~= 0 then
                    actions.set_vlan_vid(fields.vlan_vid)
                end
            end
            "#,
        )
        .is_empty());

    for i in 0..1000u32 {
        let with_l3 = i % 2 == 0;
        let key = ParsedKey {
            in_port: i,
            vlan: (i % 3 == 0).then_some(VlanKey { vid: (i % 4000) as u16, pcp: 0 }),
            ipv4: with_l3.then(|| Ipv4Key {
                src: Ipv4Addr::from(0x0a00_0000 + i),
                dst: Ipv4Addr::LOCALHOST,
                proto: 6,
                tos: 0,
            }),
            transport: with_l3.then_some(TransportKey {
                src: 1024,
                dst: i as u16,
                tcp_flags: 0,
            }),
            ..Default::default()
        };

        let verdict = h.packet(&key);
        let expected_src = if with_l3 { 0x0a00_0000 + i as u64 } else { 0 };
        let expected_dst = if with_l3 { i as u64 } else { 0 };
        assert_eq!(
            verdict.stats,
            vec![StatsHandle(expected_dst), StatsHandle(expected_src)],
            "packet {i}"
        );
        assert_eq!(verdict.actions[0], Action::Output { port: i }, "packet {i}");
        if i % 3 == 0 {
            // the present bit is set alongside the VID
            let vid = match verdict.actions.get(1) {
                Some(Action::SetVlanVid { vid }) => *vid,
                other => panic!("packet {i}: {other:?}"),
            };
            assert_eq!(vid & 0x0fff, (i % 4000) as u16);
        } else {
            assert_eq!(verdict.actions.len(), 1, "packet {i}");
        }
    }

    assert_eq!(h.counters.snapshot().faults, 0);
}

#[test]
fn verdict_round_trips_as_json() {
    let mut h = Harness::ready();
    assert!(h
        .install(
            "j.lua",
            "function process() actions.set_eth_dst(mac('02:00:00:00:00:01')) actions.controller(2) end",
        )
        .is_empty());
    let verdict = h.packet(&ParsedKey::default());
    let json = serde_json::to_value(&verdict).unwrap();
    assert_eq!(json["actions"][0]["type"], "set_eth_dst");
    assert_eq!(json["actions"][1]["type"], "controller");
    assert_eq!(json["actions"][1]["reason"], 2);
}
