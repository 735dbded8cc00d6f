//! Forwarding actions and statistics handles emitted by a pipeline.
//!
//! The action machinery that executes these lives outside the pipeline; a
//! pipeline only accumulates them into the sinks it is handed per packet.

use serde::{Deserialize, Serialize};

/// One forwarding action, in the order it should be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Output { port: u32 },
    OutputInPort,
    OutputLocal,
    /// Send to the controller. `reason` is opaque to the datapath.
    Controller { reason: u8 },
    PushVlan,
    PopVlan,
    SetVlanVid { vid: u16 },
    SetVlanPcp { pcp: u8 },
    SetEthSrc { mac: [u8; 6] },
    SetEthDst { mac: [u8; 6] },
    SetIpDscp { dscp: u8 },
    SetPriority { priority: u32 },
}

/// Opaque handle naming a statistics entry the datapath should bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsHandle(pub u64);

/// Everything one packet produced: actions plus statistics handles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub actions: Vec<Action>,
    pub stats: Vec<StatsHandle>,
}

/// Receives actions in emission order.
pub trait ActionSink {
    fn push(&mut self, action: Action);
}

/// Receives statistics handles in emission order.
pub trait StatsSink {
    fn record(&mut self, handle: StatsHandle);
}

impl ActionSink for Vec<Action> {
    fn push(&mut self, action: Action) {
        Vec::push(self, action);
    }
}

impl StatsSink for Vec<StatsHandle> {
    fn record(&mut self, handle: StatsHandle) {
        self.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sinks_keep_order() {
        let mut actions: Vec<Action> = Vec::new();
        ActionSink::push(&mut actions, Action::PopVlan);
        ActionSink::push(&mut actions, Action::Output { port: 2 });
        assert_eq!(actions, vec![Action::PopVlan, Action::Output { port: 2 }]);

        let mut stats: Vec<StatsHandle> = Vec::new();
        stats.record(StatsHandle(7));
        stats.record(StatsHandle(1));
        assert_eq!(stats, vec![StatsHandle(7), StatsHandle(1)]);
    }

    #[test]
    fn actions_serialize_tagged() {
        let json = serde_json::to_string(&Action::Output { port: 4 }).unwrap();
        assert_eq!(json, r#"{"type":"output","port":4}"#);
        let json = serde_json::to_string(&Action::PopVlan).unwrap();
        assert_eq!(json, r#"{"type":"pop_vlan"}"#);
    }
}
