//! The restricted environment every installed chunk runs in.
//!
//! Installed code sees only what is placed in this table: a whitelist of
//! pure standard functions, private copies of the `string`, `table`, `math`
//! and `utf8` libraries, and the host primitives below. Built-in scripts run
//! in the full global environment and may add more entries.
//!
//! | name             | purpose                                      |
//! |------------------|----------------------------------------------|
//! | `field_names`    | ordered list of readable field names         |
//! | `fields`         | read-only view of the current packet         |
//! | `actions`        | forwarding actions for the current packet    |
//! | `stats`          | statistics handles for the current packet    |
//! | `log(msg)`       | debug-level log line                         |
//! | `register_table` | declare a lookup table fed by the pipeline   |

use mlua::{Lua, MetaMethod, Table, UserData, UserDataMethods, Value};

use pipeline_core::fields::{field_names, u64_to_mac, Field, FieldValue};
use pipeline_core::{Action, StatsHandle};

use crate::context::PacketContext;
use crate::tables;

const SAFE_GLOBALS: &[&str] = &[
    "assert",
    "error",
    "ipairs",
    "next",
    "pairs",
    "pcall",
    "rawequal",
    "rawget",
    "rawlen",
    "rawset",
    "select",
    "setmetatable",
    "tonumber",
    "tostring",
    "type",
    "xpcall",
];

const SAFE_LIBRARIES: &[&str] = &["string", "table", "math", "utf8"];

/// Log target for lines emitted by scripts.
pub const SCRIPT_LOG_TARGET: &str = "pipeline_lua::script";

/// Build the sandbox table. Must run before any script is loaded.
pub fn build(lua: &Lua) -> mlua::Result<Table> {
    let globals = lua.globals();
    let sandbox = lua.create_table()?;

    for &name in SAFE_GLOBALS {
        sandbox.set(name, globals.get::<Value>(name)?)?;
    }
    for &name in SAFE_LIBRARIES {
        let lib: Table = globals.get(name)?;
        let copy = lua.create_table()?;
        for pair in lib.pairs::<Value, Value>() {
            let (k, v) = pair?;
            copy.set(k, v)?;
        }
        sandbox.set(name, copy)?;
    }

    sandbox.set("field_names", lua.create_sequence_from(field_names())?)?;
    sandbox.set("fields", lua.create_userdata(FieldsView)?)?;
    sandbox.set("actions", actions_table(lua)?)?;
    sandbox.set("stats", stats_table(lua)?)?;
    sandbox.set("log", lua.create_function(script_log)?)?;
    sandbox.set(
        "register_table",
        lua.create_function(|lua, (name, ops): (String, Table)| tables::register(lua, name, ops))?,
    )?;

    Ok(sandbox)
}

fn script_log(_: &Lua, msg: Value) -> mlua::Result<()> {
    let text = match msg {
        Value::String(s) => s.to_string_lossy().to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Nil => String::new(),
        other => other.type_name().to_string(),
    };
    tracing::debug!(target: SCRIPT_LOG_TARGET, "{}", text);
    Ok(())
}

fn context_error() -> mlua::Error {
    mlua::Error::runtime("packet context unavailable")
}

fn push_action(lua: &Lua, action: Action) -> mlua::Result<()> {
    let mut ctx = lua.app_data_mut::<PacketContext>().ok_or_else(context_error)?;
    ctx.actions.push(action);
    Ok(())
}

fn actions_table(lua: &Lua) -> mlua::Result<Table> {
    let t = lua.create_table()?;
    t.set(
        "output",
        lua.create_function(|lua, port: u32| push_action(lua, Action::Output { port }))?,
    )?;
    t.set(
        "output_in_port",
        lua.create_function(|lua, ()| push_action(lua, Action::OutputInPort))?,
    )?;
    t.set(
        "output_local",
        lua.create_function(|lua, ()| push_action(lua, Action::OutputLocal))?,
    )?;
    t.set(
        "controller",
        lua.create_function(|lua, reason: Option<u8>| {
            push_action(
                lua,
                Action::Controller {
                    reason: reason.unwrap_or(0),
                },
            )
        })?,
    )?;
    t.set(
        "push_vlan",
        lua.create_function(|lua, ()| push_action(lua, Action::PushVlan))?,
    )?;
    t.set(
        "pop_vlan",
        lua.create_function(|lua, ()| push_action(lua, Action::PopVlan))?,
    )?;
    t.set(
        "set_vlan_vid",
        lua.create_function(|lua, vid: u16| push_action(lua, Action::SetVlanVid { vid }))?,
    )?;
    t.set(
        "set_vlan_pcp",
        lua.create_function(|lua, pcp: u8| push_action(lua, Action::SetVlanPcp { pcp }))?,
    )?;
    t.set(
        "set_eth_src",
        lua.create_function(|lua, mac: u64| {
            push_action(lua, Action::SetEthSrc { mac: u64_to_mac(mac) })
        })?,
    )?;
    t.set(
        "set_eth_dst",
        lua.create_function(|lua, mac: u64| {
            push_action(lua, Action::SetEthDst { mac: u64_to_mac(mac) })
        })?,
    )?;
    t.set(
        "set_ip_dscp",
        lua.create_function(|lua, dscp: u8| push_action(lua, Action::SetIpDscp { dscp }))?,
    )?;
    t.set(
        "set_priority",
        lua.create_function(|lua, priority: u32| {
            push_action(lua, Action::SetPriority { priority })
        })?,
    )?;
    Ok(t)
}

fn stats_table(lua: &Lua) -> mlua::Result<Table> {
    let t = lua.create_table()?;
    t.set(
        "add",
        lua.create_function(|lua, handle: u64| {
            let mut ctx = lua.app_data_mut::<PacketContext>().ok_or_else(context_error)?;
            ctx.stats.push(StatsHandle(handle));
            Ok(())
        })?,
    )?;
    Ok(t)
}

/// `fields.<name>` reads the named field of the current packet.
struct FieldsView;

impl UserData for FieldsView {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |lua, _, name: String| {
            let field = Field::from_name(&name)
                .ok_or_else(|| mlua::Error::runtime(format!("unknown field '{name}'")))?;
            let value = {
                let ctx = lua.app_data_ref::<PacketContext>().ok_or_else(context_error)?;
                ctx.fields.get(field)
            };
            match value {
                // same bits, signed view
                FieldValue::Int(v) => Ok(Value::Integer(v as i64)),
                FieldValue::Ipv6(octets) => Ok(Value::String(lua.create_string(octets)?)),
            }
        });
        methods.add_meta_method(
            MetaMethod::NewIndex,
            |_, _, (name, _value): (String, Value)| -> mlua::Result<()> {
                Err(mlua::Error::runtime(format!("field '{name}' is read-only")))
            },
        );
    }
}
