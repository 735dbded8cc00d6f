//! Lookup tables declared by installed scripts.
//!
//! A script calls `register_table(name, { add = f, modify = g, delete = h })`.
//! The pipeline later feeds entries through [`ScriptRuntime::apply_table_op`]
//! (`crate::runtime`). Registering the same name again replaces the previous
//! callbacks. `modify` is optional and falls back to `add`.

use std::collections::BTreeMap;

use bytes::Bytes;
use mlua::{Function, Lua, RegistryKey, Table};

/// One entry operation delivered to a script-defined table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOp {
    Add { key: Bytes, value: Bytes },
    Modify { key: Bytes, value: Bytes },
    Delete { key: Bytes },
}

impl TableOp {
    pub fn kind(&self) -> &'static str {
        match self {
            TableOp::Add { .. } => "add",
            TableOp::Modify { .. } => "modify",
            TableOp::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("no table registered under {0:?}")]
    UnknownTable(String),

    #[error("table {table} {op} callback failed: {message}")]
    Callback {
        table: String,
        op: &'static str,
        message: String,
    },
}

struct TableCallbacks {
    add: RegistryKey,
    modify: Option<RegistryKey>,
    delete: RegistryKey,
}

impl TableCallbacks {
    fn for_op(&self, op: &TableOp) -> &RegistryKey {
        match op {
            TableOp::Add { .. } => &self.add,
            TableOp::Modify { .. } => self.modify.as_ref().unwrap_or(&self.add),
            TableOp::Delete { .. } => &self.delete,
        }
    }
}

/// Name → callbacks, stored in the Lua state's app data.
#[derive(Default)]
pub struct TableRegistry {
    tables: BTreeMap<String, TableCallbacks>,
}

impl TableRegistry {
    pub fn names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Backs the sandbox `register_table` primitive.
pub(crate) fn register(lua: &Lua, name: String, ops: Table) -> mlua::Result<()> {
    if name.is_empty() {
        return Err(mlua::Error::runtime("table name must not be empty"));
    }
    let required = |op: &str| -> mlua::Result<Function> {
        ops.get::<Option<Function>>(op)?.ok_or_else(|| {
            mlua::Error::runtime(format!("table {name}: '{op}' must be a function"))
        })
    };
    let add = required("add")?;
    let delete = required("delete")?;
    let modify = ops.get::<Option<Function>>("modify")?;

    let callbacks = TableCallbacks {
        add: lua.create_registry_value(add)?,
        modify: modify.map(|f| lua.create_registry_value(f)).transpose()?,
        delete: lua.create_registry_value(delete)?,
    };

    let mut registry = lua
        .app_data_mut::<TableRegistry>()
        .ok_or_else(|| mlua::Error::runtime("table registry unavailable"))?;
    if registry.tables.insert(name.clone(), callbacks).is_some() {
        tracing::debug!(table = %name, "replaced Lua table");
    } else {
        tracing::debug!(table = %name, "registered Lua table");
    }
    Ok(())
}

/// Look up and invoke the callback for `op` on `table`.
pub(crate) fn apply(lua: &Lua, table: &str, op: TableOp) -> Result<(), TableError> {
    let callback_error = |e: mlua::Error| TableError::Callback {
        table: table.to_string(),
        op: op.kind(),
        message: e.to_string(),
    };

    let func: Function = {
        let registry = lua
            .app_data_ref::<TableRegistry>()
            .ok_or_else(|| TableError::UnknownTable(table.to_string()))?;
        let callbacks = registry
            .tables
            .get(table)
            .ok_or_else(|| TableError::UnknownTable(table.to_string()))?;
        lua.registry_value(callbacks.for_op(&op))
            .map_err(callback_error)?
    };

    let result = match &op {
        TableOp::Add { key, value } | TableOp::Modify { key, value } => lua
            .create_string(key)
            .and_then(|k| Ok((k, lua.create_string(value)?)))
            .and_then(|args| func.call::<()>(args)),
        TableOp::Delete { key } => lua
            .create_string(key)
            .and_then(|k| func.call::<()>(k)),
    };
    result.map_err(callback_error)
}
