//! The embedded Lua interpreter.
//!
//! A [`ScriptRuntime`] only exists in the ready state: [`ScriptRuntime::start`]
//! either returns a fully initialised interpreter (sandbox built, built-ins
//! run, `process` resolved) or a [`StartupError`]. [`ScriptRuntime::stop`]
//! consumes it.
//!
//! The interpreter is single-threaded. All calls happen on the thread that
//! owns the runtime.

use mlua::{ChunkMode, Function, Lua, LuaOptions, RegistryKey, StdLib, Table, Value};

use pipeline_core::fields::FIELD_COUNT;
use pipeline_core::{ActionSink, ParsedKey, StatsSink};

use crate::builtin::Builtin;
use crate::context::PacketContext;
use crate::sandbox;
use crate::tables::{self, TableError, TableOp, TableRegistry};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to create Lua state: {0}")]
    State(#[source] mlua::Error),

    #[error("failed to build sandbox: {0}")]
    Sandbox(#[source] mlua::Error),

    #[error("failed to load built-in Lua code {name}: {source}")]
    BuiltinLoad {
        name: &'static str,
        source: mlua::Error,
    },

    #[error("failed to execute built-in Lua code {name}: {source}")]
    BuiltinExecute {
        name: &'static str,
        source: mlua::Error,
    },

    #[error("built-in Lua code did not define a global process function")]
    EntryPointMissing,

    #[error("global process is a {0}, not a function")]
    EntryPointNotFunction(&'static str),

    #[error("failed to retain process function: {0}")]
    EntryPoint(#[source] mlua::Error),
}

/// A script error raised while handling one packet.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct InvocationFault(pub String);

pub struct ScriptRuntime {
    lua: Lua,
    sandbox: Table,
    process: RegistryKey,
}

impl ScriptRuntime {
    /// Create the interpreter, publish the sandbox, run `builtins` in order
    /// and resolve the global `process` entry point.
    pub fn start(builtins: &[Builtin]) -> Result<Self, StartupError> {
        let lua = Lua::new_with(StdLib::ALL_SAFE, LuaOptions::default())
            .map_err(StartupError::State)?;
        lua.set_app_data(PacketContext::default());
        lua.set_app_data(TableRegistry::default());

        let sandbox = sandbox::build(&lua).map_err(StartupError::Sandbox)?;
        lua.globals()
            .set("sandbox", sandbox.clone())
            .map_err(StartupError::Sandbox)?;

        for builtin in builtins {
            tracing::debug!(name = builtin.name, "loading built-in Lua code");
            let unit = lua
                .load(builtin.source)
                .set_name(builtin.name)
                .set_mode(ChunkMode::Text)
                .into_function()
                .map_err(|source| StartupError::BuiltinLoad {
                    name: builtin.name,
                    source,
                })?;
            unit.call::<()>(())
                .map_err(|source| StartupError::BuiltinExecute {
                    name: builtin.name,
                    source,
                })?;
        }

        let process = match lua
            .globals()
            .get::<Value>("process")
            .map_err(StartupError::EntryPoint)?
        {
            Value::Function(f) => f,
            Value::Nil => return Err(StartupError::EntryPointMissing),
            other => return Err(StartupError::EntryPointNotFunction(other.type_name())),
        };
        let process = lua
            .create_registry_value(process)
            .map_err(StartupError::EntryPoint)?;

        tracing::info!(
            builtins = builtins.len(),
            fields = FIELD_COUNT,
            "Lua runtime ready"
        );
        Ok(Self {
            lua,
            sandbox,
            process,
        })
    }

    /// Compile `source` as a text chunk whose globals resolve in the sandbox.
    pub fn compile(&self, name: &str, source: &[u8]) -> mlua::Result<Function> {
        self.lua
            .load(source)
            .set_name(name)
            .set_mode(ChunkMode::Text)
            .set_environment(self.sandbox.clone())
            .into_function()
    }

    /// Run the entry point for one packet.
    ///
    /// Whatever the script emitted before returning or failing is delivered
    /// to `stats` and `actions`.
    pub fn invoke(
        &self,
        key: &ParsedKey,
        stats: &mut dyn StatsSink,
        actions: &mut dyn ActionSink,
    ) -> Result<(), InvocationFault> {
        self.with_context(|ctx| ctx.begin(key));
        let result = self
            .lua
            .registry_value::<Function>(&self.process)
            .and_then(|process| process.call::<()>(()));
        self.with_context(|ctx| ctx.flush(stats, actions));
        result.map_err(|e| InvocationFault(e.to_string()))
    }

    pub fn apply_table_op(&self, table: &str, op: TableOp) -> Result<(), TableError> {
        tables::apply(&self.lua, table, op)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.lua
            .app_data_ref::<TableRegistry>()
            .map(|registry| registry.names())
            .unwrap_or_default()
    }

    /// Bytes currently allocated by the interpreter.
    pub fn used_memory(&self) -> usize {
        self.lua.used_memory()
    }

    /// Tear down the interpreter. Nothing can be invoked afterwards.
    pub fn stop(self) {
        tracing::info!(
            used_memory = self.lua.used_memory(),
            "stopping Lua runtime"
        );
    }

    fn with_context<F: FnOnce(&mut PacketContext)>(&self, f: F) {
        if let Some(mut ctx) = self.lua.app_data_mut::<PacketContext>() {
            f(&mut ctx);
        }
    }
}
