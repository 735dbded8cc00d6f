//! pipeline-lua: the `lua` forwarding pipeline.
//!
//! Packets are handed to a user-supplied Lua `process` function running in a
//! sandbox. Scripts arrive over the control channel as `bsn_lua_upload`
//! fragments, are buffered in a [`ChunkStore`] and installed into the live
//! interpreter when the final fragment arrives.

pub mod builtin;
pub mod chunk_store;
pub mod context;
pub mod installer;
pub mod invoke;
pub mod module;
pub mod runtime;
pub mod sandbox;
pub mod tables;

pub use chunk_store::{ChunkStore, UploadChunk};
pub use installer::{install_all, InstallReport, UploadError, UploadFailure};
pub use module::{LuaPipeline, PIPELINE_NAME};
pub use runtime::{InvocationFault, ScriptRuntime, StartupError};
pub use tables::{TableError, TableOp};
