//! CLI command modules.

pub mod http;
pub mod inject;
pub mod status;
pub mod upload;
