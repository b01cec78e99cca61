//! Core Server Framework Module
//!
//! - config.rs: backend configuration and profile files
//! - server.rs: MCP server implementation with HTTP and STDIO transport
//! - utils.rs: small shared helpers

pub mod config;
pub mod server;
pub mod utils;
