//! Tools Module
//!
//! MCP tool implementations. Each tool module exports a `register` function
//! that adds its tools to the registry during server initialization.

pub mod experts;
pub mod prompts;
