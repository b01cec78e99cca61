//! LLM Delegator MCP Server
//!
//! A Model Context Protocol server that exposes expert personas (architect,
//! code reviewer, security analyst, plan reviewer, scope analyst) as tools
//! and delegates each call to an OpenAI- or Anthropic-compatible backend.

pub mod cli;
pub mod core;
pub mod entry;
pub mod observability;
pub mod providers;
pub mod tools;
