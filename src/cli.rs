//! Command-line arguments.
//!
//! Backend options are optional here so that a profile file can supply them;
//! `core::config::resolve` applies the remaining defaults.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::core::config::ProviderKind;

#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "llm-delegator",
    version,
    about = "LLM Delegator MCP Server - multi-provider expert subagents",
    after_help = "Examples:\n  \
        llm-delegator -p anthropic-compatible -u https://api.anthropic.com/v1 -k $ANTHROPIC_API_KEY -m claude-sonnet-4-20250514\n  \
        llm-delegator -p openai-compatible -u https://api.openai.com/v1 -k $OPENAI_API_KEY -m gpt-4o\n  \
        llm-delegator -p openai-compatible -u http://localhost:11434/v1 -m llama3.1"
)]
pub struct CommandArguments {
    /// Provider type
    #[arg(short = 'p', long, value_enum, env = "LLM_DELEGATOR_PROVIDER")]
    pub provider: Option<ProviderKind>,

    /// Base URL of the API [default: https://api.z.ai/api/anthropic]
    #[arg(short = 'u', long, env = "GLM_BASE_URL")]
    pub base_url: Option<String>,

    /// API key (falls back to GLM_API_KEY, then Z_AI_API_KEY)
    #[arg(short = 'k', long, env = "GLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model name [default: glm-4.7]
    #[arg(short = 'm', long, env = "GLM_MODEL")]
    pub model: Option<String>,

    /// API version for Anthropic-compatible providers [default: 2023-06-01]
    #[arg(long)]
    pub api_version: Option<String>,

    /// Request timeout in seconds [default: 600]
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Maximum tokens for responses [default: 8192]
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Backend profile file (JSON)
    #[arg(long, env = "GLM_DELEGATOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Profile to use instead of the file's activeProfile
    #[arg(long, requires = "config")]
    pub profile: Option<String>,

    /// MCP transport
    #[arg(long, value_enum, env = "MCP_TRANSPORT_MODE", default_value_t = Transport::Stdio)]
    pub transport: Transport,

    /// Bind address for the HTTP transport
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the HTTP transport
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Stdio,
    Http,
    Both,
}
