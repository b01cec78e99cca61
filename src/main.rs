//! LLM Delegator Entry Point
//!
//! Parses the command line, installs logging on stderr and starts the MCP
//! server. A startup or transport failure is logged and turned into a
//! non-zero exit status instead of being dropped.
//!
//! Environment Variables (each overridable by its flag, see `--help`):
//! - GLM_API_KEY / Z_AI_API_KEY: backend API key
//! - GLM_BASE_URL, GLM_MODEL: backend endpoint and model
//! - GLM_DELEGATOR_CONFIG: JSON profile file
//! - MCP_TRANSPORT_MODE: "stdio" (default), "http" or "both"
//! - HOST, PORT: bind address for HTTP mode
//! - RUST_LOG: log filter

use std::process::ExitCode;

use clap::Parser;
use llm_delegator::cli::CommandArguments;
use llm_delegator::core::server;
use llm_delegator::observability;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CommandArguments::parse();
    observability::init_tracing(args.debug);

    match server::start_server(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
