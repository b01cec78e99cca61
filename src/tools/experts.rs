//! Expert Delegation Tools
//!
//! Each expert persona is exposed as an MCP tool named `glm_<expert>`. A call
//! wraps the task in a structured user prompt, sends it to the configured
//! provider together with the expert's system prompt, and returns the
//! provider's reply as text.

use std::sync::Arc;

use futures_util::FutureExt;
use serde::Deserialize;
use serde_json::Value;

use crate::core::server::{McpTool, ToolHandler, ToolRegistry};
use crate::core::utils;
use crate::providers::{CallOptions, Provider};
use crate::tools::prompts;

/// Prefix shared by every expert tool name.
pub const TOOL_PREFIX: &str = "glm_";

/// Expert names and their system prompts, in listing order.
pub const EXPERTS: [(&str, &str); 5] = [
    ("architect", prompts::ARCHITECT),
    ("code_reviewer", prompts::CODE_REVIEWER),
    ("security_analyst", prompts::SECURITY_ANALYST),
    ("plan_reviewer", prompts::PLAN_REVIEWER),
    ("scope_analyst", prompts::SCOPE_ANALYST),
];

/// System prompt for `expert`, if it exists.
pub fn system_prompt(expert: &str) -> Option<&'static str> {
    EXPERTS
        .iter()
        .find(|(name, _)| *name == expert)
        .map(|(_, prompt)| *prompt)
}

/// Arguments accepted by every expert tool.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ExpertRequest {
    pub task: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub context: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub files: Vec<String>,
}

fn default_mode() -> String {
    "advisory".to_string()
}

// `null` reads the same as an omitted field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ExpertRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            mode: default_mode(),
            context: String::new(),
            files: Vec::new(),
        }
    }
}

/// Assemble the user prompt sent alongside the expert's system prompt.
pub fn build_prompt(expert: &str, request: &ExpertRequest) -> String {
    let context = if request.context.is_empty() {
        "No additional context provided."
    } else {
        request.context.as_str()
    };
    let files = if request.files.is_empty() {
        "No specific files provided.".to_string()
    } else {
        serde_json::to_string_pretty(&request.files).unwrap_or_default()
    };
    format!(
        "## TASK\n{}\n\n## MODE\n{}\n\n## CONTEXT\n{}\n\n## FILES\n{}\n\n---\n\n\
         Now respond as the {} expert following the response format specified above.\n",
        request.task,
        request.mode.to_uppercase(),
        context,
        files,
        expert
    )
}

/// Ask `expert` to handle `request`.
///
/// Provider failures do not fail the call; they come back as a bracketed
/// error message so the client still sees what went wrong.
pub async fn call_expert(
    provider: &dyn Provider,
    expert: &str,
    request: &ExpertRequest,
) -> Result<String, String> {
    let system = system_prompt(expert).ok_or_else(|| {
        let available: Vec<&str> = EXPERTS.iter().map(|(name, _)| *name).collect();
        format!("Unknown expert: {}. Available: {:?}", expert, available)
    })?;
    let user = build_prompt(expert, request);

    tracing::info!(
        "Calling expert: {}, mode: {}, provider: {}",
        expert,
        request.mode,
        provider.model()
    );

    match provider.call(system, &user, &CallOptions::default()).await {
        Ok(response) => {
            tracing::info!("Response received: {} characters", response.text.chars().count());
            if let Some(tokens) = response.tokens_used {
                tracing::debug!("Tokens used: {}", tokens);
            }
            Ok(response.text)
        }
        Err(e) => {
            tracing::error!("Error calling provider: {}", e);
            Ok(format!("[Error calling provider: {}]", e))
        }
    }
}

fn input_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "task": {
                "type": "string",
                "description": "The task or question for the expert"
            },
            "mode": {
                "type": "string",
                "enum": ["advisory", "implementation"],
                "description": "Advisory = analysis only, Implementation = make changes",
                "default": "advisory"
            },
            "context": {
                "type": "string",
                "description": "Additional context about the codebase",
                "default": ""
            },
            "files": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Relevant files to include",
                "default": []
            }
        },
        "required": ["task"]
    })
}

/// Register one tool per expert, all backed by `provider`.
pub fn register(registry: &mut ToolRegistry, provider: Arc<dyn Provider>) {
    for (expert, _) in EXPERTS {
        let tool = McpTool {
            name: format!("{TOOL_PREFIX}{expert}"),
            description: format!(
                "Delegate to the {} expert ({})",
                utils::title_case(expert),
                provider.model()
            ),
            input_schema: input_schema(),
        };

        let provider = Arc::clone(&provider);
        let handler: ToolHandler = Box::new(move |args: Value| {
            let provider = Arc::clone(&provider);
            async move {
                let request: ExpertRequest = serde_json::from_value(args)
                    .map_err(|e| format!("Invalid arguments: {}", e))?;
                call_expert(provider.as_ref(), expert, &request).await
            }
            .boxed()
        });

        registry.register(tool, handler);
    }
}
