//! Backend configuration.
//!
//! The backend is described by a `BackendConfig`, which comes either from a
//! JSON profile file or from built-in defaults, and is then overlaid with
//! whatever the command line (or its environment fallbacks) provided.
//!
//! Profile file layout:
//! ```json
//! {
//!   "activeProfile": "glm",
//!   "profiles": {
//!     "glm": {
//!       "provider": "anthropic-compatible",
//!       "baseUrl": "https://api.z.ai/api/anthropic",
//!       "apiKeyEnv": "GLM_API_KEY",
//!       "model": "glm-4.7"
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::CommandArguments;
use crate::core::utils;

pub const DEFAULT_BASE_URL: &str = "https://api.z.ai/api/anthropic";
pub const DEFAULT_MODEL: &str = "glm-4.7";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_PROFILE: &str = "glm";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Invalid {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Active profile '{0}' not found in config")]
    UnknownProfile(String),
    #[error("API key required but not provided. Use --api-key or set environment variable.")]
    MissingApiKey,
}

/// Wire protocol spoken by the backend.
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// `/chat/completions` (OpenAI, DeepInfra, Ollama, LM Studio, vLLM...)
    #[value(name = "openai-compatible")]
    #[serde(rename = "openai-compatible")]
    OpenAiCompatible,
    /// `/messages` (Anthropic, Z.AI...)
    #[value(name = "anthropic-compatible")]
    #[serde(rename = "anthropic-compatible")]
    AnthropicCompatible,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAiCompatible => "openai-compatible",
            ProviderKind::AnthropicCompatible => "anthropic-compatible",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a backend provider.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    #[serde(default = "profile_default_provider")]
    pub provider: ProviderKind,
    #[serde(default)]
    pub base_url: String,
    /// Name of the environment variable holding the API key. Empty means
    /// the key is supplied directly (or not needed).
    #[serde(default)]
    pub api_key_env: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_version: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn profile_default_provider() -> ProviderKind {
    ProviderKind::OpenAiCompatible
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::AnthropicCompatible,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: String::new(),
            model: DEFAULT_MODEL.to_string(),
            api_version: Some(DEFAULT_API_VERSION.to_string()),
            timeout: DEFAULT_TIMEOUT_SECS,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl BackendConfig {
    /// Read the API key from the variable named by `api_key_env`.
    pub fn api_key(&self) -> String {
        self.api_key_with(|k| std::env::var(k).ok())
    }

    fn api_key_with<F>(&self, get: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key_env.is_empty() {
            return String::new();
        }
        get(&self.api_key_env).unwrap_or_default()
    }

    /// Legacy configuration used when no profile file exists.
    pub fn from_env() -> Self {
        Self::from_reader(|k| std::env::var(k).ok())
    }

    fn from_reader<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            provider: ProviderKind::AnthropicCompatible,
            base_url: get("GLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key_env: "GLM_API_KEY".to_string(),
            model: get("GLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            ..Self::default()
        }
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ProfileFile {
    #[serde(default = "default_active_profile")]
    active_profile: String,
    #[serde(default)]
    profiles: BTreeMap<String, BackendConfig>,
}

fn default_active_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

fn read_profile_file(path: &Path) -> Result<Option<ProfileFile>, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            });
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| ConfigError::Invalid {
            path: path.display().to_string(),
            source,
        })
}

/// Load a backend profile from `path`.
///
/// `profile` overrides the file's `activeProfile`. A missing file is not an
/// error: the legacy environment configuration is returned under the
/// profile name `default`.
pub fn load_profile(
    path: &Path,
    profile: Option<&str>,
) -> Result<(BackendConfig, String), ConfigError> {
    tracing::info!("Loading config from: {}", path.display());
    let Some(file) = read_profile_file(path)? else {
        tracing::warn!(
            "Config file not found: {}, using environment defaults",
            path.display()
        );
        return Ok((BackendConfig::from_env(), "default".to_string()));
    };

    let name = profile.map(str::to_string).unwrap_or(file.active_profile);
    let config = file
        .profiles
        .get(&name)
        .cloned()
        .ok_or_else(|| ConfigError::UnknownProfile(name.clone()))?;

    tracing::info!("Using profile: {} ({})", name, config.provider);
    Ok((config, name))
}

/// All profiles in `path`, or an empty map when the file does not exist.
pub fn list_profiles(path: &Path) -> Result<BTreeMap<String, BackendConfig>, ConfigError> {
    Ok(read_profile_file(path)?
        .map(|file| file.profiles)
        .unwrap_or_default())
}

/// Fully resolved server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub backend: BackendConfig,
    pub api_key: String,
    /// Profile the backend came from; `cli` when no profile file was given.
    pub profile: String,
}

/// Resolve settings from parsed arguments and the process environment.
pub fn resolve(args: &CommandArguments) -> Result<ServerSettings, ConfigError> {
    resolve_with(args, |k| std::env::var(k).ok())
}

fn resolve_with<F>(args: &CommandArguments, get: F) -> Result<ServerSettings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let (mut backend, profile) = match &args.config {
        Some(path) => load_profile(path, args.profile.as_deref())?,
        None => (BackendConfig::default(), "cli".to_string()),
    };

    if let Some(provider) = args.provider {
        backend.provider = provider;
    }
    if let Some(base_url) = &args.base_url {
        backend.base_url = base_url.clone();
    }
    if let Some(model) = &args.model {
        backend.model = model.clone();
    }
    if let Some(api_version) = &args.api_version {
        backend.api_version = Some(api_version.clone());
    }
    if let Some(timeout) = args.timeout {
        backend.timeout = timeout;
    }
    if let Some(max_tokens) = args.max_tokens {
        backend.max_tokens = max_tokens;
    }

    let api_key = args
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| get("Z_AI_API_KEY").filter(|k| !k.is_empty()))
        .unwrap_or_else(|| backend.api_key_with(&get));

    if api_key.is_empty() && !utils::is_local_endpoint(&backend.base_url) {
        return Err(ConfigError::MissingApiKey);
    }

    Ok(ServerSettings {
        backend,
        api_key,
        profile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    fn profile_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const PROFILES: &str = r#"{
        "activeProfile": "glm",
        "profiles": {
            "glm": {
                "provider": "anthropic-compatible",
                "baseUrl": "https://api.z.ai/api/anthropic",
                "apiKeyEnv": "GLM_API_KEY",
                "model": "glm-4.7",
                "apiVersion": "2023-06-01"
            },
            "ollama": {
                "baseUrl": "http://localhost:11434/v1",
                "model": "llama3.1",
                "timeout": 120
            }
        }
    }"#;

    #[test]
    fn defaults_match_cli_defaults() {
        let cfg = BackendConfig::default();
        assert_eq!(cfg.provider, ProviderKind::AnthropicCompatible);
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.model, "glm-4.7");
        assert_eq!(cfg.timeout_duration(), Duration::from_secs(600));
        assert_eq!(cfg.max_tokens, 8192);
    }

    #[test]
    fn profile_fields_default_when_absent() {
        let cfg: BackendConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.provider, ProviderKind::OpenAiCompatible);
        assert_eq!(cfg.base_url, "");
        assert_eq!(cfg.api_version, None);
        assert_eq!(cfg.timeout, 600);
        assert_eq!(cfg.max_tokens, 8192);
    }

    #[test]
    fn unknown_provider_in_profile_is_rejected() {
        let err = serde_json::from_str::<BackendConfig>(r#"{"provider":"gemini"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn api_key_read_through_env_name() {
        let cfg = BackendConfig {
            api_key_env: "MY_KEY".into(),
            ..BackendConfig::default()
        };
        assert_eq!(cfg.api_key_with(lookup(&[("MY_KEY", "secret")])), "secret");
        assert_eq!(cfg.api_key_with(lookup(&[])), "");
        assert_eq!(BackendConfig::default().api_key_with(lookup(&[("", "x")])), "");
    }

    #[test]
    fn legacy_env_config() {
        let cfg = BackendConfig::from_reader(lookup(&[("GLM_MODEL", "glm-4.6")]));
        assert_eq!(cfg.model, "glm-4.6");
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.api_key_env, "GLM_API_KEY");
    }

    #[test]
    fn loads_active_profile() {
        let file = profile_file(PROFILES);
        let (cfg, name) = load_profile(file.path(), None).unwrap();
        assert_eq!(name, "glm");
        assert_eq!(cfg.provider, ProviderKind::AnthropicCompatible);
        assert_eq!(cfg.api_key_env, "GLM_API_KEY");
    }

    #[test]
    fn profile_override_selects_other_profile() {
        let file = profile_file(PROFILES);
        let (cfg, name) = load_profile(file.path(), Some("ollama")).unwrap();
        assert_eq!(name, "ollama");
        assert_eq!(cfg.provider, ProviderKind::OpenAiCompatible);
        assert_eq!(cfg.timeout, 120);
    }

    #[test]
    fn unknown_active_profile_is_an_error() {
        let file = profile_file(r#"{"activeProfile":"nope","profiles":{}}"#);
        assert!(matches!(
            load_profile(file.path(), None),
            Err(ConfigError::UnknownProfile(name)) if name == "nope"
        ));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let file = profile_file("{ not json");
        assert!(matches!(
            load_profile(file.path(), None),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn missing_file_falls_back_to_environment() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, name) = load_profile(&dir.path().join("backend.config.json"), None).unwrap();
        assert_eq!(name, "default");
        assert_eq!(cfg.api_key_env, "GLM_API_KEY");
        assert!(list_profiles(&dir.path().join("backend.config.json")).unwrap().is_empty());
    }

    #[test]
    fn lists_profiles() {
        let file = profile_file(PROFILES);
        let names: Vec<_> = list_profiles(file.path()).unwrap().into_keys().collect();
        assert_eq!(names, vec!["glm", "ollama"]);
    }

    #[test]
    fn cli_values_override_profile() {
        let file = profile_file(PROFILES);
        let args = CommandArguments {
            config: Some(file.path().to_path_buf()),
            model: Some("glm-4.5".into()),
            max_tokens: Some(1024),
            ..CommandArguments::default()
        };
        let settings = resolve_with(&args, lookup(&[("GLM_API_KEY", "from-env")])).unwrap();
        assert_eq!(settings.profile, "glm");
        assert_eq!(settings.backend.model, "glm-4.5");
        assert_eq!(settings.backend.max_tokens, 1024);
        assert_eq!(settings.backend.base_url, "https://api.z.ai/api/anthropic");
        assert_eq!(settings.api_key, "from-env");
    }

    #[test]
    fn explicit_key_wins_over_fallbacks() {
        let args = CommandArguments {
            api_key: Some("explicit".into()),
            ..CommandArguments::default()
        };
        let settings = resolve_with(&args, lookup(&[("Z_AI_API_KEY", "zai")])).unwrap();
        assert_eq!(settings.api_key, "explicit");
        assert_eq!(settings.profile, "cli");
    }

    #[test]
    fn z_ai_key_is_a_fallback() {
        let args = CommandArguments::default();
        let settings = resolve_with(&args, lookup(&[("Z_AI_API_KEY", "zai")])).unwrap();
        assert_eq!(settings.api_key, "zai");
    }

    #[test]
    fn remote_backend_requires_key() {
        let args = CommandArguments::default();
        assert!(matches!(
            resolve_with(&args, lookup(&[])),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn local_backend_runs_without_key() {
        let args = CommandArguments {
            provider: Some(ProviderKind::OpenAiCompatible),
            base_url: Some("http://localhost:11434/v1".into()),
            ..CommandArguments::default()
        };
        let settings = resolve_with(&args, lookup(&[])).unwrap();
        assert_eq!(settings.api_key, "");
        assert_eq!(settings.backend.provider, ProviderKind::OpenAiCompatible);
    }
}
