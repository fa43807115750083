//! TOML configuration.
//!
//! Every section is optional; missing keys fall back to the defaults below,
//! so an empty file is a valid configuration. See
//! `config/docent.example.toml` for a complete example.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::validate::UploadPolicy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

/// Remote completion API settings.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Inline credential. Takes precedence over `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_chat_max_tokens")]
    pub chat_max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            chat_max_tokens: default_chat_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}
fn default_model() -> String {
    "claude-3-sonnet-20240229".to_string()
}
fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_chat_max_tokens() -> u32 {
    1000
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    2
}

impl LlmConfig {
    /// Resolves the API credential: inline key first, then the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_max_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_allowed_extensions() -> Vec<String> {
    [".pdf", ".csv", ".txt", ".docx", ".doc"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl UploadConfig {
    pub fn policy(&self) -> UploadPolicy {
        UploadPolicy::new(self.max_bytes, self.allowed_extensions.clone())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Maximum files extracted concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_csv_sample_rows")]
    pub csv_sample_rows: usize,
    #[serde(default = "default_bytes_per_page")]
    pub bytes_per_page: u64,
    /// Characters of extracted text sent with a per-file metadata request.
    #[serde(default = "default_metadata_excerpt_chars")]
    pub metadata_excerpt_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            csv_sample_rows: default_csv_sample_rows(),
            bytes_per_page: default_bytes_per_page(),
            metadata_excerpt_chars: default_metadata_excerpt_chars(),
        }
    }
}

fn default_workers() -> usize {
    4
}
fn default_csv_sample_rows() -> usize {
    5
}
fn default_bytes_per_page() -> u64 {
    50 * 1024
}
fn default_metadata_excerpt_chars() -> usize {
    8000
}

impl Config {
    /// Built-in defaults, used when no config file is present.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if config.upload.max_bytes == 0 {
        anyhow::bail!("upload.max_bytes must be > 0");
    }
    if config.upload.allowed_extensions.is_empty() {
        anyhow::bail!("upload.allowed_extensions must not be empty");
    }
    if let Some(bad) = config
        .upload
        .allowed_extensions
        .iter()
        .find(|e| !e.starts_with('.'))
    {
        anyhow::bail!(
            "upload.allowed_extensions entries must start with '.', got '{}'",
            bad
        );
    }

    if config.pipeline.workers == 0 {
        anyhow::bail!("pipeline.workers must be >= 1");
    }
    if config.pipeline.bytes_per_page == 0 {
        anyhow::bail!("pipeline.bytes_per_page must be > 0");
    }

    if config.llm.max_tokens == 0 || config.llm.chat_max_tokens == 0 {
        anyhow::bail!("llm.max_tokens and llm.chat_max_tokens must be > 0");
    }
    if config.llm.timeout_secs == 0 {
        anyhow::bail!("llm.timeout_secs must be > 0");
    }
    if !config.llm.endpoint.starts_with("http://") && !config.llm.endpoint.starts_with("https://")
    {
        anyhow::bail!("llm.endpoint must be an http(s) URL");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        validate_config(&config).unwrap();
        assert_eq!(config.upload.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.pipeline.csv_sample_rows, 5);
        assert_eq!(config.llm.api_key_env, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
[llm]
model = "test-model"
max_retries = 0

[pipeline]
workers = 2
"#,
        )
        .unwrap();
        assert_eq!(config.llm.model, "test-model");
        assert_eq!(config.llm.max_retries, 0);
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.pipeline.workers, 2);
        assert_eq!(config.pipeline.bytes_per_page, 50 * 1024);
    }

    #[test]
    fn example_config_is_valid() {
        let config: Config = toml::from_str(include_str!("../config/docent.example.toml")).unwrap();
        validate_config(&config).unwrap();
        assert_eq!(config.pipeline.bytes_per_page, 51200);
        assert_eq!(config.server.bind, "127.0.0.1:8787");
    }

    #[test]
    fn rejects_zero_workers() {
        let config: Config = toml::from_str("[pipeline]\nworkers = 0\n").unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_extension_without_dot() {
        let config: Config =
            toml::from_str("[upload]\nallowed_extensions = [\"pdf\"]\n").unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("must start with '.'"));
    }

    #[test]
    fn inline_key_wins_over_env() {
        let mut llm = LlmConfig::default();
        llm.api_key = Some("inline".into());
        llm.api_key_env = "DOCENT_TEST_UNSET_VAR".into();
        assert_eq!(llm.resolve_api_key().as_deref(), Some("inline"));

        llm.api_key = None;
        assert_eq!(llm.resolve_api_key(), None);
    }
}
