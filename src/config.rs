//! Configuration for Skiff
//!
//! Layered load: built-in defaults, then an optional `skiff.toml`, then
//! `SKIFF__` environment overrides. API keys always prefer the environment
//! over the config file so secrets stay out of checked-in settings.

use crate::error::Result;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;

/// Which model backend the client prefers. The local backend is always
/// available as the fallback regardless of this selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI-compatible chat-completions endpoint (OpenRouter, Groq, ...)
    Cloud,
    /// Ollama-style single-endpoint generate call
    Local,
}

/// Cloud provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfig {
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_cloud_base_url")]
    pub base_url: String,
    /// API key (prefer SKIFF_API_KEY / OPENROUTER_API_KEY env vars)
    #[serde(default = "default_secret")]
    pub api_key: SecretString,
    /// Chat model id
    #[serde(default = "default_cloud_model")]
    pub model: String,
    /// Vision-capable model id for image analysis
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request timeout in seconds
    #[serde(default = "default_cloud_timeout")]
    pub timeout_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        CloudConfig {
            base_url: default_cloud_base_url(),
            api_key: default_secret(),
            model: default_cloud_model(),
            vision_model: default_vision_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_cloud_timeout(),
        }
    }
}

/// Local model runtime configuration (Ollama-compatible)
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    /// Base URL of the local runtime
    #[serde(default = "default_local_host")]
    pub host: String,
    /// Local model id
    #[serde(default = "default_local_model")]
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_local_timeout")]
    pub timeout_secs: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        LocalConfig {
            host: default_local_host(),
            model: default_local_model(),
            timeout_secs: default_local_timeout(),
        }
    }
}

/// LLM client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Preferred provider
    #[serde(default = "default_provider")]
    pub provider: Provider,
    /// Cloud backend settings
    #[serde(default)]
    pub cloud: CloudConfig,
    /// Local backend settings
    #[serde(default)]
    pub local: LocalConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            provider: default_provider(),
            cloud: CloudConfig::default(),
            local: LocalConfig::default(),
        }
    }
}

/// Memory store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Where the index persists its records (None = in-memory only)
    #[serde(default = "default_memory_path")]
    pub data_path: Option<PathBuf>,
    /// Maximum nearest-neighbor hits injected as context
    #[serde(default = "default_max_context_chunks")]
    pub max_context_chunks: usize,
    /// Skip memory retrieval for trivial conversational turns
    #[serde(default = "default_true")]
    pub gate_simple_queries: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            data_path: default_memory_path(),
            max_context_chunks: default_max_context_chunks(),
            gate_simple_queries: true,
        }
    }
}

/// Connectivity probe configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Host used for the reachability probe
    #[serde(default = "default_check_host")]
    pub check_host: String,
    /// Port used for the reachability probe
    #[serde(default = "default_check_port")]
    pub check_port: u16,
    /// Probe timeout in seconds
    #[serde(default = "default_check_timeout")]
    pub check_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            check_host: default_check_host(),
            check_port: default_check_port(),
            check_timeout_secs: default_check_timeout(),
        }
    }
}

/// Command sandbox configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxConfig {
    /// Whether command execution is enabled at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whitelisted executables
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
    /// Hard kill timeout for a running command, in seconds
    #[serde(default = "default_max_execution")]
    pub max_execution_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            enabled: true,
            allowed_commands: default_allowed_commands(),
            max_execution_secs: default_max_execution(),
        }
    }
}

/// Web search / fetch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Maximum search results to return
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// HTTP timeout for search and fetch, in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            max_results: default_max_results(),
            timeout_secs: default_search_timeout(),
        }
    }
}

/// File operations configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FileOpsConfig {
    /// Project directory for list/search/write operations.
    /// Reads of absolute paths are allowed regardless.
    #[serde(default)]
    pub project_path: Option<PathBuf>,
    /// Maximum bytes read from a single file
    #[serde(default = "default_max_read_bytes")]
    pub max_read_bytes: u64,
}

impl Default for FileOpsConfig {
    fn default() -> Self {
        FileOpsConfig {
            project_path: None,
            max_read_bytes: default_max_read_bytes(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// LLM client settings
    #[serde(default)]
    pub llm: LlmConfig,
    /// Memory store settings
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Connectivity probe settings
    #[serde(default)]
    pub network: NetworkConfig,
    /// Command sandbox settings
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Web search/fetch settings
    #[serde(default)]
    pub search: SearchConfig,
    /// File operations settings
    #[serde(default)]
    pub file_ops: FileOpsConfig,
}

impl Config {
    /// Load configuration: defaults, then optional `skiff.toml`, then
    /// `SKIFF__` environment overrides (e.g. `SKIFF__LLM__LOCAL__MODEL`).
    pub fn load() -> Result<Self> {
        Self::load_from(std::path::Path::new("skiff.toml"))
    }

    /// Load configuration from a specific file path (if it exists)
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("SKIFF").separator("__"));

        let mut cfg: Config = builder.build()?.try_deserialize()?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Apply secret overrides from well-known environment variables
    fn apply_env_overrides(&mut self) {
        for var in ["SKIFF_API_KEY", "OPENROUTER_API_KEY", "GROQ_API_KEY"] {
            if let Ok(key) = std::env::var(var) {
                if !key.is_empty() {
                    self.llm.cloud.api_key = SecretString::from(key);
                    break;
                }
            }
        }
    }
}

fn default_provider() -> Provider {
    Provider::Local
}

fn default_secret() -> SecretString {
    SecretString::from(String::new())
}

fn default_cloud_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_cloud_model() -> String {
    "deepseek/deepseek-r1:free".to_string()
}

fn default_vision_model() -> String {
    "meta-llama/llama-3.2-11b-vision-instruct".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_cloud_timeout() -> u64 {
    60
}

fn default_local_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_local_model() -> String {
    "phi3:mini".to_string()
}

fn default_local_timeout() -> u64 {
    120
}

fn default_memory_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("skiff").join("memory.jsonl"))
}

fn default_max_context_chunks() -> usize {
    3
}

fn default_check_host() -> String {
    "8.8.8.8".to_string()
}

fn default_check_port() -> u16 {
    53
}

fn default_check_timeout() -> u64 {
    2
}

fn default_true() -> bool {
    true
}

fn default_allowed_commands() -> Vec<String> {
    ["echo", "ls", "cat", "date", "uname", "whoami", "pwd", "df", "uptime"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_execution() -> u64 {
    10
}

fn default_max_results() -> usize {
    5
}

fn default_search_timeout() -> u64 {
    15
}

fn default_max_read_bytes() -> u64 {
    35 * 1024 * 1024
}
