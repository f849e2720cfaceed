//! Local model backend (Ollama-compatible)
//!
//! Single-endpoint generate call with a flattened prompt string. The local
//! backend is the bottom of the failover chain: terminal failures become
//! user-actionable diagnostic strings, never errors, because there is
//! nothing further to fall back to.

use crate::config::LocalConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Short system prompt for the local model. Small local models destabilize
/// on long instruction blocks, so the cloud system prompt is never forwarded.
const SIMPLE_SYSTEM_PROMPT: &str = "You are Skiff, a helpful AI assistant. \
Answer the user's question directly and concisely. \
Do not make up conversations or reference past context unless asked. \
For greetings, just greet back briefly.";

/// Temperature for local generation, lower to keep answers focused
const LOCAL_TEMPERATURE: f32 = 0.5;

/// Output-length cap to prevent small models from rambling
const LOCAL_NUM_PREDICT: u32 = 512;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    options: GenerateOptions,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Client for an Ollama-style local runtime
#[derive(Clone)]
pub struct LocalBackend {
    client: Client,
    config: LocalConfig,
}

impl LocalBackend {
    /// Create a new local backend client
    pub fn new(config: LocalConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        LocalBackend { client, config }
    }

    /// Generate a completion. Always returns a string: on terminal failure
    /// the string is a diagnostic telling the user what to fix.
    pub async fn generate(&self, prompt: &str) -> String {
        let url = format!("{}/api/generate", self.config.host.trim_end_matches('/'));

        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            system: SIMPLE_SYSTEM_PROMPT,
            options: GenerateOptions {
                temperature: LOCAL_TEMPERATURE,
                num_predict: LOCAL_NUM_PREDICT,
            },
            stream: false,
        };

        info!(
            "Local generate: model={}, prompt_len={}",
            self.config.model,
            prompt.len()
        );

        let response = match self.client.post(&url).json(&request).send().await {
            Ok(resp) => resp,
            Err(e) if e.is_connect() => {
                error!("Local runtime is not running: {}", e);
                return format!(
                    "ERROR: Cannot connect to the local model runtime. \
                     Make sure it is running and the model is pulled \
                     (e.g. `ollama serve` and `ollama pull {}`).",
                    self.config.model
                );
            }
            Err(e) if e.is_timeout() => {
                error!("Local generate timed out");
                return "ERROR: Local model response timed out. \
                        Try a shorter prompt or increase llm.local.timeout_secs."
                    .to_string();
            }
            Err(e) => {
                error!("Local generate failed: {}", e);
                return format!("ERROR: {}", e);
            }
        };

        if let Err(e) = response.error_for_status_ref() {
            error!("Local runtime returned failure: {}", e);
            return format!("ERROR: Local model returned failure: {}", e);
        }

        match response.json::<GenerateResponse>().await {
            Ok(body) => body.response.trim().to_string(),
            Err(e) => {
                error!("Local generate returned malformed body: {}", e);
                format!("ERROR: {}", e)
            }
        }
    }

    /// Quick health check against the runtime's model listing endpoint
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.config.host.trim_end_matches('/'));
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(3))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Host the backend talks to
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Model the backend generates with
    pub fn model(&self) -> &str {
        &self.config.model
    }
}
