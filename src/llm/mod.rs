//! Language-model client with online/offline failover
//!
//! One facade, two backends:
//! - `CloudBackend`: OpenAI-compatible chat completions with streaming and vision
//! - `LocalBackend`: Ollama-style generate call, always available as fallback
//!
//! The failover policy applies on every call, not just at startup. When the
//! configured provider is cloud-class, a fast TCP probe against the endpoint
//! runs first so an offline machine skips the cloud attempt instead of
//! paying the full HTTP timeout. A probe that passes but a call that fails
//! still degrades to the local backend. Nothing in this module returns an
//! error to the orchestrator: the local backend converts its own terminal
//! failures into user-actionable diagnostic strings.

mod cloud;
mod local;
pub mod types;

pub use cloud::CloudBackend;
pub use local::LocalBackend;
pub use types::{ChatMessage, Role};

use crate::config::{LlmConfig, Provider};
use crate::error::Result;
use crate::net;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;
use tracing::{error, warn};

/// Sentinel prefix: vision skipped because the machine is offline
pub const VISION_OFFLINE_SENTINEL: &str = "[VISION_OFFLINE]";

/// Sentinel prefix: vision attempted but the API call failed
pub const VISION_ERROR_SENTINEL: &str = "[VISION_ERROR]";

/// Check whether a vision result is one of the failure sentinels
pub fn is_vision_sentinel(result: &str) -> bool {
    result.starts_with(VISION_OFFLINE_SENTINEL) || result.starts_with(VISION_ERROR_SENTINEL)
}

/// Pre-call probe timeout. Shorter than the router's connectivity check:
/// this runs before every cloud call and only needs to rule out the
/// obviously-offline case.
const QUICK_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Backend selected at construction
enum Backend {
    /// Cloud-class provider with local fallback
    Cloud(CloudBackend),
    /// Local-only operation
    Local,
}

/// Multi-provider LLM client
pub struct LlmClient {
    backend: Backend,
    local: LocalBackend,
}

impl LlmClient {
    /// Create a client from configuration. The provider variant is fixed
    /// here; the local backend is always constructed since it terminates
    /// the failover chain.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let backend = match config.provider {
            Provider::Cloud => Backend::Cloud(CloudBackend::new(config.cloud)?),
            Provider::Local => Backend::Local,
        };

        Ok(LlmClient {
            backend,
            local: LocalBackend::new(config.local),
        })
    }

    /// Whether the cloud endpoint looks reachable right now
    async fn cloud_reachable(cloud: &CloudBackend) -> bool {
        match cloud.endpoint_host_port() {
            Some((host, port)) => net::probe(&host, port, QUICK_PROBE_TIMEOUT).await,
            None => false,
        }
    }

    /// Generate a completion. Never fails: cloud errors degrade to the
    /// local backend, and local terminal failures come back as diagnostic
    /// strings.
    pub async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        history: &[ChatMessage],
    ) -> String {
        let cloud = match &self.backend {
            Backend::Cloud(cloud) => cloud,
            Backend::Local => return self.local.generate(prompt).await,
        };

        if !Self::cloud_reachable(cloud).await {
            warn!("Cloud endpoint unreachable, using local backend directly");
            return self.local.generate(prompt).await;
        }

        match cloud.chat(prompt, system, history).await {
            Ok(text) => text,
            Err(e) => {
                error!("Cloud provider failed: {}", e);
                warn!("Falling back to local backend");
                self.local.generate(prompt).await
            }
        }
    }

    /// Streaming variant of [`generate`]. Streams token deltas from the
    /// cloud; any failure at any point abandons the partial stream and
    /// yields one complete non-streamed chunk from the local backend.
    ///
    /// [`generate`]: LlmClient::generate
    pub async fn stream_generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        history: &[ChatMessage],
    ) -> BoxStream<'static, String> {
        let cloud = match &self.backend {
            Backend::Cloud(cloud) => cloud,
            Backend::Local => return self.local_single_chunk(prompt),
        };

        if !Self::cloud_reachable(cloud).await {
            warn!("Cloud endpoint unreachable, streaming single local chunk");
            return self.local_single_chunk(prompt);
        }

        let upstream = match cloud.stream_chat(prompt, system, history).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Cloud stream failed to start: {}", e);
                return self.local_single_chunk(prompt);
            }
        };

        enum StreamState {
            Streaming(BoxStream<'static, Result<String>>),
            Done,
        }

        let local = self.local.clone();
        let prompt = prompt.to_string();

        futures::stream::unfold(
            (StreamState::Streaming(upstream), local, prompt),
            |(state, local, prompt)| async move {
                match state {
                    StreamState::Streaming(mut upstream) => match upstream.next().await {
                        Some(Ok(token)) => {
                            Some((token, (StreamState::Streaming(upstream), local, prompt)))
                        }
                        Some(Err(e)) => {
                            error!("Cloud stream broke mid-flight: {}", e);
                            warn!("Abandoning partial stream, generating locally");
                            let chunk = local.generate(&prompt).await;
                            Some((chunk, (StreamState::Done, local, prompt)))
                        }
                        None => None,
                    },
                    StreamState::Done => None,
                }
            },
        )
        .boxed()
    }

    fn local_single_chunk(&self, prompt: &str) -> BoxStream<'static, String> {
        let local = self.local.clone();
        let prompt = prompt.to_string();
        futures::stream::once(async move { local.generate(&prompt).await }).boxed()
    }

    /// Analyze an image with the cloud vision model. Cloud-only: returns
    /// `[VISION_OFFLINE]`-prefixed text when the probe fails (or no cloud
    /// provider is configured) and `[VISION_ERROR]`-prefixed text on API
    /// failure. Callers use the sentinels to decide on an OCR fallback.
    pub async fn analyze_image(&self, image_bytes: &[u8], mime_type: &str, prompt: &str) -> String {
        let cloud = match &self.backend {
            Backend::Cloud(cloud) => cloud,
            Backend::Local => {
                return format!(
                    "{} No cloud provider configured, cannot analyze images.",
                    VISION_OFFLINE_SENTINEL
                )
            }
        };

        if !Self::cloud_reachable(cloud).await {
            return format!(
                "{} No internet connection, cannot analyze image with the vision model.",
                VISION_OFFLINE_SENTINEL
            );
        }

        match cloud.analyze_image(image_bytes, mime_type, prompt).await {
            Ok(description) => description,
            Err(e) => {
                error!("Vision API error: {}", e);
                format!("{} Vision analysis failed: {}", VISION_ERROR_SENTINEL, e)
            }
        }
    }

    /// Quick health check against the preferred backend
    pub async fn is_available(&self) -> bool {
        match &self.backend {
            Backend::Cloud(cloud) => cloud.is_available().await,
            Backend::Local => self.local.is_available().await,
        }
    }
}
