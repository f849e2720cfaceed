//! Cloud backend: OpenAI-compatible chat completions
//!
//! Works against OpenRouter, Groq, DeepSeek, or any other endpoint that
//! speaks the chat-completions wire format, including SSE streaming and
//! multimodal (vision) messages. Errors propagate to the client facade,
//! which owns the failover policy.

use crate::config::CloudConfig;
use crate::error::{Error, Result};
use crate::llm::types::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use base64::Engine;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{header, Client};
use secrecy::ExposeSecret;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info};

/// How many trailing history turns are replayed to the cloud model
const HISTORY_WINDOW: usize = 20;

/// Client for an OpenAI-compatible cloud provider
#[derive(Clone)]
pub struct CloudBackend {
    client: Client,
    config: CloudConfig,
}

impl CloudBackend {
    /// Create a new cloud backend client
    pub fn new(config: CloudConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();

        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", config.api_key.expose_secret()))
                .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
        );
        // OpenRouter attribution headers; harmless for other providers
        headers.insert(
            "HTTP-Referer",
            header::HeaderValue::from_static("https://github.com/your-org/skiff"),
        );
        headers.insert("X-Title", header::HeaderValue::from_static("Skiff"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(CloudBackend { client, config })
    }

    /// Host and port of the configured endpoint, for the pre-call probe
    pub fn endpoint_host_port(&self) -> Option<(String, u16)> {
        let parsed = url::Url::parse(&self.config.base_url).ok()?;
        let host = parsed.host_str()?.to_string();
        let port = parsed.port_or_known_default()?;
        Some((host, port))
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn build_messages(
        &self,
        prompt: &str,
        system: Option<&str>,
        history: &[ChatMessage],
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len().min(HISTORY_WINDOW) + 2);

        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }

        let start = history.len().saturating_sub(HISTORY_WINDOW);
        for msg in &history[start..] {
            if !msg.content.is_empty() {
                messages.push(msg.clone());
            }
        }

        messages.push(ChatMessage::user(prompt));
        messages
    }

    /// Create a chat completion
    pub async fn chat(
        &self,
        prompt: &str,
        system: Option<&str>,
        history: &[ChatMessage],
    ) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: self.build_messages(prompt, system, history),
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            stream: false,
        };

        info!(
            "Cloud chat: model={}, prompt_len={}",
            request.model,
            prompt.len()
        );

        let response = self
            .client
            .post(self.completions_url())
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: ChatCompletionResponse = response.json().await?;

        let content = body
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| Error::Provider("Response contained no choices".to_string()))?;

        if let Some(usage) = body.usage {
            debug!("Cloud chat tokens: {}", usage.total_tokens);
        }

        Ok(content)
    }

    /// Create a streaming chat completion. Items are content deltas parsed
    /// from line-delimited `data:` frames; the stream stops at `[DONE]`.
    pub async fn stream_chat(
        &self,
        prompt: &str,
        system: Option<&str>,
        history: &[ChatMessage],
    ) -> Result<BoxStream<'static, Result<String>>> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: self.build_messages(prompt, system, history),
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            stream: true,
        };

        info!("Cloud stream: model={}", request.model);

        let response = self
            .client
            .post(self.completions_url())
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        struct SseState {
            inner: BoxStream<'static, reqwest::Result<Vec<u8>>>,
            buf: String,
            pending: VecDeque<String>,
            done: bool,
        }

        let state = SseState {
            inner: response
                .bytes_stream()
                .map(|chunk| chunk.map(|b| b.to_vec()))
                .boxed(),
            buf: String::new(),
            pending: VecDeque::new(),
            done: false,
        };

        let stream = futures::stream::unfold(state, |mut st| async move {
            loop {
                if let Some(token) = st.pending.pop_front() {
                    return Some((Ok(token), st));
                }
                if st.done {
                    return None;
                }

                match st.inner.next().await {
                    Some(Ok(bytes)) => {
                        st.buf.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(pos) = st.buf.find('\n') {
                            let line: String = st.buf.drain(..=pos).collect();
                            let line = line.trim();
                            let Some(data) = line.strip_prefix("data:") else {
                                continue;
                            };
                            let data = data.trim();
                            if data == "[DONE]" {
                                st.done = true;
                                break;
                            }
                            // Malformed frames are skipped, not fatal
                            if let Ok(chunk) = serde_json::from_str::<ChatCompletionChunk>(data) {
                                if let Some(content) = chunk
                                    .choices
                                    .first()
                                    .and_then(|c| c.delta.content.clone())
                                {
                                    if !content.is_empty() {
                                        st.pending.push_back(content);
                                    }
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        st.done = true;
                        return Some((Err(Error::Http(e)), st));
                    }
                    None => {
                        st.done = true;
                        return None;
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    /// Analyze an image with the configured vision model.
    /// Errors propagate; the facade maps them to sentinel strings.
    pub async fn analyze_image(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_bytes);
        let data_url = format!("data:{};base64,{}", mime_type, encoded);

        let body = serde_json::json!({
            "model": self.config.vision_model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }],
            "temperature": 0.4,
            "max_tokens": 1024,
        });

        info!("Vision call: model={}", self.config.vision_model);

        let response = self
            .client
            .post(self.completions_url())
            .json(&body)
            .timeout(Duration::from_secs(30))
            .send()
            .await?
            .error_for_status()?;

        let parsed: ChatCompletionResponse = response.json().await?;
        parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| Error::Provider("Vision response contained no choices".to_string()))
    }

    /// Quick health check against the provider's model listing endpoint
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.config.base_url.trim_end_matches('/'));
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Model id used for chat
    pub fn model(&self) -> &str {
        &self.config.model
    }
}
