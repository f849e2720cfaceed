//! Agent orchestrator
//!
//! One message in, one response out, through five ordered steps: triviality
//! check, memory retrieval, routing, tool dispatch, memory write. Tool
//! handlers may fail; the dispatch step is the single error boundary that
//! converts any handler error into a fallback model response, so `run`
//! itself always produces text.

use crate::agent::history::SessionHistory;
use crate::agent::prompts::{
    self, PromptContext, EXTRACT_PATH_SYSTEM_PROMPT, EXTRACT_QUERY_SYSTEM_PROMPT,
    FILE_READ_SYSTEM_PROMPT, SYSTEM_PROMPT, VISION_ANALYSIS_PROMPT,
};
use crate::config::Config;
use crate::error::Result;
use crate::llm::{self, LlmClient};
use crate::memory::MemoryStore;
use crate::net;
use crate::router::{RouteContext, Router, ToolKind};
use crate::tools::{CommandSandbox, FileOps, FileParser, PlainTextParser, WebFetcher, WebSearch};
use std::path::Path;
use tracing::{error, info, warn};

/// Exact inputs treated as trivial conversation
const SIMPLE_PHRASES: &[&str] = &[
    "hi", "hello", "hey", "hii", "hiii", "yo", "sup", "howdy", "good morning", "good evening",
    "good night", "thanks", "thank you", "bye", "goodbye", "ok", "okay", "yeah", "yes", "no",
    "sure", "cool", "nice", "great", "awesome",
];

/// Keywords that mark a short input as a real task anyway
const TASK_KEYWORDS: &[&str] = &["file", "search", "fetch", "http", "summarize"];

/// The conversational agent: routes each message, gathers context, and
/// drives the model
pub struct Agent {
    llm: LlmClient,
    memory: MemoryStore,
    router: Router,
    parser: PlainTextParser,
    sandbox: CommandSandbox,
    web_search: WebSearch,
    web_fetcher: WebFetcher,
    file_ops: FileOps,
    network: crate::config::NetworkConfig,
    gate_simple_queries: bool,
}

impl Agent {
    /// Assemble an agent from already-built core services plus tool
    /// configuration
    pub fn new(llm: LlmClient, memory: MemoryStore, config: &Config) -> Self {
        Agent {
            llm,
            memory,
            router: Router::new(config.network.clone()),
            parser: PlainTextParser,
            sandbox: CommandSandbox::new(config.sandbox.clone()),
            web_search: WebSearch::new(config.search.clone()),
            web_fetcher: WebFetcher::new(&config.search),
            file_ops: FileOps::new(config.file_ops.clone()),
            network: config.network.clone(),
            gate_simple_queries: config.memory.gate_simple_queries,
        }
    }

    /// Process one user message and return the response. Never fails:
    /// every failure path ends in model-generated or diagnostic text.
    pub async fn run(&self, user_input: &str, history: &mut SessionHistory) -> String {
        // Step 1 + 2: memory retrieval, skipped for trivial conversation
        // so stray context cannot confuse small models
        let memory_context = if self.gate_simple_queries && is_simple_query(user_input) {
            String::new()
        } else {
            self.memory.retrieve_or_empty(user_input).await
        };

        // Step 3: route
        let (tool, ctx) = self.router.route(user_input).await;
        info!("Routed to: {}", tool);

        // Step 4: dispatch, with the single error boundary
        let response = match self.dispatch(tool, &ctx, &memory_context, history).await {
            Ok(response) => response,
            Err(e) => {
                error!("Tool execution failed: {}", e);
                self.fallback(user_input, &memory_context, history, &e.to_string())
                    .await
            }
        };

        // Step 5: persist the turn before returning
        if let Err(e) = self.memory.store(user_input, &response).await {
            warn!("Failed to store memory for this turn: {}", e);
        }
        history.push_turn(user_input, &response);

        response
    }

    async fn dispatch(
        &self,
        tool: ToolKind,
        ctx: &RouteContext,
        memory: &str,
        history: &SessionHistory,
    ) -> Result<String> {
        match tool {
            ToolKind::ParseFile => self.handle_parse_file(ctx, memory, history).await,
            ToolKind::OcrImage => self.handle_ocr_image(ctx, memory, history).await,
            ToolKind::AnalyzeImage => self.handle_analyze_image(ctx, memory, history).await,
            ToolKind::Summarize => {
                let prompt = self.assemble(ctx, memory, PromptContext::default());
                Ok(self.generate(&prompt, SYSTEM_PROMPT, history).await)
            }
            ToolKind::RunCommand => Ok(self.sandbox.run(&ctx.prompt, &self.llm).await),
            ToolKind::FileOps => self.handle_file_ops(ctx, memory, history).await,
            ToolKind::WebSearch => {
                let query = ctx.query.as_deref().unwrap_or(&ctx.prompt);
                let results = self.web_search.search(query).await;
                let prompt = self.assemble(
                    ctx,
                    memory,
                    PromptContext {
                        web_results: results,
                        ..Default::default()
                    },
                );
                Ok(self.generate(&prompt, SYSTEM_PROMPT, history).await)
            }
            ToolKind::WebFetch => {
                let Some(url) = &ctx.url else {
                    return Ok(
                        "No URL found. Include a full URL (https://...) in your message."
                            .to_string(),
                    );
                };
                let page = self.web_fetcher.fetch(url).await;
                let prompt = self.assemble(
                    ctx,
                    memory,
                    PromptContext {
                        web_content: page,
                        ..Default::default()
                    },
                );
                Ok(self.generate(&prompt, SYSTEM_PROMPT, history).await)
            }
            ToolKind::General => {
                let mut prompt = self.assemble(ctx, memory, PromptContext::default());
                if let Some(warning) = &ctx.offline_warning {
                    prompt = format!("[NOTE: {}]\n\n{}", warning, prompt);
                }
                Ok(self.generate(&prompt, SYSTEM_PROMPT, history).await)
            }
        }
    }

    async fn handle_parse_file(
        &self,
        ctx: &RouteContext,
        memory: &str,
        history: &SessionHistory,
    ) -> Result<String> {
        let Some(filepath) = &ctx.filepath else {
            return Ok("No file path provided. Use: [FILE:<path>] in your message.".to_string());
        };

        let text = self.parser.parse(filepath)?;
        let prompt = self.assemble(
            ctx,
            memory,
            PromptContext {
                file_content: text,
                ..Default::default()
            },
        );
        Ok(self.generate(&prompt, SYSTEM_PROMPT, history).await)
    }

    async fn handle_ocr_image(
        &self,
        ctx: &RouteContext,
        memory: &str,
        history: &SessionHistory,
    ) -> Result<String> {
        let Some(filepath) = &ctx.filepath else {
            return Ok(
                "No image file provided. Use: [FILE:<path_to_image>] in your message.".to_string(),
            );
        };

        // The parser reports what it can and cannot extract
        let text = self.parser.parse(filepath)?;
        let prompt = self.assemble(
            ctx,
            memory,
            PromptContext {
                file_content: text,
                ..Default::default()
            },
        );
        Ok(self.generate(&prompt, SYSTEM_PROMPT, history).await)
    }

    /// Vision sub-pipeline: describe the image, fall back to OCR when the
    /// vision model is unavailable, optionally enrich identified entities
    /// with a web search, then synthesize.
    async fn handle_analyze_image(
        &self,
        ctx: &RouteContext,
        memory: &str,
        history: &SessionHistory,
    ) -> Result<String> {
        let Some(filepath) = &ctx.filepath else {
            return Ok("No image file provided for analysis.".to_string());
        };

        let image_bytes = tokio::fs::read(filepath).await?;
        let mime = guess_mime(filepath);

        let vision_result = self
            .llm
            .analyze_image(&image_bytes, mime, VISION_ANALYSIS_PROMPT)
            .await;
        info!(
            "Vision result: {}...",
            vision_result.chars().take(200).collect::<String>()
        );

        if llm::is_vision_sentinel(&vision_result) {
            warn!("Vision unavailable, falling back to OCR");
            return match self.parser.parse(filepath) {
                Ok(ocr_text) => {
                    let prompt = self.assemble(
                        ctx,
                        memory,
                        PromptContext {
                            file_content: ocr_text,
                            ..Default::default()
                        },
                    );
                    Ok(self.generate(&prompt, SYSTEM_PROMPT, history).await)
                }
                Err(_) => Ok(format!(
                    "Image analysis is unavailable offline and OCR failed.\n\nVision error: {}",
                    vision_result
                )),
            };
        }

        // Enrich with a web search when an entity stands out and the
        // machine is online
        let mut web_results = String::new();
        if net::is_reachable(&self.network).await {
            let extraction_prompt = format!(
                "Based on this image description, extract the single most important \
                 person name or entity to search for. Reply with ONLY the search query, \
                 nothing else. If no specific person or entity is identifiable, reply \
                 with 'NONE'.\n\nDescription: {}",
                vision_result
            );
            let query = self
                .llm
                .generate(&extraction_prompt, Some(EXTRACT_QUERY_SYSTEM_PROMPT), &[])
                .await;
            let query = query.trim().trim_matches(['"', '\'']).to_string();

            if !query.is_empty() && !query.eq_ignore_ascii_case("none") && query.len() > 2 {
                info!("Auto web search for identified entity: {}", query);
                web_results = self.web_search.search(&query).await;
            }
        }

        let prompt = self.assemble(
            ctx,
            memory,
            PromptContext {
                file_content: format!("[IMAGE ANALYSIS BY VISION AI]\n{}", vision_result),
                web_results,
                ..Default::default()
            },
        );
        let synthesis_system = format!(
            "{}\n\nYou have received an AI vision analysis of an image. Present the \
             findings in a clear, organized way. If web search results are available, \
             use them to provide additional context about identified people, places, \
             or objects. Be confident but note if identification is uncertain.",
            SYSTEM_PROMPT
        );
        Ok(self.generate(&prompt, &synthesis_system, history).await)
    }

    async fn handle_file_ops(
        &self,
        ctx: &RouteContext,
        memory: &str,
        history: &SessionHistory,
    ) -> Result<String> {
        let text_lower = ctx.prompt.to_lowercase();

        // A raw path detected by the router is read directly
        if let Some(detected) = &ctx.detected_path {
            let content = self.file_ops.read_file(detected)?;
            let prompt = self.assemble(
                ctx,
                memory,
                PromptContext {
                    file_content: content,
                    ..Default::default()
                },
            );
            return Ok(self.generate(&prompt, FILE_READ_SYSTEM_PROMPT, history).await);
        }

        let read_requested = ["read file", "show code", "open file", "read code", "show file"]
            .iter()
            .any(|kw| text_lower.contains(kw));

        if self.file_ops.project_path().is_none() {
            // Reads still work without a project path when the path can be
            // recovered from the message
            if read_requested {
                if let Some(extracted) = FileOps::extract_path_from_text(&ctx.prompt) {
                    let content = self.file_ops.read_file(&extracted)?;
                    let prompt = self.assemble(
                        ctx,
                        memory,
                        PromptContext {
                            file_content: content,
                            ..Default::default()
                        },
                    );
                    return Ok(self.generate(&prompt, FILE_READ_SYSTEM_PROMPT, history).await);
                }
            }
            return Ok(
                "No project path is configured. Set file_ops.project_path in skiff.toml; \
                 then I can list, search, write, and fix files in your project. \
                 You can still read any file by providing its full path."
                    .to_string(),
            );
        }

        if ["list files", "project files", "show project", "project structure", "directory"]
            .iter()
            .any(|kw| text_lower.contains(kw))
        {
            return self.file_ops.list_files();
        }

        if ["search in files", "find in code", "grep"]
            .iter()
            .any(|kw| text_lower.contains(kw))
        {
            let query = self
                .llm
                .generate(
                    &ctx.prompt,
                    Some("Extract the search query from the user's message. Reply with ONLY the search term, nothing else."),
                    &[],
                )
                .await;
            let query = query.trim().trim_matches(['"', '\'']).to_string();
            if query.len() < 2 {
                return Ok(
                    "Could not determine what to search for. Try: 'search in files: <query>'"
                        .to_string(),
                );
            }
            return self.file_ops.search_in_files(&query);
        }

        if read_requested {
            let filepath = self.extract_path(&ctx.prompt).await;
            let Some(filepath) = filepath else {
                return Ok("Please specify a file path. Example: `read file src/main.rs`".to_string());
            };
            return self.file_ops.read_file(&filepath);
        }

        if ["fix error", "fix bug", "fix code", "fix this"]
            .iter()
            .any(|kw| text_lower.contains(kw))
        {
            return self.fix_code(ctx, memory, history).await;
        }

        if ["write file", "edit file", "modify file"]
            .iter()
            .any(|kw| text_lower.contains(kw))
        {
            return Ok(
                "To write or edit files I need the specific changes. Try:\n\
                 - `fix error in <file>` to have the file read, fixed, and written back\n\
                 - `read file <file>` to see the code first, then ask for specific changes"
                    .to_string(),
            );
        }

        // General project question: ground it in the tree
        let tree = self.file_ops.list_files()?;
        let prompt = self.assemble(
            ctx,
            memory,
            PromptContext {
                file_content: format!("[PROJECT STRUCTURE]\n{}", tree),
                ..Default::default()
            },
        );
        Ok(self.generate(&prompt, SYSTEM_PROMPT, history).await)
    }

    /// Read, fix, and write back a file the user names; without a specific
    /// file, suggest where to look based on the project tree.
    async fn fix_code(
        &self,
        ctx: &RouteContext,
        memory: &str,
        history: &SessionHistory,
    ) -> Result<String> {
        let filepath = self.extract_path(&ctx.prompt).await;

        let Some(filepath) = filepath else {
            let tree = self.file_ops.list_files()?;
            let prompt = prompts::build_prompt(
                &format!(
                    "The user wants to fix an error in their project. Here is the \
                     structure:\n{}\n\nUser: {}\n\nSuggest which files to check and what \
                     might be wrong. Tell the user to try `fix error in <filename>` to \
                     automatically fix a specific file.",
                    tree, ctx.prompt
                ),
                &PromptContext {
                    memory: memory.to_string(),
                    ..Default::default()
                },
            );
            return Ok(self.generate(&prompt, SYSTEM_PROMPT, history).await);
        };

        let content = self.file_ops.read_file(&filepath)?;

        let fix_prompt = format!(
            "The user has an error in this code. Fix the code.\n\n\
             User's description: {}\n\nCurrent file content:\n{}\n\n\
             Respond with ONLY the complete corrected code, nothing else. \
             No explanations, no markdown fences.",
            ctx.prompt, content
        );
        let fixed = self
            .llm
            .generate(
                &fix_prompt,
                Some("You are a code fixer. Output only the corrected code. No markdown, no explanations."),
                &[],
            )
            .await;

        let write_result = self.file_ops.write_file(&filepath, &fixed)?;
        Ok(format!(
            "Fixed: {}\n\n{}\n\nChanges applied. Review the file to verify.",
            filepath, write_result
        ))
    }

    /// Ask the model to pull a file path out of the user's message
    async fn extract_path(&self, prompt: &str) -> Option<String> {
        let raw = self
            .llm
            .generate(prompt, Some(EXTRACT_PATH_SYSTEM_PROMPT), &[])
            .await;
        let path = raw.trim().trim_matches(['"', '\'']).to_string();
        if path.is_empty() || path.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(path)
        }
    }

    /// Fallback when a tool handler fails: answer anyway and tell the
    /// model what went wrong
    async fn fallback(
        &self,
        user_input: &str,
        memory: &str,
        history: &SessionHistory,
        error: &str,
    ) -> String {
        let prompt = format!(
            "[NOTE: A tool action failed with: {}. Answer the user's request as well \
             as you can and mention the problem briefly.]\n\n{}",
            error,
            prompts::build_prompt(
                user_input,
                &PromptContext {
                    memory: memory.to_string(),
                    ..Default::default()
                }
            )
        );
        self.generate(&prompt, SYSTEM_PROMPT, history).await
    }

    fn assemble(&self, ctx: &RouteContext, memory: &str, mut parts: PromptContext) -> String {
        parts.memory = memory.to_string();
        prompts::build_prompt(&ctx.prompt, &parts)
    }

    async fn generate(&self, prompt: &str, system: &str, history: &SessionHistory) -> String {
        self.llm.generate(prompt, Some(system), history.messages()).await
    }
}

/// Trivial conversational inputs that gain nothing from memory context
pub fn is_simple_query(text: &str) -> bool {
    let t = text
        .trim()
        .to_lowercase()
        .trim_end_matches(['?', '!', '.'])
        .to_string();

    if SIMPLE_PHRASES.contains(&t.as_str()) {
        return true;
    }

    let words: Vec<&str> = t.split_whitespace().collect();
    words.len() <= 3 && !TASK_KEYWORDS.iter().any(|kw| t.contains(kw))
}

fn guess_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("tiff") | Some("tif") => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LlmConfig, LocalConfig, Provider};
    use crate::error::Result as SkiffResult;
    use crate::memory::{Embedder, InMemoryIndex};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Embedder that counts calls; the vector is a constant
    struct CountingEmbedder(Arc<AtomicUsize>);

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, _text: &str) -> SkiffResult<Vec<f32>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    fn offline_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn mount_local(server: &MockServer, response: &str) {
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "response": response })),
            )
            .mount(server)
            .await;
    }

    fn test_agent(
        local_server: &MockServer,
        embed_count: Arc<AtomicUsize>,
    ) -> (Agent, MemoryStore) {
        let mut config = Config::default();
        // Offline probe so online routing rules downgrade deterministically
        config.network.check_host = "127.0.0.1".to_string();
        config.network.check_port = offline_port();
        config.network.check_timeout_secs = 1;
        config.memory.data_path = None;

        let llm = LlmClient::new(LlmConfig {
            provider: Provider::Local,
            cloud: Default::default(),
            local: LocalConfig {
                host: local_server.uri(),
                model: "test-local".to_string(),
                timeout_secs: 5,
            },
        })
        .unwrap();

        let index = Arc::new(InMemoryIndex::new());
        let memory = MemoryStore::new(
            Arc::new(CountingEmbedder(embed_count.clone())),
            index.clone(),
            3,
        );
        let memory_for_checks = MemoryStore::new(
            Arc::new(CountingEmbedder(embed_count)),
            index,
            3,
        );

        (Agent::new(llm, memory, &config), memory_for_checks)
    }

    #[tokio::test]
    async fn test_simple_query_skips_memory_retrieval() {
        let server = MockServer::start().await;
        mount_local(&server, "Hello!").await;
        let count = Arc::new(AtomicUsize::new(0));
        let (agent, _) = test_agent(&server, count.clone());

        let mut history = SessionHistory::new();
        let out = agent.run("hi", &mut history).await;

        assert_eq!(out, "Hello!");
        // No retrieval embed; the short turn also fails the store gate
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_summarize_run_stores_one_record() {
        let server = MockServer::start().await;
        mount_local(&server, "A concise summary of the provided text.").await;
        let count = Arc::new(AtomicUsize::new(0));
        let (agent, memory) = test_agent(&server, count);

        let mut history = SessionHistory::new();
        let out = agent
            .run(
                "summarize: the quick brown fox jumps over the lazy dog repeatedly",
                &mut history,
            )
            .await;

        assert_eq!(out, "A concise summary of the provided text.");
        assert_eq!(memory.count().await, 1);
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_tool_error_falls_back_to_generate() {
        let server = MockServer::start().await;
        mount_local(&server, "I could not parse that file, but here is what I know.").await;
        let count = Arc::new(AtomicUsize::new(0));
        let (agent, _) = test_agent(&server, count);

        // An existing .pdf routes to ParseFile, which fails with
        // UnsupportedFormat; the boundary must still produce a response
        let file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        let input = format!("[FILE:{}] what does this say", file.path().display());

        let mut history = SessionHistory::new();
        let out = agent.run(&input, &mut history).await;
        assert_eq!(out, "I could not parse that file, but here is what I know.");
    }

    #[tokio::test]
    async fn test_offline_search_warning_reaches_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_string_contains("[NOTE:"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "response": "offline answer" })),
            )
            .mount(&server)
            .await;
        let count = Arc::new(AtomicUsize::new(0));
        let (agent, _) = test_agent(&server, count);

        let mut history = SessionHistory::new();
        let out = agent
            .run("search for rust async runtimes", &mut history)
            .await;
        assert_eq!(out, "offline answer");
    }

    #[test]
    fn test_is_simple_query() {
        assert!(is_simple_query("hi"));
        assert!(is_simple_query("Hello!"));
        assert!(is_simple_query("thank you"));
        assert!(is_simple_query("how are you"));
        assert!(!is_simple_query("read file main.rs"));
        assert!(!is_simple_query("summarize this"));
        assert!(!is_simple_query("what is the capital of France"));
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime(Path::new("a.png")), "image/png");
        assert_eq!(guess_mime(Path::new("b.JPG")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("c.bin")), "application/octet-stream");
    }
}
