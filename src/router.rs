//! Intent router
//!
//! Maps raw user text to a (tool, context) pair. Intentionally not ML-based:
//! an ordered cascade of keyword and pattern rules keeps routing fast,
//! deterministic, and debuggable rule-by-rule. The rules are evaluated in a
//! fixed, documented order; the first match wins:
//!
//! 1. Explicit `[FILE:<path>]` tag (dispatch by extension)
//! 2. Raw absolute filesystem path in free text
//! 3. OCR keywords
//! 4. Command-execution keywords
//! 5. Literal URL or fetch keywords (connectivity-gated)
//! 6. Search keywords (connectivity-gated)
//! 7. Summarization keywords
//! 8. File-operation keywords
//! 9. Default: general
//!
//! Online rules re-check connectivity at routing time and downgrade to
//! `General` with an explicit offline warning instead of letting the tool
//! fail later. The router itself never errors.

use crate::config::NetworkConfig;
use crate::net;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

/// The closed set of routable tools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Parse a text/document file and analyze it
    ParseFile,
    /// Extract text from an image (OCR)
    OcrImage,
    /// Vision-model image analysis
    AnalyzeImage,
    /// Summarize pasted or referenced text
    Summarize,
    /// Sandboxed command execution
    RunCommand,
    /// Read/list/search project files
    FileOps,
    /// Web search
    WebSearch,
    /// Fetch and read a web page
    WebFetch,
    /// Direct model response
    General,
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ToolKind::ParseFile => "parse_file",
            ToolKind::OcrImage => "ocr_image",
            ToolKind::AnalyzeImage => "analyze_image",
            ToolKind::Summarize => "summarize",
            ToolKind::RunCommand => "run_command",
            ToolKind::FileOps => "file_ops",
            ToolKind::WebSearch => "web_search",
            ToolKind::WebFetch => "web_fetch",
            ToolKind::General => "general",
        };
        write!(f, "{}", name)
    }
}

/// Context extracted alongside the tool selection.
/// Produced once per message, consumed exactly once by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct RouteContext {
    /// The full user message
    pub prompt: String,
    /// Path from an explicit `[FILE:...]` tag
    pub filepath: Option<PathBuf>,
    /// Raw path detected in free text
    pub detected_path: Option<String>,
    /// URL for web fetch
    pub url: Option<String>,
    /// Query for web search
    pub query: Option<String>,
    /// Set when an online tool was downgraded because the machine is offline
    pub offline_warning: Option<String>,
}

impl RouteContext {
    fn for_prompt(text: &str) -> Self {
        RouteContext {
            prompt: text.to_string(),
            ..Default::default()
        }
    }
}

static FILE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[FILE:([^\]]+)\]").unwrap());

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s]+").unwrap());

// Raw-path patterns, tried strictly in this order. Quoted paths go first
// because unconstrained path regexes over-match; a path containing spaces
// is only recoverable from the quoted form.
static QUOTED_WIN_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']([A-Za-z]:\\[^"']+)["']"#).unwrap());
// Unquoted patterns are anchored to start-of-text or a separator, and the
// forward-slash form forbids a second slash after the drive colon, so the
// scheme and path portions of a URL (https://..., example.com/home/...)
// never match
static WIN_PATH_WITH_EXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[\s"'(\[])([A-Za-z]:\\[^\s"'<>|]+\.[A-Za-z0-9]{1,5})"#).unwrap()
});
static WIN_FORWARD_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[\s"'(\[])([A-Za-z]:/[^\s"'<>|/][^\s"'<>|]*)"#).unwrap()
});
static UNIX_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[\s"'(\[])(/(?:home|usr|etc|var|tmp|opt|mnt|srv|Users)/[^\s"'<>|]+)"#)
        .unwrap()
});

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff", "gif", "webp"];

const PARSEABLE_EXTENSIONS: &[&str] = &[
    "txt", "md", "pdf", "docx", "csv", "json", "log", "rs", "py", "toml", "yaml", "yml",
];

const OCR_KEYWORDS: &[&str] = &["ocr", "read image", "extract text from image", "scan image"];

const COMMAND_KEYWORDS: &[&str] = &["run command", "execute", "shell", "terminal", "run this"];

const FETCH_KEYWORDS: &[&str] = &[
    "fetch", "open url", "visit", "go to", "load page", "read website",
];

const SEARCH_KEYWORDS: &[&str] = &[
    "search",
    "google",
    "find online",
    "look up",
    "what is the latest",
    "current",
    "news",
    "today",
    "who is",
    "who was",
    "tell me about",
    "info on",
    "biography of",
    "history of",
    "price of",
    "stock",
    "weather",
    "latest on",
];

const SUMMARIZE_KEYWORDS: &[&str] = &[
    "summarize", "summary", "tldr", "tl;dr", "shorten", "brief", "key points", "main points",
];

const FILE_OPS_KEYWORDS: &[&str] = &[
    "read file",
    "show code",
    "open file",
    "read code",
    "show file",
    "list files",
    "project files",
    "show project",
    "project structure",
    "search in files",
    "find in code",
    "grep",
    "fix error",
    "fix bug",
    "fix code",
    "write file",
    "edit file",
];

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| haystack.contains(kw))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

/// Stateless intent router. Owns only the probe configuration needed by
/// the connectivity-gated rules.
pub struct Router {
    network: NetworkConfig,
}

impl Router {
    /// Create a router with the given probe configuration
    pub fn new(network: NetworkConfig) -> Self {
        Router { network }
    }

    /// Route user text to a (tool, context) pair. Never fails: ambiguous
    /// or unparseable input resolves to `General`.
    pub async fn route(&self, user_input: &str) -> (ToolKind, RouteContext) {
        let text = user_input.trim();
        let text_lower = text.to_lowercase();

        // Rule 1: explicit file tag
        if let Some(routed) = self.rule_file_tag(text, &text_lower) {
            return routed;
        }

        // Rule 2: raw absolute path in free text
        if let Some(routed) = self.rule_raw_path(text) {
            return routed;
        }

        // Rule 3: OCR keywords
        if contains_any(&text_lower, OCR_KEYWORDS) {
            return (ToolKind::OcrImage, RouteContext::for_prompt(text));
        }

        // Rule 4: command execution keywords
        if contains_any(&text_lower, COMMAND_KEYWORDS) {
            return (ToolKind::RunCommand, RouteContext::for_prompt(text));
        }

        // Rule 5: URL fetch
        let url_match = URL_PATTERN.find(text).map(|m| m.as_str().to_string());
        if url_match.is_some() || contains_any(&text_lower, FETCH_KEYWORDS) {
            return self.gated_online(
                text,
                ToolKind::WebFetch,
                url_match,
                "Web fetch requires internet. You are currently offline.",
            )
            .await;
        }

        // Rule 6: web search keywords
        if contains_any(&text_lower, SEARCH_KEYWORDS) {
            return self.gated_online(
                text,
                ToolKind::WebSearch,
                None,
                "Web search requires internet. You are currently offline.",
            )
            .await;
        }

        // Rule 7: summarization keywords
        if contains_any(&text_lower, SUMMARIZE_KEYWORDS) {
            return (ToolKind::Summarize, RouteContext::for_prompt(text));
        }

        // Rule 8: file operation keywords
        if contains_any(&text_lower, FILE_OPS_KEYWORDS) {
            return (ToolKind::FileOps, RouteContext::for_prompt(text));
        }

        // Rule 9: default
        (ToolKind::General, RouteContext::for_prompt(text))
    }

    /// Rule 1: `[FILE:<path>]` tag, dispatched by extension when the path
    /// exists. A missing path falls through to General rather than routing
    /// a tool at a file that is not there.
    fn rule_file_tag(&self, text: &str, text_lower: &str) -> Option<(ToolKind, RouteContext)> {
        let captures = FILE_TAG.captures(text)?;
        let filepath = PathBuf::from(captures[1].trim());

        if !filepath.exists() {
            return Some((ToolKind::General, RouteContext::for_prompt(text)));
        }

        let ext = extension_of(&filepath).unwrap_or_default();
        let mut ctx = RouteContext::for_prompt(text);
        ctx.filepath = Some(filepath);

        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            // OCR only on explicit request; otherwise full vision analysis
            if contains_any(text_lower, OCR_KEYWORDS) {
                return Some((ToolKind::OcrImage, ctx));
            }
            return Some((ToolKind::AnalyzeImage, ctx));
        }
        if PARSEABLE_EXTENSIONS.contains(&ext.as_str()) {
            return Some((ToolKind::ParseFile, ctx));
        }

        Some((ToolKind::General, RouteContext::for_prompt(text)))
    }

    /// Rule 2: raw absolute path in free text
    fn rule_raw_path(&self, text: &str) -> Option<(ToolKind, RouteContext)> {
        let detected = detect_raw_path(text)?;
        debug!("Detected raw path in input: {}", detected);

        let mut ctx = RouteContext::for_prompt(text);
        ctx.detected_path = Some(detected);
        Some((ToolKind::FileOps, ctx))
    }

    /// Shared online gate for rules 5 and 6: re-check connectivity at this
    /// instant and downgrade to General with an explicit warning when
    /// offline. Never attempt the online tool just to watch it fail.
    async fn gated_online(
        &self,
        text: &str,
        tool: ToolKind,
        url: Option<String>,
        warning: &str,
    ) -> (ToolKind, RouteContext) {
        if !net::is_reachable(&self.network).await {
            let mut ctx = RouteContext::for_prompt(text);
            ctx.offline_warning = Some(warning.to_string());
            return (ToolKind::General, ctx);
        }

        let mut ctx = RouteContext::for_prompt(text);
        ctx.url = url;
        if tool == ToolKind::WebSearch {
            ctx.query = Some(text.to_string());
        }
        (tool, ctx)
    }
}

/// Try the raw-path patterns in over-match-safe order and return the first
/// hit. Quoted first; unquoted patterns cannot recover paths with spaces.
pub fn detect_raw_path(text: &str) -> Option<String> {
    if let Some(c) = QUOTED_WIN_PATH.captures(text) {
        return Some(c[1].to_string());
    }
    if let Some(c) = WIN_PATH_WITH_EXT.captures(text) {
        return Some(c[1].to_string());
    }
    if let Some(c) = WIN_FORWARD_PATH.captures(text) {
        return Some(c[1].to_string());
    }
    if let Some(c) = UNIX_PATH.captures(text) {
        return Some(c[1].to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn online_network() -> NetworkConfig {
        // A listener we own: the probe always succeeds
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        // Leak the listener so it stays bound for the test duration
        std::mem::forget(listener);
        NetworkConfig {
            check_host: "127.0.0.1".to_string(),
            check_port: port,
            check_timeout_secs: 1,
        }
    }

    fn offline_network() -> NetworkConfig {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        NetworkConfig {
            check_host: "127.0.0.1".to_string(),
            check_port: port,
            check_timeout_secs: 1,
        }
    }

    #[tokio::test]
    async fn test_file_tag_existing_document_routes_to_parse() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "content").unwrap();
        let input = format!("[FILE:{}] analyze this", file.path().display());

        let router = Router::new(offline_network());
        let (tool, ctx) = router.route(&input).await;
        assert_eq!(tool, ToolKind::ParseFile);
        assert_eq!(ctx.filepath.as_deref(), Some(file.path()));
    }

    #[tokio::test]
    async fn test_file_tag_missing_path_falls_to_general() {
        let router = Router::new(offline_network());
        let (tool, ctx) = router
            .route("[FILE:/tmp/definitely-not-here-489213.pdf] analyze this")
            .await;
        assert_eq!(tool, ToolKind::General);
        assert!(ctx.filepath.is_none());
    }

    #[tokio::test]
    async fn test_file_tag_image_routes_to_analysis() {
        let file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        let input = format!("[FILE:{}] what is in this picture", file.path().display());

        let router = Router::new(offline_network());
        let (tool, _) = router.route(&input).await;
        assert_eq!(tool, ToolKind::AnalyzeImage);
    }

    #[tokio::test]
    async fn test_file_tag_image_with_ocr_keyword_routes_to_ocr() {
        let file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        let input = format!("[FILE:{}] ocr this please", file.path().display());

        let router = Router::new(offline_network());
        let (tool, _) = router.route(&input).await;
        assert_eq!(tool, ToolKind::OcrImage);
    }

    #[tokio::test]
    async fn test_raw_unix_path_routes_to_file_ops() {
        let router = Router::new(offline_network());
        let (tool, ctx) = router.route("please read /home/alice/notes.txt for me").await;
        assert_eq!(tool, ToolKind::FileOps);
        assert_eq!(ctx.detected_path.as_deref(), Some("/home/alice/notes.txt"));
    }

    #[tokio::test]
    async fn test_quoted_windows_path_with_spaces() {
        let router = Router::new(offline_network());
        let (tool, ctx) = router
            .route(r#"open "C:\My Documents\report final.docx" please"#)
            .await;
        assert_eq!(tool, ToolKind::FileOps);
        assert_eq!(
            ctx.detected_path.as_deref(),
            Some(r"C:\My Documents\report final.docx")
        );
    }

    #[test]
    fn test_raw_path_pattern_order() {
        // Quoted wins over the bare-extension pattern
        assert_eq!(
            detect_raw_path(r#"check 'C:\a b\c.txt' now"#).as_deref(),
            Some(r"C:\a b\c.txt")
        );
        assert_eq!(
            detect_raw_path(r"check C:\direct\file.txt now").as_deref(),
            Some(r"C:\direct\file.txt")
        );
        assert_eq!(
            detect_raw_path("check C:/forward/style/path now").as_deref(),
            Some("C:/forward/style/path")
        );
        assert_eq!(
            detect_raw_path("check /etc/hosts now").as_deref(),
            Some("/etc/hosts")
        );
        assert_eq!(detect_raw_path("no path here"), None);
    }

    #[test]
    fn test_url_path_segment_is_not_a_raw_path() {
        assert_eq!(detect_raw_path("see https://example.com/home/a/b"), None);
        assert_eq!(detect_raw_path("see http://cdn.io/usr/share/pkg.tar"), None);
        // A real path after a URL is still found
        assert_eq!(
            detect_raw_path("compare https://example.com/home with /etc/hosts").as_deref(),
            Some("/etc/hosts")
        );
    }

    #[tokio::test]
    async fn test_url_with_pathlike_segment_routes_to_fetch() {
        // The /home/... segment belongs to the URL; rule 5 must win
        let router = Router::new(online_network());
        let (tool, ctx) = router.route("fetch https://example.com/home/a/b now").await;
        assert_eq!(tool, ToolKind::WebFetch);
        assert_eq!(ctx.url.as_deref(), Some("https://example.com/home/a/b"));
        assert!(ctx.detected_path.is_none());
    }

    #[tokio::test]
    async fn test_ocr_keywords_route() {
        let router = Router::new(offline_network());
        let (tool, _) = router.route("can you ocr the receipt").await;
        assert_eq!(tool, ToolKind::OcrImage);
    }

    #[tokio::test]
    async fn test_command_keywords_route() {
        let router = Router::new(offline_network());
        let (tool, _) = router.route("run command: echo hello").await;
        assert_eq!(tool, ToolKind::RunCommand);
    }

    #[tokio::test]
    async fn test_url_online_routes_to_fetch() {
        let router = Router::new(online_network());
        let (tool, ctx) = router.route("check https://example.com/page for me").await;
        assert_eq!(tool, ToolKind::WebFetch);
        assert_eq!(ctx.url.as_deref(), Some("https://example.com/page"));
    }

    #[tokio::test]
    async fn test_url_offline_downgrades_with_warning() {
        let router = Router::new(offline_network());
        let (tool, ctx) = router.route("check https://example.com/page for me").await;
        assert_eq!(tool, ToolKind::General);
        assert!(ctx.offline_warning.as_deref().unwrap().contains("offline"));
    }

    #[tokio::test]
    async fn test_search_online() {
        let router = Router::new(online_network());
        let (tool, ctx) = router.route("search for rust async runtimes").await;
        assert_eq!(tool, ToolKind::WebSearch);
        assert_eq!(ctx.query.as_deref(), Some("search for rust async runtimes"));
    }

    #[tokio::test]
    async fn test_search_offline_downgrades_with_warning() {
        let router = Router::new(offline_network());
        let (tool, ctx) = router.route("search for rust async runtimes").await;
        assert_eq!(tool, ToolKind::General);
        assert!(!ctx.offline_warning.as_deref().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_summarize_keywords_route() {
        let router = Router::new(offline_network());
        let (tool, _) = router.route("summarize: some long document text").await;
        assert_eq!(tool, ToolKind::Summarize);
    }

    #[tokio::test]
    async fn test_file_ops_keywords_route() {
        let router = Router::new(offline_network());
        let (tool, _) = router.route("list files in the project").await;
        assert_eq!(tool, ToolKind::FileOps);
    }

    #[tokio::test]
    async fn test_default_is_general() {
        let router = Router::new(offline_network());
        let (tool, ctx) = router.route("why is the sky blue?").await;
        assert_eq!(tool, ToolKind::General);
        assert_eq!(ctx.prompt, "why is the sky blue?");
        assert!(ctx.offline_warning.is_none());
    }

    #[tokio::test]
    async fn test_command_takes_precedence_over_search() {
        // "execute" (rule 4) must win over "search" (rule 6)
        let router = Router::new(offline_network());
        let (tool, _) = router.route("execute the search script").await;
        assert_eq!(tool, ToolKind::RunCommand);
    }
}
