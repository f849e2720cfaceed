//! Web page fetch
//!
//! Downloads a URL and strips it to readable text. Plain HTTP only: pages
//! that render through JavaScript come back empty, and the diagnostic says
//! so. Failures are bracketed text rather than errors.

use crate::config::SearchConfig;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

/// Container tags whose entire content is noise
const STRIP_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe",
];

/// HTML page fetcher
pub struct WebFetcher {
    client: Client,
    timeout_secs: u64,
}

impl WebFetcher {
    /// Create a fetcher with the configured timeout
    pub fn new(config: &SearchConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("Mozilla/5.0 (compatible; Skiff/0.1)")
            .build()
            .unwrap_or_default();

        WebFetcher {
            client,
            timeout_secs: config.timeout_secs,
        }
    }

    /// Fetch a URL and return cleaned page text. Never errors.
    pub async fn fetch(&self, url: &str) -> String {
        if url.is_empty() {
            return "[No URL provided.]".to_string();
        }

        let url = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{}", url)
        };

        info!("Fetching URL: {}", url);

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return format!(
                    "[Fetch timed out after {}s. The page may be too slow.]",
                    self.timeout_secs
                );
            }
            Err(e) if e.is_connect() => {
                return "[Connection failed. Check your internet or the URL.]".to_string();
            }
            Err(e) => {
                warn!("Fetch error: {}", e);
                return format!("[Fetch failed: {}]", e);
            }
        };

        if !response.status().is_success() {
            return format!("[HTTP error: status {}]", response.status());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.contains("text/html") && !content_type.contains("application/xhtml") {
            return format!("[Non-HTML content type: {}. Cannot extract text.]", content_type);
        }

        let html = match response.text().await {
            Ok(html) => html,
            Err(e) => return format!("[Failed to read page body: {}]", e),
        };

        let text = extract_text(&html);
        if text.is_empty() {
            return "[Page loaded but no readable text was found. It may be JS-rendered.]"
                .to_string();
        }

        info!("Extracted {} chars from page", text.len());
        text
    }
}

/// Strip an HTML document down to readable text: drop noise containers
/// wholesale, then remove remaining tags, decode common entities, and
/// collapse blank lines.
fn extract_text(html: &str) -> String {
    let mut cleaned = html.to_string();
    for tag in STRIP_TAGS {
        cleaned = strip_container(&cleaned, tag);
    }

    let mut text = String::with_capacity(cleaned.len() / 4);
    let mut in_tag = false;
    for c in cleaned.chars() {
        match c {
            '<' => {
                in_tag = true;
                // Tag boundaries break words apart
                text.push('\n');
            }
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }

    let decoded = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    decoded
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove `<tag ...>...</tag>` blocks, case-insensitively
fn strip_container(html: &str, tag: &str) -> String {
    let lower = html.to_lowercase();
    // Lowercasing can change byte offsets for some Unicode text; skip
    // stripping rather than slice at misaligned indices
    if lower.len() != html.len() {
        return html.to_string();
    }
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);

    let mut out = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(start) = lower[pos..].find(&open) {
        let start = pos + start;
        // Require a real tag boundary, not a prefix of a longer tag name
        let after = lower.as_bytes().get(start + open.len());
        if !matches!(after, Some(b' ') | Some(b'>') | Some(b'\n') | Some(b'\t') | Some(b'/')) {
            out.push_str(&html[pos..start + open.len()]);
            pos = start + open.len();
            continue;
        }

        out.push_str(&html[pos..start]);
        match lower[start..].find(&close) {
            Some(end) => pos = start + end + close.len(),
            None => {
                // Unclosed container: drop the rest
                pos = html.len();
            }
        }
    }
    out.push_str(&html[pos..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> WebFetcher {
        WebFetcher::new(&SearchConfig {
            max_results: 5,
            timeout_secs: 5,
        })
    }

    #[tokio::test]
    async fn test_fetch_extracts_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<html><head><script>var x = 1;</script></head>\
                 <body><h1>Title</h1><p>Body text here.</p></body></html>",
                "text/html",
            ))
            .mount(&server)
            .await;

        let out = fetcher().fetch(&server.uri()).await;
        assert!(out.contains("Title"));
        assert!(out.contains("Body text here."));
        assert!(!out.contains("var x"));
    }

    #[tokio::test]
    async fn test_fetch_non_html_diagnostic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("{\"a\":1}", "application/json"),
            )
            .mount(&server)
            .await;

        let out = fetcher().fetch(&server.uri()).await;
        assert!(out.starts_with("[Non-HTML content type:"));
    }

    #[tokio::test]
    async fn test_fetch_http_error_diagnostic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let out = fetcher().fetch(&server.uri()).await;
        assert!(out.contains("404"));
    }

    #[tokio::test]
    async fn test_fetch_empty_url() {
        assert_eq!(fetcher().fetch("").await, "[No URL provided.]");
    }

    #[test]
    fn test_extract_text_strips_noise_containers() {
        let html = "<body><nav>Menu</nav><p>Keep this</p><footer>Legal</footer></body>";
        let text = extract_text(html);
        assert!(text.contains("Keep this"));
        assert!(!text.contains("Menu"));
        assert!(!text.contains("Legal"));
    }

    #[test]
    fn test_extract_text_decodes_entities() {
        assert_eq!(extract_text("<p>a &amp; b</p>"), "a & b");
    }

    #[test]
    fn test_strip_container_tag_boundary() {
        // <header> must not swallow <head> content handling: "headline" tag
        // prefix must survive
        let html = "<headline>x</headline><header>gone</header>";
        let out = strip_container(html, "header");
        assert!(out.contains("headline"));
        assert!(!out.contains("gone"));
    }
}
