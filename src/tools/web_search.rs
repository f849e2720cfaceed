//! Web search via DuckDuckGo
//!
//! No API key, no registration. The instant-answer JSON API is tried
//! first; when it has nothing useful the HTML endpoint is scraped as a
//! fallback. Calls are self-rate-limited with a minimum gap between
//! searches. All failures come back as bracketed diagnostic text, never
//! as errors: a broken search should degrade the answer, not the turn.

use crate::config::SearchConfig;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Minimum gap between searches, to stay under DDG's throttling
const MIN_SEARCH_GAP: Duration = Duration::from_secs(1);

const INSTANT_ANSWER_BASE: &str = "https://api.duckduckgo.com";
const HTML_SEARCH_BASE: &str = "https://html.duckduckgo.com/html";

#[derive(Debug, Deserialize)]
struct InstantAnswer {
    #[serde(rename = "AbstractText")]
    abstract_text: Option<String>,
    #[serde(rename = "AbstractURL")]
    abstract_url: Option<String>,
    #[serde(rename = "Heading")]
    heading: Option<String>,
    #[serde(rename = "RelatedTopics")]
    related_topics: Option<Vec<RelatedTopic>>,
}

#[derive(Debug, Deserialize)]
struct RelatedTopic {
    #[serde(rename = "Text")]
    text: Option<String>,
    #[serde(rename = "FirstURL")]
    first_url: Option<String>,
}

/// One formatted search hit
#[derive(Debug, Clone)]
struct SearchHit {
    title: String,
    url: String,
    snippet: String,
}

/// DuckDuckGo search client. Owns its own rate-limit state, so two
/// instances never interfere with each other.
pub struct WebSearch {
    client: Client,
    config: SearchConfig,
    api_base: String,
    html_base: String,
    last_search: Mutex<Option<Instant>>,
}

impl WebSearch {
    /// Create a search client against the real DuckDuckGo endpoints
    pub fn new(config: SearchConfig) -> Self {
        Self::with_endpoints(
            config,
            INSTANT_ANSWER_BASE.to_string(),
            HTML_SEARCH_BASE.to_string(),
        )
    }

    /// Create a client against specific endpoints (tests point this at a
    /// mock server)
    pub fn with_endpoints(config: SearchConfig, api_base: String, html_base: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("Mozilla/5.0 (compatible; Skiff/0.1)")
            .build()
            .unwrap_or_default();

        WebSearch {
            client,
            config,
            api_base,
            html_base,
            last_search: Mutex::new(None),
        }
    }

    /// Search and return text ready for prompt injection. Never errors.
    pub async fn search(&self, query: &str) -> String {
        self.rate_limit().await;
        info!("Web search: '{}'", query);

        let hits = match self.instant_answer(query).await {
            Ok(hits) if !hits.is_empty() => hits,
            Ok(_) => match self.html_search(query).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!("HTML search fallback failed: {}", e);
                    return format!(
                        "[Web search failed: {}. You may be offline or rate-limited.]",
                        e
                    );
                }
            },
            Err(e) => {
                warn!("Web search failed: {}", e);
                return format!(
                    "[Web search failed: {}. You may be offline or rate-limited.]",
                    e
                );
            }
        };

        *self.last_search.lock().await = Some(Instant::now());

        if hits.is_empty() {
            return "[No search results found for this query.]".to_string();
        }

        hits.iter()
            .enumerate()
            .map(|(i, hit)| format!("{}. {}\n   URL: {}\n   {}", i + 1, hit.title, hit.url, hit.snippet))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    async fn rate_limit(&self) {
        let last = *self.last_search.lock().await;
        if let Some(last) = last {
            let elapsed = last.elapsed();
            if elapsed < MIN_SEARCH_GAP {
                tokio::time::sleep(MIN_SEARCH_GAP - elapsed).await;
            }
        }
    }

    async fn instant_answer(&self, query: &str) -> crate::error::Result<Vec<SearchHit>> {
        let url = format!(
            "{}/?q={}&format=json&no_html=1&skip_disambig=1",
            self.api_base,
            urlencode(query)
        );

        let response: InstantAnswer = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut hits = Vec::new();
        let max = self.config.max_results;

        if let (Some(text), Some(url)) = (&response.abstract_text, &response.abstract_url) {
            if !text.is_empty() {
                hits.push(SearchHit {
                    title: response.heading.clone().unwrap_or_else(|| url.clone()),
                    url: url.clone(),
                    snippet: text.clone(),
                });
            }
        }

        if let Some(topics) = response.related_topics {
            for topic in topics {
                if hits.len() >= max {
                    break;
                }
                if let (Some(text), Some(url)) = (topic.text, topic.first_url) {
                    let title = text.split(" - ").next().unwrap_or(&text).to_string();
                    hits.push(SearchHit {
                        title,
                        url,
                        snippet: text,
                    });
                }
            }
        }

        Ok(hits)
    }

    async fn html_search(&self, query: &str) -> crate::error::Result<Vec<SearchHit>> {
        let url = format!("{}/?q={}", self.html_base, urlencode(query));

        let html = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(parse_result_blocks(&html, self.config.max_results))
    }
}

/// Parse DuckDuckGo's HTML result blocks without a DOM library: split on
/// the result link class and pull the href, title, and snippet out of
/// each chunk.
fn parse_result_blocks(html: &str, max: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();

    for chunk in html.split("class=\"result__a\"").skip(1).take(max) {
        let url = chunk
            .split("href=\"")
            .nth(1)
            .and_then(|s| s.split('"').next())
            .map(unwrap_ddg_redirect);

        let title = chunk
            .split('>')
            .nth(1)
            .and_then(|s| s.split('<').next())
            .map(html_decode);

        let snippet = chunk
            .split("class=\"result__snippet\"")
            .nth(1)
            .and_then(|s| s.split('>').nth(1))
            .and_then(|s| s.split('<').next())
            .map(html_decode)
            .unwrap_or_default();

        if let (Some(url), Some(title)) = (url, title) {
            if !url.is_empty() && !title.is_empty() {
                hits.push(SearchHit { title, url, snippet });
            }
        }
    }

    hits
}

/// DDG wraps destination URLs in a redirect with a `uddg=` parameter
fn unwrap_ddg_redirect(href: &str) -> String {
    match href.split("uddg=").nth(1) {
        Some(encoded) => {
            let end = encoded.find('&').unwrap_or(encoded.len());
            urldecode(&encoded[..end])
        }
        None => href.to_string(),
    }
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

fn urldecode(s: &str) -> String {
    url::form_urlencoded::parse(format!("k={}", s).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| s.to_string())
}

fn html_decode(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> SearchConfig {
        SearchConfig {
            max_results: 5,
            timeout_secs: 5,
        }
    }

    fn search_against(server: &MockServer) -> WebSearch {
        WebSearch::with_endpoints(config(), server.uri(), server.uri())
    }

    #[tokio::test]
    async fn test_instant_answer_formats_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "AbstractText": "Rust is a systems programming language.",
                "AbstractURL": "https://rust-lang.org",
                "Heading": "Rust",
                "RelatedTopics": []
            })))
            .mount(&server)
            .await;

        let out = search_against(&server).search("rust language").await;
        assert!(out.contains("1. Rust"));
        assert!(out.contains("https://rust-lang.org"));
        assert!(out.contains("systems programming"));
    }

    #[tokio::test]
    async fn test_search_failure_returns_diagnostic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let out = search_against(&server).search("anything").await;
        assert!(out.starts_with("[Web search failed:"));
    }

    #[test]
    fn test_parse_result_blocks() {
        let html = r#"
            <a class="result__a" href="https://example.com/one">First Result</a>
            <a class="result__snippet">Snippet one</a>
            <a class="result__a" href="https://example.com/two">Second &amp; Result</a>
            <a class="result__snippet">Snippet two</a>
        "#;
        let hits = parse_result_blocks(html, 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "First Result");
        assert_eq!(hits[0].url, "https://example.com/one");
        assert_eq!(hits[1].title, "Second & Result");
    }

    #[test]
    fn test_unwrap_ddg_redirect() {
        let href = "//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fpage&rut=abc";
        assert_eq!(unwrap_ddg_redirect(href), "https://example.com/page");
        assert_eq!(unwrap_ddg_redirect("https://direct.com"), "https://direct.com");
    }

    #[test]
    fn test_html_decode() {
        assert_eq!(html_decode("a &amp; b"), "a & b");
        assert_eq!(html_decode("&lt;tag&gt;"), "<tag>");
    }
}
