//! Prompt assembly
//!
//! Pure string construction: every optional context block is wrapped in a
//! labeled open/close delimiter pair so the model can tell retrieved memory
//! from file content from live web results. Sections appear in a fixed
//! order; the user query always comes last.

/// System prompt injected into every general completion
pub const SYSTEM_PROMPT: &str = "\
You are Skiff, a friendly and capable AI assistant.
You are conversational, helpful, and concise. Respond naturally.

For simple greetings (hi, hello, hey), respond warmly and briefly.
For questions, give clear, accurate answers.
For complex tasks, use your available tools.

Your available tools include:
- Web Search & Fetch (when the user needs current information)
- File Parsing & OCR (for documents and images)
- Command Execution & Summarization

IMPORTANT: Do NOT reference memory context, conversation data, or internal \
system details in your responses. Just respond naturally to what the user says.";

/// System prompt when a file was already read on the user's behalf
pub const FILE_READ_SYSTEM_PROMPT: &str = "\
You are Skiff, an AI assistant with local file access capability. \
You HAVE successfully read the user's file. The file content is provided \
below in the [FILE CONTENT] section. Respond about the file content based \
on what the user asked. Do NOT say you cannot access files. The file has \
ALREADY been read for you.";

/// System prompt for single-value extraction calls (search queries, paths)
pub const EXTRACT_QUERY_SYSTEM_PROMPT: &str =
    "You extract search queries. Reply with only the query text, no explanation.";

/// System prompt for extracting a file path from free text
pub const EXTRACT_PATH_SYSTEM_PROMPT: &str = "\
Extract the file path from the user's message. Reply with ONLY the file \
path, nothing else. If no specific path is mentioned, reply 'NONE'.";

/// Vision prompt used when analyzing an image end to end
pub const VISION_ANALYSIS_PROMPT: &str = "\
Analyze this image thoroughly. Describe:
1. All people visible (appearance, estimated age, notable features)
2. Objects, text, logos, or landmarks
3. The scene/setting/background
4. Any text visible in the image
If you recognize any famous person, celebrity, or public figure, state \
their name and why you think it's them.";

/// Character budget for an injected file before truncation
const FILE_CONTENT_BUDGET: usize = 8000;

/// Character budget for an injected web page before truncation
const WEB_CONTENT_BUDGET: usize = 6000;

/// Optional context gathered for one turn
#[derive(Debug, Default)]
pub struct PromptContext {
    /// Retrieved long-term memory, already formatted
    pub memory: String,
    /// Parsed file or OCR text
    pub file_content: String,
    /// Web search results
    pub web_results: String,
    /// Fetched page text
    pub web_content: String,
}

/// Assemble the full prompt for one turn. Empty sections are omitted;
/// the user query section is always present.
pub fn build_prompt(user_query: &str, ctx: &PromptContext) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !ctx.memory.is_empty() {
        parts.push(format!(
            "[PAST MEMORY CONTEXT]\n{}\n[END MEMORY]",
            ctx.memory
        ));
    }

    if !ctx.file_content.is_empty() {
        parts.push(format!(
            "[FILE CONTENT]\n{}\n[END FILE]",
            truncate_chars(
                &ctx.file_content,
                FILE_CONTENT_BUDGET,
                "\n... [content truncated for context limit]"
            )
        ));
    }

    if !ctx.web_results.is_empty() {
        parts.push(format!(
            "[WEB SEARCH RESULTS]\n{}\n[END SEARCH]",
            ctx.web_results
        ));
    }

    if !ctx.web_content.is_empty() {
        parts.push(format!(
            "[WEB PAGE CONTENT]\n{}\n[END PAGE]",
            truncate_chars(&ctx.web_content, WEB_CONTENT_BUDGET, "\n... [page content truncated]")
        ));
    }

    parts.push(format!("[USER QUERY]\n{}", user_query));

    parts.join("\n\n")
}

/// Truncate to a character budget, appending a marker only when content
/// was actually cut. Counts chars, not bytes, so multi-byte text never
/// splits mid-codepoint.
fn truncate_chars(text: &str, budget: usize, marker: &str) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(budget).collect();
    truncated.push_str(marker);
    truncated
}
