//! Sandboxed command execution
//!
//! Security model:
//! 1. Whitelist only: the base command must appear in the configured list.
//! 2. Timeout kill: a command exceeding the limit is killed, not awaited.
//! 3. No shell: argv is passed directly to the process, never a shell line.
//! 4. No privilege change: the child inherits the current user.
//!
//! The model extracts a JSON argv from the user's natural language; the
//! sandbox validates and runs it. All outcomes, including refusals, come
//! back as user-facing text so one misbehaving command never aborts a turn.

use crate::config::SandboxConfig;
use crate::llm::LlmClient;
use std::process::Stdio;
use std::time::Duration;
use tracing::{info, warn};

/// System prompt for argv extraction
const EXTRACT_CMD_SYSTEM: &str = "\
You are a command parser. The user wants to run a shell command.
Extract EXACTLY the command and its arguments from the user's message.
Return ONLY a JSON array of strings. Example: [\"echo\", \"hello\", \"world\"]
Do NOT add explanations. Do NOT add shell operators like |, >, ;, &&.
If no clear command is found, return: [\"echo\", \"No command detected.\"]";

/// Whitelist-enforcing command runner
pub struct CommandSandbox {
    config: SandboxConfig,
}

impl CommandSandbox {
    /// Create a sandbox with the given policy
    pub fn new(config: SandboxConfig) -> Self {
        CommandSandbox { config }
    }

    /// Full pipeline: extract argv with the model, validate, execute.
    /// Always returns user-facing text.
    pub async fn run(&self, user_prompt: &str, llm: &LlmClient) -> String {
        if !self.config.enabled {
            return "[Sandboxed command execution is disabled in the configuration.]".to_string();
        }

        let raw = llm.generate(user_prompt, Some(EXTRACT_CMD_SYSTEM), &[]).await;

        let argv = match parse_argv(&raw) {
            Some(argv) if !argv.is_empty() => argv,
            _ => {
                warn!("Failed to parse command from model output: {}", raw);
                return format!("[Could not parse a command. Model returned: {}]", raw);
            }
        };

        self.execute(&argv).await
    }

    /// Validate an argv against the whitelist and run it with a timeout
    pub async fn execute(&self, argv: &[String]) -> String {
        let Some(first) = argv.first() else {
            return "[No command provided.]".to_string();
        };
        let base = first.trim().to_lowercase();

        if !self.config.allowed_commands.iter().any(|c| c == &base) {
            return format!(
                "[Command '{}' is not allowed. Allowed commands: {}]",
                base,
                self.config.allowed_commands.join(", ")
            );
        }

        // Resolve through PATH up front for a clear not-installed message
        let program = match which::which(&base) {
            Ok(path) => path,
            Err(_) => return format!("[Command '{}' not found on this system.]", base),
        };

        info!("Executing sandboxed command: {:?}", argv);

        let mut child = match tokio::process::Command::new(&program)
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return format!("[Failed to start '{}': {}]", base, e),
        };

        let limit = Duration::from_secs(self.config.max_execution_secs);
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return format!("[Execution error: {}]", e),
            Err(_) => {
                // kill_on_drop reaps the child when the future is dropped
                return format!(
                    "[Command timed out after {}s. Increase sandbox.max_execution_secs if needed.]",
                    self.config.max_execution_secs
                );
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            return format!("[Command exited with code {}. Stderr: {}]", code, stderr);
        }

        if stdout.is_empty() {
            "[Command completed with no output.]".to_string()
        } else {
            stdout
        }
    }
}

/// Parse a JSON string array out of model output, tolerating markdown
/// code fences around it.
fn parse_argv(raw: &str) -> Option<Vec<String>> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str::<Vec<String>>(cleaned).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> CommandSandbox {
        CommandSandbox::new(SandboxConfig {
            enabled: true,
            allowed_commands: vec!["echo".to_string()],
            max_execution_secs: 5,
        })
    }

    #[test]
    fn test_parse_argv_plain() {
        assert_eq!(
            parse_argv(r#"["echo", "hello"]"#),
            Some(vec!["echo".to_string(), "hello".to_string()])
        );
    }

    #[test]
    fn test_parse_argv_fenced() {
        let raw = "```json\n[\"echo\", \"hi\"]\n```";
        assert_eq!(
            parse_argv(raw),
            Some(vec!["echo".to_string(), "hi".to_string()])
        );
    }

    #[test]
    fn test_parse_argv_garbage() {
        assert_eq!(parse_argv("sure, run echo hello"), None);
    }

    #[tokio::test]
    async fn test_execute_whitelisted_command() {
        let out = sandbox()
            .execute(&["echo".to_string(), "hello".to_string()])
            .await;
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_execute_rejects_non_whitelisted() {
        let out = sandbox().execute(&["rm".to_string(), "-rf".to_string()]).await;
        assert!(out.contains("not allowed"));
        assert!(out.contains("echo"));
    }

    #[tokio::test]
    async fn test_execute_empty_output_message() {
        let out = sandbox().execute(&["echo".to_string(), "-n".to_string()]).await;
        assert!(out.contains("no output"));
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let sandbox = CommandSandbox::new(SandboxConfig {
            enabled: true,
            allowed_commands: vec!["sleep".to_string()],
            max_execution_secs: 1,
        });

        let start = std::time::Instant::now();
        let out = sandbox.execute(&["sleep".to_string(), "30".to_string()]).await;
        assert!(out.contains("timed out"));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
