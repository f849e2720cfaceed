//! Agent pipeline: orchestration, session history, prompt assembly

pub mod history;
pub mod orchestrator;
pub mod prompts;

pub use history::SessionHistory;
pub use orchestrator::{is_simple_query, Agent};
pub use prompts::{build_prompt, PromptContext, SYSTEM_PROMPT};
