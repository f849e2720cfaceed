//! External collaborators: file parsing, command sandbox, web tools

pub mod file_ops;
pub mod parse;
pub mod run_command;
pub mod web_fetch;
pub mod web_search;

pub use file_ops::FileOps;
pub use parse::{FileParser, PlainTextParser};
pub use run_command::CommandSandbox;
pub use web_fetch::WebFetcher;
pub use web_search::WebSearch;
