//! # Skiff
//!
//! A local-first conversational agent with semantic memory and automatic
//! online/offline failover.
//!
//! ## Features
//!
//! - **Intent routing:** deterministic keyword/pattern cascade, no ML classifier
//! - **Semantic memory:** fastembed embeddings over past turns, relevance-gated
//! - **Provider failover:** cloud chat completions with a local Ollama-style
//!   runtime as the always-available fallback
//! - **Streaming:** SSE token streams with mid-stream local fallback
//! - **Tools:** file parsing, sandboxed commands, project file ops, web
//!   search and fetch

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod net;
pub mod router;
pub mod tools;

pub use config::Config;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
