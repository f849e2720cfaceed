//! Skiff CLI
//!
//! Interactive chat REPL plus one-shot commands. This binary is the
//! composition root: it loads configuration, builds the LLM client and
//! memory store, and hands them to the agent.

use clap::{Parser, Subcommand};
use console::style;
use futures::StreamExt;
use skiff::agent::{Agent, SessionHistory};
use skiff::config::Config;
use skiff::llm::LlmClient;
use skiff::memory::MemoryStore;
use skiff::{net, Result, VERSION};
use std::io::{self, BufRead, Write};

#[derive(Parser)]
#[command(
    name = "skiff",
    author = "Skiff Contributors",
    version = VERSION,
    about = "Local-first AI assistant with memory and offline fallback",
    long_about = None
)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "skiff.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat,

    /// One-shot question, streamed straight from the model (no tools)
    Ask {
        /// The question to ask
        prompt: String,
    },

    /// Show connectivity and backend status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("skiff=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load_from(std::path::Path::new(&cli.config))?;

    match cli.command {
        Some(Commands::Ask { prompt }) => ask(&config, &prompt).await,
        Some(Commands::Status) => status(&config).await,
        Some(Commands::Chat) | None => chat(&config).await,
    }
}

async fn build_agent(config: &Config) -> Result<Agent> {
    let llm = LlmClient::new(config.llm.clone())?;
    let memory = MemoryStore::open(&config.memory).await?;
    Ok(Agent::new(llm, memory, config))
}

/// Interactive REPL. One session history, one memory store, kept for the
/// lifetime of the process.
async fn chat(config: &Config) -> Result<()> {
    println!();
    println!("  {}", style("Skiff").cyan().bold());
    println!(
        "  {}",
        style("Local-first assistant. Type 'exit' to quit, 'clear' to reset the session.").dim()
    );
    println!();

    let agent = build_agent(config).await?;
    let mut history = SessionHistory::new();

    let stdin = io::stdin();
    loop {
        print!("{} ", style("you ❯").green().bold());
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();

        match input {
            "" => continue,
            "exit" | "quit" => break,
            "clear" => {
                history.clear();
                println!("  {}", style("Session history cleared.").dim());
                continue;
            }
            _ => {}
        }

        let response = agent.run(input, &mut history).await;
        println!("{} {}", style("skiff ❯").cyan().bold(), response);
        println!();
    }

    println!("  {}", style("Goodbye.").dim());
    Ok(())
}

/// One-shot streamed completion, bypassing routing and memory
async fn ask(config: &Config, prompt: &str) -> Result<()> {
    let llm = LlmClient::new(config.llm.clone())?;

    let mut stream = llm.stream_generate(prompt, None, &[]).await;
    while let Some(chunk) = stream.next().await {
        print!("{}", chunk);
        io::stdout().flush()?;
    }
    println!();
    Ok(())
}

async fn status(config: &Config) -> Result<()> {
    println!();
    println!("  {} v{}", style("Skiff status").cyan().bold(), VERSION);
    println!();

    print!("  Internet connectivity... ");
    io::stdout().flush()?;
    if net::is_reachable(&config.network).await {
        println!("{}", style("online").green());
    } else {
        println!("{}", style("offline").yellow());
    }

    print!("  Preferred model backend... ");
    io::stdout().flush()?;
    let llm = LlmClient::new(config.llm.clone())?;
    if llm.is_available().await {
        println!("{}", style("available").green());
    } else {
        println!(
            "{}",
            style("unavailable (responses will use the fallback path)").yellow()
        );
    }

    match &config.memory.data_path {
        Some(path) => println!("  Memory index path: {}", style(path.display()).cyan()),
        None => println!("  Memory index: {}", style("in-memory only").cyan()),
    }

    println!();
    Ok(())
}
