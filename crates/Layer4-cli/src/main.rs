//! CodeRelay CLI - Main entry point

mod cli;

use clap::Parser;
use relay_foundation::BridgeConfig;
use relay_task::TaskManager;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CodeRelay - hand a task to a coding-agent CLI and relay its questions
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Task prompt (alternative to the positional words)
    #[arg(short, long, conflicts_with = "words")]
    prompt: Option<String>,

    /// Task prompt as free words
    #[arg(value_name = "PROMPT")]
    words: Vec<String>,

    /// Model to use
    #[arg(long)]
    model: Option<String>,

    /// Agent CLI binary
    #[arg(long)]
    command: Option<String>,

    /// Comma-separated tool allow-list (default: skip permission prompts)
    #[arg(long, value_delimiter = ',')]
    allowed_tools: Vec<String>,

    /// Working directory for the agent process
    #[arg(short, long)]
    working_dir: Option<PathBuf>,

    /// Context key for session resume (e.g. "chat:123")
    #[arg(long)]
    context: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn prompt_text(&self) -> Option<String> {
        self.prompt
            .clone()
            .or_else(|| (!self.words.is_empty()).then(|| self.words.join(" ")))
            .filter(|p| !p.trim().is_empty())
    }

    /// Command-line values win over loaded configuration
    fn apply(&self, mut config: BridgeConfig) -> BridgeConfig {
        if let Some(command) = &self.command {
            config = config.command(command.clone());
        }
        if let Some(model) = &self.model {
            config = config.model(model.clone());
        }
        if !self.allowed_tools.is_empty() {
            config = config.allowed_tools(self.allowed_tools.iter().cloned());
        }
        if let Some(dir) = &self.working_dir {
            config = config.working_dir(dir.clone());
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr, so stdout carries only task output)
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let Some(prompt) = args.prompt_text() else {
        anyhow::bail!("no prompt given; pass --prompt TEXT or the prompt as arguments");
    };

    // Load configuration
    let config = BridgeConfig::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}", e);
        BridgeConfig::default()
    });
    let manager = TaskManager::new(args.apply(config));

    let completed = cli::run_once(&manager, &prompt, args.context.as_deref()).await?;
    if !completed {
        std::process::exit(1);
    }
    Ok(())
}
