//! TAOR CLI: the main entry point.
//!
//! Commands:
//! - `chat`: Interactive chat with the agent in this terminal
//! - `serve`: Run the line-delimited JSON-RPC server on stdin/stdout
//! - `tools`: List the registered tools

use clap::{Args, Parser, Subcommand};
use taor_config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "taor",
    about = "TAOR — Think-Act-Observe-Repeat agent core",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Backend selection shared by `chat` and `serve`.
#[derive(Args, Debug, Clone, Default)]
pub struct BackendArgs {
    /// Provider family: anthropic, openai, gemini or ollama
    #[arg(long, env = "TAOR_PROVIDER")]
    pub provider: Option<String>,

    /// Model id (defaults to the provider's default model)
    #[arg(long, env = "TAOR_MODEL")]
    pub model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent interactively
    Chat {
        #[command(flatten)]
        backend: BackendArgs,

        /// Run approval-gated tools without asking
        #[arg(long)]
        auto_approve: bool,

        /// Resume a saved session by id
        #[arg(long, value_name = "SESSION_ID")]
        resume: Option<String>,
    },

    /// Serve the stdio protocol (logs go to stderr)
    Serve {
        #[command(flatten)]
        backend: BackendArgs,
    },

    /// List registered tools
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let serving = matches!(cli.command, Commands::Serve { .. });
    init_tracing(cli.verbose, serving);

    let config = AppConfig::load()?;

    match cli.command {
        Commands::Chat {
            backend,
            auto_approve,
            resume,
        } => commands::chat::run(config, backend, auto_approve, resume).await?,
        Commands::Serve { backend } => commands::serve::run(config, backend).await?,
        Commands::Tools => commands::tools::run()?,
    }

    Ok(())
}

/// Install the subscriber. Stdout belongs to the protocol in serve mode, so
/// logs go to stderr there; chat keeps the terminal quiet unless asked.
fn init_tracing(verbose: bool, serving: bool) {
    let filter = match (verbose, serving) {
        (true, _) => "debug",
        (false, true) => "info",
        (false, false) => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
