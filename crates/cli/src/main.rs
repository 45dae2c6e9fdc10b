//! SmartSeva CLI — the main entry point.
//!
//! Commands:
//! - `ask`      — Answer a single question
//! - `chat`     — Interactive chat backed by the session log
//! - `sessions` — List, show, delete, or clean up stored sessions
//! - `status`   — Show configuration and pipeline health
//! - `onboard`  — Write a default config file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "smartseva",
    about = "SmartSeva — answers about Indian government services",
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

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        /// The question
        question: String,

        /// Continue an existing session
        #[arg(short, long)]
        session: Option<String>,

        /// Print the query report as JSON after the answer
        #[arg(long)]
        report: bool,
    },

    /// Start an interactive chat
    Chat {
        /// Resume a stored session
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Manage stored sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Show configuration and pipeline health
    Status,

    /// Initialize configuration
    Onboard,
}

#[derive(Subcommand)]
enum SessionAction {
    /// List sessions, most recent first
    List,
    /// Print a session's transcript
    Show { id: String },
    /// Delete a session
    Delete { id: String },
    /// Remove sessions without messages
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ask {
            question,
            session,
            report,
        } => commands::ask::run(question, session, report).await?,
        Commands::Chat { session } => commands::chat::run(session).await?,
        Commands::Sessions { action } => match action {
            SessionAction::List => commands::sessions::list().await?,
            SessionAction::Show { id } => commands::sessions::show(&id).await?,
            SessionAction::Delete { id } => commands::sessions::delete(&id).await?,
            SessionAction::Cleanup => commands::sessions::cleanup().await?,
        },
        Commands::Status => commands::status::run().await?,
        Commands::Onboard => commands::onboard::run().await?,
    }

    Ok(())
}
