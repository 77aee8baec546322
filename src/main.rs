//! # codelink CLI
//!
//! ## Usage
//!
//! ```bash
//! codelink --config ./config/codelink.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `codelink init` | Create the SQLite database and schema |
//! | `codelink serve` | Start the HTTP server (webhooks, chat, accounts) |
//! | `codelink sync <repo> <url>` | Sync a compare or commit URL into a registered project |
//! | `codelink ask "<question>" --project-id <id>` | Run one chat request |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use codelink::analysis::DocRequest;
use codelink::chat::{ChatDispatcher, ChatMode, ChatRequest};
use codelink::config;
use codelink::migrate;
use codelink::server;
use codelink::services::Services;
use codelink::sync::{compare_and_embed, ChangeSource};

/// codelink: keeps a searchable index of GitHub repositories and answers
/// questions about their code.
#[derive(Parser)]
#[command(name = "codelink", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/codelink.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Sync one change set into a registered project.
    ///
    /// URLs containing `/compare/` are treated as comparisons, anything
    /// else as a single commit.
    Sync {
        /// Repository full name (`owner/name`) as registered.
        repo: String,

        /// GitHub API compare or commit URL.
        url: String,
    },

    /// Ask a question about a project and print the answer.
    Ask {
        question: String,

        #[arg(long)]
        project_id: String,

        /// Chat mode: bugs, read, docs, progress, complete, or conversational.
        #[arg(long)]
        mode: Option<String>,

        /// Conversation memory key (defaults to the project id).
        #[arg(long)]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Sync { repo, url } => {
            let services = Services::from_config(&cfg).await?;
            let project = services
                .projects
                .find_project_by_name(&repo)
                .await?
                .with_context(|| format!("Project '{}' is not registered", repo))?;
            if project.auth_token.is_empty() {
                bail!("Project '{}' has no stored token", repo);
            }

            let source = if url.contains("/compare/") {
                ChangeSource::Compare(url)
            } else {
                ChangeSource::Commit(url)
            };
            let report =
                compare_and_embed(&services, &project.auth_token, &project.id, &source).await?;

            println!(
                "Sync {}: {} embedded, {} deleted, {} skipped, {} failed",
                repo,
                report.embedded.len(),
                report.deleted.len(),
                report.skipped.len(),
                report.failed.len()
            );
            for failure in &report.failed {
                println!("  failed {}: {}", failure.filename, failure.error);
            }
        }
        Commands::Ask {
            question,
            project_id,
            mode,
            session,
        } => {
            let services = Services::from_config(&cfg).await?;
            let request = ChatRequest {
                question,
                project_id,
                mode: ChatMode::from_type(mode.as_deref()),
                session_id: session,
                doc: DocRequest::default(),
            };
            request.validate()?;

            let answer = ChatDispatcher::new(&services).dispatch(&request).await?;
            println!("{}", answer);
        }
    }

    Ok(())
}
