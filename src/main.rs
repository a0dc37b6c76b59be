//! # Onboard CLI (`onboard`)
//!
//! Indexes an institution's documents and answers questions about them,
//! either from the terminal or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! onboard --config ./config/onboard.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `onboard init` | Create the index and history databases |
//! | `onboard index <sources...>` | Load, chunk and index URLs, files or directories |
//! | `onboard index --manifest` | Index the sources listed in `[manifest].path` |
//! | `onboard ask "<query>"` | Answer one question |
//! | `onboard chat` | Interactive conversation (type `stop` to exit) |
//! | `onboard serve` | Start the HTTP API |
//!
//! The Gemini API key is read from `GOOGLE_API_KEY`. Logs go to stderr and
//! honour `RUST_LOG`; `--json` switches them to JSON lines.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use onboard_rag::app::App;
use onboard_rag::config::{self, Config};
use onboard_rag::ingest::{read_manifest, IndexingReport};
use onboard_rag::migrate;
use onboard_rag::models::ChatAnswer;
use onboard_rag::server;

/// Onboarding assistant: document ingestion and grounded answers.
///
/// All commands read settings from a TOML file given by `--config`.
#[derive(Parser)]
#[command(name = "onboard", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/onboard.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index and chat-history databases.
    ///
    /// Safe to run repeatedly.
    Init,

    /// Index sources into the vector store.
    ///
    /// Sources are URLs, files (`.pdf`, `.md`, `.pptx`, `.docx`, `.txt`) or
    /// directories, which are walked recursively.
    Index {
        /// URLs, files or directories to index.
        sources: Vec<String>,

        /// Also index the sources listed in the configured manifest.
        #[arg(long)]
        manifest: bool,
    },

    /// Ask a single question.
    Ask {
        /// The question.
        query: String,

        /// User the conversation belongs to.
        #[arg(long, default_value = "cli")]
        user: String,

        /// Continue an existing session instead of starting a new one.
        #[arg(long)]
        session: Option<String>,
    },

    /// Start an interactive conversation.
    Chat {
        /// User the conversation belongs to.
        #[arg(long, default_value = "cli")]
        user: String,

        /// Session to continue.
        #[arg(long)]
        session: Option<String>,

        /// Continue the user's most recent session.
        #[arg(long, conflicts_with = "session")]
        resume: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("onboard_rag=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Databases initialized successfully.");
        }
        Commands::Index { sources, manifest } => {
            run_index(cfg, sources, manifest).await?;
        }
        Commands::Ask {
            query,
            user,
            session,
        } => {
            let app = App::from_config(cfg).await?;
            let (answer, key) = app.chat(&query, &user, session).await?;
            print_answer(&answer);
            println!("session: {}", key.session_id);
        }
        Commands::Chat {
            user,
            session,
            resume,
        } => {
            let app = App::from_config(cfg).await?;
            let session = if resume {
                app.memory().sessions_for_user(&user).await?.into_iter().next()
            } else {
                session
            };
            run_chat(&app, &user, session).await?;
        }
        Commands::Serve => {
            let app = Arc::new(App::from_config(cfg).await?);
            server::run_server(app).await?;
        }
    }

    Ok(())
}

async fn run_index(cfg: Config, mut sources: Vec<String>, manifest: bool) -> anyhow::Result<()> {
    if manifest {
        let path = cfg
            .manifest
            .path
            .clone()
            .context("--manifest given but [manifest].path is not set")?;
        sources.extend(read_manifest(&path)?);
    }
    if sources.is_empty() {
        bail!("no sources given; pass URLs or paths, or --manifest");
    }

    let app = App::from_config(cfg).await?;
    let report = app.index_sources(&sources).await?;
    print_report(&report);
    Ok(())
}

async fn run_chat(app: &App, user: &str, mut session: Option<String>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Ask a question (type `stop` to exit).");
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("stop") {
            break;
        }

        match app.chat(query, user, session.clone()).await {
            Ok((answer, key)) => {
                print_answer(&answer);
                session = Some(key.session_id);
            }
            Err(e) => eprintln!("error: {}", e),
        }
    }

    if let Some(session) = session {
        println!("session: {}", session);
    }
    Ok(())
}

fn print_answer(answer: &ChatAnswer) {
    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &answer.sources {
            println!("  - {}", source);
        }
    }
}

fn print_report(report: &IndexingReport) {
    println!(
        "Indexed {} documents: {} chunks ({} added, {} skipped as duplicates).",
        report.documents, report.chunks, report.added, report.skipped
    );
    if !report.failures.is_empty() {
        println!("Skipped {} sources:", report.failures.len());
        for failure in &report.failures {
            println!("  - {}: {}", failure.source, failure.reason);
        }
    }
}
