//! # DocBot CLI (`docbot`)
//!
//! Admin and operations interface for the DocBot engine: database
//! initialization, per-tenant document management, one-off questions for
//! smoke-testing a corpus, and starting the HTTP gateway that chat
//! connectors talk to.
//!
//! ## Usage
//!
//! ```bash
//! docbot --config ./config/docbot.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docbot init` | Create the SQLite database and run schema migrations |
//! | `docbot ingest <tenant> [file]` | Ingest a document for a tenant (stdin when no file) |
//! | `docbot clear <tenant>` | Remove a tenant's entire corpus |
//! | `docbot ask <tenant> <user> "<question>"` | Answer one question from the CLI |
//! | `docbot stats` | Per-tenant document and chunk counts |
//! | `docbot serve` | Start the HTTP gateway |

use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use docbot::answer::Engine;
use docbot::config::load_config;
use docbot::models::ReplyMode;
use docbot::{db, migrate, server};

/// DocBot — a tenant-isolated retrieval and escalation engine for
/// community support bots.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docbot.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docbot",
    about = "DocBot — tenant-isolated documentation Q&A engine",
    version,
    long_about = "DocBot ingests project documentation per tenant, answers questions grounded \
    in the retrieved context, refuses to guess when retrieval confidence is low, and \
    de-escalates repeat askers with short acknowledgments instead of repeated LLM calls."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docbot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Idempotent.
    Init,

    /// Ingest a document for a tenant.
    ///
    /// Reads the file (or stdin when no file is given) and replaces any
    /// previously ingested document with the same source name.
    Ingest {
        /// Tenant identifier (e.g., a community or server id).
        tenant: String,

        /// Path to a UTF-8 text file. Reads stdin when omitted.
        file: Option<PathBuf>,

        /// Source label stored with the document. Defaults to the file
        /// name, or "stdin".
        #[arg(long)]
        source: Option<String>,
    },

    /// Remove a tenant's entire corpus.
    Clear {
        /// Tenant identifier.
        tenant: String,
    },

    /// Answer one question from the CLI.
    ///
    /// Runs the same pipeline the gateway uses, including the confidence
    /// gate and escalation tracking, and prints the reply.
    Ask {
        /// Tenant identifier.
        tenant: String,
        /// User identifier (escalation and cooldowns are per-user).
        user: String,
        /// The question text.
        question: String,
    },

    /// Show per-tenant document and chunk counts.
    Stats,

    /// Start the HTTP gateway.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// ask, ingest, clear, stats, and health endpoints.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            tenant,
            file,
            source,
        } => {
            let (text, default_source) = match &file {
                Some(path) => {
                    let text = std::fs::read_to_string(path)?;
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| path.display().to_string());
                    (text, name)
                }
                None => {
                    let mut text = String::new();
                    std::io::stdin().read_to_string(&mut text)?;
                    (text, "stdin".to_string())
                }
            };
            let source = source.unwrap_or(default_source);

            let engine = Engine::new(cfg).await?;
            let report = engine.ingest_text(&tenant, &source, &text).await?;
            println!(
                "Ingested '{}' for tenant '{}': {} chunks (document {}).",
                source, tenant, report.chunks_written, report.document_id
            );
        }
        Commands::Clear { tenant } => {
            let engine = Engine::new(cfg).await?;
            engine.clear_tenant(&tenant).await?;
            println!("Cleared tenant '{}'.", tenant);
        }
        Commands::Ask {
            tenant,
            user,
            question,
        } => {
            let engine = Engine::new(cfg).await?;
            let reply = engine.ask(&tenant, &user, &question).await;
            match reply.mode {
                ReplyMode::Suppressed => {
                    println!("(suppressed: repeat level {})", reply.escalation_level);
                }
                _ => {
                    println!("{}", reply.text.unwrap_or_default());
                    println!(
                        "  [mode: {:?}, confidence: {:.3}, level: {}]",
                        reply.mode, reply.confidence, reply.escalation_level
                    );
                }
            }
        }
        Commands::Stats => {
            let engine = Engine::new(cfg).await?;
            let stats = engine.stats().await?;
            if stats.is_empty() {
                println!("No tenants.");
            } else {
                println!(
                    "{:<24} {:>10} {:>10} {:>10}",
                    "TENANT", "DOCS", "CHUNKS", "EMBEDDED"
                );
                for s in stats {
                    println!(
                        "{:<24} {:>10} {:>10} {:>10}",
                        s.tenant_id, s.documents, s.chunks, s.embedded_chunks
                    );
                }
            }
        }
        Commands::Serve => {
            let engine = Arc::new(Engine::new(cfg).await?);
            server::run_server(engine).await?;
        }
    }

    Ok(())
}
