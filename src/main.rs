//! # askdoc CLI
//!
//! The `askdoc` binary is the operator interface for the Q&A engine. It
//! provides commands for database initialization, document ingestion,
//! chat queries, manual Q&A authoring, credential encryption, and starting
//! the HTTP chat server.
//!
//! ## Usage
//!
//! ```bash
//! askdoc --config ./config/askdoc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askdoc init` | Create the SQLite database and run schema migrations |
//! | `askdoc ingest <file>` | Extract, generate Q&A pairs, embed, and store a document |
//! | `askdoc ask "<query>"` | Answer a chat query against a project |
//! | `askdoc qa add` | Add a manually authored Q&A item |
//! | `askdoc qa list` | List the Q&A items of a document |
//! | `askdoc key encrypt` | Encrypt an API key for transit with the shared secret |
//! | `askdoc serve http` | Start the HTTP chat server |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use askdoc::cipher::KeyCipher;
use askdoc::config;
use askdoc::db;
use askdoc::embedding;
use askdoc::extract;
use askdoc::generation;
use askdoc::migrate;
use askdoc::models::QaItem;
use askdoc::pipeline::{self, IngestionRequest, PipelineOptions};
use askdoc::retrieval::{self, AnswerOutcome, AnswerSource, RetrievalOptions};
use askdoc::server;
use askdoc::store::{SqliteStore, Store};

/// askdoc — a document Q&A ingestion and retrieval engine.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/askdoc.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "askdoc",
    about = "askdoc — a document Q&A ingestion and retrieval engine",
    version,
    long_about = "askdoc ingests documents, derives question/answer pairs with a pluggable \
    generation backend (local subprocess, OpenAI, Anthropic, or Mistral), embeds documents and \
    pairs into vector space, and answers chat queries by similarity retrieval over the stored \
    answers."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/askdoc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the documents/qa_items tables.
    /// Idempotent — running it multiple times is safe.
    Init,

    /// Ingest a document: extract text, generate Q&A pairs, embed, store.
    ///
    /// The whole operation is all-or-nothing: on any failure nothing is
    /// persisted. A persistence failure after generation is reported as
    /// such; do not blindly re-run, the vendor cost was already paid.
    Ingest {
        /// Path to the document (PDF, DOCX, Markdown, or plain text).
        file: PathBuf,

        /// Project the document belongs to.
        #[arg(long)]
        project: String,

        /// Context hint telling the generator what to focus on. Required.
        #[arg(long)]
        hint: String,
    },

    /// Answer a chat query against a project's knowledge base.
    Ask {
        /// The query text.
        query: String,

        /// Project to search.
        #[arg(long)]
        project: String,
    },

    /// Manage question/answer items.
    Qa {
        #[command(subcommand)]
        action: QaAction,
    },

    /// Credential transit utilities.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Start the HTTP chat server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

/// Q&A item management subcommands.
#[derive(Subcommand)]
enum QaAction {
    /// Add a manually authored Q&A item to a document.
    ///
    /// The item starts without an embedding; it is computed lazily the
    /// first time the document wins a query.
    Add {
        /// Project the item belongs to.
        #[arg(long)]
        project: String,

        /// Document the item belongs to.
        #[arg(long)]
        document: String,

        /// Question text.
        #[arg(long)]
        question: String,

        /// Answer text.
        #[arg(long)]
        answer: String,
    },

    /// List the Q&A items of a document.
    List {
        /// Document id.
        #[arg(long)]
        document: String,
    },
}

/// Credential transit subcommands.
#[derive(Subcommand)]
enum KeyAction {
    /// Encrypt an API key with the transit secret for use in config.
    ///
    /// The output is obfuscation for transit/config files, not secure
    /// storage; see the cipher module documentation.
    Encrypt {
        /// The plaintext API key.
        key: String,
    },
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// Start the HTTP chat server on the configured bind address.
    Http,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            file,
            project,
            hint,
        } => {
            run_ingest(&cfg, &file, &project, &hint).await?;
        }
        Commands::Ask { query, project } => {
            run_ask(&cfg, &query, &project).await?;
        }
        Commands::Qa { action } => match action {
            QaAction::Add {
                project,
                document,
                question,
                answer,
            } => {
                run_qa_add(&cfg, &project, &document, &question, &answer).await?;
            }
            QaAction::List { document } => {
                run_qa_list(&cfg, &document).await?;
            }
        },
        Commands::Key { action } => match action {
            KeyAction::Encrypt { key } => {
                let secret = cfg.transit.secret.as_deref().ok_or_else(|| {
                    anyhow::anyhow!("transit.secret must be set in config to encrypt keys")
                })?;
                let cipher = KeyCipher::new(secret.as_bytes());
                println!("{}", cipher.encrypt_for_transit(&key));
            }
        },
        Commands::Serve { service } => match service {
            ServeService::Http => {
                server::run_server(&cfg).await?;
            }
        },
    }

    Ok(())
}

async fn run_ingest(
    cfg: &config::Config,
    file: &PathBuf,
    project: &str,
    hint: &str,
) -> Result<()> {
    let bytes = std::fs::read(file)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;
    let content_type = extract::content_type_for_path(file);
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let pool = db::connect(cfg).await?;
    let store = SqliteStore::new(pool);
    let backend = generation::create_backend(&cfg.generation)?;
    let embedder = embedding::create_embedder(&cfg.embedding)?;

    let request = IngestionRequest {
        project_id: project.to_string(),
        filename,
        bytes,
        content_type: content_type.to_string(),
        context_hint: hint.to_string(),
        credential: cfg.generation_credential()?,
    };
    let options = PipelineOptions {
        inline_items: cfg.embedding.inline_items,
        concurrency: cfg.embedding.concurrency,
        embedding_credential: cfg.embedding_credential()?,
    };

    match pipeline::run_ingestion(&store, backend.as_ref(), embedder.as_ref(), &options, request)
        .await
    {
        Ok(report) => {
            println!("ingest {}", file.display());
            println!("  document: {}", report.document_id);
            println!("  qa items: {}", report.qa_count);
            println!(
                "  embedded inline: {} (remainder computed at query time)",
                report.items_embedded
            );
            println!("ok");
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            store.pool().close().await;
            std::process::exit(1);
        }
    }

    store.pool().close().await;
    Ok(())
}

async fn run_ask(cfg: &config::Config, query: &str, project: &str) -> Result<()> {
    let pool = db::connect(cfg).await?;
    let store = SqliteStore::new(pool);
    let embedder = embedding::create_embedder(&cfg.embedding)?;

    let options = RetrievalOptions {
        threshold: cfg.retrieval.threshold,
        decline_message: cfg.retrieval.decline_message.clone(),
        concurrency: cfg.embedding.concurrency,
        credential: cfg.embedding_credential()?,
    };

    let outcome = retrieval::answer(&store, embedder.as_ref(), &options, query, project).await;

    match outcome {
        AnswerOutcome::Answered {
            answer,
            document_id,
            similarity,
            source,
        } => {
            println!("{}", answer);
            println!();
            println!("  document: {}", document_id);
            println!("  similarity: {:.3}", similarity);
            match source {
                AnswerSource::QaItem { item_id } => println!("  via: qa item {}", item_id),
                AnswerSource::DocumentText => println!("  via: document text"),
            }
        }
        AnswerOutcome::NoConfidentMatch { message } => {
            println!("{}", message);
        }
        AnswerOutcome::NoKnowledgeBase => {
            println!("Project '{}' has no documents yet.", project);
        }
        AnswerOutcome::Failed(failure) => {
            eprintln!("Error: {}", failure);
            store.pool().close().await;
            std::process::exit(1);
        }
    }

    store.pool().close().await;
    Ok(())
}

async fn run_qa_add(
    cfg: &config::Config,
    project: &str,
    document: &str,
    question: &str,
    answer: &str,
) -> Result<()> {
    let pool = db::connect(cfg).await?;
    let store = SqliteStore::new(pool);

    // The document must exist; a manual item may not dangle.
    if store.get_document(document).await?.is_none() {
        anyhow::bail!("document not found: {}", document);
    }

    let item = QaItem {
        id: uuid::Uuid::new_v4().to_string(),
        project_id: project.to_string(),
        document_id: document.to_string(),
        question: question.to_string(),
        answer: answer.to_string(),
        embedding: None,
        generated: false,
        created_at: chrono::Utc::now().timestamp(),
    };
    store.create_qa_items(std::slice::from_ref(&item)).await?;

    println!("qa add");
    println!("  item: {}", item.id);
    println!("  (embedding computed at first query)");

    store.pool().close().await;
    Ok(())
}

async fn run_qa_list(cfg: &config::Config, document: &str) -> Result<()> {
    let pool = db::connect(cfg).await?;
    let store = SqliteStore::new(pool);

    let items = store.qa_items_by_document(document).await?;
    if items.is_empty() {
        println!("No qa items for document {}.", document);
    } else {
        println!("--- QA items ({}) ---", items.len());
        for item in &items {
            let origin = if item.generated { "generated" } else { "manual" };
            let embedded = if item.embedding.is_some() {
                "embedded"
            } else {
                "pending embedding"
            };
            println!("[{}] ({}, {})", item.id, origin, embedded);
            println!("  Q: {}", item.question);
            println!("  A: {}", item.answer);
            println!();
        }
    }

    store.pool().close().await;
    Ok(())
}
