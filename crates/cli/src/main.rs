//! docchat CLI
//!
//! Ingest a directory of documents, then ask questions about it from the
//! terminal or over HTTP.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use docchat_agents::chain::{DEFAULT_CALL_TIMEOUT, DEFAULT_TOP_K};
use docchat_agents::ingest::DEFAULT_EMBED_BATCH_SIZE;
use docchat_agents::{
    normalize_question, ChainConfig, CompletionClient, ConversationalChain, EmbeddingClient,
    IngestConfig, IngestionPipeline, DEFAULT_NAMESPACE,
};
use docchat_core::chunker::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use docchat_core::profile::LOADING_PLACEHOLDER;
use docchat_core::{AnswerResult, ChunkingConfig, ConversationTurn, ProfileSet};
use docchat_db::{init_memory, init_persistent, Repository};
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// docchat - chat with your PDF library
#[derive(Parser)]
#[command(name = "docchat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database path (defaults to ~/.docchat/data)
    #[arg(short, long, env = "DOCCHAT_DB_PATH", global = true)]
    db_path: Option<PathBuf>,

    /// Use in-memory database (for testing)
    #[arg(long, global = true)]
    memory: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON file replacing the built-in domain profiles
    #[arg(long, env = "DOCCHAT_PROFILES", global = true)]
    profiles: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ChainArgs {
    /// Namespace to retrieve passages from
    #[arg(long, env = "DOCCHAT_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Passages retrieved per question
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Seconds allowed for each model or index call
    #[arg(long, env = "DOCCHAT_CALL_TIMEOUT_SECS", default_value_t = DEFAULT_CALL_TIMEOUT.as_secs())]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest every PDF, text and markdown file under a directory
    Ingest {
        /// Directory to ingest
        dir: PathBuf,

        /// Namespace the records are written to
        #[arg(long, env = "DOCCHAT_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
        namespace: String,

        /// Maximum characters per chunk
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Characters shared by consecutive chunks
        #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
        chunk_overlap: usize,

        /// Chunks per embedding request
        #[arg(long, default_value_t = DEFAULT_EMBED_BATCH_SIZE)]
        batch_size: usize,

        /// Skip chunks already stored in the namespace
        #[arg(long)]
        dedupe: bool,

        /// Seconds allowed for each embedding or storage call
        #[arg(long, env = "DOCCHAT_CALL_TIMEOUT_SECS", default_value_t = DEFAULT_CALL_TIMEOUT.as_secs())]
        timeout_secs: u64,

        /// Print the ingestion report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask a single question
    Ask {
        question: String,

        /// Domain profile (see `docchat profiles`)
        #[arg(short, long)]
        profile: Option<String>,

        #[command(flatten)]
        chain: ChainArgs,
    },

    /// Interactive conversation with history
    Chat {
        /// Domain profile (see `docchat profiles`)
        #[arg(short, long)]
        profile: Option<String>,

        #[command(flatten)]
        chain: ChainArgs,
    },

    /// Serve the chat API over HTTP
    Serve {
        /// Address to bind the HTTP server to (host:port)
        #[arg(long, env = "DOCCHAT_BIND", default_value = "127.0.0.1:3000")]
        bind: String,

        #[command(flatten)]
        chain: ChainArgs,
    },

    /// Show record counts per namespace
    Stats,

    /// Delete every record in a namespace
    Purge {
        #[arg(long, env = "DOCCHAT_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
        namespace: String,
    },

    /// List the available domain profiles
    Profiles,

    /// Delete the local database (fresh start)
    ResetDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let profiles = load_profiles(cli.profiles.as_deref())?;

    // Commands that never touch the database
    match &cli.command {
        Commands::Profiles => return cmd_profiles(&profiles),
        Commands::ResetDb => return cmd_reset_db(cli.db_path),
        Commands::Ingest { dir, .. } if !dir.is_dir() => {
            anyhow::bail!("Not a readable directory: {}", dir.display());
        }
        Commands::Ask { question, .. } => {
            normalize_question(question)?;
        }
        _ => {}
    }

    let db = if cli.memory {
        info!("Using in-memory database");
        init_memory().await?
    } else {
        let db_path = match cli.db_path {
            Some(path) => path,
            None => default_db_path()?,
        };

        // Ensure directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Using database at: {}", db_path.display());
        init_persistent(&db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?
    };
    let repo = Arc::new(Repository::new(db));

    // Execute command
    match cli.command {
        Commands::Ingest {
            dir,
            namespace,
            chunk_size,
            chunk_overlap,
            batch_size,
            dedupe,
            timeout_secs,
            json,
        } => {
            let config = IngestConfig {
                namespace,
                chunking: ChunkingConfig::new(chunk_size, chunk_overlap)?,
                embed_batch_size: batch_size,
                dedupe,
                call_timeout: Duration::from_secs(timeout_secs.max(1)),
            };
            cmd_ingest(repo, config, &dir, json).await?;
        }
        Commands::Ask {
            question,
            profile,
            chain,
        } => {
            let chain = build_chain(repo, chain, profiles).await?;
            cmd_ask(&chain, &question, profile.as_deref()).await?;
        }
        Commands::Chat { profile, chain } => {
            let chain = build_chain(repo, chain, profiles).await?;
            cmd_chat(&chain, profile).await?;
        }
        Commands::Serve { bind, chain } => {
            let addr: SocketAddr = bind
                .parse()
                .with_context(|| format!("invalid bind address {bind}"))?;
            let chain = build_chain(repo, chain, profiles).await?;
            docchat_server::serve(Arc::new(chain), addr)
                .await
                .with_context(|| format!("server on {addr} stopped"))?;
        }
        Commands::Stats => {
            cmd_stats(&repo).await?;
        }
        Commands::Purge { namespace } => {
            let removed = repo.purge(&namespace).await?;
            println!("✓ Removed {removed} records from {namespace:?}");
        }
        Commands::Profiles | Commands::ResetDb => {
            // Handled before database init.
        }
    }

    Ok(())
}

fn default_db_path() -> Result<PathBuf> {
    let mut path = dirs::home_dir().context("Could not find home directory")?;
    path.push(".docchat");
    path.push("data");
    Ok(path)
}

fn load_profiles(path: Option<&Path>) -> Result<ProfileSet> {
    let Some(path) = path else {
        return Ok(ProfileSet::builtin());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profiles: {}", path.display()))?;
    ProfileSet::from_json(&json)
        .with_context(|| format!("Failed to parse profiles: {}", path.display()))
}

async fn build_chain(
    repo: Arc<Repository>,
    args: ChainArgs,
    profiles: ProfileSet,
) -> Result<ConversationalChain> {
    let embedder = EmbeddingClient::from_env().context("Failed to configure embeddings")?;
    let llm = CompletionClient::from_env().context("Failed to configure language model")?;

    // Check inference services before accepting questions
    if !embedder.health().await.unwrap_or(false) {
        eprintln!("Error: embeddings service is not reachable.");
        eprintln!("  Embeddings: {} ({})", embedder.base_url(), embedder.model());
        anyhow::bail!("Embeddings service unavailable");
    }
    if !llm.health().await.unwrap_or(false) {
        eprintln!("Error: language model service is not reachable.");
        eprintln!("  LLM: {} ({})", llm.base_url(), llm.model());
        anyhow::bail!("Language model service unavailable");
    }

    let config = ChainConfig {
        namespace: args.namespace,
        top_k: args.top_k.max(1),
        call_timeout: Duration::from_secs(args.timeout_secs.max(1)),
        profiles,
        ..ChainConfig::default()
    };
    Ok(ConversationalChain::new(
        Arc::new(embedder),
        repo,
        Arc::new(llm),
        config,
    ))
}

async fn cmd_ingest(repo: Arc<Repository>, config: IngestConfig, dir: &Path, json: bool) -> Result<()> {
    let embedder = EmbeddingClient::from_env().context("Failed to configure embeddings")?;
    if !embedder.health().await.unwrap_or(false) {
        eprintln!("Error: embeddings service is not reachable.");
        eprintln!("  Embeddings: {} ({})", embedder.base_url(), embedder.model());
        anyhow::bail!("Embeddings service unavailable");
    }

    let pipeline = IngestionPipeline::new(Arc::new(embedder), repo, config);
    let report = pipeline.ingest_directory(dir).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("✓ Ingestion complete into {:?}:", report.namespace);
    println!("  • Documents loaded: {}", report.documents_loaded);
    println!("  • Documents skipped (no text): {}", report.documents_skipped);
    println!("  • Chunks created: {}", report.chunks_created);
    println!("  • Records inserted: {}", report.records_inserted);
    if report.duplicates_skipped > 0 {
        println!("  • Duplicates skipped: {}", report.duplicates_skipped);
    }
    Ok(())
}

async fn cmd_ask(chain: &ConversationalChain, question: &str, profile: Option<&str>) -> Result<()> {
    let answer = chain.answer(question, &[], profile).await?;
    print_answer(&answer);
    Ok(())
}

fn print_answer(answer: &AnswerResult) {
    println!("{}", answer.text.trim());

    if !answer.source_documents.is_empty() {
        println!();
        println!("Sources:");
        for source in &answer.source_documents {
            let preview: String = source.page_content.chars().take(80).collect();
            println!(
                "  [{:.3}] {} #{} - {}{}",
                source.score,
                source.metadata.source,
                source.metadata.chunk_index,
                preview.replace('\n', " "),
                if source.page_content.chars().count() > 80 { "..." } else { "" }
            );
        }
    }
}

async fn cmd_chat(chain: &ConversationalChain, mut profile: Option<String>) -> Result<()> {
    let mut history: Vec<ConversationTurn> = Vec::new();

    println!("docchat - Interactive Mode");
    println!("Commands: /profile <name>, /reset, /quit");
    println!("{}", chain.profiles().placeholder(false, profile.as_deref()));
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("docchat> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }

        let input = line.trim();
        match input.split_once(' ').unwrap_or((input, "")) {
            ("", _) => continue,

            ("/quit" | "/q" | "/exit", _) => {
                println!("Goodbye!");
                break;
            }

            ("/reset", _) => {
                history.clear();
                println!("History cleared.");
            }

            ("/profile", name) => {
                let name = name.trim();
                if name.is_empty() {
                    for p in chain.profiles().iter() {
                        println!("  • {}", p.name);
                    }
                } else if chain.profiles().get(name).is_some() {
                    profile = Some(name.to_string());
                    println!("{}", chain.profiles().placeholder(false, Some(name)));
                } else {
                    println!("Unknown profile: {name}");
                }
            }

            _ => {
                println!("{LOADING_PLACEHOLDER}");
                match chain.answer(input, &history, profile.as_deref()).await {
                    Ok(answer) => {
                        print_answer(&answer);
                        history.push(ConversationTurn::new(input, answer.text));
                    }
                    Err(e) => println!("Error: {e}"),
                }
            }
        }

        println!();
    }

    Ok(())
}

async fn cmd_stats(repo: &Repository) -> Result<()> {
    let stats = repo.namespace_stats().await?;

    if stats.is_empty() {
        println!("No records stored.");
        return Ok(());
    }

    println!("Database Statistics:");
    for entry in stats {
        println!("  • {}: {} records", entry.namespace, entry.records);
    }

    Ok(())
}

fn cmd_profiles(profiles: &ProfileSet) -> Result<()> {
    for profile in profiles.iter() {
        println!("{}", profile.name);
        println!("  {}", profile.thematic_question);
    }
    Ok(())
}

fn cmd_reset_db(db_path: Option<PathBuf>) -> Result<()> {
    let path = match db_path {
        Some(path) => path,
        None => default_db_path()?,
    };

    if path.exists() {
        std::fs::remove_dir_all(&path)
            .with_context(|| format!("Failed to remove db at {}", path.display()))?;
        println!("✓ Removed database at {}", path.display());
    } else {
        println!("Database not found at {}, nothing to remove", path.display());
    }
    Ok(())
}
