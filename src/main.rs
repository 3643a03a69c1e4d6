//! # Adaptive RAG CLI (`arag`)
//!
//! ## Usage
//!
//! ```bash
//! arag --config ./config/arag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `arag query "<text>"` | Route, retrieve and answer one query |
//! | `arag status` | Show which dependencies are live or simulated |
//! | `arag serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Let the router pick the source
//! arag query "What are the types of agent memory?"
//!
//! # Force Wikipedia and emit the JSON response
//! arag query "Who is Elon Musk?" --source wikipedia --json
//!
//! # Serve the HTTP API on [server].bind
//! arag serve --config ./config/arag.toml
//! ```
//!
//! Credentials are read from the environment (`GROQ_API_KEY`,
//! `OPENAI_API_KEY`, `ASTRA_DB_APPLICATION_TOKEN`, `ASTRA_DB_ID`,
//! `SUPABASE_URL`, `SUPABASE_ANON_KEY`). Anything missing runs simulated.
//!
//! Ctrl-C during `arag query` cancels the run and exits with an error.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use adaptive_rag::capability::{CapabilityState, Dependency};
use adaptive_rag::config::{load_config_or_default, Config, Credentials};
use adaptive_rag::logging::init_tracing;
use adaptive_rag::models::{QueryOptions, QueryRequest, QueryResponse, SourceHint};
use adaptive_rag::orchestrator::Orchestrator;
use adaptive_rag::server::run_server;

/// Adaptive RAG: route each query to the knowledge source best able to
/// answer it, retrieve evidence and synthesize a cited answer.
#[derive(Parser)]
#[command(
    name = "arag",
    about = "Adaptive routing and retrieval orchestration engine",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// A missing file is not an error: built-in defaults are used and every
    /// dependency without credentials runs simulated.
    #[arg(long, global = true, default_value = "./config/arag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single query.
    Query {
        /// The question to answer.
        query: String,

        /// Source to use: auto, vector, wikipedia or web.
        #[arg(long, default_value = "auto")]
        source: SourceHint,

        /// Maximum number of evidence results.
        #[arg(long, default_value_t = 5)]
        top_k: usize,

        /// Sampling temperature for live synthesis, in [0, 2].
        #[arg(long, default_value_t = 0.0)]
        temperature: f32,

        /// Embed a hypothetical answer instead of the raw query.
        #[arg(long)]
        hyde: bool,

        /// Requester identifier, echoed into the request.
        #[arg(long)]
        user_id: Option<String>,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show live/mock status for every dependency.
    Status,

    /// Start the HTTP API server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config_or_default(&cli.config)?;
    init_tracing(&config.logging)?;
    if !cli.config.exists() {
        tracing::warn!(
            path = %cli.config.display(),
            "config file not found, using built-in defaults"
        );
    }
    let creds = Credentials::from_env();
    let caps = CapabilityState::resolve(&config, &creds);
    for warning in caps.mock_warnings() {
        tracing::warn!("{}", warning);
    }

    match cli.command {
        Commands::Query {
            query,
            source,
            top_k,
            temperature,
            hyde,
            user_id,
            json,
        } => {
            let request = QueryRequest {
                query,
                user_id,
                source,
                options: QueryOptions {
                    top_k,
                    temperature,
                    hyde,
                },
            };
            let orchestrator = Orchestrator::with_capabilities(&config, &creds, caps)?;
            let response = orchestrator.run_until(&request, interrupted()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_response(&response);
            }
        }
        Commands::Status => {
            print_status(&config, &caps);
        }
        Commands::Serve => {
            let mock: Vec<&str> = caps.mock_dependencies().iter().map(|d| d.as_str()).collect();
            if !mock.is_empty() {
                tracing::info!(services = %mock.join(", "), "running in MOCK MODE");
            }
            let orchestrator = Arc::new(Orchestrator::with_capabilities(&config, &creds, caps)?);
            run_server(&config, orchestrator).await?;
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves,
/// so the query runs to completion.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

fn print_response(response: &QueryResponse) {
    let mode = if response.mock { " (mock)" } else { "" };
    println!("Source:  {}{}", response.source, mode);
    println!("Routing: {}", response.routing_reason);
    println!();
    println!("{}", response.response);

    if !response.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, r) in response.sources.iter().enumerate() {
            match &r.url {
                Some(url) => println!(
                    "  {}. [{:.2}] {}  {}",
                    i + 1,
                    r.similarity_score,
                    r.source_id,
                    url
                ),
                None => println!("  {}. [{:.2}] {}", i + 1, r.similarity_score, r.source_id),
            }
        }
    }

    let m = &response.metrics;
    let mut parts = vec![format!("elapsed {} ms", m.elapsed_ms)];
    if let Some(ms) = m.retrieval_ms {
        parts.push(format!("retrieval {} ms", ms));
    }
    if let Some(ms) = m.embedding_ms {
        parts.push(format!("embedding {} ms", ms));
    }
    if let Some(ms) = m.llm_ms {
        parts.push(format!("llm {} ms", ms));
    }
    if let Some(t) = m.tokens {
        parts.push(format!("{} tokens", t));
    }
    println!();
    println!("Metrics: {}", parts.join(" | "));
}

fn print_status(config: &Config, caps: &CapabilityState) {
    println!("environment: {}", config.app.environment);
    println!("{:<16} MODE", "DEPENDENCY");
    for dep in Dependency::ALL {
        let mode = if caps.is_live(dep) { "live" } else { "mock" };
        println!("{:<16} {}", dep.as_str(), mode);
    }
    let warnings = caps.mock_warnings();
    if !warnings.is_empty() {
        println!();
        for w in warnings {
            println!("{}", w);
        }
    }
}
