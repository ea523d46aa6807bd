// src/main.rs
// Montage - conversational task orchestration for project content edits

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use montage::{ChatRequest, EngineConfig, build_engine, db, server};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "montage")]
#[command(about = "Conversational task orchestration for project content edits")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Port to listen on (overrides MONTAGE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send one chat message and print the response as JSON
    Chat {
        #[arg(long)]
        project: String,
        #[arg(long)]
        topic: String,
        #[arg(short, long)]
        message: String,
        /// JSON file with {"items": [...], "order": [...]}
        #[arg(long)]
        context_file: Option<PathBuf>,
        #[arg(long)]
        model: Option<String>,
        /// "execute" (default) or "plan"
        #[arg(long)]
        mode: Option<String>,
    },

    /// Print a session's history as JSON
    History {
        #[arg(long)]
        project: String,
        #[arg(long)]
        topic: String,
    },

    /// Delete a session's history
    Clear {
        #[arg(long)]
        project: String,
        #[arg(long)]
        topic: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("montage=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);

    if std::env::var("MONTAGE_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_context_file(path: Option<PathBuf>) -> Result<serde_json::Value> {
    let Some(path) = path else {
        return Ok(serde_json::Value::Null);
    };
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = EngineConfig::from_env();
    init_tracing();

    let pool = db::create_pool(&config.database_url).await?;
    let engine = Arc::new(build_engine(&config, pool));

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.port);
            info!(host = %config.host, port, model = %config.completion.default_model, "Starting server");
            server::run(&config.host, port, server::AppState::new(engine)).await?;
        }
        Commands::Chat {
            project,
            topic,
            message,
            context_file,
            model,
            mode,
        } => {
            let mut request = ChatRequest::new(project, topic, message)
                .with_context_data(read_context_file(context_file)?);
            request.model = model;
            request.mode = mode;

            // Ctrl-C cancels the turn without storing a partial reply
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });

            let response = engine.handle_turn_with_cancel(request, cancel).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::History { project, topic } => {
            let history = engine.history(&project, &topic).await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Commands::Clear { project, topic } => {
            let cleared = engine.clear(&project, &topic).await?;
            println!("Deleted {} messages", cleared.deleted_messages);
        }
    }

    Ok(())
}
