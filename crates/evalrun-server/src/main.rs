//! Evalrun orchestrator server.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use evalrun_core::SessionId;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use evalrun_server::{http, orchestrator, AppState, Config};

/// Evaluation session orchestrator.
#[derive(Parser, Debug)]
#[command(name = "evalrun-server", about = "Evaluation session orchestrator")]
struct Args {
    /// Configuration file (TOML)
    #[arg(long, env = "EVALRUN_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP server address, overrides the config file
    #[arg(long, env = "EVALRUN_BIND")]
    bind: Option<String>,

    /// Sessions directory, overrides the config file
    #[arg(long, env = "EVALRUN_SESSIONS_DIR")]
    sessions_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Recover results for sessions whose results were never extracted
    Reprocess {
        /// Session to reprocess; all sessions when omitted
        id: Option<String>,

        /// Reprocess even if results exist or the session is marked running
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load config
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if let Some(dir) = args.sessions_dir {
        config.server.sessions_dir = dir;
    }

    let state = AppState::new(config);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state).await,
        Command::Reprocess { id, force } => reprocess(state, id, force).await,
    }
}

async fn serve(state: std::sync::Arc<AppState>) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = state.config.server.bind_addr.parse()?;
    tokio::fs::create_dir_all(&state.config.server.sessions_dir).await?;

    info!(
        http_addr = %addr,
        sessions_dir = %state.config.server.sessions_dir.display(),
        "Starting evalrun server"
    );

    let router = http::create_router(state);
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    Ok(())
}

async fn reprocess(
    state: std::sync::Arc<AppState>,
    id: Option<String>,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let responses = match id {
        Some(id) => {
            let id = SessionId::parse(&id)?;
            vec![orchestrator::reprocess_session(&state, &id, force).await?]
        }
        None => orchestrator::reprocess_all(&state, force).await?,
    };

    for response in &responses {
        if response.skipped {
            println!("{}: skipped", response.session_id);
        } else {
            println!("{}: {} result(s) recovered", response.session_id, response.recovered);
        }
    }
    let recovered: usize = responses.iter().map(|r| r.recovered).sum();
    println!("Processed {} session(s), {} result(s) recovered", responses.len(), recovered);
    Ok(())
}
