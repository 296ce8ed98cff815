//! Evalrun CLI - Command line interface for the evaluation orchestrator.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use evalrun_client::{HttpClient, WatchError, Watcher};
use evalrun_core::api::{ResultEntry, StartEvaluationRequest};
use evalrun_core::SessionOutcome;

/// Evalrun CLI - Evaluation session management tool
#[derive(Parser)]
#[command(name = "evalrun")]
#[command(about = "CLI for the evalrun orchestrator", long_about = None)]
struct Cli {
    /// Server address
    #[arg(short, long, env = "EVALRUN_ADDR", default_value = "http://127.0.0.1:3100")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new evaluation
    Start {
        /// Task ids, comma separated or repeated
        #[arg(short, long, value_delimiter = ',', required = true)]
        tasks: Vec<String>,

        /// Model configuration for the agent under test
        #[arg(long, default_value = "ollama/llama3.2:latest")]
        agent: String,

        /// Model configuration for the simulated environment
        #[arg(long, default_value = "ollama/llama3.2:latest")]
        env: String,

        /// Keep polling until the evaluation is done
        #[arg(short, long)]
        watch: bool,
    },

    /// Poll a session until it is done
    Watch {
        /// Session ID
        id: String,

        /// Seconds between polls
        #[arg(long, default_value = "2")]
        interval: u64,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show session status
    Status {
        /// Session ID
        id: String,
    },

    /// Print the session log
    Logs {
        /// Session ID
        id: String,
    },

    /// List materialized results
    Results {
        /// Session ID
        id: String,
    },

    /// Download metadata, results and log as one JSON file
    Export {
        /// Session ID
        id: String,

        /// Output file, defaults to <id>-results.json
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete a session
    Delete {
        /// Session ID
        id: String,
    },

    /// Kill a running evaluation
    Cancel {
        /// Session ID
        id: String,
    },

    /// Recover results from a stored log
    Reprocess {
        /// Session ID
        id: String,

        /// Replace existing results
        #[arg(long)]
        force: bool,
    },

    /// List sessions, newest first
    List,

    /// List model configurations
    Configs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let client = HttpClient::new(&cli.addr);

    match cli.command {
        Commands::Start {
            tasks,
            agent,
            env,
            watch,
        } => {
            start(&client, tasks, agent, env, watch).await?;
        }
        Commands::Watch {
            id,
            interval,
            timeout,
        } => {
            watch_session(&client, &id, interval, timeout).await?;
        }
        Commands::Status { id } => {
            status(&client, &id).await?;
        }
        Commands::Logs { id } => {
            print!("{}", client.logs(&id).await?);
        }
        Commands::Results { id } => {
            let results = client.results(&id).await?;
            print_results(&results);
        }
        Commands::Export { id, output } => {
            export(&client, &id, output).await?;
        }
        Commands::Delete { id } => {
            let response = client.delete(&id).await?;
            println!("{}", response.message);
        }
        Commands::Cancel { id } => {
            client.cancel(&id).await?;
            println!("Cancellation requested for {}", id);
        }
        Commands::Reprocess { id, force } => {
            let response = client.reprocess(&id, force).await?;
            if response.skipped {
                println!("{}: skipped", response.session_id);
            } else {
                println!(
                    "{}: {} result(s) recovered",
                    response.session_id, response.recovered
                );
            }
        }
        Commands::List => {
            list_sessions(&client).await?;
        }
        Commands::Configs => {
            list_configs(&client).await?;
        }
    }

    Ok(())
}

async fn start(
    client: &HttpClient,
    tasks: Vec<String>,
    agent: String,
    env: String,
    watch: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = StartEvaluationRequest {
        task_ids: tasks,
        agent_model_config: agent,
        environment_model_config: env,
    };

    let response = client.start_evaluation(&request).await?;
    println!("Evaluation started: {}", response.session_id);

    if watch {
        watch_session(client, response.session_id.as_str(), 2, None).await?;
    }
    Ok(())
}

async fn watch_session(
    client: &HttpClient,
    id: &str,
    interval: u64,
    timeout: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    // The task list enables the all-tasks-reported signal; watching still
    // works without it.
    let expected = client
        .list_sessions()
        .await
        .ok()
        .and_then(|sessions| sessions.into_iter().find(|s| s.id.as_str() == id))
        .and_then(|s| s.config)
        .map(|c| c.task_ids);

    let mut watcher = Watcher::new(client.clone())
        .with_interval(Duration::from_secs(interval.max(1)))
        .with_timeout(timeout.map(Duration::from_secs));
    if let Some(tasks) = expected {
        watcher = watcher.with_expected_tasks(tasks);
    }

    let result = watcher
        .watch(id, |poll| {
            println!(
                "[poll {:>3}] {:<10} results: {}",
                poll.cycle,
                format!("{:?}", poll.verdict).to_lowercase(),
                poll.signals.result_count
            );
        })
        .await;

    match result {
        Ok(report) => {
            println!("{}", outcome_name(report.outcome));
            print_results(&report.results);
            Ok(())
        }
        Err(WatchError::Timeout { outcome, .. }) => {
            println!("Timed out, last state: {}", outcome_name(outcome));
            Err("watch timed out".into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn status(client: &HttpClient, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let status = client.status(id).await?;
    let results = client.results(id).await?;
    let outcome = SessionOutcome::classify(status.status, results.len());

    println!("  ID:         {}", id);
    println!("  Status:     {}", status.status);
    println!("  Outcome:    {}", outcome_name(outcome));
    println!("  Started:    {}", format_time(status.start_time));
    println!("  Ended:      {}", format_time(status.end_time));
    println!("  Results:    {}", results.len());
    Ok(())
}

async fn export(
    client: &HttpClient,
    id: &str,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let bundle = client.export(id).await?;
    let path = output.unwrap_or_else(|| PathBuf::from(format!("{id}-results.json")));
    std::fs::write(&path, serde_json::to_string_pretty(&bundle)?)?;
    println!("Exported {} to {}", id, path.display());
    Ok(())
}

async fn list_sessions(client: &HttpClient) -> Result<(), Box<dyn std::error::Error>> {
    let sessions = client.list_sessions().await?;

    println!("Sessions ({}):", sessions.len());
    println!(
        "{:<20}  {:<10}  {:<20}  {:>7}  {:>6}",
        "ID", "STATUS", "STARTED", "PASSED", "AVG"
    );
    println!("{}", "-".repeat(72));

    for session in sessions {
        let passed = format!(
            "{}/{}",
            session.summary.successful_tasks, session.summary.total_tasks
        );
        println!(
            "{:<20}  {:<10}  {:<20}  {:>7}  {:>6.1}",
            session.id.as_str(),
            session.status.as_str(),
            format_time(session.start_time),
            passed,
            session.summary.average_score
        );
    }
    Ok(())
}

async fn list_configs(client: &HttpClient) -> Result<(), Box<dyn std::error::Error>> {
    let configs = client.llm_configs().await?;

    println!("Model configurations ({}):", configs.len());
    println!("{:<32}  {:<10}  {:<6}  {}", "NAME", "PROVIDER", "LOCAL", "MODEL");
    println!("{}", "-".repeat(72));

    for config in configs {
        println!(
            "{:<32}  {:<10}  {:<6}  {}",
            config.name,
            config.provider,
            if config.is_local { "yes" } else { "no" },
            config.model.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn print_results(results: &[ResultEntry]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    println!("{:<32}  {:<8}  {:>5}  {:>8}", "TASK", "RESULT", "SCORE", "TIME");
    println!("{}", "-".repeat(60));
    for entry in results {
        println!(
            "{:<32}  {:<8}  {:>5}  {:>7.1}s",
            entry.task_id,
            entry.status.to_string(),
            format!("{}/{}", entry.score, entry.max_score),
            entry.evaluation_data.time_used
        );
    }
}

fn outcome_name(outcome: SessionOutcome) -> &'static str {
    match outcome {
        SessionOutcome::Running => "RUNNING",
        SessionOutcome::CompletedWithResults => "COMPLETED",
        SessionOutcome::CompletedWithoutResults => "COMPLETED (no results recovered)",
        SessionOutcome::Error => "ERROR",
    }
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
