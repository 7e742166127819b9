use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use testwright_cli::{app, cases, config::AppConfig};
use testwright_core_types::{RunEvent, RunStatus};
use testwright_engine::Subscription;
use testwright_server::AppState;

#[derive(Parser)]
#[command(author, version, about = "LLM-driven browser test runner", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one test case from a YAML file and stream progress to stdout
    Run {
        /// Test case definition
        #[arg(value_name = "CASE_FILE")]
        case: PathBuf,
    },
    /// Start the HTTP API server
    Serve {
        /// Directory of test case YAML files to load at startup
        #[arg(long, value_name = "DIR")]
        cases: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = AppConfig::load(cli.config.as_deref())?;
    config.validate()?;

    match cli.command {
        Commands::Run { case } => run_case(&config, &case).await,
        Commands::Serve { cases } => serve(&config, cases.as_deref()).await,
    }
}

fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run_case(config: &AppConfig, case_path: &std::path::Path) -> Result<()> {
    let app = app::build(config)?;
    let case = cases::load_case(case_path)?;
    let case_id = case.id.clone();
    let case_name = case.name.clone();
    app.cases.insert(case);

    let run_id = app.orchestrator.start(&case_id).await?;
    println!("running case {case_name} (run {run_id})");

    match app.orchestrator.subscribe(&run_id).await? {
        Subscription::Live { mut receiver, .. } => loop {
            match receiver.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    println!("... {missed} events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        },
        Subscription::Finished { status } => println!("status: {status}"),
    }

    let record = app
        .orchestrator
        .run_record(&run_id)
        .await
        .context("run record missing after completion")?;
    println!(
        "result: {}{}",
        record.status,
        record
            .result_summary
            .map(|s| format!(" ({s})"))
            .unwrap_or_default()
    );

    if record.status != RunStatus::Passed {
        std::process::exit(1);
    }
    Ok(())
}

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::Log(message) => println!("[log] {message}"),
        RunEvent::Screenshot(data) => println!("[screenshot] {} bytes (base64)", data.len()),
        RunEvent::StepStart { order, .. } => println!("[step {order}] started"),
        RunEvent::StepEnd { status, .. } => println!("[step] finished: {status:?}"),
        RunEvent::Status(status) => println!("[status] {status}"),
        RunEvent::Error(message) => eprintln!("[error] {message}"),
    }
}

async fn serve(config: &AppConfig, cases_dir: Option<&std::path::Path>) -> Result<()> {
    let app = app::build(config)?;

    if let Some(dir) = cases_dir {
        let loaded = cases::load_dir(dir)?;
        info!(count = loaded.len(), dir = %dir.display(), "loaded test cases");
        for case in loaded {
            app.cases.insert(case);
        }
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server host/port")?;

    let state = AppState {
        orchestrator: app.orchestrator,
        cases: app.cases,
    };
    testwright_server::serve(addr, state)
        .await
        .context("server error")
}
