//! Forumpipe - forum ingestion job

use anyhow::{Context, Result};
use clap::Parser;
use forumpipe_common::logging::{init_logging, LogConfig, LogLevel};
use forumpipe_ingest::{
    config::{Config, ServerConfig},
    metrics::{install_prometheus, Metrics, PrometheusBackend},
    server::{self, AppState},
    PipelineContext,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "forumpipe")]
#[command(author, version, about = "Forum post ingestion job")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run the HTTP trigger server
    Serve,

    /// Run one batch in the foreground and exit
    Run {
        /// Semicolon-delimited subreddits (defaults to SUBREDDITS)
        #[arg(short, long)]
        subreddits: Option<String>,

        /// Posts per subreddit (defaults to POST_LIMIT)
        #[arg(short, long)]
        limit: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("forumpipe")
        .filter_directives("forumpipe_ingest=debug,tower_http=info,aws_config=warn,hyper=warn")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Serve => serve().await,
        Command::Run { subreddits, limit } => run_once(subreddits.as_deref(), limit).await,
    }
}

async fn serve() -> Result<()> {
    let server_config = ServerConfig::from_env();
    let metrics_handle = install_prometheus()?;
    let metrics = Metrics::new(Arc::new(PrometheusBackend));

    // A broken startup still serves, answering every trigger with 500
    let state = match Config::load().and_then(|config| PipelineContext::initialize(&config, metrics)) {
        Ok(pipeline) => AppState::ready(Arc::new(pipeline)),
        Err(e) => {
            error!(severity = "CRITICAL", error = %format!("{:#}", e), "Failed to initialize pipeline");
            AppState::failed(format!("{:#}", e))
        },
    }
    .with_metrics(metrics_handle);

    let app = server::router(state.clone());

    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(server::shutdown_signal())
        .await?;

    state.drain(server_config.shutdown_timeout()).await;

    info!("Server shut down gracefully");

    Ok(())
}

async fn run_once(subreddits: Option<&str>, limit: Option<i64>) -> Result<()> {
    let config = Config::load()?;
    let metrics_handle = install_prometheus()?;
    let pipeline = PipelineContext::initialize(&config, Metrics::new(Arc::new(PrometheusBackend)))?;

    let request = pipeline
        .resolve_request(subreddits, limit)
        .context("Invalid batch request")?;

    let report = pipeline.run_batch(&request).await;
    pipeline.shutdown().await;

    info!(
        batch_id = %report.batch_id,
        report = %serde_json::to_string(&report)?,
        "Batch report"
    );
    info!(
        batch_id = %report.batch_id,
        metrics = %metrics_handle.render(),
        "Batch metrics"
    );

    Ok(())
}
