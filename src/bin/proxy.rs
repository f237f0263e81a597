use std::io::Write;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::future::join_all;
use influx_proxy::{
    backend::{HttpBackend, QueryRequest, QueryResponse},
    config::{ProxyConfig, read_config_file},
    influxql::{SupportedCommands, classify},
};
use tracing::{debug, error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Ping every configured backend
    Ping,

    /// Write line protocol from a file to every backend
    Write {
        /// Line protocol file
        input: String,

        /// Timestamp precision of the input (ns, u, ms, s, m, h)
        #[arg(short, long, default_value = "ns")]
        precision: String,
    },

    /// Classify a statement and run it on the first backend serving queries
    Query {
        /// Database to query
        #[arg(short, long)]
        db: String,

        statement: String,
    },
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("influx_proxy", LevelFilter::DEBUG),
        ("proxy", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;
    let backends = spawn_backends(&config)?;

    let result = match args.command {
        Command::Ping => ping(&backends).await,
        Command::Write { input, precision } => write(&backends, &input, &precision).await,
        Command::Query { db, statement } => query(&backends, &db, &statement).await,
    };

    for backend in &backends {
        if let Err(e) = backend.close().await {
            error!("{}: error during close: {e}", backend.name());
        }
    }

    result
}

fn spawn_backends(config: &ProxyConfig) -> anyhow::Result<Vec<HttpBackend>> {
    config
        .backends
        .iter()
        .map(|backend| {
            HttpBackend::spawn(backend.clone())
                .with_context(|| format!("failed to create backend {}", backend.display_name()))
        })
        .collect()
}

async fn ping(backends: &[HttpBackend]) -> anyhow::Result<()> {
    let results = join_all(backends.iter().map(|backend| backend.ping())).await;

    for (backend, result) in backends.iter().zip(results) {
        match result {
            Ok(version) => info!("{}: up (version {version})", backend.name()),
            Err(e) => error!("{}: down: {e}", backend.name()),
        }
    }
    Ok(())
}

async fn write(backends: &[HttpBackend], input: &str, precision: &str) -> anyhow::Result<()> {
    let body = std::fs::read(input).with_context(|| format!("failed to read {input}"))?;
    debug!("writing {} bytes with precision {precision}", body.len());

    for backend in backends {
        backend
            .write_with_precision(&body, precision)
            .await
            .with_context(|| format!("{}: write failed", backend.name()))?;
    }
    Ok(())
}

async fn query(backends: &[HttpBackend], db: &str, statement: &str) -> anyhow::Result<()> {
    let classified =
        classify(statement, &SupportedCommands::default()).context("failed to parse statement")?;
    if !classified.is_routable() {
        anyhow::bail!("statement cannot be routed: {statement}");
    }
    debug!(
        "classified as {:?} (measurement: {:?}, consistency check: {})",
        classified.kind(),
        classified.measurement().ok(),
        classified.needs_consistency_check()
    );

    let backend = backends
        .iter()
        .find(|b| !b.is_write_only() && b.is_active())
        .context("no active backend serves queries")?;

    let mut response = QueryResponse::new();
    backend
        .query(&mut response, &QueryRequest::new(db, statement))
        .await
        .with_context(|| format!("{}: query failed", backend.name()))?;

    info!(
        "{}: status {:?}, version {:?}",
        backend.name(),
        response.status(),
        response.version()
    );
    std::io::stdout().write_all(response.body())?;
    Ok(())
}
