//! autonomy-engine - Entry Point
//!
//! Reads one application task (JSON file or stdin), coordinates the document
//! and risk actors on it, and prints the result as JSON on stdout.
//!
//! Flags:
//! - --document / -d <path>: identity document bytes for the document actor
//! - --json: log to stderr as JSON instead of human-readable text

use anyhow::{bail, Context};
use autonomy_engine::{
    ClaudeClient, Config, CoordinationTask, Coordinator, ModelGateway, UnconfiguredExtractor,
};
use std::io::Read;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

struct Args {
    task_path: Option<String>,
    document_path: Option<String>,
    json_logs: bool,
    help: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        task_path: None,
        document_path: None,
        json_logs: false,
        help: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => args.help = true,
            "--json" => args.json_logs = true,
            "--document" | "-d" => {
                args.document_path = Some(iter.next().context("--document needs a path")?);
            }
            flag if flag.starts_with('-') && flag != "-" => bail!("unknown option: {}", flag),
            path => {
                if args.task_path.is_some() {
                    bail!("only one task file may be given");
                }
                args.task_path = Some(path.to_string());
            }
        }
    }
    Ok(args)
}

fn print_help() {
    println!("autonomy-engine v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: autonomy-engine [OPTIONS] [TASK.json]");
    println!();
    println!("Reads the task from TASK.json, or stdin when omitted or '-'.");
    println!();
    println!("Options:");
    println!("  --document, -d PATH  Identity document for the document actor");
    println!("  --json               Log to stderr as JSON");
    println!("  --help, -h           Show this help");
    println!();
    println!("Environment variables:");
    println!("  ANTHROPIC_API_KEY            Claude API key");
    println!("  AUTONOMY_MODEL_ID            Model id (default: {})", autonomy_engine::claude::DEFAULT_MODEL_ID);
    println!("  AUTONOMY_API_URL             Messages API endpoint");
    println!("  AUTONOMY_MAX_RETRIES         Retries after throttling (default: 3, max 10)");
    println!("  AUTONOMY_BACKOFF_BASE_SECS   Backoff base in seconds (default: 3, max 300)");
    println!("  SEGMENT_URBAN_PREFIXES       Comma-separated urban pincode prefixes");
    println!("  SEGMENT_RURAL_INCOME_MAX     Rural income ceiling (default: 300000)");
    println!("  SEGMENT_URBAN_INCOME_MIN     Urban income floor (default: 700000)");
}

fn read_task(path: Option<&str>) -> anyhow::Result<CoordinationTask> {
    let raw = match path {
        Some(p) if p != "-" => {
            std::fs::read_to_string(p).with_context(|| format!("reading task file {}", p))?
        }
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading task from stdin")?;
            buf
        }
    };
    let value: serde_json::Value = serde_json::from_str(&raw).context("task is not valid JSON")?;
    if !value.is_object() {
        bail!("task must be a JSON object");
    }
    Ok(CoordinationTask::from_value(value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let args = parse_args()?;
    if args.help {
        print_help();
        return Ok(());
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    // stdout carries the result, so logs always go to stderr
    if args.json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("autonomy-engine v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let client = ClaudeClient::from_config(&config);
    if !client.is_available() {
        warn!("ANTHROPIC_API_KEY not set - every phase will use its fallback");
    }

    let mut task = read_task(args.task_path.as_deref())?;
    if let Some(path) = &args.document_path {
        let bytes = std::fs::read(path).with_context(|| format!("reading document {}", path))?;
        info!("Loaded document {} ({} bytes)", path, bytes.len());
        task = task.with_document(bytes);
    }

    let gateway = ModelGateway::new(Arc::new(client), config.retry_policy());
    let mut coordinator = Coordinator::banking(
        gateway.clone(),
        Arc::new(UnconfiguredExtractor),
        config.segmentation.clone(),
        config.engine.clone(),
    )?;

    let result = coordinator.coordinate(task).await?;
    info!("{}", gateway.stats().format());

    println!("{}", serde_json::to_string_pretty(&result.to_json())?);
    Ok(())
}
