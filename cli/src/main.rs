//! `memu` entry point.
//!
//! Runs a memU workflow node over a JSON array of input items, or checks a
//! cloud memorize task.
//!
//! ## Exit Codes
//!
//! - 0: Success
//! - 1: The memU operation failed (classified error or aborted batch)
//! - 2: Usage or configuration error

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use memu_core::operation::TaskStatusRequest;
use memu_core::{
    AdapterConfig, BatchError, ClassifiedError, ConfigLoader, MemoryNode, NodeItem,
    NodeParameters, OperationGateway, TracingLogger, connect, wait_for_task,
};
use serde_json::Value;

mod exit_codes {
    pub const OPERATION_FAILED: u8 = 1;
    pub const USAGE_ERROR: u8 = 2;
}

/// Run memU memory operations from the command line
#[derive(Debug, Parser)]
#[command(name = "memu", version)]
struct Cli {
    /// Adapter configuration file (TOML or JSON)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a node over input items and print the output items as JSON
    Run(RunArgs),

    /// Show the status of a cloud memorize task
    TaskStatus(TaskStatusArgs),
}

#[derive(Debug, Parser)]
struct RunArgs {
    /// Node parameters file (TOML, or JSON with a .json extension)
    #[arg(long, value_name = "PATH")]
    params: PathBuf,

    /// JSON array of records or `{json, binary}` items (default: stdin)
    #[arg(long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Override batch.max_concurrency
    #[arg(long, value_name = "N")]
    max_concurrency: Option<usize>,

    /// Report failed records in the output instead of aborting
    #[arg(long)]
    continue_on_error: bool,

    /// Pretty-print the output
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Parser)]
struct TaskStatusArgs {
    task_id: String,

    /// Poll until the task is SUCCESS or FAILED
    #[arg(long)]
    wait: bool,

    /// Give up waiting after this many seconds (default: polling.timeout_ms)
    #[arg(long, value_name = "SECS", requires = "wait")]
    timeout_secs: Option<u64>,

    /// Pretty-print the output
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<BatchError>().is_some() || err.downcast_ref::<ClassifiedError>().is_some()
    {
        exit_codes::OPERATION_FAILED
    } else {
        exit_codes::USAGE_ERROR
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    let config = loader.load().context("failed to load adapter configuration")?;
    tracing::debug!(credential = ?config.credential, "configuration loaded");

    match cli.command {
        Command::Run(args) => run_node(&config, args).await,
        Command::TaskStatus(args) => task_status(&config, args).await,
    }
}

fn gateway(config: &AdapterConfig) -> Result<Arc<dyn OperationGateway>> {
    Ok(connect(
        &config.credential,
        &config.http,
        &config.retry,
        Arc::new(TracingLogger),
    )?)
}

async fn run_node(config: &AdapterConfig, args: RunArgs) -> Result<()> {
    let parameters = load_parameters(&args.params)?;
    let items = read_items(args.input.as_deref())?;

    let mut batch = config.batch;
    if let Some(max_concurrency) = args.max_concurrency {
        batch.max_concurrency = max_concurrency;
    }
    if args.continue_on_error {
        batch.continue_on_error = true;
    }

    let node = MemoryNode::new(gateway(config)?, parameters)
        .with_batch_options(batch)
        .with_wait_options(config.polling.wait_options());
    let output = node.execute(items).await?;

    write_json(&serde_json::to_value(&output)?, args.pretty)
}

async fn task_status(config: &AdapterConfig, args: TaskStatusArgs) -> Result<()> {
    let gateway = gateway(config)?;
    let status = if args.wait {
        let mut options = config.polling.wait_options();
        if let Some(secs) = args.timeout_secs {
            options.timeout = Duration::from_secs(secs);
        }
        wait_for_task(gateway.as_ref(), &args.task_id, &options).await?
    } else {
        gateway
            .poll_task_status(&TaskStatusRequest::new(args.task_id.as_str()))
            .await?
    };
    write_json(&serde_json::to_value(&status)?, args.pretty)
}

fn load_parameters(path: &Path) -> Result<NodeParameters> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read node parameters from {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let parameters = if is_json {
        serde_json::from_str(&contents).map_err(anyhow::Error::from)
    } else {
        toml::from_str(&contents).map_err(anyhow::Error::from)
    };
    parameters.with_context(|| format!("invalid node parameters in {}", path.display()))
}

fn read_items(input: Option<&Path>) -> Result<Vec<NodeItem>> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input items from {}", path.display()))?,
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("failed to read input items from stdin")?;
            raw
        }
    };
    let value: Value = serde_json::from_str(&raw).context("input items are not valid JSON")?;
    Ok(match value {
        Value::Array(entries) => entries.into_iter().map(NodeItem::from_value).collect(),
        single => vec![NodeItem::from_value(single)],
    })
}

fn write_json(value: &Value, pretty: bool) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    if pretty {
        serde_json::to_writer_pretty(&mut stdout, value)?;
    } else {
        serde_json::to_writer(&mut stdout, value)?;
    }
    writeln!(stdout)?;
    Ok(())
}
