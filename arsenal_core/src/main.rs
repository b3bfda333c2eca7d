//! `arsenal` binary: run one command through the execution engine and print
//! the result as JSON. The exit code mirrors the result's `success` flag so
//! the binary composes in shell pipelines.

use anyhow::Result;
use arsenal_core::{EngineConfig, ExecOptions, ExecutionEngine, logging};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "arsenal", version, about = "Run an external tool through the arsenal execution engine")]
struct Cli {
    /// Timeout in seconds (default from config).
    #[arg(long)]
    timeout: Option<u64>,

    /// Bypass the result cache for this invocation.
    #[arg(long)]
    no_cache: bool,

    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log to stderr instead of the rolling log file.
    #[arg(long)]
    verbose: bool,

    /// The command line to execute.
    #[arg(trailing_var_arg = true, required = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging("info", !cli.verbose)?;

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::default(),
    };

    let engine = ExecutionEngine::new(config);
    let command = cli.command.join(" ");
    let opts = ExecOptions {
        timeout: cli.timeout.map(Duration::from_secs),
        use_cache: !cli.no_cache,
    };

    let result = engine.execute(&command, opts).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    std::process::exit(if result.success { 0 } else { 1 });
}
