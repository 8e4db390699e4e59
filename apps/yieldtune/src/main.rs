//! yieldtune - LoRA fine-tuning of an instruction model for crop yield prediction
//!
//! Invoked without arguments it trains an adapter; with `--test` it runs a
//! single inference check against the most recently saved adapter.

mod commands;
mod config;
mod progress;

use clap::Parser;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use yieldtune_training::RunMode;

#[derive(Parser, Debug)]
#[command(
    name = "yieldtune",
    author,
    version,
    about = "Fine-tune a yield prediction adapter on an instruction dataset",
    long_about = "Loads an instruction/response dataset, formats it with the [INST] template and trains a\nLoRA adapter on a 4-bit quantized base model through the configured worker.\nPass --test to run one sampled generation against the saved adapter."
)]
struct Args {
    /// Run the inference check instead of training
    #[arg(long)]
    test: bool,

    /// Pipeline configuration file (defaults to ./yieldtune.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber =
        FmtSubscriber::builder().with_max_level(level).without_time().with_target(false).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let pipeline_config = config::load_config(args.config.as_deref())?;

    match RunMode::from_test_flag(args.test) {
        RunMode::Train => commands::train::execute(&pipeline_config).await,
        RunMode::Test => commands::inference::execute(&pipeline_config).await,
    }
}
