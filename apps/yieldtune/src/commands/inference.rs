//! Inference check against the saved adapter.

use anyhow::{Context, Result};
use colored::Colorize;
use yieldtune_training::{Pipeline, PipelineConfig};
use yieldtune_worker::WorkerGenerator;

pub async fn execute(config: &PipelineConfig) -> Result<()> {
    let pipeline = Pipeline::new(config).context("Invalid pipeline configuration")?;
    let generator = WorkerGenerator::from_config(&config.worker);

    println!();
    println!("{}", "Loading fine-tuned model for testing...".dimmed());

    let outcome = pipeline.test(&generator).await.context("Inference check failed")?;

    println!();
    println!("{}", "=".repeat(50));
    println!("{}", "TEST OUTPUT:".bold().cyan());
    println!("{}", "=".repeat(50));
    println!("{}", outcome.text);
    Ok(())
}
