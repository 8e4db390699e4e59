//! Training command implementation.

use crate::progress::BarProgressSink;
use anyhow::{Context, Result};
use colored::Colorize;
use yieldtune_training::{Pipeline, PipelineConfig};
use yieldtune_worker::WorkerTrainer;

pub async fn execute(config: &PipelineConfig) -> Result<()> {
    println!("{}", "=".repeat(50));
    println!("{}", "Yield Prediction Model - LoRA Fine-tuning".bold().cyan());
    println!("  Base model: {}", config.model.model_id.cyan());
    println!("{}", "=".repeat(50));

    let pipeline = Pipeline::new(config).context("Invalid pipeline configuration")?;
    let trainer = WorkerTrainer::from_config(&config.worker);
    let sink = BarProgressSink::default();

    let manifest = pipeline.train(&trainer, &sink).await.context("Training failed")?;

    println!();
    println!("{}", "Adapter saved".bold().green());
    println!("  Job: {}", manifest.job_id.0.cyan());
    println!("  Output: {}", pipeline.layout().root().display().to_string().dimmed());
    println!("  Examples: {}", manifest.record_count);
    if let Some(loss) = manifest.metrics.train_loss {
        println!("  Final loss: {loss:.4}");
    }
    if let Some(pct) = manifest.metrics.trainable_percent() {
        println!("  Trainable params: {pct:.4}%");
    }
    println!();
    println!("  {}", "Run with --test to try the adapter.".dimmed());
    println!();
    Ok(())
}
