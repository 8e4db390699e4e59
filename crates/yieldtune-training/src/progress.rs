use crate::job::TrainingJobId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { job_id: TrainingJobId },
    Message { job_id: TrainingJobId, message: String },
    ModelReady { job_id: TrainingJobId, trainable_params: u64, total_params: u64 },
    Step { job_id: TrainingJobId, step: u64, total: Option<u64>, loss: Option<f64>, learning_rate: Option<f64> },
    Checkpoint { job_id: TrainingJobId, step: u64, path: PathBuf },
    Finished { job_id: TrainingJobId },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Reports progress through `tracing` at info level.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { job_id } => info!(%job_id, "training started"),
            ProgressEvent::Message { job_id, message } => info!(%job_id, "{message}"),
            ProgressEvent::ModelReady { job_id, trainable_params, total_params } => {
                let pct = if total_params > 0 { trainable_params as f64 * 100.0 / total_params as f64 } else { 0.0 };
                info!(%job_id, trainable_params, total_params, "trainable params: {pct:.4}%");
            }
            ProgressEvent::Step { job_id, step, total, loss, learning_rate } => match total {
                Some(total) => info!(%job_id, ?loss, ?learning_rate, "step {step}/{total}"),
                None => info!(%job_id, ?loss, ?learning_rate, "step {step}"),
            },
            ProgressEvent::Checkpoint { job_id, step, path } => {
                info!(%job_id, step, path = %path.display(), "checkpoint written");
            }
            ProgressEvent::Finished { job_id } => info!(%job_id, "training finished"),
        }
    }
}

/// Forwards every event to two sinks.
pub struct TeeProgressSink<'a> {
    first: &'a dyn ProgressSink,
    second: &'a dyn ProgressSink,
}

impl<'a> TeeProgressSink<'a> {
    #[must_use]
    pub fn new(first: &'a dyn ProgressSink, second: &'a dyn ProgressSink) -> Self {
        Self { first, second }
    }
}

impl ProgressSink for TeeProgressSink<'_> {
    fn on_event(&self, event: ProgressEvent) {
        self.first.on_event(event.clone());
        self.second.on_event(event);
    }
}
