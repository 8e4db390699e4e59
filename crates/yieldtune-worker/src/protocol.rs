//! JSON-lines protocol spoken with the worker process.
//!
//! The runtime writes one [`WorkerRequest`] to a file and passes its path as
//! the worker's last argument. The worker answers with one [`WorkerEvent`]
//! object per stdout line. Anything else on stdout is treated as chatter.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use yieldtune_training::{GenerationRequest, TrainingJob};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerRequest {
    Train { job: TrainingJob },
    Generate { request: GenerationRequest },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerEvent {
    Log { message: String },
    ModelReady { trainable_params: u64, total_params: u64 },
    Step { step: u64, total: Option<u64>, loss: Option<f64>, learning_rate: Option<f64>, epoch: Option<f64> },
    Checkpoint { step: u64, path: PathBuf },
    Saved { files: Vec<PathBuf> },
    Completed { train_loss: Option<f64>, steps: Option<u64>, runtime_secs: Option<f64> },
    Generated { text: String },
    Error { message: String },
}

/// Parse one stdout line. Returns `None` for lines that are not events.
#[must_use]
pub fn parse_event(line: &str) -> Option<WorkerEvent> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }
    serde_json::from_str(line).ok()
}
