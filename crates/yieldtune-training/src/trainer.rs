use crate::artifacts::TrainingMetrics;
use crate::config::DType;
use crate::error::TrainingResult;
use crate::job::TrainingJob;
use crate::progress::ProgressSink;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What a backend reports after the fit loop and final save.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainOutcome {
    pub metrics: TrainingMetrics,
    /// Adapter and tokenizer files, absolute or relative to the output dir.
    pub saved_files: Vec<PathBuf>,
}

/// A single sampled completion against base model + adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub base_model: String,
    pub revision: Option<String>,
    pub adapter_dir: PathBuf,
    pub prompt: String,
    pub max_new_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub do_sample: bool,
    pub skip_special_tokens: bool,
    pub dtype: DType,
}

/// Quantized model preparation, adapter wrapping and the fit loop.
#[async_trait]
pub trait Trainer: Send + Sync {
    fn id(&self) -> &'static str;

    async fn prepare(&self, job: &TrainingJob) -> TrainingResult<()>;

    async fn train(&self, job: &TrainingJob, progress: &dyn ProgressSink) -> TrainingResult<TrainOutcome>;
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn id(&self) -> &'static str;

    async fn generate(&self, request: &GenerationRequest) -> TrainingResult<String>;
}
