use crate::config::{LoraConfig, ModelConfig, PipelineConfig, QuantizationConfig, TrainingArguments};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Identifier for a training job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingJobId(pub String);

impl TrainingJobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TrainingJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TrainingJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Entry point selected once at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Train,
    Test,
}

impl RunMode {
    #[must_use]
    pub fn from_test_flag(test: bool) -> Self {
        if test { Self::Test } else { Self::Train }
    }
}

/// Everything a backend needs to prepare the model and run the fit loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJob {
    pub job_id: TrainingJobId,
    pub created_at: DateTime<Utc>,
    pub model: ModelConfig,
    pub quantization: QuantizationConfig,
    pub lora: LoraConfig,
    pub args: TrainingArguments,
    /// Formatted JSONL dataset, one `{"text": ...}` per line.
    pub dataset_path: PathBuf,
    pub record_count: usize,
    /// Field of each dataset line holding the training text.
    pub text_field: String,
    pub output_dir: PathBuf,
    pub resume_from: Option<PathBuf>,
}

impl TrainingJob {
    #[must_use]
    pub fn new(config: &PipelineConfig, dataset_path: PathBuf, record_count: usize) -> Self {
        Self {
            job_id: TrainingJobId::new(),
            created_at: Utc::now(),
            model: config.model.clone(),
            quantization: config.quantization.clone(),
            lora: config.lora.clone(),
            args: config.training.clone(),
            dataset_path,
            record_count,
            text_field: "text".to_string(),
            output_dir: config.paths.output_dir.clone(),
            resume_from: None,
        }
    }

    #[must_use]
    pub fn total_steps(&self) -> u64 {
        self.args.total_steps(self.record_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_mode_from_flag() {
        assert_eq!(RunMode::from_test_flag(false), RunMode::Train);
        assert_eq!(RunMode::from_test_flag(true), RunMode::Test);
    }

    #[test]
    fn test_job_copies_config_sections() {
        let config = PipelineConfig::default();
        let job = TrainingJob::new(&config, PathBuf::from("out/train_dataset.jsonl"), 40);

        assert_eq!(job.model, config.model);
        assert_eq!(job.args, config.training);
        assert_eq!(job.output_dir, config.paths.output_dir);
        assert_eq!(job.total_steps(), 9);
        assert!(job.resume_from.is_none());
        assert_ne!(job.job_id, TrainingJob::new(&config, job.dataset_path.clone(), 40).job_id);
    }
}
