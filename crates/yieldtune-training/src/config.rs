//! Pipeline configuration.
//!
//! Every field has a default matching the reference yield-predictor run, so an
//! empty or partial TOML file is valid. Once loaded the configuration is only
//! handed out by shared reference.

use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL_ID: &str = "mistralai/Mistral-7B-Instruct-v0.2";
pub const DEFAULT_DATASET_PATH: &str = "./data/yield_prediction_dataset.json";
pub const DEFAULT_OUTPUT_DIR: &str = "./output/yield-predictor-lora";

const DEFAULT_TEST_INSTRUCTION: &str = "Predict the yield for Wheat cultivation in Punjab with the following conditions: Land area is 10 acres, soil type is Loamy, season is Rabi, annual rainfall is 450mm, average temperature is 20°C, and humidity is 50%.";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub model: ModelConfig,
    pub quantization: QuantizationConfig,
    pub lora: LoraConfig,
    pub training: TrainingArguments,
    pub generation: GenerationConfig,
    pub paths: PathsConfig,
    pub worker: WorkerConfig,
}

impl PipelineConfig {
    pub fn load_from_file(path: &Path) -> TrainingResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TrainingError::ConfigNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let config: Self = toml::from_str(&content)
            .map_err(|e| TrainingError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> TrainingResult<String> {
        toml::to_string_pretty(self).map_err(|e| TrainingError::InvalidConfig(format!("failed to serialize: {e}")))
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if self.model.model_id.trim().is_empty() {
            return Err(invalid("model.model_id is required"));
        }
        self.lora.validate()?;
        self.training.validate()?;
        self.generation.validate()?;
        if self.worker.program.trim().is_empty() {
            return Err(invalid("worker.program is required"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> TrainingError {
    TrainingError::InvalidConfig(msg.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PadTokenPolicy {
    /// Reuse the end-of-sequence token for padding.
    Eos,
    /// Keep whatever pad token the tokenizer ships with.
    Tokenizer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingSide {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model_id: String,
    pub revision: Option<String>,
    pub trust_remote_code: bool,
    pub pad_token: PadTokenPolicy,
    pub padding_side: PaddingSide,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: None,
            trust_remote_code: true,
            pad_token: PadTokenPolicy::Eos,
            padding_side: PaddingSide::Right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantType {
    Nf4,
    Fp4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Bf16,
    Fp16,
    Fp32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizationConfig {
    pub load_in_4bit: bool,
    pub double_quant: bool,
    pub quant_type: QuantType,
    pub compute_dtype: DType,
}

impl Default for QuantizationConfig {
    fn default() -> Self {
        Self { load_in_4bit: true, double_quant: true, quant_type: QuantType::Nf4, compute_dtype: DType::Bf16 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoraBias {
    None,
    All,
    LoraOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    CausalLm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoraConfig {
    pub rank: u32,
    pub alpha: f64,
    pub dropout: f64,
    pub bias: LoraBias,
    pub task_type: TaskType,
    pub target_modules: Vec<String>,
}

impl Default for LoraConfig {
    fn default() -> Self {
        Self {
            rank: 16,
            alpha: 32.0,
            dropout: 0.05,
            bias: LoraBias::None,
            task_type: TaskType::CausalLm,
            target_modules: ["q_proj", "k_proj", "v_proj", "o_proj", "gate_proj", "up_proj", "down_proj"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl LoraConfig {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.rank == 0 {
            return Err(invalid("lora.rank must be >= 1"));
        }
        if !self.alpha.is_finite() || self.alpha <= 0.0 {
            return Err(invalid("lora.alpha must be > 0"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(invalid("lora.dropout must be in [0, 1)"));
        }
        if self.target_modules.is_empty() {
            return Err(invalid("lora.target_modules must not be empty"));
        }
        if self.target_modules.iter().any(|m| m.trim().is_empty()) {
            return Err(invalid("lora.target_modules must not contain blank names"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LrScheduler {
    Cosine,
    Linear,
    Constant,
    ConstantWithWarmup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Optimizer {
    Adamw,
    #[serde(rename = "paged_adamw_32bit")]
    PagedAdamw32bit,
    #[serde(rename = "paged_adamw_8bit")]
    PagedAdamw8bit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingArguments {
    pub epochs: u32,
    pub per_device_batch_size: u32,
    pub gradient_accumulation_steps: u32,
    pub learning_rate: f64,
    pub lr_scheduler: LrScheduler,
    pub warmup_ratio: f64,
    pub weight_decay: f64,
    pub logging_steps: u64,
    pub save_steps: u64,
    /// Maximum number of `checkpoint-<step>` directories kept on disk.
    pub save_total_limit: usize,
    /// Mixed-precision mode of the fit loop.
    pub precision: DType,
    pub gradient_checkpointing: bool,
    pub optimizer: Optimizer,
    pub max_grad_norm: f64,
    pub max_seq_length: u32,
    pub packing: bool,
    pub seed: u64,
    pub resume_from_checkpoint: bool,
}

impl Default for TrainingArguments {
    fn default() -> Self {
        Self {
            epochs: 3,
            per_device_batch_size: 4,
            gradient_accumulation_steps: 4,
            learning_rate: 2e-4,
            lr_scheduler: LrScheduler::Cosine,
            warmup_ratio: 0.03,
            weight_decay: 0.001,
            logging_steps: 10,
            save_steps: 100,
            save_total_limit: 3,
            precision: DType::Bf16,
            gradient_checkpointing: true,
            optimizer: Optimizer::PagedAdamw32bit,
            max_grad_norm: 0.3,
            max_seq_length: 2048,
            packing: false,
            seed: 42,
            resume_from_checkpoint: false,
        }
    }
}

impl TrainingArguments {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.epochs == 0 {
            return Err(invalid("training.epochs must be >= 1"));
        }
        if self.per_device_batch_size == 0 {
            return Err(invalid("training.per_device_batch_size must be >= 1"));
        }
        if self.gradient_accumulation_steps == 0 {
            return Err(invalid("training.gradient_accumulation_steps must be >= 1"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(invalid("training.learning_rate must be > 0"));
        }
        if !(0.0..1.0).contains(&self.warmup_ratio) {
            return Err(invalid("training.warmup_ratio must be in [0, 1)"));
        }
        if !self.weight_decay.is_finite() || self.weight_decay < 0.0 {
            return Err(invalid("training.weight_decay must be >= 0"));
        }
        if self.logging_steps == 0 {
            return Err(invalid("training.logging_steps must be >= 1"));
        }
        if self.save_steps == 0 {
            return Err(invalid("training.save_steps must be >= 1"));
        }
        if self.save_total_limit == 0 {
            return Err(invalid("training.save_total_limit must be >= 1"));
        }
        if !self.max_grad_norm.is_finite() || self.max_grad_norm <= 0.0 {
            return Err(invalid("training.max_grad_norm must be > 0"));
        }
        if self.max_seq_length == 0 {
            return Err(invalid("training.max_seq_length must be >= 1"));
        }
        Ok(())
    }

    /// Examples consumed per optimizer step.
    #[must_use]
    pub fn effective_batch_size(&self) -> u64 {
        u64::from(self.per_device_batch_size) * u64::from(self.gradient_accumulation_steps)
    }

    #[must_use]
    pub fn steps_per_epoch(&self, records: usize) -> u64 {
        (records as u64).div_ceil(self.effective_batch_size().max(1))
    }

    #[must_use]
    pub fn total_steps(&self, records: usize) -> u64 {
        self.steps_per_epoch(records) * u64::from(self.epochs)
    }

    #[must_use]
    pub fn warmup_steps(&self, records: usize) -> u64 {
        let total = self.total_steps(records);
        (total as f64 * self.warmup_ratio).ceil() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Instruction wrapped in the prompt template for the inference check.
    pub prompt_instruction: String,
    pub max_new_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub do_sample: bool,
    pub skip_special_tokens: bool,
    pub dtype: DType,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            prompt_instruction: DEFAULT_TEST_INSTRUCTION.to_string(),
            max_new_tokens: 500,
            temperature: 0.7,
            top_p: 0.9,
            do_sample: true,
            skip_special_tokens: true,
            dtype: DType::Bf16,
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.prompt_instruction.trim().is_empty() {
            return Err(invalid("generation.prompt_instruction must not be empty"));
        }
        if self.max_new_tokens == 0 {
            return Err(invalid("generation.max_new_tokens must be >= 1"));
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(invalid("generation.temperature must be > 0"));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(invalid("generation.top_p must be in (0, 1]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub dataset: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { dataset: PathBuf::from(DEFAULT_DATASET_PATH), output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR) }
    }
}

/// External program that hosts the model framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Run the bundled reference worker script with `program`.
    pub reference_script: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            reference_script: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.model.model_id, DEFAULT_MODEL_ID);
        assert_eq!(config.training.save_total_limit, 3);
        assert_eq!(config.lora.target_modules.len(), 7);
    }

    #[test]
    fn test_partial_file_overrides_only_named_fields() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("yieldtune.toml");
        std::fs::write(
            &path,
            r#"
[training]
epochs = 1
lr_scheduler = "linear"

[paths]
output_dir = "out/adapter"
"#,
        )
        .unwrap();

        let config = PipelineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.training.epochs, 1);
        assert_eq!(config.training.lr_scheduler, LrScheduler::Linear);
        assert_eq!(config.training.per_device_batch_size, 4);
        assert_eq!(config.paths.output_dir, PathBuf::from("out/adapter"));
        assert_eq!(config.paths.dataset, PathBuf::from(DEFAULT_DATASET_PATH));
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = PipelineConfig::load_from_file(&temp.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, TrainingError::ConfigNotFound(_)));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        std::fs::write(&path, "[generation]\ntop_p = 1.5\n").unwrap();
        let err = PipelineConfig::load_from_file(&path).unwrap_err();
        match err {
            TrainingError::InvalidConfig(msg) => assert!(msg.contains("top_p")),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_load_rejects_unknown_enum_value() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        std::fs::write(&path, "[training]\nprecision = \"int8\"\n").unwrap();
        assert!(matches!(PipelineConfig::load_from_file(&path).unwrap_err(), TrainingError::InvalidConfig(_)));
    }

    #[test]
    fn test_toml_roundtrip_preserves_config() {
        let mut config = PipelineConfig::default();
        config.lora.rank = 8;
        config.worker.env.insert("HF_HOME".to_string(), "/cache".to_string());
        let text = config.to_toml_string().unwrap();
        let parsed: PipelineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut args = TrainingArguments::default();
        args.gradient_accumulation_steps = 0;
        assert!(args.validate().is_err());

        let mut args = TrainingArguments::default();
        args.save_total_limit = 0;
        assert!(args.validate().is_err());

        let mut lora = LoraConfig::default();
        lora.target_modules.clear();
        assert!(lora.validate().is_err());

        let mut config = PipelineConfig::default();
        config.model.model_id = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_step_counts() {
        let args = TrainingArguments::default();
        assert_eq!(args.effective_batch_size(), 16);
        assert_eq!(args.steps_per_epoch(0), 0);
        assert_eq!(args.steps_per_epoch(16), 1);
        assert_eq!(args.steps_per_epoch(17), 2);
        assert_eq!(args.total_steps(100), 21);
        // ceil(21 * 0.03) = 1
        assert_eq!(args.warmup_steps(100), 1);
    }

    #[test]
    fn test_blank_target_module_is_rejected() {
        let mut lora = LoraConfig::default();
        lora.target_modules = vec!["q_proj".to_string(), String::new()];
        let err = lora.validate().unwrap_err();
        assert!(err.to_string().contains("blank names"));

        lora.target_modules = vec!["q_proj".to_string(), "  ".to_string()];
        assert!(lora.validate().is_err());
    }

    #[test]
    fn test_enum_names_in_toml() {
        let config: PipelineConfig = toml::from_str(
            r#"
[training]
optimizer = "paged_adamw_8bit"
precision = "fp16"

[quantization]
compute_dtype = "fp16"
"#,
        )
        .unwrap();
        assert_eq!(config.training.optimizer, Optimizer::PagedAdamw8bit);
        assert_eq!(config.training.precision, DType::Fp16);
        assert_eq!(config.quantization.compute_dtype, DType::Fp16);

        let text = PipelineConfig::default().to_toml_string().unwrap();
        assert!(text.contains(r#"optimizer = "paged_adamw_32bit""#));
        assert!(text.contains(r#"precision = "bf16""#));
    }

    #[test]
    fn test_default_worker_runs_reference_script() {
        let worker = WorkerConfig::default();
        assert_eq!(worker.program, "python3");
        assert!(worker.args.is_empty());
        assert!(worker.reference_script);
    }
}
