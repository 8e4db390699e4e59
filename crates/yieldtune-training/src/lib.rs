//! yieldtune training primitives
//!
//! Backend-agnostic pieces of the adapter fine-tuning pipeline:
//! - Loading instruction/response datasets and formatting them with the
//!   `[INST] ... [/INST]` template
//! - Pipeline configuration (model, quantization, LoRA, training, generation)
//! - Output layout, checkpoint retention and the adapter manifest
//! - The `Trainer` / `Generator` seams implemented by backends
//! - The train and test entry points (`Pipeline`)

pub mod artifacts;
pub mod config;
pub mod dataset;
pub mod error;
pub mod job;
pub mod layout;
pub mod pipeline;
pub mod progress;
pub mod template;
pub mod trainer;

pub use artifacts::{AdapterManifest, ArtifactKind, TrainingArtifact, TrainingMetrics};
pub use config::{
    GenerationConfig, LoraConfig, ModelConfig, PathsConfig, PipelineConfig, QuantizationConfig, TrainingArguments,
    WorkerConfig,
};
pub use dataset::{format_example, load_dataset, load_examples, Dataset, DatasetId, Example, FormattedRecord};
pub use error::{TrainingError, TrainingResult};
pub use job::{RunMode, TrainingJob, TrainingJobId};
pub use layout::OutputLayout;
pub use pipeline::{InferenceOutcome, Pipeline, RunOutcome};
pub use progress::{ProgressEvent, ProgressSink, TeeProgressSink, TracingProgressSink};
pub use template::PromptTemplate;
pub use trainer::{GenerationRequest, Generator, TrainOutcome, Trainer};
