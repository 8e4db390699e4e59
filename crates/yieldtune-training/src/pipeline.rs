//! Train and test entry points.
//!
//! Both are strictly linear. Failures propagate to the caller untouched;
//! checkpoints already on disk are left there.

use crate::artifacts::{
    classify_artifact, make_artifact, read_manifest, sha256_file, write_manifest, AdapterManifest,
    ArtifactKind,
};
use crate::config::PipelineConfig;
use crate::dataset::{compute_dataset_id, load_dataset, write_jsonl_dataset};
use crate::error::{TrainingError, TrainingResult};
use crate::job::{RunMode, TrainingJob};
use crate::layout::OutputLayout;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::template::PromptTemplate;
use crate::trainer::{GenerationRequest, Generator, Trainer};
use chrono::Utc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutcome {
    pub prompt: String,
    pub text: String,
    pub manifest: AdapterManifest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Trained(AdapterManifest),
    Tested(InferenceOutcome),
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    layout: OutputLayout,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a PipelineConfig) -> TrainingResult<Self> {
        config.validate()?;
        Ok(Self { config, layout: OutputLayout::new(config.paths.output_dir.clone()) })
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        self.config
    }

    #[must_use]
    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub async fn run(
        &self,
        mode: RunMode,
        trainer: &dyn Trainer,
        generator: &dyn Generator,
        progress: &dyn ProgressSink,
    ) -> TrainingResult<RunOutcome> {
        match mode {
            RunMode::Train => self.train(trainer, progress).await.map(RunOutcome::Trained),
            RunMode::Test => self.test(generator).await.map(RunOutcome::Tested),
        }
    }

    pub async fn train(&self, trainer: &dyn Trainer, progress: &dyn ProgressSink) -> TrainingResult<AdapterManifest> {
        let config = self.config;

        info!(path = %config.paths.dataset.display(), "loading dataset");
        let records = load_dataset(&config.paths.dataset)?;
        if records.is_empty() {
            return Err(TrainingError::InvalidConfig(format!(
                "dataset {} contains no examples",
                config.paths.dataset.display()
            )));
        }
        info!(records = records.len(), "loaded training examples");

        self.layout.ensure_dirs()?;
        // A failed run must not leave an older adapter looking current.
        if self.layout.remove_manifest()? {
            info!("removed manifest of previous run");
        }
        let dataset_path = self.layout.dataset_jsonl_path();
        write_jsonl_dataset(&dataset_path, &records)?;
        let dataset_id = compute_dataset_id(&records)?;

        let mut job = TrainingJob::new(config, dataset_path.clone(), records.len());
        if config.training.resume_from_checkpoint {
            job.resume_from = self.layout.latest_checkpoint()?;
            if let Some(ref ckpt) = job.resume_from {
                info!(checkpoint = %ckpt.display(), "resuming from checkpoint");
            }
        }
        info!(
            job_id = %job.job_id,
            backend = trainer.id(),
            model = %config.model.model_id,
            total_steps = job.total_steps(),
            "preparing model"
        );

        trainer.prepare(&job).await?;

        let retention = RetentionSink {
            inner: progress,
            layout: &self.layout,
            keep: config.training.save_total_limit,
        };
        let outcome = trainer.train(&job, &retention).await?;
        retention.prune();

        let mut artifacts = Vec::with_capacity(outcome.saved_files.len() + 1);
        for file in outcome.saved_files {
            let path = if file.is_absolute() { file } else { self.layout.root().join(file) };
            artifacts.push(classify_artifact(path)?);
        }
        if !artifacts.iter().any(|a| a.kind == ArtifactKind::AdapterWeights) {
            return Err(TrainingError::Artifact(format!(
                "backend `{}` reported no adapter weights",
                trainer.id()
            )));
        }
        artifacts.push(make_artifact(ArtifactKind::DatasetJsonl, dataset_path)?);

        let manifest = AdapterManifest {
            job_id: job.job_id.clone(),
            created_at: Utc::now(),
            base_model: config.model.model_id.clone(),
            lora: config.lora.clone(),
            dataset_id,
            record_count: records.len(),
            metrics: outcome.metrics,
            artifacts,
        };
        write_manifest(&self.layout.manifest_path(), &manifest)?;

        progress.on_event(ProgressEvent::Finished { job_id: job.job_id });
        info!(output = %self.layout.root().display(), "adapter saved");
        Ok(manifest)
    }

    /// Resolve the saved adapter and check it against the configured model.
    pub fn load_adapter(&self) -> TrainingResult<AdapterManifest> {
        let manifest_path = self.layout.manifest_path();
        let manifest = read_manifest(&manifest_path)?;

        let weights = manifest
            .artifact(ArtifactKind::AdapterWeights)
            .ok_or_else(|| TrainingError::AdapterNotFound(manifest_path.clone()))?;
        if !weights.path.is_file() {
            return Err(TrainingError::AdapterNotFound(weights.path.clone()));
        }
        let actual = sha256_file(&weights.path)?;
        if actual != weights.sha256 {
            return Err(TrainingError::Artifact(format!(
                "adapter weights {} changed since training (manifest sha256 {}, file sha256 {actual})",
                weights.path.display(),
                weights.sha256
            )));
        }

        manifest.verify_base_model(&self.config.model.model_id)?;
        Ok(manifest)
    }

    #[must_use]
    pub fn generation_request(&self) -> GenerationRequest {
        let config = self.config;
        let generation = &config.generation;
        GenerationRequest {
            base_model: config.model.model_id.clone(),
            revision: config.model.revision.clone(),
            adapter_dir: self.layout.root().to_path_buf(),
            prompt: PromptTemplate.render_prompt(&generation.prompt_instruction),
            max_new_tokens: generation.max_new_tokens,
            temperature: generation.temperature,
            top_p: generation.top_p,
            do_sample: generation.do_sample,
            skip_special_tokens: generation.skip_special_tokens,
            dtype: generation.dtype,
        }
    }

    pub async fn test(&self, generator: &dyn Generator) -> TrainingResult<InferenceOutcome> {
        let manifest = self.load_adapter()?;
        info!(job_id = %manifest.job_id, backend = generator.id(), "loaded adapter for inference check");

        let request = self.generation_request();
        let text = generator.generate(&request).await?;
        Ok(InferenceOutcome { prompt: request.prompt, text, manifest })
    }
}

/// Enforces `save_total_limit` whenever a checkpoint lands.
struct RetentionSink<'a> {
    inner: &'a dyn ProgressSink,
    layout: &'a OutputLayout,
    keep: usize,
}

impl RetentionSink<'_> {
    fn prune(&self) {
        if let Err(e) = self.layout.prune_checkpoints(self.keep) {
            warn!(error = %e, "failed to prune old checkpoints");
        }
    }
}

impl ProgressSink for RetentionSink<'_> {
    fn on_event(&self, event: ProgressEvent) {
        let is_checkpoint = matches!(event, ProgressEvent::Checkpoint { .. });
        self.inner.on_event(event);
        if is_checkpoint {
            self.prune();
        }
    }
}
