use crate::process::WorkerProcess;
use crate::protocol::{WorkerEvent, WorkerRequest};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use yieldtune_training::{
    OutputLayout, ProgressEvent, ProgressSink, TrainOutcome, Trainer, TrainingError, TrainingJob, TrainingMetrics,
    TrainingResult, WorkerConfig,
};

/// Trainer that hands quantized loading, adapter wrapping and the fit loop
/// to the worker process.
#[derive(Debug, Clone)]
pub struct WorkerTrainer {
    process: WorkerProcess,
}

impl WorkerTrainer {
    #[must_use]
    pub fn new(process: WorkerProcess) -> Self {
        Self { process }
    }

    #[must_use]
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(WorkerProcess::from_config(config))
    }
}

fn resolve(root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() { path } else { root.join(path) }
}

#[async_trait]
impl Trainer for WorkerTrainer {
    fn id(&self) -> &'static str {
        "worker"
    }

    async fn prepare(&self, job: &TrainingJob) -> TrainingResult<()> {
        if !job.dataset_path.is_file() {
            return Err(TrainingError::DatasetNotFound(job.dataset_path.clone()));
        }
        OutputLayout::new(job.output_dir.clone()).ensure_dirs()?;
        debug!(program = self.process.program(), "worker trainer ready");
        Ok(())
    }

    async fn train(&self, job: &TrainingJob, progress: &dyn ProgressSink) -> TrainingResult<TrainOutcome> {
        let layout = OutputLayout::new(job.output_dir.clone());
        let job_id = job.job_id.clone();
        let planned_total = job.total_steps();

        progress.on_event(ProgressEvent::Started { job_id: job_id.clone() });

        let mut metrics = TrainingMetrics::default();
        let mut saved_files = Vec::new();
        let mut completed = false;

        let request = WorkerRequest::Train { job: job.clone() };
        self.process
            .run(&layout.worker_request_path(), &request, |event| {
                match event {
                    WorkerEvent::Log { message } => {
                        progress.on_event(ProgressEvent::Message { job_id: job_id.clone(), message });
                    }
                    WorkerEvent::ModelReady { trainable_params, total_params } => {
                        metrics.trainable_params = Some(trainable_params);
                        metrics.total_params = Some(total_params);
                        progress.on_event(ProgressEvent::ModelReady {
                            job_id: job_id.clone(),
                            trainable_params,
                            total_params,
                        });
                    }
                    WorkerEvent::Step { step, total, loss, learning_rate, .. } => {
                        progress.on_event(ProgressEvent::Step {
                            job_id: job_id.clone(),
                            step,
                            total: total.or(Some(planned_total)),
                            loss,
                            learning_rate,
                        });
                    }
                    WorkerEvent::Checkpoint { step, path } => {
                        progress.on_event(ProgressEvent::Checkpoint {
                            job_id: job_id.clone(),
                            step,
                            path: resolve(layout.root(), path),
                        });
                    }
                    WorkerEvent::Saved { files } => saved_files.extend(files),
                    WorkerEvent::Completed { train_loss, steps, runtime_secs } => {
                        metrics.train_loss = train_loss;
                        metrics.steps = steps;
                        metrics.runtime_secs = runtime_secs;
                        completed = true;
                    }
                    WorkerEvent::Generated { .. } => debug!("ignoring generated text during training"),
                    WorkerEvent::Error { .. } => {}
                }
                Ok(())
            })
            .await?;

        if !completed {
            return Err(TrainingError::Backend("worker exited without reporting completion".to_string()));
        }

        info!(job_id = %job.job_id, loss = ?metrics.train_loss, steps = ?metrics.steps, "worker finished training");
        Ok(TrainOutcome { metrics, saved_files })
    }
}
