use crate::process::WorkerProcess;
use crate::protocol::{WorkerEvent, WorkerRequest};
use async_trait::async_trait;
use tracing::info;
use yieldtune_training::{GenerationRequest, Generator, OutputLayout, TrainingError, TrainingResult, WorkerConfig};

/// Single-prompt inference through the worker process.
#[derive(Debug, Clone)]
pub struct WorkerGenerator {
    process: WorkerProcess,
}

impl WorkerGenerator {
    #[must_use]
    pub fn new(process: WorkerProcess) -> Self {
        Self { process }
    }

    #[must_use]
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(WorkerProcess::from_config(config))
    }
}

#[async_trait]
impl Generator for WorkerGenerator {
    fn id(&self) -> &'static str {
        "worker"
    }

    async fn generate(&self, request: &GenerationRequest) -> TrainingResult<String> {
        let layout = OutputLayout::new(request.adapter_dir.clone());
        let worker_request = WorkerRequest::Generate { request: request.clone() };

        let mut text = None;
        self.process
            .run(&layout.worker_request_path(), &worker_request, |event| {
                match event {
                    WorkerEvent::Generated { text: t } => text = Some(t),
                    WorkerEvent::Log { message } => info!("{message}"),
                    _ => {}
                }
                Ok(())
            })
            .await?;

        text.ok_or_else(|| TrainingError::Backend("worker exited without generating text".to_string()))
    }
}
