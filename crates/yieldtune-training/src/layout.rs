use crate::error::TrainingResult;
use std::path::{Path, PathBuf};
use tracing::debug;

const CHECKPOINT_PREFIX: &str = "checkpoint-";

/// Filesystem layout of the adapter output directory.
///
/// ```text
/// <root>/
///   adapter_manifest.json
///   train_dataset.jsonl
///   worker_request.json
///   checkpoint-<step>/
///   ...adapter and tokenizer files written by the backend
/// ```
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("adapter_manifest.json")
    }

    #[must_use]
    pub fn dataset_jsonl_path(&self) -> PathBuf {
        self.root.join("train_dataset.jsonl")
    }

    #[must_use]
    pub fn worker_request_path(&self) -> PathBuf {
        self.root.join("worker_request.json")
    }

    #[must_use]
    pub fn checkpoint_dir(&self, step: u64) -> PathBuf {
        self.root.join(format!("{CHECKPOINT_PREFIX}{step}"))
    }

    pub fn ensure_dirs(&self) -> TrainingResult<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Delete the manifest of a previous run. Returns whether one existed.
    pub fn remove_manifest(&self) -> TrainingResult<bool> {
        match std::fs::remove_file(self.manifest_path()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Checkpoint directories sorted by ascending step.
    pub fn list_checkpoints(&self) -> TrainingResult<Vec<(u64, PathBuf)>> {
        let dir = match std::fs::read_dir(&self.root) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        for entry in dir {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(step) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix(CHECKPOINT_PREFIX))
                .and_then(|s| s.parse::<u64>().ok())
            else {
                continue;
            };
            out.push((step, path));
        }
        out.sort_by_key(|(step, _)| *step);
        Ok(out)
    }

    pub fn latest_checkpoint(&self) -> TrainingResult<Option<PathBuf>> {
        Ok(self.list_checkpoints()?.pop().map(|(_, path)| path))
    }

    /// Delete the oldest checkpoints so that at most `keep` remain.
    pub fn prune_checkpoints(&self, keep: usize) -> TrainingResult<Vec<PathBuf>> {
        let checkpoints = self.list_checkpoints()?;
        let excess = checkpoints.len().saturating_sub(keep);
        let mut removed = Vec::with_capacity(excess);
        for (step, path) in checkpoints.into_iter().take(excess) {
            debug!(step, path = %path.display(), "removing old checkpoint");
            std::fs::remove_dir_all(&path)?;
            removed.push(path);
        }
        Ok(removed)
    }
}
