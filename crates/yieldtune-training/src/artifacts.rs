use crate::config::LoraConfig;
use crate::dataset::DatasetId;
use crate::error::{TrainingError, TrainingResult};
use crate::job::TrainingJobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    AdapterWeights,
    AdapterConfig,
    Tokenizer,
    DatasetJsonl,
    Other,
}

impl ArtifactKind {
    /// Classify a file written by a backend from its file name.
    #[must_use]
    pub fn from_file_name(name: &str) -> Self {
        match name {
            "adapter_model.safetensors" | "adapter_model.bin" => Self::AdapterWeights,
            "adapter_config.json" => Self::AdapterConfig,
            "special_tokens_map.json" => Self::Tokenizer,
            n if n.starts_with("tokenizer") => Self::Tokenizer,
            n if n.ends_with(".jsonl") => Self::DatasetJsonl,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrainingMetrics {
    pub train_loss: Option<f64>,
    pub steps: Option<u64>,
    pub runtime_secs: Option<f64>,
    pub trainable_params: Option<u64>,
    pub total_params: Option<u64>,
}

impl TrainingMetrics {
    #[must_use]
    pub fn trainable_percent(&self) -> Option<f64> {
        match (self.trainable_params, self.total_params) {
            (Some(t), Some(total)) if total > 0 => Some(t as f64 * 100.0 / total as f64),
            _ => None,
        }
    }
}

/// Metadata written next to the adapter after a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterManifest {
    pub job_id: TrainingJobId,
    pub created_at: DateTime<Utc>,
    /// Base model the adapter was trained against.
    pub base_model: String,
    pub lora: LoraConfig,
    pub dataset_id: DatasetId,
    pub record_count: usize,
    #[serde(default)]
    pub metrics: TrainingMetrics,
    pub artifacts: Vec<TrainingArtifact>,
}

impl AdapterManifest {
    pub fn artifact(&self, kind: ArtifactKind) -> Option<&TrainingArtifact> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }

    pub fn verify_base_model(&self, expected: &str) -> TrainingResult<()> {
        if self.base_model != expected {
            return Err(TrainingError::ProvenanceMismatch {
                expected: expected.to_string(),
                found: self.base_model.clone(),
            });
        }
        Ok(())
    }
}

pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

pub fn make_artifact(kind: ArtifactKind, path: PathBuf) -> TrainingResult<TrainingArtifact> {
    if !path.is_file() {
        return Err(TrainingError::Artifact(format!("artifact path does not exist: {}", path.display())));
    }

    let hash = sha256_file(&path)?;
    Ok(TrainingArtifact { kind, path, sha256: hash })
}

/// Build an artifact, taking its kind from the file name.
pub fn classify_artifact(path: PathBuf) -> TrainingResult<TrainingArtifact> {
    let kind = path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(ArtifactKind::Other, ArtifactKind::from_file_name);
    make_artifact(kind, path)
}

pub fn write_manifest(path: &Path, manifest: &AdapterManifest) -> TrainingResult<()> {
    let json = serde_json::to_string_pretty(manifest)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Read a manifest. A missing file is reported as a missing adapter.
pub fn read_manifest(path: &Path) -> TrainingResult<AdapterManifest> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TrainingError::AdapterNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(base_model: &str) -> AdapterManifest {
        AdapterManifest {
            job_id: TrainingJobId("job-1".to_string()),
            created_at: Utc::now(),
            base_model: base_model.to_string(),
            lora: LoraConfig::default(),
            dataset_id: DatasetId("abc".to_string()),
            record_count: 2,
            metrics: TrainingMetrics::default(),
            artifacts: vec![],
        }
    }

    #[test]
    fn test_kind_from_file_name() {
        assert_eq!(ArtifactKind::from_file_name("adapter_model.safetensors"), ArtifactKind::AdapterWeights);
        assert_eq!(ArtifactKind::from_file_name("adapter_config.json"), ArtifactKind::AdapterConfig);
        assert_eq!(ArtifactKind::from_file_name("tokenizer.json"), ArtifactKind::Tokenizer);
        assert_eq!(ArtifactKind::from_file_name("tokenizer_config.json"), ArtifactKind::Tokenizer);
        assert_eq!(ArtifactKind::from_file_name("special_tokens_map.json"), ArtifactKind::Tokenizer);
        assert_eq!(ArtifactKind::from_file_name("train_dataset.jsonl"), ArtifactKind::DatasetJsonl);
        assert_eq!(ArtifactKind::from_file_name("README.md"), ArtifactKind::Other);
    }

    #[test]
    fn test_make_artifact_requires_existing_file() {
        let temp = TempDir::new().unwrap();
        let err = make_artifact(ArtifactKind::Other, temp.path().join("missing.bin")).unwrap_err();
        assert!(matches!(err, TrainingError::Artifact(_)));

        let path = temp.path().join("adapter_model.safetensors");
        std::fs::write(&path, b"weights").unwrap();
        let artifact = classify_artifact(path).unwrap();
        assert_eq!(artifact.kind, ArtifactKind::AdapterWeights);
        assert_eq!(artifact.sha256.len(), 64);
    }

    #[test]
    fn test_manifest_roundtrip_and_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("adapter_manifest.json");
        assert!(matches!(read_manifest(&path).unwrap_err(), TrainingError::AdapterNotFound(_)));

        let m = manifest("base/model");
        write_manifest(&path, &m).unwrap();
        assert_eq!(read_manifest(&path).unwrap(), m);
    }

    #[test]
    fn test_verify_base_model() {
        let m = manifest("mistralai/Mistral-7B-Instruct-v0.2");
        m.verify_base_model("mistralai/Mistral-7B-Instruct-v0.2").unwrap();
        let err = m.verify_base_model("meta-llama/Llama-2-7b").unwrap_err();
        match err {
            TrainingError::ProvenanceMismatch { expected, found } => {
                assert_eq!(expected, "meta-llama/Llama-2-7b");
                assert_eq!(found, "mistralai/Mistral-7B-Instruct-v0.2");
            }
            other => panic!("expected ProvenanceMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_trainable_percent() {
        let metrics = TrainingMetrics { trainable_params: Some(25), total_params: Some(1000), ..Default::default() };
        assert_eq!(metrics.trainable_percent(), Some(2.5));
        assert_eq!(TrainingMetrics::default().trainable_percent(), None);
    }
}
