use crate::error::{TrainingError, TrainingResult};
use crate::template::PromptTemplate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Stable identifier for a formatted dataset (content hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(pub String);

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A labeled instruction/response pair as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub instruction: String,
    pub response: String,
}

/// A single `text` blob ready for supervised fine-tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedRecord {
    pub text: String,
}

pub type Dataset = Vec<FormattedRecord>;

/// Read a JSON array of examples.
///
/// The whole file is rejected if any element is malformed.
pub fn load_examples(path: &Path) -> TrainingResult<Vec<Example>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TrainingError::DatasetNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| TrainingError::DatasetFormat(format!("{}: {}", path.display(), e)))?;

    let serde_json::Value::Array(items) = value else {
        return Err(TrainingError::DatasetFormat(format!(
            "{}: expected a JSON array of examples, found {}",
            path.display(),
            json_kind(&value)
        )));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            Example::deserialize(item).map_err(|e| {
                TrainingError::DatasetFormat(format!("{}: example[{idx}]: {e}", path.display()))
            })
        })
        .collect()
}

#[must_use]
pub fn format_example(example: &Example) -> FormattedRecord {
    FormattedRecord { text: PromptTemplate.render_training(&example.instruction, &example.response) }
}

/// Load and format a dataset, one record per example.
pub fn load_dataset(path: &Path) -> TrainingResult<Dataset> {
    let examples = load_examples(path)?;
    Ok(examples.iter().map(format_example).collect())
}

pub fn write_jsonl_dataset(path: &Path, records: &[FormattedRecord]) -> TrainingResult<()> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}

pub fn compute_dataset_id(records: &[FormattedRecord]) -> TrainingResult<DatasetId> {
    let mut hasher = Sha256::new();

    for record in records {
        let bytes = serde_json::to_vec(record)?;
        hasher.update(bytes);
        hasher.update(b"\n");
    }

    Ok(DatasetId(hex::encode(hasher.finalize())))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
