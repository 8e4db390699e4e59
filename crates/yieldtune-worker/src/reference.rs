//! Bundled reference worker.
//!
//! A Python script on the `transformers`/`peft`/`trl`/`bitsandbytes` stack,
//! compiled into the binary and written next to the request file before each
//! run, so the default configuration works without a separately installed
//! package.

use std::path::{Path, PathBuf};
use yieldtune_training::TrainingResult;

pub const REFERENCE_WORKER_FILE: &str = "yieldtune_worker.py";
pub const REFERENCE_WORKER_SOURCE: &str = include_str!("../python/yieldtune_worker.py");

/// Write the script into `dir` and return its path.
pub fn install(dir: &Path) -> TrainingResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(REFERENCE_WORKER_FILE);
    std::fs::write(&path, REFERENCE_WORKER_SOURCE)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_install_writes_script() {
        let temp = TempDir::new().unwrap();
        let path = install(&temp.path().join("out")).unwrap();
        assert_eq!(path.file_name().unwrap(), REFERENCE_WORKER_FILE);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), REFERENCE_WORKER_SOURCE);
    }

    #[test]
    fn test_script_speaks_every_event() {
        for event in ["log", "model_ready", "step", "checkpoint", "saved", "completed", "generated", "error"] {
            assert!(
                REFERENCE_WORKER_SOURCE.contains(&format!("emit(\"{event}\"")),
                "reference worker never emits `{event}`"
            );
        }
        assert!(REFERENCE_WORKER_SOURCE.contains(r#"kind == "train""#));
        assert!(REFERENCE_WORKER_SOURCE.contains(r#"kind == "generate""#));
    }

    #[test]
    fn test_script_reads_serialized_enum_names() {
        for name in ["paged_adamw_32bit", "paged_adamw_8bit", "causal_lm", "bf16", "fp16"] {
            assert!(REFERENCE_WORKER_SOURCE.contains(&format!("\"{name}\"")), "missing `{name}`");
        }
    }
}
