use crate::protocol::{parse_event, WorkerEvent, WorkerRequest};
use crate::reference;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;
use yieldtune_training::{TrainingError, TrainingResult, WorkerConfig};

const STDERR_TAIL_LINES: usize = 20;

/// Launches the worker program and streams its events.
#[derive(Debug, Clone)]
pub struct WorkerProcess {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    reference_script: bool,
}

impl WorkerProcess {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args, env: BTreeMap::new(), reference_script: false }
    }

    #[must_use]
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
            reference_script: config.reference_script,
        }
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Pass the bundled reference worker script after `args`.
    #[must_use]
    pub fn with_reference_script(mut self, enabled: bool) -> Self {
        self.reference_script = enabled;
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Write `request` to `request_path`, run the worker and feed every event
    /// except `error` to `on_event`.
    ///
    /// The command line is `program args... [reference script] request_path`.
    /// Output that is not valid UTF-8 is decoded lossily.
    ///
    /// Fails on a worker `error` event, a non-zero exit, or an error returned
    /// by `on_event` (the worker is killed in that case).
    pub async fn run<F>(&self, request_path: &Path, request: &WorkerRequest, mut on_event: F) -> TrainingResult<()>
    where
        F: FnMut(WorkerEvent) -> TrainingResult<()> + Send,
    {
        if let Some(parent) = request_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(request_path, serde_json::to_vec(request)?)?;

        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if self.reference_script {
            let script_dir = request_path.parent().unwrap_or_else(|| Path::new("."));
            command.arg(reference::install(script_dir)?);
        }
        command
            .arg(request_path)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %self.program, args = ?self.args, request = %request_path.display(), "spawning worker");
        let mut child = command
            .spawn()
            .map_err(|e| TrainingError::Backend(format!("failed to spawn worker `{}`: {e}", self.program)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TrainingError::Backend("worker stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TrainingError::Backend("worker stderr was not captured".to_string()))?;

        // Drained until EOF so the worker never blocks or dies on a closed pipe.
        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            loop {
                match next_line_lossy(&mut reader, &mut buf).await {
                    Ok(Some(line)) => {
                        debug!(target: "yieldtune::worker", "stderr: {line}");
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(target: "yieldtune::worker", error = %e, "stderr read failed");
                        break;
                    }
                }
            }
            tail
        });

        let mut worker_error: Option<String> = None;
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        while let Some(line) = next_line_lossy(&mut reader, &mut buf).await? {
            match parse_event(&line) {
                Some(WorkerEvent::Error { message }) => {
                    if worker_error.is_none() {
                        worker_error = Some(message);
                    }
                }
                Some(event) => {
                    if let Err(e) = on_event(event) {
                        let _ = child.start_kill();
                        return Err(e);
                    }
                }
                None => debug!(target: "yieldtune::worker", "stdout: {line}"),
            }
        }

        let status = child.wait().await?;
        let tail = stderr_task
            .await
            .map_err(|e| TrainingError::Backend(format!("stderr reader failed: {e}")))?;

        if let Some(message) = worker_error {
            return Err(TrainingError::Backend(format!("worker reported error: {message}{}", format_tail(&tail))));
        }
        if !status.success() {
            return Err(TrainingError::Backend(format!("worker exited with {status}{}", format_tail(&tail))));
        }
        Ok(())
    }
}

/// Read one line, replacing invalid UTF-8 instead of failing on it.
async fn next_line_lossy<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

fn format_tail(tail: &VecDeque<String>) -> String {
    if tail.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n--- worker stderr ---");
    for line in tail {
        out.push('\n');
        out.push_str(line);
    }
    out
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> WorkerProcess {
        WorkerProcess::new("sh", vec!["-c".to_string(), script.to_string(), "worker".to_string()])
    }

    fn log_request() -> WorkerRequest {
        WorkerRequest::Generate {
            request: yieldtune_training::GenerationRequest {
                base_model: "m".to_string(),
                revision: None,
                adapter_dir: std::path::PathBuf::from("out"),
                prompt: "[INST] p [/INST]".to_string(),
                max_new_tokens: 4,
                temperature: 0.7,
                top_p: 0.9,
                do_sample: true,
                skip_special_tokens: true,
                dtype: yieldtune_training::config::DType::Bf16,
            },
        }
    }

    #[tokio::test]
    async fn test_events_are_forwarded_and_request_file_passed() {
        let temp = TempDir::new().unwrap();
        let request_path = temp.path().join("req").join("worker_request.json");
        let worker = sh(r#"grep -q '"kind":"generate"' "$1" || exit 7
echo 'warming up'
echo '{"event":"log","message":"loaded"}'
echo '{"event":"generated","text":"done"}'"#);

        let mut events = Vec::new();
        worker
            .run(&request_path, &log_request(), |e| {
                events.push(e);
                Ok(())
            })
            .await
            .unwrap();

        assert!(request_path.exists());
        assert_eq!(
            events,
            vec![
                WorkerEvent::Log { message: "loaded".to_string() },
                WorkerEvent::Generated { text: "done".to_string() },
            ]
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr_tail() {
        let temp = TempDir::new().unwrap();
        let worker = sh("echo 'torch.cuda.OutOfMemoryError: CUDA out of memory' >&2; exit 2");

        let err = worker.run(&temp.path().join("r.json"), &log_request(), |_| Ok(())).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exited with"));
        assert!(msg.contains("CUDA out of memory"));
    }

    #[tokio::test]
    async fn test_error_event_fails_even_on_clean_exit() {
        let temp = TempDir::new().unwrap();
        let worker = sh(r#"echo '{"event":"error","message":"model not found on hub"}'"#);

        let err = worker.run(&temp.path().join("r.json"), &log_request(), |_| Ok(())).await.unwrap_err();
        assert!(err.to_string().contains("model not found on hub"));
    }

    #[tokio::test]
    async fn test_callback_error_stops_worker() {
        let temp = TempDir::new().unwrap();
        let worker = sh(r#"echo '{"event":"log","message":"x"}'; sleep 30"#);

        let err = worker
            .run(&temp.path().join("r.json"), &log_request(), |_| Err(TrainingError::Backend("stop".to_string())))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "backend error: stop");
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let temp = TempDir::new().unwrap();
        let worker = WorkerProcess::new("/nonexistent/yieldtune-worker", vec![]);

        let err = worker.run(&temp.path().join("r.json"), &log_request(), |_| Ok(())).await.unwrap_err();
        assert!(err.to_string().contains("failed to spawn worker"));
    }

    #[tokio::test]
    async fn test_env_is_passed_through() {
        let temp = TempDir::new().unwrap();
        let mut config = WorkerConfig {
            program: "sh".to_string(),
            reference_script: false,
            args: vec![
                "-c".to_string(),
                r#"echo "{\"event\":\"log\",\"message\":\"$YIELDTUNE_TEST_VAR\"}""#.to_string(),
                "worker".to_string(),
            ],
            ..Default::default()
        };
        config.env.insert("YIELDTUNE_TEST_VAR".to_string(), "from-config".to_string());

        let mut seen = None;
        WorkerProcess::from_config(&config)
            .run(&temp.path().join("r.json"), &log_request(), |e| {
                seen = Some(e);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(seen, Some(WorkerEvent::Log { message: "from-config".to_string() }));
    }

    #[tokio::test]
    async fn test_invalid_utf8_on_stderr_keeps_worker_alive() {
        let temp = TempDir::new().unwrap();
        let worker = sh(r#"printf 'bnb \377\n' >&2
sleep 1
echo 'later warning' >&2
echo '{"event":"generated","text":"ok"}'"#);

        let mut events = Vec::new();
        worker
            .run(&temp.path().join("r.json"), &log_request(), |e| {
                events.push(e);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(events, vec![WorkerEvent::Generated { text: "ok".to_string() }]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_on_stdout_is_chatter() {
        let temp = TempDir::new().unwrap();
        let worker = sh(r#"printf 'progress \377\r\n'
echo '{"event":"generated","text":"ok"}'"#);

        let mut events = Vec::new();
        worker
            .run(&temp.path().join("r.json"), &log_request(), |e| {
                events.push(e);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(events, vec![WorkerEvent::Generated { text: "ok".to_string() }]);
    }

    #[tokio::test]
    async fn test_stderr_tail_survives_invalid_utf8() {
        let temp = TempDir::new().unwrap();
        let worker = sh(r#"printf 'cuda \377 init\n' >&2; echo 'Segmentation fault' >&2; exit 139"#);

        let msg = worker.run(&temp.path().join("r.json"), &log_request(), |_| Ok(())).await.unwrap_err().to_string();
        assert!(msg.contains("cuda \u{fffd} init"));
        assert!(msg.contains("Segmentation fault"));
    }

    #[tokio::test]
    async fn test_reference_script_is_passed_before_request() {
        let temp = TempDir::new().unwrap();
        let worker = sh(r#"grep -q 'def main' "$1" || exit 7
grep -q '"kind":"generate"' "$2" || exit 8
echo '{"event":"generated","text":"ok"}'"#)
        .with_reference_script(true);

        let request_path = temp.path().join("out").join("worker_request.json");
        let mut text = None;
        worker
            .run(&request_path, &log_request(), |e| {
                if let WorkerEvent::Generated { text: t } = e {
                    text = Some(t);
                }
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(text.as_deref(), Some("ok"));
        assert!(temp.path().join("out").join(reference::REFERENCE_WORKER_FILE).is_file());
    }
}
