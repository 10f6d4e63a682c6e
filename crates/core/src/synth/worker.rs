//! Model worker backend.
//!
//! The neural model is loaded once by a long-lived worker process. Requests
//! and responses are single-line JSON documents over the worker's stdin and
//! stdout; the worker's stderr is passed through so model logs stay visible.
//!
//! Handshake: after loading, the worker prints `{"ready": true}` (or
//! `{"ready": false, "error": "..."}`) before accepting requests.
//!
//! Model code tends to print progress to stdout, so any line that is not a
//! response object is passed to the log and skipped. Each request carries an
//! `id`; a reply echoing a different id is stale and skipped too.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use super::{DecodingParams, SpeechSynthesizer, SynthesisCall};
use crate::error::DrillError;

/// Model config file the worker loads next to the checkpoints.
pub const MODEL_CONFIG_FILE: &str = "config.yaml";

/// How to launch the model worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker executable
    pub program: PathBuf,
    /// Arguments placed before the generated model arguments
    pub args: Vec<String>,
    /// Model checkpoint directory
    pub model_dir: PathBuf,
    /// Forbid the worker from fetching model files over the network
    pub offline: bool,
}

impl WorkerConfig {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from("indextts-worker"),
            args: Vec::new(),
            model_dir: model_dir.into(),
            offline: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Handshake {
    ready: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct WorkerRequest<'a> {
    id: u64,
    spk_audio_prompt: &'a Path,
    text: &'a str,
    output_path: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(flatten)]
    params: &'a DecodingParams,
}

#[derive(Debug, Deserialize)]
struct WorkerResponse {
    ok: bool,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    output_path: Option<PathBuf>,
    #[serde(default)]
    error: Option<String>,
}

pub struct WorkerSynthesizer {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
    released: bool,
}

impl WorkerSynthesizer {
    /// Launch the worker and wait until it reports the model is loaded.
    ///
    /// Every failure here is fatal for the run.
    pub fn spawn(config: &WorkerConfig) -> std::result::Result<Self, DrillError> {
        let model_dir = absolute(&config.model_dir).map_err(DrillError::model_init)?;
        if !model_dir.is_dir() {
            return Err(DrillError::model_init(format!(
                "model directory not found: {}",
                model_dir.display()
            )));
        }
        let cfg_path = model_dir.join(MODEL_CONFIG_FILE);
        if !cfg_path.is_file() {
            return Err(DrillError::model_init(format!(
                "model config not found: {}",
                cfg_path.display()
            )));
        }

        let mut cmd = Command::new(&config.program);
        cmd.args(&config.args)
            .arg("--model-dir")
            .arg(&model_dir)
            .arg("--cfg-path")
            .arg(&cfg_path);
        if config.offline {
            cmd.arg("--offline");
        }

        log::info!("Loading speech model from {}", model_dir.display());
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                DrillError::model_init(format!("failed to start {}: {}", config.program.display(), e))
            })?;

        let stdin = child.stdin.take();
        let stdout = match child.stdout.take() {
            Some(s) => BufReader::new(s),
            None => {
                let _ = child.kill();
                return Err(DrillError::model_init("worker stdout unavailable"));
            }
        };

        let mut worker = Self {
            child,
            stdin,
            stdout,
            next_id: 1,
            released: false,
        };

        match worker.read_handshake() {
            Ok(Handshake { ready: true, .. }) => Ok(worker),
            Ok(Handshake { error, .. }) => {
                worker.kill();
                Err(DrillError::model_init(
                    error.unwrap_or_else(|| "worker reported not ready".to_string()),
                ))
            }
            Err(e) => {
                worker.kill();
                Err(DrillError::model_init(format!("{:#}", e)))
            }
        }
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self
            .stdout
            .read_line(&mut line)
            .context("Failed to read from worker")?;
        if n == 0 {
            let status = self.child.try_wait().ok().flatten();
            match status {
                Some(status) => bail!("Worker exited ({})", status),
                None => bail!("Worker closed its output"),
            }
        }
        Ok(line)
    }

    fn read_handshake(&mut self) -> Result<Handshake> {
        loop {
            let line = self.read_line()?;
            match serde_json::from_str::<Handshake>(&line) {
                Ok(h) => return Ok(h),
                Err(_) => log::debug!("worker: {}", line.trim_end()),
            }
        }
    }

    /// Read until the reply to request `id`, skipping log noise and stale replies.
    fn read_response(&mut self, id: u64) -> Result<WorkerResponse> {
        loop {
            let line = self.read_line()?;
            let response = match serde_json::from_str::<WorkerResponse>(&line) {
                Ok(r) => r,
                Err(_) => {
                    log::debug!("worker: {}", line.trim_end());
                    continue;
                }
            };
            match response.id {
                Some(got) if got != id => {
                    log::warn!("Skipping stale worker reply for request {} (waiting on {})", got, id);
                }
                _ => return Ok(response),
            }
        }
    }

    fn kill(&mut self) {
        self.stdin.take();
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.released = true;
    }
}

impl SpeechSynthesizer for WorkerSynthesizer {
    fn name(&self) -> &str {
        "worker"
    }

    fn synthesize(&mut self, call: &SynthesisCall<'_>) -> Result<PathBuf> {
        let reference_voice = absolute(call.reference_voice)?;
        let output_path = absolute(call.output_path)?;
        let id = self.next_id;
        self.next_id += 1;
        let request = WorkerRequest {
            id,
            spk_audio_prompt: &reference_voice,
            text: call.text,
            output_path: &output_path,
            seed: call.seed,
            params: call.params,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("Worker already released"))?;
        stdin
            .write_all(line.as_bytes())
            .and_then(|_| stdin.flush())
            .context("Failed to send request to worker")?;

        let response = self.read_response(id)?;
        if !response.ok {
            bail!(
                "{}",
                response.error.unwrap_or_else(|| "unknown worker error".to_string())
            );
        }
        let written = response
            .output_path
            .ok_or_else(|| anyhow!("TTS returned empty output path"))?;
        if written != output_path {
            bail!(
                "Worker wrote {} but {} was requested",
                written.display(),
                output_path.display()
            );
        }
        Ok(call.output_path.to_path_buf())
    }

    /// Close the request pipe and wait for the worker to exit on its own.
    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.stdin.take();
        let status = self.child.wait().context("Failed to wait for worker")?;
        self.released = true;
        if !status.success() {
            log::warn!("Speech worker exited with {}", status);
        }
        Ok(())
    }
}

impl Drop for WorkerSynthesizer {
    fn drop(&mut self) {
        if !self.released {
            self.kill();
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("Failed to resolve current directory")?
        .join(path))
}
