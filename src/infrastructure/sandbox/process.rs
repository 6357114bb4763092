use crate::domain::cancellation::CancelSignal;
use crate::domain::errors::SandboxError;
use crate::domain::execution::{ExecutionRequest, ExecutionResult};
use crate::domain::ports::SandboxEnvironment;
use crate::infrastructure::sandbox::workspace::Workspace;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Grace period for the output readers once the child is gone
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub interpreter: String,
    /// Arguments placed before the script path
    pub interpreter_args: Vec<String>,
    pub script_name: String,
    /// `PATH` handed to the child; the rest of the environment is cleared
    pub path: String,
    /// Extra variables copied from the parent environment when set
    pub env_allowlist: Vec<String>,
    /// Per stream capture limit
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            interpreter_args: vec!["-I".to_string()],
            script_name: "strategy.py".to_string(),
            path: "/usr/local/bin:/usr/bin:/bin".to_string(),
            env_allowlist: Vec::new(),
            max_output_bytes: 1024 * 1024,
        }
    }
}

/// Output captured from one stream
#[derive(Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

type SharedCapture = Arc<Mutex<Captured>>;

fn lock(sink: &SharedCapture) -> MutexGuard<'_, Captured> {
    sink.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reads the whole stream so the child never blocks on a full pipe, keeping
/// at most `limit` bytes in `sink` as they arrive.
async fn capture<R: AsyncRead + Unpin>(mut reader: R, limit: usize, sink: SharedCapture) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let mut captured = lock(&sink);
                let room = limit.saturating_sub(captured.bytes.len());
                if n > room {
                    captured.truncated = true;
                }
                captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) => {
                debug!("ProcessSandbox: output stream closed with error: {}", e);
                break;
            }
        }
    }
}

/// Background reader of one child stream
struct StreamReader {
    task: JoinHandle<()>,
    sink: SharedCapture,
}

impl StreamReader {
    fn spawn<R: AsyncRead + Unpin + Send + 'static>(stream: Option<R>, limit: usize) -> Option<Self> {
        let stream = stream?;
        let sink = SharedCapture::default();
        let task = tokio::spawn(capture(stream, limit, sink.clone()));
        Some(Self { task, sink })
    }

    /// Waits for end of stream, keeping whatever was read if the pipe stays open
    async fn finish(reader: Option<Self>) -> Captured {
        let Some(Self { mut task, sink }) = reader else {
            return Captured::default();
        };
        let abandoned = match tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                warn!("ProcessSandbox: output reader failed: {}", e);
                false
            }
            Err(_) => {
                warn!("ProcessSandbox: output pipe still open after {:?}; keeping partial capture", DRAIN_TIMEOUT);
                task.abort();
                true
            }
        };
        let mut captured = std::mem::take(&mut *lock(&sink));
        captured.truncated |= abandoned;
        captured
    }
}

/// Signals the whole process group led by the child, reaching anything it spawned
#[cfg(unix)]
fn kill_group(group: Option<u32>) {
    let Some(pgid) = group.and_then(|id| libc::pid_t::try_from(id).ok()) else {
        return;
    };
    // SAFETY: killpg has no memory effects; the group was created for this child alone
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        debug!(
            "ProcessSandbox: process group {} already gone: {}",
            pgid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>) {}

async fn kill(child: &mut Child, group: Option<u32>) {
    kill_group(group);
    if let Err(e) = child.kill().await {
        warn!("ProcessSandbox: failed to kill child: {}", e);
    }
}

/// Runs each artifact as a child interpreter process in a throwaway directory.
///
/// The child sees a cleared environment, no stdin and a hard wall-clock limit.
/// A non-zero exit or a timeout is reported in the result, never as an error.
pub struct ProcessSandbox {
    config: SandboxConfig,
}

impl ProcessSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    fn command(&self, workspace: &Workspace) -> Command {
        let mut command = Command::new(&self.config.interpreter);
        command
            .args(&self.config.interpreter_args)
            .arg(workspace.script())
            .current_dir(workspace.path())
            .env_clear()
            .env("PATH", &self.config.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        for name in &self.config.env_allowlist {
            if let Ok(value) = std::env::var(name) {
                command.env(name, value);
            }
        }
        command
    }
}

#[async_trait]
impl SandboxEnvironment for ProcessSandbox {
    async fn run(&self, request: ExecutionRequest, cancel: &CancelSignal) -> Result<ExecutionResult, SandboxError> {
        if cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }
        let workspace = Workspace::prepare(
            &self.config.script_name,
            &request.source,
            request.market_data.as_ref(),
        )
        .await?;

        let started = Instant::now();
        let mut child = self.command(&workspace).spawn().map_err(|e| SandboxError::Spawn {
            interpreter: self.config.interpreter.clone(),
            reason: e.to_string(),
        })?;
        let group = child.id();
        debug!(
            "ProcessSandbox: run {} v{} started in {}",
            request.run_id,
            request.artifact_version,
            workspace.path().display()
        );

        let limit = self.config.max_output_bytes;
        let stdout = StreamReader::spawn(child.stdout.take(), limit);
        let stderr = StreamReader::spawn(child.stderr.take(), limit);

        let (exit_code, timed_out) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                kill(&mut child, group).await;
                info!("ProcessSandbox: run {} v{} cancelled", request.run_id, request.artifact_version);
                return Err(SandboxError::Cancelled);
            }
            waited = tokio::time::timeout(request.timeout, child.wait()) => match waited {
                Ok(Ok(status)) => {
                    // Background processes left behind would hold the pipes open
                    kill_group(group);
                    (status.code(), false)
                }
                Ok(Err(e)) => {
                    warn!("ProcessSandbox: waiting on child failed: {}", e);
                    kill(&mut child, group).await;
                    (None, false)
                }
                Err(_) => {
                    warn!(
                        "ProcessSandbox: run {} v{} exceeded {:?}; killing",
                        request.run_id, request.artifact_version, request.timeout
                    );
                    kill(&mut child, group).await;
                    (None, true)
                }
            },
        };

        let stdout = StreamReader::finish(stdout).await;
        let stderr = StreamReader::finish(stderr).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        Ok(ExecutionResult {
            stdout: String::from_utf8_lossy(&stdout.bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr.bytes).into_owned(),
            exit_code,
            duration_ms,
            timed_out,
            truncated: stdout.truncated || stderr.truncated,
        })
    }
}
