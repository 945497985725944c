// Runner Driver
// Spawns the external workflow runner and streams its output as run events

use crate::decoder::MarkerDecoder;
use crate::events::{DoneEvent, EventSender, ProgressSender, RunEvent};
use crate::{CoreError, CoreResult};

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

pub const DEFAULT_RUNNER: &str = "act";

/// How long an interrupted runner gets to clean up before it is killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Configuration for the external runner process
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Runner executable, looked up on `PATH`
    pub program: String,
    /// Flag that points the runner at the prepared directory (`-W` for act)
    pub workflows_flag: Option<String>,
    /// Extra arguments passed through verbatim
    pub args: Vec<String>,
    /// Directory the runner is started in (the repository root)
    pub working_dir: PathBuf,
    pub grace_period: Duration,
    /// Jobs forced to skip; reported once the manifest arrives
    pub skipped: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_RUNNER.to_string(),
            workflows_flag: Some("-W".to_string()),
            args: Vec::new(),
            working_dir: PathBuf::from("."),
            grace_period: DEFAULT_GRACE_PERIOD,
            skipped: Vec::new(),
        }
    }
}

impl RunnerConfig {
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn with_skipped(mut self, skipped: Vec<String>) -> Self {
        self.skipped = skipped;
        self
    }

    pub fn without_workflows_flag(mut self) -> Self {
        self.workflows_flag = None;
        self
    }
}

/// Handle to a spawned runner.
///
/// Cancelling interrupts the runner; a `Done` event still follows once the
/// process has exited.
pub struct RunnerHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RunnerHandle {
    /// Ask the runner to stop.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop driving the runner immediately. The child is killed when its
    /// handle is dropped.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the driver task to finish.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                warn!(error = %e, "runner task panicked");
            }
        }
    }
}

/// Drives one runner process.
pub struct Runner {
    config: RunnerConfig,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Build the runner command for a prepared workflow directory.
    pub fn command(&self, workflows_dir: &Path) -> CoreResult<Command> {
        let program = which::which(&self.config.program).map_err(|e| {
            CoreError::Runner(format!(
                "runner '{}' not found on PATH: {}",
                self.config.program, e
            ))
        })?;

        let mut cmd = Command::new(program);
        if let Some(flag) = &self.config.workflows_flag {
            cmd.arg(flag);
            cmd.arg(workflows_dir);
        }
        cmd.args(&self.config.args);
        cmd.current_dir(&self.config.working_dir);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        // Own process group, so an interrupt reaches the runner's children
        #[cfg(unix)]
        cmd.process_group(0);

        Ok(cmd)
    }

    /// Spawn the runner in the background, sending events to `tx`.
    ///
    /// Every run ends with exactly one `Done` or `Error` event.
    pub fn spawn(self, workflows_dir: PathBuf, tx: ProgressSender) -> RunnerHandle {
        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            if let Err(e) = self.drive(&workflows_dir, &tx, cancel_rx).await {
                tx.send_event(RunEvent::error(e.to_string()));
            }
        });
        RunnerHandle { cancel, task }
    }

    async fn drive(
        &self,
        workflows_dir: &Path,
        tx: &ProgressSender,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> CoreResult<()> {
        let started = Instant::now();
        let mut cmd = self.command(workflows_dir)?;
        let mut child = cmd.spawn().map_err(|e| {
            CoreError::Runner(format!("failed to start '{}': {}", self.config.program, e))
        })?;
        info!(program = %self.config.program, dir = %workflows_dir.display(), "runner started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CoreError::Runner("runner stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CoreError::Runner("runner stderr not captured".to_string()))?;

        let mut lines = LinesStream::new(BufReader::new(stdout).lines())
            .merge(LinesStream::new(BufReader::new(stderr).lines()));

        let mut decoder = MarkerDecoder::with_skipped(self.config.skipped.clone());
        let mut cancelled = false;
        let kill_deadline = tokio::time::sleep(Duration::MAX);
        tokio::pin!(kill_deadline);
        let mut kill_armed = false;
        let mut streaming = true;

        // Output is drained before the exit status is collected; a runner that
        // closes its pipes early can still be interrupted while it is awaited.
        let status = loop {
            tokio::select! {
                line = lines.next(), if streaming => match line {
                    Some(Ok(line)) => {
                        for event in decoder.decode(&line) {
                            tx.send_event(event);
                        }
                    }
                    Some(Err(e)) => debug!(error = %e, "skipping unreadable runner output"),
                    None => streaming = false,
                },
                status = child.wait(), if !streaming => break status?,
                changed = cancel_rx.changed(), if !cancelled => {
                    // A dropped handle counts as a cancellation request
                    if changed.is_err() || *cancel_rx.borrow() {
                        cancelled = true;
                        info!("interrupting runner");
                        interrupt(&mut child);
                        kill_deadline
                            .as_mut()
                            .reset(tokio::time::Instant::now() + self.config.grace_period);
                        kill_armed = true;
                    }
                }
                _ = &mut kill_deadline, if kill_armed => {
                    warn!("runner did not stop within the grace period, killing it");
                    kill_armed = false;
                    force_kill(&mut child);
                }
            }
        };

        let exit_code = status.code().unwrap_or(-1);

        let mut error_count = decoder.failed_jobs();
        if exit_code != 0 {
            error_count = error_count.max(1);
        }

        info!(exit_code, error_count, cancelled, "runner finished");

        tx.send_event(RunEvent::Done(DoneEvent {
            error_count,
            duration: started.elapsed(),
            exit_code,
            errors: None,
            cancelled,
        }));
        Ok(())
    }
}

#[cfg(unix)]
fn signal_group(child: &Child, sig: nix::sys::signal::Signal) -> bool {
    use nix::sys::signal;
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => signal::kill(Pid::from_raw(-(pid as i32)), sig).is_ok(),
        None => false,
    }
}

#[cfg(unix)]
fn interrupt(child: &mut Child) {
    if !signal_group(child, nix::sys::signal::Signal::SIGINT) {
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) {
    let _ = child.start_kill();
}

fn force_kill(child: &mut Child) {
    #[cfg(unix)]
    signal_group(child, nix::sys::signal::Signal::SIGKILL);

    let _ = child.start_kill();
}
