//! Process spawning and shell execution for the simulator binary.
//!
//! The supervisor never talks to the operating system directly. It goes
//! through two seams defined here: [`ProcessRunner`] starts the simulator
//! launcher and hands back a [`SimProcess`] handle, and [`ShellRunner`]
//! runs the setup commands a launch spec derives. Production
//! implementations ([`WaxsimRunner`], [`TokioSimProcess`], [`SystemShell`])
//! sit alongside them; tests substitute scripted doubles.
//!
//! # Example
//!
//! ```no_run
//! use simvisor_core::launch_spec::{LaunchOptions, LaunchSpec};
//! use simvisor_core::runner::{ProcessRunner, SimSignal, WaxsimRunner};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = LaunchSpec::new("Calculator/Calculator.xcodeproj", LaunchOptions::new());
//! let runner = WaxsimRunner::default();
//!
//! let mut process = runner.start(&spec.command()).await?;
//! process.signal(SimSignal::Quit)?;
//! let status = process.wait().await?;
//! println!("simulator exited: {status}");
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, trace};

use crate::launch_spec::SimInvocation;

/// Launcher binary used when none is configured explicitly.
const DEFAULT_LAUNCHER: &str = "waxsim";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while spawning or controlling processes.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The launcher or shell binary could not be started.
    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        /// The program that failed to start.
        program: String,
        /// The underlying spawn error.
        source: std::io::Error,
    },

    /// Delivering a signal to the child failed.
    #[error("failed to signal process: {0}")]
    Signal(String),

    /// Any other I/O error while interacting with the child.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Signals the supervisor delivers to the simulator process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimSignal {
    /// Request a graceful exit that keeps the app installed and its state
    /// on disk, so a later launch resumes where it left off.
    Quit,
    /// Forcibly terminate the process.
    Kill,
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Starts the simulator process described by a [`SimInvocation`].
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Spawn the simulator and return a handle to the running process.
    async fn start(&self, invocation: &SimInvocation) -> Result<Box<dyn SimProcess>, RunnerError>;
}

/// Handle to a running simulator process.
#[async_trait]
pub trait SimProcess: Send + std::fmt::Debug {
    /// Wait for the process to exit and return its status.
    async fn wait(&mut self) -> Result<ExitStatus, RunnerError>;

    /// Deliver a signal to the process.
    fn signal(&self, signal: SimSignal) -> Result<(), RunnerError>;

    /// OS process id, if the process is still believed to be running.
    fn id(&self) -> Option<u32>;
}

/// Runs a setup command line through the system shell.
#[async_trait]
pub trait ShellRunner: Send + Sync {
    /// Execute `command` and wait for it to finish.
    async fn run(&self, command: &str) -> Result<ExitStatus, RunnerError>;
}

// ---------------------------------------------------------------------------
// WaxsimRunner
// ---------------------------------------------------------------------------

/// Production [`ProcessRunner`] that invokes the `waxsim` launcher.
///
/// The launcher receives the device family as `-f`, each environment
/// variable as a separate `-e KEY=VALUE` argument, and the app bundle path
/// last. Stdio is discarded; the simulator's own output goes to the
/// system log, not to us.
pub struct WaxsimRunner {
    launcher: PathBuf,
}

impl WaxsimRunner {
    /// Create a runner using a specific launcher binary.
    pub fn new(launcher: impl Into<PathBuf>) -> Self {
        Self {
            launcher: launcher.into(),
        }
    }
}

impl Default for WaxsimRunner {
    fn default() -> Self {
        Self::new(DEFAULT_LAUNCHER)
    }
}

#[async_trait]
impl ProcessRunner for WaxsimRunner {
    async fn start(&self, invocation: &SimInvocation) -> Result<Box<dyn SimProcess>, RunnerError> {
        let mut command = Command::new(&self.launcher);
        command.arg("-f").arg(invocation.platform.family());
        for (key, value) in &invocation.env {
            command.arg("-e").arg(format!("{key}={value}"));
        }
        command.arg(&invocation.app_bundle);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        debug!(
            launcher = %self.launcher.display(),
            bundle = %invocation.app_bundle.display(),
            family = invocation.platform.family(),
            "starting simulator"
        );

        let child = command.spawn().map_err(|source| RunnerError::SpawnFailed {
            program: self.launcher.display().to_string(),
            source,
        })?;

        Ok(Box::new(TokioSimProcess::new(child)))
    }
}

// ---------------------------------------------------------------------------
// TokioSimProcess
// ---------------------------------------------------------------------------

/// [`SimProcess`] backed by a [`tokio::process::Child`].
#[derive(Debug)]
pub struct TokioSimProcess {
    child: Child,
}

impl TokioSimProcess {
    /// Wrap an already spawned child process.
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

#[async_trait]
impl SimProcess for TokioSimProcess {
    async fn wait(&mut self) -> Result<ExitStatus, RunnerError> {
        let status = self.child.wait().await?;
        trace!(%status, "simulator process exited");
        Ok(status)
    }

    #[cfg(unix)]
    fn signal(&self, signal: SimSignal) -> Result<(), RunnerError> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = self
            .child
            .id()
            .ok_or_else(|| RunnerError::Signal("process has already exited".into()))?;
        let sig = match signal {
            SimSignal::Quit => Signal::SIGQUIT,
            SimSignal::Kill => Signal::SIGKILL,
        };
        trace!(pid, ?sig, "signalling simulator");
        kill(Pid::from_raw(pid as i32), sig).map_err(|e| RunnerError::Signal(e.to_string()))
    }

    #[cfg(not(unix))]
    fn signal(&self, _signal: SimSignal) -> Result<(), RunnerError> {
        Err(RunnerError::Signal(
            "signal delivery is only supported on unix".into(),
        ))
    }

    fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

// ---------------------------------------------------------------------------
// SystemShell
// ---------------------------------------------------------------------------

/// Production [`ShellRunner`] that delegates to `sh -c`.
#[derive(Default)]
pub struct SystemShell;

#[async_trait]
impl ShellRunner for SystemShell {
    async fn run(&self, command: &str) -> Result<ExitStatus, RunnerError> {
        debug!(command, "running setup command");
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| RunnerError::SpawnFailed {
                program: "sh".into(),
                source,
            })?;
        Ok(status)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch_spec::Platform;
    use std::collections::HashMap;

    fn invocation() -> SimInvocation {
        SimInvocation {
            app_bundle: PathBuf::from("/tmp/build/Debug-iphonesimulator/App.app"),
            platform: Platform::Phone,
            env: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn start_reports_missing_launcher() {
        let runner = WaxsimRunner::new("/nonexistent/waxsim-test-binary");
        let err = runner.start(&invocation()).await.unwrap_err();
        match err {
            RunnerError::SpawnFailed { program, .. } => {
                assert_eq!(program, "/nonexistent/waxsim-test-binary");
            }
            other => panic!("expected SpawnFailed, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn system_shell_reports_exit_status() {
        let shell = SystemShell;
        let ok = shell.run("true").await.unwrap();
        assert!(ok.success());

        let failed = shell.run("false").await.unwrap();
        assert!(!failed.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn quit_signal_terminates_child() {
        // `sleep` ignores nothing, so SIGQUIT takes it down promptly.
        let child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        let mut process = TokioSimProcess::new(child);
        assert!(process.id().is_some());

        process.signal(SimSignal::Quit).unwrap();
        let status = process.wait().await.unwrap();
        assert!(!status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signal_after_exit_is_an_error() {
        let child = Command::new("true")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        let mut process = TokioSimProcess::new(child);
        process.wait().await.unwrap();

        let err = process.signal(SimSignal::Kill).unwrap_err();
        assert!(matches!(err, RunnerError::Signal(_)));
    }

    #[test]
    fn default_runner_uses_waxsim() {
        let runner = WaxsimRunner::default();
        assert_eq!(runner.launcher, PathBuf::from("waxsim"));
    }

    #[test]
    fn spawn_error_display_names_program() {
        let err = RunnerError::SpawnFailed {
            program: "waxsim".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let text = err.to_string();
        assert!(text.contains("waxsim"));
        assert!(text.contains("not found"));
    }
}
