//! Lifecycle supervision for an externally spawned simulator process.
//!
//! This module provides [`Supervisor`], the state machine that owns a
//! simulator used as a UI-test fixture. It drives four operations:
//!
//! - [`launch`](Supervisor::launch) — run setup commands, start the
//!   process with a fresh scratch home injected, and poll the app's HTTP
//!   endpoint until it is ready
//! - [`quit`](Supervisor::quit) — best-effort graceful shutdown
//! - [`suspend`](Supervisor::suspend) — signal the process to exit while
//!   keeping its on-disk state
//! - [`resume`](Supervisor::resume) — relaunch the retained spec after a
//!   suspend
//!
//! The supervisor performs no direct I/O. Process spawning, shell
//! execution, readiness probing, and scratch-directory creation all go
//! through the seams in [`crate::runner`], [`crate::probe`], and
//! [`crate::scratch`], which is what makes the state machine testable
//! without a real simulator.
//!
//! # Example
//!
//! ```no_run
//! use simvisor_core::launch_spec::{LaunchOptions, LaunchSpec};
//! use simvisor_core::supervisor::Supervisor;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut supervisor = Supervisor::with_local_simulator("waxsim", 50000);
//! let spec = LaunchSpec::new("Calculator/Calculator.xcodeproj", LaunchOptions::new());
//!
//! supervisor.launch(spec).await?;
//! supervisor.suspend().await?;
//! supervisor.resume().await?;
//! supervisor.quit().await?;
//! # Ok(())
//! # }
//! ```

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::launch_spec::{LaunchOptions, LaunchSpec};
use crate::probe::{HttpProbe, ProbeError, ReadinessClient};
use crate::runner::{ProcessRunner, RunnerError, ShellRunner, SimProcess, SimSignal, SystemShell, WaxsimRunner};
use crate::scratch::{ScratchDirs, TempScratch};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Endpoint polled while waiting for the app to come up.
pub const READINESS_ENDPOINT: &str = "/view";

/// Endpoint asked to shut the app down gracefully.
pub const QUIT_ENDPOINT: &str = "/quit";

/// Environment variable that redirects the app's home directory.
pub const FIXED_HOME_VAR: &str = "CFFIXED_USER_HOME";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timing and failure-handling knobs for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How long a launch may take before it is declared failed.
    pub startup_timeout: Duration,

    /// Delay between readiness probe attempts.
    pub probe_interval: Duration,

    /// Pause after a suspended process exits, giving the simulator
    /// infrastructure time to release the device before a relaunch.
    pub settle_delay: Duration,

    /// Whether a failed launch kills the half-started process.
    ///
    /// When `false` (the default) the process is left running and the
    /// supervisor stays in `Starting`, so a later [`Supervisor::quit`]
    /// can still clean up. When `true` the process is killed and the
    /// supervisor returns to `Stopped`.
    pub kill_on_launch_failure: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(30),
            probe_interval: Duration::from_millis(500),
            settle_delay: Duration::from_secs(1),
            kill_on_launch_failure: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during lifecycle operations.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// A setup command could not be started at all.
    #[error("failed to run setup command `{command}`: {source}")]
    SetupCommandSpawn {
        /// The command line that failed.
        command: String,
        /// The underlying spawn error.
        source: RunnerError,
    },

    /// A setup command ran but exited unsuccessfully.
    #[error("setup command exited with {status}: {command}")]
    SetupCommandFailed {
        /// The command line that failed.
        command: String,
        /// The command's exit status.
        status: std::process::ExitStatus,
    },

    /// The app never became ready within the startup timeout.
    #[error("simulator failed to become ready within the startup timeout")]
    LaunchTimeout,

    /// A readiness probe failed in a way retrying cannot fix.
    #[error("readiness probe failed: {0}")]
    ReadinessProbe(ProbeError),

    /// The requested operation is not valid in the current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state the supervisor was in.
        state: &'static str,
    },

    /// Spawning, signalling, or waiting on a process failed.
    #[error("process runner error: {0}")]
    Runner(#[from] RunnerError),

    /// Creating the per-launch scratch home failed.
    #[error("failed to create scratch directory: {0}")]
    ScratchDir(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Lifecycle state
// ---------------------------------------------------------------------------

/// Internal state, carrying the data each phase needs.
enum Lifecycle {
    /// No process is running and nothing is retained.
    Stopped,
    /// The process was spawned but has not yet answered a probe.
    Starting {
        spec: LaunchSpec,
        process: Box<dyn SimProcess>,
    },
    /// The process answered a readiness probe.
    Ready {
        spec: LaunchSpec,
        process: Box<dyn SimProcess>,
    },
    /// The process exited gracefully; its spec is retained for resume.
    Suspended { spec: LaunchSpec },
}

impl Lifecycle {
    fn name(&self) -> &'static str {
        match self {
            Lifecycle::Stopped => "stopped",
            Lifecycle::Starting { .. } => "starting",
            Lifecycle::Ready { .. } => "ready",
            Lifecycle::Suspended { .. } => "suspended",
        }
    }

    fn state(&self) -> LifecycleState {
        match self {
            Lifecycle::Stopped => LifecycleState::Stopped,
            Lifecycle::Starting { .. } => LifecycleState::Starting,
            Lifecycle::Ready { .. } => LifecycleState::Ready,
            Lifecycle::Suspended { .. } => LifecycleState::Suspended,
        }
    }
}

/// Observable lifecycle phase, without the internal payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No simulator process is associated with the supervisor.
    Stopped,
    /// A process was spawned and readiness is pending or failed.
    Starting,
    /// The simulated app is up and answering probes.
    Ready,
    /// The process exited gracefully; resume will bring it back.
    Suspended,
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// State machine supervising a single simulator process.
///
/// All collaborators are injected; see
/// [`with_local_simulator`](Self::with_local_simulator) for the default
/// production wiring.
pub struct Supervisor {
    runner: Arc<dyn ProcessRunner>,
    shell: Arc<dyn ShellRunner>,
    probe: Arc<dyn ReadinessClient>,
    scratch: Arc<dyn ScratchDirs>,
    config: SupervisorConfig,
    lifecycle: Lifecycle,
}

impl Supervisor {
    /// Create a supervisor with explicit collaborators.
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        shell: Arc<dyn ShellRunner>,
        probe: Arc<dyn ReadinessClient>,
        scratch: Arc<dyn ScratchDirs>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            runner,
            shell,
            probe,
            scratch,
            config,
            lifecycle: Lifecycle::Stopped,
        }
    }

    /// Create a supervisor wired to the local simulator toolchain.
    ///
    /// Uses the given launcher binary, the system shell for setup
    /// commands, an HTTP probe against `127.0.0.1:probe_port`, temp-dir
    /// scratch homes, and the default [`SupervisorConfig`].
    pub fn with_local_simulator(launcher: impl Into<std::path::PathBuf>, probe_port: u16) -> Self {
        Self::new(
            Arc::new(WaxsimRunner::new(launcher)),
            Arc::new(SystemShell),
            Arc::new(HttpProbe::new("127.0.0.1".into(), probe_port)),
            Arc::new(TempScratch),
            SupervisorConfig::default(),
        )
    }

    /// The current lifecycle phase.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// The spec of the launch in flight, if any.
    ///
    /// This is always the spec as the caller supplied it, without the
    /// per-launch scratch-home decoration.
    pub fn current_spec(&self) -> Option<&LaunchSpec> {
        match &self.lifecycle {
            Lifecycle::Stopped => None,
            Lifecycle::Starting { spec, .. }
            | Lifecycle::Ready { spec, .. }
            | Lifecycle::Suspended { spec } => Some(spec),
        }
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Launch the simulator described by `spec` and wait until it is ready.
    ///
    /// The spec is decorated with a freshly created scratch home via
    /// [`FIXED_HOME_VAR`] before anything runs; the caller's spec is
    /// retained undecorated so a later [`resume`](Self::resume) gets a new
    /// home of its own. Setup commands run in order before the process is
    /// spawned, and any failure among them aborts the launch with nothing
    /// started.
    ///
    /// On readiness failure the behavior depends on
    /// [`SupervisorConfig::kill_on_launch_failure`]; see there.
    pub async fn launch(&mut self, spec: LaunchSpec) -> Result<(), SupervisorError> {
        if !matches!(self.lifecycle, Lifecycle::Stopped) {
            return Err(SupervisorError::InvalidState {
                operation: "launch",
                state: self.lifecycle.name(),
            });
        }

        let home = self.scratch.create()?;
        info!(
            project = %spec.project_path().display(),
            home = %home.display(),
            "launching simulator"
        );

        let effective = spec.with_options(
            LaunchOptions::new().with_env_var(FIXED_HOME_VAR, home.to_string_lossy()),
        );

        for command in effective.setup_commands() {
            let status = self.shell.run(&command).await.map_err(|source| {
                SupervisorError::SetupCommandSpawn {
                    command: command.clone(),
                    source,
                }
            })?;
            if !status.success() {
                return Err(SupervisorError::SetupCommandFailed { command, status });
            }
            debug!(command, "setup command completed");
        }

        let process = self.runner.start(&effective.command()).await?;
        self.lifecycle = Lifecycle::Starting { spec, process };

        match self.wait_for_ready().await {
            Ok(()) => {
                if let Lifecycle::Starting { spec, process } =
                    mem::replace(&mut self.lifecycle, Lifecycle::Stopped)
                {
                    self.lifecycle = Lifecycle::Ready { spec, process };
                }
                info!("simulator is ready");
                Ok(())
            }
            Err(err) => {
                if self.config.kill_on_launch_failure {
                    warn!(error = %err, "launch failed, killing simulator");
                    if let Lifecycle::Starting { mut process, .. } =
                        mem::replace(&mut self.lifecycle, Lifecycle::Stopped)
                    {
                        if let Err(kill_err) = process.signal(SimSignal::Kill) {
                            debug!(error = %kill_err, "kill after failed launch did not deliver");
                        } else if let Err(wait_err) = process.wait().await {
                            debug!(error = %wait_err, "wait after kill failed");
                        }
                    }
                } else {
                    warn!(error = %err, "launch failed, leaving simulator running");
                }
                Err(err)
            }
        }
    }

    /// Shut the simulator down, tolerating an app that is already gone.
    ///
    /// Asks the app to exit via [`QUIT_ENDPOINT`]; a probe failure here is
    /// logged and ignored since the goal is a stopped process either way.
    /// Then waits for the process to exit. A quit from `Stopped` or
    /// `Suspended` is a no-op.
    pub async fn quit(&mut self) -> Result<(), SupervisorError> {
        let mut process = match mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Stopped => {
                debug!("quit requested while stopped; nothing to do");
                return Ok(());
            }
            Lifecycle::Suspended { .. } => {
                debug!("quit requested while suspended; process already exited");
                return Ok(());
            }
            Lifecycle::Starting { process, .. } | Lifecycle::Ready { process, .. } => process,
        };

        if let Err(err) = self.probe.get(QUIT_ENDPOINT).await {
            debug!(error = %err, "quit request not acknowledged");
        }

        process.wait().await?;
        info!("simulator stopped");
        Ok(())
    }

    /// Suspend the simulator, keeping its on-disk state for a resume.
    ///
    /// Sends the graceful-exit signal, waits for the process to go away,
    /// and pauses for [`SupervisorConfig::settle_delay`] so the device is
    /// released before anything relaunches. Only valid from `Ready`.
    pub async fn suspend(&mut self) -> Result<(), SupervisorError> {
        let (spec, mut process) = match mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Ready { spec, process } => (spec, process),
            other => {
                let state = other.name();
                self.lifecycle = other;
                return Err(SupervisorError::InvalidState {
                    operation: "suspend",
                    state,
                });
            }
        };

        if let Err(err) = process.signal(SimSignal::Quit) {
            self.lifecycle = Lifecycle::Ready { spec, process };
            return Err(err.into());
        }

        let waited = process.wait().await;
        self.lifecycle = Lifecycle::Suspended { spec };
        waited?;

        tokio::time::sleep(self.config.settle_delay).await;
        info!("simulator suspended");
        Ok(())
    }

    /// Relaunch the spec retained by the last [`suspend`](Self::suspend).
    ///
    /// Equivalent to calling [`launch`](Self::launch) again with the
    /// original spec: the app comes back with a fresh scratch home and the
    /// same configuration. Only valid from `Suspended`.
    pub async fn resume(&mut self) -> Result<(), SupervisorError> {
        let spec = match mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Suspended { spec } => spec,
            other => {
                let state = other.name();
                self.lifecycle = other;
                return Err(SupervisorError::InvalidState {
                    operation: "resume",
                    state,
                });
            }
        };

        info!("resuming simulator");
        self.launch(spec).await
    }

    // -----------------------------------------------------------------------
    // Readiness
    // -----------------------------------------------------------------------

    /// Poll [`READINESS_ENDPOINT`] until the app answers, a fatal probe
    /// error occurs, or the startup timeout elapses.
    async fn wait_for_ready(&self) -> Result<(), SupervisorError> {
        let deadline = tokio::time::Instant::now() + self.config.startup_timeout;

        loop {
            match self.probe.get(READINESS_ENDPOINT).await {
                Ok(_) => return Ok(()),
                Err(err) if err.is_transient() => {
                    trace!(error = %err, "app not ready yet");
                }
                Err(err) => return Err(SupervisorError::ReadinessProbe(err)),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(SupervisorError::LaunchTimeout);
            }

            tokio::time::sleep(self.config.probe_interval).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
