//! Shared test helpers for simvisor-core integration tests.
//!
//! This module provides scripted mock implementations of the supervisor's
//! collaborator seams, plus a [`Fixture`] that wires them into a
//! [`Supervisor`] and exposes the recorded interactions for assertions.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;

use simvisor_core::launch_spec::SimInvocation;
use simvisor_core::probe::{ProbeError, ReadinessClient};
use simvisor_core::runner::{ProcessRunner, RunnerError, ShellRunner, SimProcess, SimSignal};
use simvisor_core::scratch::ScratchDirs;
use simvisor_core::supervisor::{Supervisor, SupervisorConfig};

/// Build an `ExitStatus` from a conventional exit code.
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(code << 8)
}

// ---------------------------------------------------------------------------
// Process mocks
// ---------------------------------------------------------------------------

/// A fake simulator process that records the signals it receives and
/// exits cleanly whenever waited on.
#[derive(Debug)]
pub struct MockProcess {
    signals: Arc<Mutex<Vec<SimSignal>>>,
}

#[async_trait]
impl SimProcess for MockProcess {
    async fn wait(&mut self) -> Result<ExitStatus, RunnerError> {
        Ok(exit_status(0))
    }

    fn signal(&self, signal: SimSignal) -> Result<(), RunnerError> {
        self.signals.lock().unwrap().push(signal);
        Ok(())
    }

    fn id(&self) -> Option<u32> {
        Some(4242)
    }
}

/// A [`ProcessRunner`] that records every invocation it is asked to start
/// and hands out [`MockProcess`]es sharing one signal log.
pub struct RecordingRunner {
    invocations: Arc<Mutex<Vec<SimInvocation>>>,
    signals: Arc<Mutex<Vec<SimSignal>>>,
}

#[async_trait]
impl ProcessRunner for RecordingRunner {
    async fn start(&self, invocation: &SimInvocation) -> Result<Box<dyn SimProcess>, RunnerError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        Ok(Box::new(MockProcess {
            signals: self.signals.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Shell mock
// ---------------------------------------------------------------------------

/// A [`ShellRunner`] that records command lines and reports a fixed exit
/// code for all of them.
pub struct ScriptedShell {
    commands: Arc<Mutex<Vec<String>>>,
    exit_code: i32,
}

#[async_trait]
impl ShellRunner for ScriptedShell {
    async fn run(&self, command: &str) -> Result<ExitStatus, RunnerError> {
        self.commands.lock().unwrap().push(command.to_string());
        Ok(exit_status(self.exit_code))
    }
}

// ---------------------------------------------------------------------------
// Probe mock
// ---------------------------------------------------------------------------

/// One scripted outcome for a probe call.
#[derive(Clone, Copy)]
pub enum ProbeScript {
    /// Answer with a successful body.
    Ok,
    /// Fail with `ConnectionRefused` (transient).
    Refused,
    /// Fail with `ConnectionReset` (transient).
    Reset,
    /// Fail with `UnexpectedEof` (transient).
    Eof,
    /// Fail with a non-transient `BadResponse`.
    Fatal,
}

impl ProbeScript {
    fn produce(self) -> Result<String, ProbeError> {
        match self {
            ProbeScript::Ok => Ok("ok".to_string()),
            ProbeScript::Refused => Err(ProbeError::ConnectionRefused),
            ProbeScript::Reset => Err(ProbeError::ConnectionReset),
            ProbeScript::Eof => Err(ProbeError::UnexpectedEof),
            ProbeScript::Fatal => Err(ProbeError::BadResponse("HTTP/1.1 500".to_string())),
        }
    }
}

/// A [`ReadinessClient`] whose per-call behavior is scripted.
///
/// Entries are consumed in order; once exhausted, every further call
/// replays the configured default. Every call is recorded with the path
/// requested and the (virtual) instant it arrived, so tests can assert on
/// probe spacing under tokio's paused clock.
pub struct ScriptedProbe {
    script: Mutex<VecDeque<ProbeScript>>,
    fallback: ProbeScript,
    calls: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl ScriptedProbe {
    /// A probe following `entries`, then repeating `fallback` forever.
    pub fn script(entries: Vec<ProbeScript>, fallback: ProbeScript) -> Self {
        Self {
            script: Mutex::new(entries.into()),
            fallback,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A probe that succeeds on every call.
    pub fn always_ready() -> Self {
        Self::script(Vec::new(), ProbeScript::Ok)
    }

    /// A probe for which nothing ever starts listening.
    pub fn never_ready() -> Self {
        Self::script(Vec::new(), ProbeScript::Refused)
    }
}

#[async_trait]
impl ReadinessClient for ScriptedProbe {
    async fn get(&self, path: &str) -> Result<String, ProbeError> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_string(), Instant::now()));
        let entry = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);
        entry.produce()
    }
}

// ---------------------------------------------------------------------------
// Scratch mock
// ---------------------------------------------------------------------------

/// A [`ScratchDirs`] that yields numbered synthetic paths without touching
/// the filesystem.
pub struct CountingScratch {
    counter: AtomicUsize,
    created: Arc<Mutex<Vec<PathBuf>>>,
}

impl ScratchDirs for CountingScratch {
    fn create(&self) -> std::io::Result<PathBuf> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = PathBuf::from(format!("/tmp/simvisor-scratch-{n}"));
        self.created.lock().unwrap().push(path.clone());
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Fixture — fully wired supervisor with observable collaborators
// ---------------------------------------------------------------------------

/// A supervisor wired to scripted collaborators, with handles to every
/// recorded interaction.
pub struct Fixture {
    /// The supervisor under test.
    pub supervisor: Supervisor,
    /// Invocations the runner was asked to start, in order.
    pub invocations: Arc<Mutex<Vec<SimInvocation>>>,
    /// Signals delivered to spawned processes, in order.
    pub signals: Arc<Mutex<Vec<SimSignal>>>,
    /// Setup command lines the shell ran, in order.
    pub shell_commands: Arc<Mutex<Vec<String>>>,
    /// Probe calls as `(path, instant)` pairs, in order.
    pub probe_calls: Arc<Mutex<Vec<(String, Instant)>>>,
    /// Scratch directories handed out, in order.
    pub scratch_paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl Fixture {
    /// Wire a supervisor around the given probe with the default config
    /// and a shell whose commands all succeed.
    pub fn new(probe: ScriptedProbe) -> Self {
        Self::build(probe, SupervisorConfig::default(), 0)
    }

    /// Like [`new`](Self::new) but with a custom config.
    pub fn with_config(probe: ScriptedProbe, config: SupervisorConfig) -> Self {
        Self::build(probe, config, 0)
    }

    /// Like [`new`](Self::new) but every setup command exits with `code`.
    pub fn with_shell_exit(probe: ScriptedProbe, code: i32) -> Self {
        Self::build(probe, SupervisorConfig::default(), code)
    }

    fn build(probe: ScriptedProbe, config: SupervisorConfig, shell_exit: i32) -> Self {
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let signals = Arc::new(Mutex::new(Vec::new()));
        let shell_commands = Arc::new(Mutex::new(Vec::new()));
        let probe_calls = probe.calls.clone();
        let scratch_paths = Arc::new(Mutex::new(Vec::new()));

        let supervisor = Supervisor::new(
            Arc::new(RecordingRunner {
                invocations: invocations.clone(),
                signals: signals.clone(),
            }),
            Arc::new(ScriptedShell {
                commands: shell_commands.clone(),
                exit_code: shell_exit,
            }),
            Arc::new(probe),
            Arc::new(CountingScratch {
                counter: AtomicUsize::new(0),
                created: scratch_paths.clone(),
            }),
            config,
        );

        Self {
            supervisor,
            invocations,
            signals,
            shell_commands,
            probe_calls,
            scratch_paths,
        }
    }
}
