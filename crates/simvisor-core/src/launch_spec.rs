//! Immutable launch configuration for a simulator process.
//!
//! This module provides the [`LaunchSpec`] value object, which captures "what
//! to run and how" for a single simulator launch: the Xcode project the app
//! bundle was built from, plus a set of [`LaunchOptions`] overrides. A spec
//! never performs I/O; it only derives values on demand:
//!
//! - [`LaunchSpec::setup_commands`] — shell commands that must run before the
//!   process starts (device-simulation defaults when retina is requested)
//! - [`LaunchSpec::command`] — the fully resolved [`SimInvocation`] handed to
//!   a process runner
//!
//! Specs are immutable: [`LaunchSpec::with_options`] returns a new spec with
//! the delta overlaid, leaving the receiver untouched. This is what makes a
//! supervisor's resume reproducible — the original spec can be re-launched
//! any number of times with fresh per-launch decoration.
//!
//! # Example
//!
//! ```
//! use simvisor_core::launch_spec::{LaunchOptions, LaunchSpec, Platform};
//!
//! let spec = LaunchSpec::new(
//!     "/projects/Timer/Timer.xcodeproj",
//!     LaunchOptions::new().with_platform(Platform::Tablet).with_retina(true),
//! );
//!
//! assert_eq!(spec.setup_commands().len(), 1);
//! let invocation = spec.command();
//! assert!(invocation.app_bundle.ends_with("Timer.app"));
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Build configuration used when the spec does not override it.
pub const DEFAULT_CONFIGURATION: &str = "Debug";

/// Suffix Xcode appends to simulator build product directories.
const PLATFORM_BUILD_SUFFIX: &str = "iphonesimulator";

/// Project file extension stripped when deriving the default target name.
const PROJECT_EXTENSION: &str = ".xcodeproj";

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// Device family the simulator should present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// An iPhone-class device (the default).
    #[default]
    Phone,
    /// An iPad-class device.
    Tablet,
}

impl Platform {
    /// The device name used in simulator device-simulation settings.
    pub fn device_name(self) -> &'static str {
        match self {
            Self::Phone => "iPhone",
            Self::Tablet => "iPad",
        }
    }

    /// The family token passed to the launcher binary.
    pub fn family(self) -> &'static str {
        match self {
            Self::Phone => "iphone",
            Self::Tablet => "ipad",
        }
    }
}

// ---------------------------------------------------------------------------
// LaunchOptions
// ---------------------------------------------------------------------------

/// Optional overrides applied on top of a spec's defaults.
///
/// Every field is optional; unset fields fall back to the receiver's value
/// during [`overlay`](Self::overlay) and to built-in defaults during
/// derivation ([`DEFAULT_CONFIGURATION`], [`Platform::Phone`], the project
/// base name as target).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchOptions {
    /// Environment-variable overrides for the launched process.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Device family to simulate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,

    /// Executable name override; defaults to the project base name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Build variant override; defaults to [`DEFAULT_CONFIGURATION`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_configuration: Option<String>,

    /// Request high-density (Retina) device simulation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retina: Option<bool>,
}

impl LaunchOptions {
    /// Creates an empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single environment-variable override.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the device family.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Sets the executable name override.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Sets the build variant override.
    pub fn with_build_configuration(mut self, configuration: impl Into<String>) -> Self {
        self.build_configuration = Some(configuration.into());
        self
    }

    /// Requests (or declines) Retina device simulation.
    pub fn with_retina(mut self, retina: bool) -> Self {
        self.retina = Some(retina);
        self
    }

    /// Overlays `delta` on top of `self`, producing a new option set.
    ///
    /// Fields set in `delta` replace the receiver's; unset fields are kept.
    /// `env` merges key-wise with `delta`'s keys winning, so an injected
    /// variable never erases unrelated overrides (and vice versa).
    pub fn overlay(&self, delta: &LaunchOptions) -> LaunchOptions {
        let mut env = self.env.clone();
        env.extend(delta.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        LaunchOptions {
            env,
            platform: delta.platform.or(self.platform),
            target: delta.target.clone().or_else(|| self.target.clone()),
            build_configuration: delta
                .build_configuration
                .clone()
                .or_else(|| self.build_configuration.clone()),
            retina: delta.retina.or(self.retina),
        }
    }
}

// ---------------------------------------------------------------------------
// SimInvocation
// ---------------------------------------------------------------------------

/// Fully resolved invocation descriptor for a simulator launch.
///
/// Produced by [`LaunchSpec::command`] and consumed by a
/// [`ProcessRunner`](crate::runner::ProcessRunner); the spec itself never
/// touches the filesystem or spawns anything.
#[derive(Debug, Clone, PartialEq)]
pub struct SimInvocation {
    /// Path to the built `.app` bundle.
    pub app_bundle: PathBuf,
    /// Device family to launch under.
    pub platform: Platform,
    /// Environment-variable overrides for the process.
    pub env: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// LaunchSpec
// ---------------------------------------------------------------------------

/// Immutable description of a single simulator launch.
///
/// Cheap to clone; all derivation is pure. See the module docs for the
/// overall contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchSpec {
    project_path: PathBuf,
    options: LaunchOptions,
}

impl LaunchSpec {
    /// Creates a spec for the given `.xcodeproj` path with the given options.
    pub fn new(project_path: impl Into<PathBuf>, options: LaunchOptions) -> Self {
        Self {
            project_path: project_path.into(),
            options,
        }
    }

    /// The project path this spec was created with.
    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    /// The option set this spec was created with.
    pub fn options(&self) -> &LaunchOptions {
        &self.options
    }

    /// Returns a new spec with `delta` overlaid on this spec's options.
    ///
    /// The receiver is untouched. Delta fields win over stored ones; `env`
    /// merges key-wise (see [`LaunchOptions::overlay`]).
    pub fn with_options(&self, delta: LaunchOptions) -> LaunchSpec {
        LaunchSpec {
            project_path: self.project_path.clone(),
            options: self.options.overlay(&delta),
        }
    }

    /// Shell commands that must run, in order, before the process starts.
    ///
    /// Empty unless Retina simulation is requested, in which case it contains
    /// exactly one device-simulation `defaults write` command.
    pub fn setup_commands(&self) -> Vec<String> {
        let mut commands = Vec::new();
        if self.retina() {
            commands.push(self.simulate_device_command());
        }
        commands
    }

    /// The fully resolved invocation for this spec.
    ///
    /// The app bundle resolves to
    /// `dirname(project_path)/build/<configuration>-iphonesimulator/<target>.app`.
    pub fn command(&self) -> SimInvocation {
        SimInvocation {
            app_bundle: self
                .build_directory()
                .join(format!("{}.app", self.target())),
            platform: self.options.platform.unwrap_or_default(),
            env: self.options.env.clone(),
        }
    }

    fn retina(&self) -> bool {
        self.options.retina.unwrap_or(false)
    }

    fn simulate_device_command(&self) -> String {
        format!(
            r#"defaults write com.apple.iphonesimulator SimulateDevice '"{}"'"#,
            self.simulate_device()
        )
    }

    fn simulate_device(&self) -> String {
        let device = self.options.platform.unwrap_or_default().device_name();
        if self.retina() {
            format!("{device} (Retina)")
        } else {
            device.to_string()
        }
    }

    fn target(&self) -> String {
        if let Some(target) = &self.options.target {
            return target.clone();
        }
        let name = self
            .project_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.strip_suffix(PROJECT_EXTENSION)
            .unwrap_or(&name)
            .to_string()
    }

    fn build_configuration(&self) -> &str {
        self.options
            .build_configuration
            .as_deref()
            .unwrap_or(DEFAULT_CONFIGURATION)
    }

    fn build_directory(&self) -> PathBuf {
        self.project_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join("build")
            .join(format!(
                "{}-{}",
                self.build_configuration(),
                PLATFORM_BUILD_SUFFIX
            ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
