//! # simvisor-core
//!
//! Process supervision core for iOS Simulator test fixtures.
//!
//! This crate launches and supervises a simulator process used as a UI-test
//! fixture: generate the launch configuration, start the process with a
//! sandboxed scratch home, wait for the app's embedded HTTP server to come
//! up, and later suspend, resume, or quit it between test scenarios.
//!
//! ## Modules
//!
//! - [`launch_spec`] - Immutable launch configuration and derived invocations
//! - [`supervisor`] - Lifecycle state machine (launch, quit, suspend, resume)
//! - [`probe`] - HTTP readiness probing with transient-error classification
//! - [`runner`] - Process spawning, signalling, and shell execution seams
//! - [`scratch`] - Per-launch scratch home directories
//!
//! ## External Dependencies
//!
//! The default production wiring requires the following to be installed:
//!
//! - **Xcode** (for the iOS Simulator and `defaults` device settings)
//! - **waxsim** - Simulator launcher binary that accepts a built `.app` bundle
//!
//! ## Example
//!
//! ```no_run
//! use simvisor_core::launch_spec::{LaunchOptions, LaunchSpec, Platform};
//! use simvisor_core::supervisor::Supervisor;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = LaunchSpec::new(
//!     "Calculator/Calculator.xcodeproj",
//!     LaunchOptions::new().with_platform(Platform::Phone).with_retina(true),
//! );
//!
//! let mut supervisor = Supervisor::with_local_simulator("waxsim", 50000);
//! supervisor.launch(spec).await?;
//!
//! // ... drive the app through its HTTP interface ...
//!
//! supervisor.suspend().await?;
//! supervisor.resume().await?;
//! supervisor.quit().await?;
//! # Ok(())
//! # }
//! ```

pub mod launch_spec;
pub mod probe;
pub mod runner;
pub mod scratch;
pub mod supervisor;
