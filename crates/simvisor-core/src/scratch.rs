//! Scratch home directories for sandboxed simulator launches.
//!
//! Every launch gets a fresh directory injected as the app's fixed user
//! home, so on-disk state from one fixture run cannot leak into the next.
//! [`ScratchDirs`] is the seam; [`TempScratch`] is the production
//! implementation backed by the system temp directory.

use std::io;
use std::path::PathBuf;

use tempfile::Builder;
use tracing::debug;

/// Prefix for scratch directory names, so stale ones are easy to spot.
const SCRATCH_PREFIX: &str = "simvisor-home-";

/// Provides a unique, writable directory per launch.
pub trait ScratchDirs: Send + Sync {
    /// Create a fresh directory and return its path.
    fn create(&self) -> io::Result<PathBuf>;
}

/// Production [`ScratchDirs`] creating directories under the system temp
/// root.
///
/// Directories are deliberately not removed on drop. The simulator
/// process outlives the supervisor's interest in the path, and a
/// suspended app resumes against the same home on relaunch of the test
/// run. The OS temp cleaner reclaims them.
#[derive(Default)]
pub struct TempScratch;

impl ScratchDirs for TempScratch {
    fn create(&self) -> io::Result<PathBuf> {
        let dir = Builder::new().prefix(SCRATCH_PREFIX).tempdir()?;
        let path = dir.into_path();
        debug!(path = %path.display(), "created scratch home");
        Ok(path)
    }
}
