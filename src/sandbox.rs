mod process_runner;
mod runner;
mod workspace;

// Re-export the trait and common types
pub use process_runner::ProcessRunner;
pub use runner::Runner;
pub use workspace::{ScratchDir, Workspace, WorkspaceError};

use serde::Serialize;

use crate::config::JudgeConfig;

/// Everything observed about one subprocess run, before any judging
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RawExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal, timed out, or never started
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// The interpreter could not be started; `stderr` holds the reason
    pub launch_failed: bool,
}

impl RawExecutionResult {
    pub fn launch_failure(message: String) -> Self {
        Self {
            stderr: message,
            launch_failed: true,
            ..Default::default()
        }
    }
}

/// Creates the process runner described by the judge configuration
///
/// The runner gives every attempt its own scratch directory and a wall-clock
/// deadline, but provides no filesystem, network or memory isolation.
pub fn create_runner(config: &JudgeConfig) -> Result<ProcessRunner, WorkspaceError> {
    let workspace = Workspace::new(config.scratch_root())?;
    log::info!(
        "Creating ProcessRunner for `{}` with scratch root {}",
        config.interpreter,
        workspace.root().display()
    );
    log::warn!("ProcessRunner provides NO security isolation - use only in trusted environments");
    Ok(ProcessRunner::new(config, workspace))
}
