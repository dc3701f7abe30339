use std::time::Duration;

use async_trait::async_trait;

use super::{RawExecutionResult, WorkspaceError};

/// Trait for executing one piece of source code against one input
///
/// Implementations own the scratch space for each call and must remove it
/// before returning, whatever the outcome. They know nothing about expected
/// outputs or verdicts.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Runs `source_code` with `stdin_text` on standard input, for at most `time_limit`
    ///
    /// Only a failure to prepare the scratch directory is an `Err`; a program
    /// that crashes, times out or cannot be launched is still an `Ok` result.
    async fn run(
        &self,
        source_code: &str,
        stdin_text: &str,
        time_limit: Duration,
    ) -> Result<RawExecutionResult, WorkspaceError>;
}
