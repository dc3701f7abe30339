use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::JudgeConfig;

use super::{RawExecutionResult, Runner, ScratchDir, Workspace, WorkspaceError};

/// Appended to a stream that hit the capture limit
pub const TRUNCATION_MARKER: &str = "\n[Output truncated]";

/// How long to wait for the output pipes to close once the process is gone
const DRAIN_GRACE: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 8192;

/// Runs source code through an interpreter in a plain child process
///
/// Each call gets its own scratch directory holding the source file. The child
/// is placed in a new process group so a timeout can take down anything it
/// spawned. There is no memory, filesystem or network restriction.
pub struct ProcessRunner {
    interpreter: String,
    interpreter_args: Vec<String>,
    source_file_name: String,
    max_output_chars: usize,
    workspace: Workspace,
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(
        &self,
        source_code: &str,
        stdin_text: &str,
        time_limit: Duration,
    ) -> Result<RawExecutionResult, WorkspaceError> {
        let scratch = self.workspace.acquire()?;
        let result = self
            .run_in(&scratch, source_code, stdin_text, time_limit)
            .await;
        scratch.release();
        result
    }
}

impl ProcessRunner {
    pub fn new(config: &JudgeConfig, workspace: Workspace) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            interpreter_args: config.interpreter_args.clone(),
            source_file_name: config.source_file_name.clone(),
            max_output_chars: config.max_output_chars,
            workspace,
        }
    }

    async fn run_in(
        &self,
        scratch: &ScratchDir,
        source_code: &str,
        stdin_text: &str,
        time_limit: Duration,
    ) -> Result<RawExecutionResult, WorkspaceError> {
        let source_path = scratch.write(&self.source_file_name, source_code)?;

        let mut cmd = Command::new(&self.interpreter);
        cmd.args(&self.interpreter_args)
            .arg(&source_path)
            .current_dir(scratch.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                log::error!("Failed to spawn interpreter `{}`: {e}", self.interpreter);
                return Ok(RawExecutionResult::launch_failure(format!(
                    "Interpreter `{}` could not be started: {e}",
                    self.interpreter
                )));
            }
        };
        // Group id equals the child's pid because of `process_group(0)`
        let pgid = child.id();

        let input = prepare_input(stdin_text);
        let stdin_task = child
            .stdin
            .take()
            .map(|stdin| tokio::spawn(feed_stdin(stdin, input)));
        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(capture(out, self.max_output_chars)));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(capture(err, self.max_output_chars)));

        let mut wait_error = None;
        let (exit_code, timed_out) = match timeout(time_limit, child.wait()).await {
            Ok(Ok(status)) => (status.code(), false),
            Ok(Err(e)) => {
                log::error!("Failed to wait for child process: {e}");
                kill_process_group(pgid);
                let _ = child.kill().await;
                wait_error = Some(format!("Failed to wait for process: {e}"));
                (None, false)
            }
            Err(_) => {
                log::warn!("Process exceeded time limit of {time_limit:?}, killing it");
                kill_process_group(pgid);
                if let Err(e) = child.kill().await {
                    log::debug!("Killing timed out child failed: {e}");
                }
                (None, true)
            }
        };

        if let Some(task) = stdin_task {
            task.abort();
        }
        let stdout = drain(stdout_task, pgid).await;
        let mut stderr = drain(stderr_task, pgid).await;
        if let Some(message) = wait_error {
            if !stderr.is_empty() {
                stderr.push('\n');
            }
            stderr.push_str(&message);
        }

        Ok(RawExecutionResult {
            stdout,
            stderr,
            exit_code,
            timed_out,
            launch_failed: false,
        })
    }
}

/// Turns literal `\n` sequences into newlines and guarantees a trailing newline.
/// Blank input yields nothing to write.
fn prepare_input(stdin_text: &str) -> Option<String> {
    if stdin_text.trim().is_empty() {
        return None;
    }
    let mut input = stdin_text.replace("\\n", "\n");
    if !input.ends_with('\n') {
        input.push('\n');
    }
    Some(input)
}

async fn feed_stdin(stdin: ChildStdin, input: Option<String>) {
    let Some(input) = input else {
        // dropping the handle closes the pipe
        return;
    };
    let mut stdin = tokio::io::BufWriter::new(stdin);
    let written = async {
        stdin.write_all(input.as_bytes()).await?;
        stdin.flush().await?;
        stdin.shutdown().await
    };
    if let Err(e) = written.await {
        // the program may exit without reading its input
        log::debug!("Writing stdin stopped early: {e}");
    }
}

/// Reads a stream to its end, keeping at most `max_chars` characters
///
/// Reading continues past the limit so the child never blocks on a full pipe.
async fn capture<R: AsyncRead + Unpin>(mut reader: R, max_chars: usize) -> String {
    let byte_cap = max_chars.saturating_mul(4);
    let mut kept = Vec::new();
    let mut overflow = false;
    let mut buf = [0u8; READ_CHUNK];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let room = byte_cap.saturating_sub(kept.len());
                if n > room {
                    overflow = true;
                }
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
            Err(e) => {
                log::debug!("Reading child output failed: {e}");
                break;
            }
        }
    }

    truncate_output(String::from_utf8_lossy(&kept).into_owned(), max_chars, overflow)
}

fn truncate_output(mut text: String, max_chars: usize, overflow: bool) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            text.truncate(cut);
            text.push_str(TRUNCATION_MARKER);
        }
        None if overflow => text.push_str(TRUNCATION_MARKER),
        None => {}
    }
    text
}

/// Waits for a capture task, killing stray descendants that keep the pipe open
async fn drain(task: Option<JoinHandle<String>>, pgid: Option<u32>) -> String {
    let Some(mut task) = task else {
        return String::new();
    };

    if let Ok(joined) = timeout(DRAIN_GRACE, &mut task).await {
        return joined.unwrap_or_default();
    }

    log::warn!("Output pipe held open after exit, killing process group");
    kill_process_group(pgid);
    match timeout(DRAIN_GRACE, &mut task).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            task.abort();
            String::new()
        }
    }
}

/// Best-effort SIGKILL for every process in the child's group
fn kill_process_group(pgid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pgid) = pgid.and_then(|id| i32::try_from(id).ok()) {
        // SAFETY: killpg only sends a signal and reports failure through errno
        let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if rc != 0 {
            log::debug!(
                "killpg({pgid}) failed: {}",
                std::io::Error::last_os_error()
            );
        }
    }
    #[cfg(not(unix))]
    let _ = pgid;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_input_normalizes_escaped_newlines() {
        assert_eq!(prepare_input("1 2\\n3 4"), Some("1 2\n3 4\n".to_string()));
        assert_eq!(prepare_input("5\n"), Some("5\n".to_string()));
        assert_eq!(prepare_input("a\\nb\\n"), Some("a\nb\n".to_string()));
    }

    #[test]
    fn test_prepare_input_skips_blank() {
        assert_eq!(prepare_input(""), None);
        assert_eq!(prepare_input("  \n"), None);
    }

    #[test]
    fn test_truncate_output_appends_marker() {
        assert_eq!(truncate_output("abcdef".into(), 3, false), format!("abc{TRUNCATION_MARKER}"));
        assert_eq!(truncate_output("abc".into(), 3, false), "abc");
        assert_eq!(truncate_output("abc".into(), 3, true), format!("abc{TRUNCATION_MARKER}"));
        assert_eq!(truncate_output("héllo".into(), 2, false), format!("hé{TRUNCATION_MARKER}"));
    }

    #[tokio::test]
    async fn test_capture_bounds_memory_and_drains() {
        let data = vec![b'x'; 100_000];
        let out = capture(&data[..], 10).await;
        assert_eq!(out, format!("xxxxxxxxxx{TRUNCATION_MARKER}"));

        let out = capture(&b"short"[..], 10).await;
        assert_eq!(out, "short");
    }
}
