#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use codejudge::config::JudgeConfig;
use codejudge::orchestrator::Orchestrator;
use codejudge::sandbox::{RawExecutionResult, Runner, WorkspaceError};
use codejudge::store::MemoryStore;

/// What the scripted runner does for a given stdin
#[derive(Clone)]
pub enum Script {
    Exit { stdout: &'static str, code: i32 },
    Timeout { partial: &'static str },
    Crash { stderr: &'static str },
    Workspace,
}

/// Runner that answers from a table keyed by stdin and records every call
#[derive(Default)]
pub struct ScriptedRunner {
    scripts: HashMap<String, Script>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, stdin: &str, script: Script) -> Self {
        self.scripts.insert(stdin.to_string(), script);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl Runner for ScriptedRunner {
    async fn run(
        &self,
        _source_code: &str,
        stdin_text: &str,
        _time_limit: Duration,
    ) -> Result<RawExecutionResult, WorkspaceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().push(stdin_text.to_string());

        let script = self
            .scripts
            .get(stdin_text)
            .cloned()
            .unwrap_or(Script::Exit { stdout: "", code: 0 });

        Ok(match script {
            Script::Exit { stdout, code } => RawExecutionResult {
                stdout: stdout.to_string(),
                exit_code: Some(code),
                ..Default::default()
            },
            Script::Timeout { partial } => RawExecutionResult {
                stdout: partial.to_string(),
                timed_out: true,
                ..Default::default()
            },
            Script::Crash { stderr } => RawExecutionResult {
                stderr: stderr.to_string(),
                exit_code: Some(1),
                ..Default::default()
            },
            Script::Workspace => {
                return Err(WorkspaceError::Create {
                    path: "/nonexistent".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
        })
    }
}

pub fn orchestrator(
    runner: Arc<ScriptedRunner>,
    store: Arc<MemoryStore>,
    execution_enabled: bool,
) -> Orchestrator {
    Orchestrator::new(runner, store, Duration::from_millis(500), execution_enabled)
}

/// Judge settings that run submissions as POSIX shell scripts
pub fn sh_config(scratch_root: &Path) -> JudgeConfig {
    JudgeConfig {
        interpreter: "sh".to_string(),
        source_file_name: "solution.sh".to_string(),
        scratch_root: Some(scratch_root.to_path_buf()),
        ..Default::default()
    }
}
