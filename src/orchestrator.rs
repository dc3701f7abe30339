use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::config::JudgeConfig;
use crate::sandbox::Runner;
use crate::store::{
    NewSubmissionResult, StoreError, Submission, SubmissionResult, SubmissionStore, Testcase,
};
use crate::verdict::{self, Aggregate, SubmissionStatus, Verdict};

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("submission {0} is not pending")]
    AlreadyJudged(i64),

    #[error("problem {0} is not active")]
    ProblemInactive(i64),
}

impl ExecuteError {
    /// Whether the submission row is still ours to mark as failed
    pub fn leaves_submission_claimed(&self) -> bool {
        match self {
            Self::AlreadyJudged(_) => false,
            Self::Store(StoreError::NotFound { entity, .. }) => *entity != "submission",
            Self::Store(_) | Self::ProblemInactive(_) => true,
        }
    }
}

/// Final state of a judged submission, with its per-testcase results in order
#[derive(Serialize, Debug, Clone)]
pub struct SubmissionOutcome {
    pub submission_id: i64,
    pub status: SubmissionStatus,
    pub output: String,
    pub score: u32,
    pub passed_testcases: usize,
    pub total_testcases: usize,
    pub results: Vec<SubmissionResult>,
}

impl SubmissionOutcome {
    fn new(submission_id: i64, aggregate: Aggregate, results: Vec<SubmissionResult>) -> Self {
        Self {
            submission_id,
            status: aggregate.status,
            output: aggregate.output,
            score: aggregate.score,
            passed_testcases: aggregate.passed,
            total_testcases: aggregate.total,
            results,
        }
    }
}

/// Runs a submission's testcases one after another and records the outcome
///
/// Every testcase is attempted even when an earlier one fails, and each
/// result is stored as soon as it is known.
pub struct Orchestrator {
    runner: Arc<dyn Runner>,
    store: Arc<dyn SubmissionStore>,
    time_limit: Duration,
    execution_enabled: bool,
}

impl Orchestrator {
    pub fn new(
        runner: Arc<dyn Runner>,
        store: Arc<dyn SubmissionStore>,
        time_limit: Duration,
        execution_enabled: bool,
    ) -> Self {
        Self {
            runner,
            store,
            time_limit,
            execution_enabled,
        }
    }

    pub fn from_config(
        runner: Arc<dyn Runner>,
        store: Arc<dyn SubmissionStore>,
        config: &JudgeConfig,
    ) -> Self {
        Self::new(
            runner,
            store,
            config.time_limit.into(),
            config.execution_enabled,
        )
    }

    pub fn store(&self) -> &Arc<dyn SubmissionStore> {
        &self.store
    }

    /// Loads a submission with a snapshot of its problem's testcases and judges it
    pub async fn judge_submission(&self, id: i64) -> Result<SubmissionOutcome, ExecuteError> {
        let submission = self.store.find_submission(id).await?;
        self.claim(&submission).await?;

        let problem = self.store.find_problem(submission.problem_id).await?;
        if !problem.is_active {
            return Err(ExecuteError::ProblemInactive(problem.id));
        }
        let testcases = self.store.list_testcases(problem.id).await?;

        self.run_claimed(&submission, &testcases).await
    }

    /// Judges `submission` against a snapshot of its testcases
    ///
    /// The testcases run in creation order whatever order they are passed in.
    pub async fn execute(
        &self,
        submission: &Submission,
        testcases: &[Testcase],
    ) -> Result<SubmissionOutcome, ExecuteError> {
        self.claim(submission).await?;
        self.run_claimed(submission, testcases).await
    }

    /// Marks a claimed submission as `ERROR` after judging could not finish
    pub async fn fail_submission(&self, id: i64, reason: &str) -> Result<(), StoreError> {
        self.store
            .finish_submission(id, &Aggregate::rejected(reason, 0))
            .await
    }

    async fn claim(&self, submission: &Submission) -> Result<(), ExecuteError> {
        if self.store.mark_executing(submission.id).await? {
            log::debug!("Submission {} is now executing", submission.id);
            Ok(())
        } else {
            Err(ExecuteError::AlreadyJudged(submission.id))
        }
    }

    async fn run_claimed(
        &self,
        submission: &Submission,
        testcases: &[Testcase],
    ) -> Result<SubmissionOutcome, ExecuteError> {
        let testcases = in_creation_order(testcases);
        if let Some(reason) = self.rejection_reason(submission, &testcases) {
            log::warn!("Submission {} rejected: {reason}", submission.id);
            let aggregate = Aggregate::rejected(reason, testcases.len());
            self.store
                .finish_submission(submission.id, &aggregate)
                .await?;
            return Ok(SubmissionOutcome::new(submission.id, aggregate, Vec::new()));
        }

        log::info!(
            "Executing submission {} against {} testcases",
            submission.id,
            testcases.len()
        );

        let mut results = Vec::with_capacity(testcases.len());
        for testcase in &testcases {
            let attempt = self.attempt(submission, testcase).await;
            log::info!(
                "Submission {} testcase {}: {} ({} ms)",
                submission.id,
                testcase.id,
                attempt.verdict,
                attempt.execution_time_ms
            );
            results.push(self.store.insert_result(&attempt).await?);
        }

        let verdicts: Vec<Verdict> = results.iter().map(|r| r.verdict).collect();
        let aggregate = verdict::fold(&verdicts);
        self.store
            .finish_submission(submission.id, &aggregate)
            .await?;

        log::info!(
            "Submission {} finished: {} ({}/{} passed, score {})",
            submission.id,
            aggregate.status,
            aggregate.passed,
            aggregate.total,
            aggregate.score
        );
        Ok(SubmissionOutcome::new(submission.id, aggregate, results))
    }

    /// Problems that make running the submission pointless
    fn rejection_reason(&self, submission: &Submission, testcases: &[&Testcase]) -> Option<String> {
        if !self.execution_enabled {
            return Some("Code execution is disabled".to_string());
        }
        if submission.code.trim().is_empty() {
            return Some("User code cannot be empty".to_string());
        }
        if testcases.is_empty() {
            return Some(verdict::NO_TESTCASES.to_string());
        }
        testcases
            .iter()
            .find(|t| t.expected_output.trim().is_empty())
            .map(|t| format!("Expected output not configured for testcase {}", t.id))
    }

    /// One testcase: run, classify, and turn any failure into a verdict
    async fn attempt(&self, submission: &Submission, testcase: &Testcase) -> NewSubmissionResult {
        let started = Instant::now();
        let run = self
            .runner
            .run(&submission.code, &testcase.input, self.time_limit)
            .await;
        let execution_time_ms = started.elapsed().as_millis() as i64;

        let (verdict, stdout, stderr) = match run {
            Ok(raw) => {
                let verdict = verdict::classify(&raw, &testcase.expected_output);
                let mut stderr = raw.stderr;
                if verdict == Verdict::Timeout {
                    log::warn!(
                        "Submission {} testcase {} timed out",
                        submission.id,
                        testcase.id
                    );
                    if !stderr.is_empty() {
                        stderr.push('\n');
                    }
                    stderr.push_str(&format!(
                        "Time Limit Exceeded ({} ms)",
                        self.time_limit.as_millis()
                    ));
                }
                (verdict, raw.stdout, stderr)
            }
            Err(e) => {
                log::error!(
                    "Submission {} testcase {} could not run: {e}",
                    submission.id,
                    testcase.id
                );
                (Verdict::Error, String::new(), format!("Execution error: {e}"))
            }
        };

        NewSubmissionResult {
            submission_id: submission.id,
            testcase_id: testcase.id,
            verdict,
            stdout,
            stderr,
            execution_time_ms,
        }
    }
}

fn in_creation_order(testcases: &[Testcase]) -> Vec<&Testcase> {
    let mut ordered: Vec<&Testcase> = testcases.iter().collect();
    ordered.sort_by(|a, b| (a.created_at.as_str(), a.id).cmp(&(b.created_at.as_str(), b.id)));
    ordered
}
