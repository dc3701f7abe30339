use async_trait::async_trait;
use parking_lot::Mutex;

use super::*;
use crate::create_timestamp;

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    problems: Vec<Problem>,
    testcases: Vec<Testcase>,
    submissions: Vec<Submission>,
    results: Vec<SubmissionResult>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn submission_mut(&mut self, id: i64) -> Result<&mut Submission, StoreError> {
        self.submissions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::not_found("submission", id))
    }
}

/// In-process store, for embedding the engine without a database and for tests
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_user(&self, username: &str) -> User {
        let mut tables = self.tables.lock();
        let user = User {
            id: tables.next_id(),
            username: username.to_string(),
        };
        tables.users.push(user.clone());
        user
    }

    pub fn create_problem(&self, title: &str, is_active: bool) -> Problem {
        let mut tables = self.tables.lock();
        let problem = Problem {
            id: tables.next_id(),
            title: title.to_string(),
            is_active,
        };
        tables.problems.push(problem.clone());
        problem
    }

    pub fn create_testcase(
        &self,
        problem_id: i64,
        input: &str,
        expected_output: &str,
        hidden: bool,
    ) -> Testcase {
        let mut tables = self.tables.lock();
        let testcase = Testcase {
            id: tables.next_id(),
            problem_id,
            input: input.to_string(),
            expected_output: expected_output.to_string(),
            hidden,
            created_at: create_timestamp(),
        };
        tables.testcases.push(testcase.clone());
        testcase
    }

    pub fn create_submission(&self, user_id: i64, problem_id: i64, code: &str) -> Submission {
        let mut tables = self.tables.lock();
        let now = create_timestamp();
        let submission = Submission {
            id: tables.next_id(),
            user_id,
            problem_id,
            code: code.to_string(),
            status: SubmissionStatus::Pending,
            output: None,
            score: 0,
            passed_testcases: 0,
            total_testcases: 0,
            created_at: now.clone(),
            updated_at: now,
        };
        tables.submissions.push(submission.clone());
        submission
    }

    pub fn list_results(&self, submission_id: i64) -> Vec<SubmissionResult> {
        self.tables
            .lock()
            .results
            .iter()
            .filter(|r| r.submission_id == submission_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn find_submission(&self, id: i64) -> Result<Submission, StoreError> {
        self.tables
            .lock()
            .submissions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(StoreError::not_found("submission", id))
    }

    async fn find_problem(&self, id: i64) -> Result<Problem, StoreError> {
        self.tables
            .lock()
            .problems
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(StoreError::not_found("problem", id))
    }

    async fn list_testcases(&self, problem_id: i64) -> Result<Vec<Testcase>, StoreError> {
        Ok(self
            .tables
            .lock()
            .testcases
            .iter()
            .filter(|t| t.problem_id == problem_id)
            .cloned()
            .collect())
    }

    async fn mark_executing(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        let submission = tables.submission_mut(id)?;
        if submission.status != SubmissionStatus::Pending {
            return Ok(false);
        }
        submission.status = SubmissionStatus::Executing;
        submission.updated_at = create_timestamp();
        Ok(true)
    }

    async fn insert_result(
        &self,
        result: &NewSubmissionResult,
    ) -> Result<SubmissionResult, StoreError> {
        let mut tables = self.tables.lock();
        tables.submission_mut(result.submission_id)?;
        let stored = SubmissionResult {
            id: tables.next_id(),
            submission_id: result.submission_id,
            testcase_id: result.testcase_id,
            verdict: result.verdict,
            passed: result.verdict.is_passed(),
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            execution_time_ms: result.execution_time_ms,
            created_at: create_timestamp(),
        };
        tables.results.push(stored.clone());
        Ok(stored)
    }

    async fn finish_submission(&self, id: i64, aggregate: &Aggregate) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let submission = tables.submission_mut(id)?;
        if !submission.status.can_transition_to(aggregate.status) {
            return Err(StoreError::InvalidTransition {
                id,
                from: submission.status,
                to: aggregate.status,
            });
        }
        submission.status = aggregate.status;
        submission.output = Some(aggregate.output.clone());
        submission.score = aggregate.score;
        submission.passed_testcases = aggregate.passed as u32;
        submission.total_testcases = aggregate.total as u32;
        submission.updated_at = create_timestamp();
        Ok(())
    }
}
