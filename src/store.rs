mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::verdict::{Aggregate, SubmissionStatus, Verdict};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub id: i64,
    pub title: String,
    pub is_active: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Testcase {
    pub id: i64,
    pub problem_id: i64,
    pub input: String,
    pub expected_output: String,
    pub hidden: bool,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: i64,
    pub user_id: i64,
    pub problem_id: i64,
    pub code: String,
    pub status: SubmissionStatus,
    pub output: Option<String>,
    pub score: u32,
    pub passed_testcases: u32,
    pub total_testcases: u32,
    pub created_at: String,
    pub updated_at: String,
}

/// Outcome of one testcase for one submission, stored once and never changed
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResult {
    pub id: i64,
    pub submission_id: i64,
    pub testcase_id: i64,
    pub verdict: Verdict,
    pub passed: bool,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: i64,
    pub created_at: String,
}

/// A per-testcase result that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubmissionResult {
    pub submission_id: i64,
    pub testcase_id: i64,
    pub verdict: Verdict,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: i64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    #[error("submission {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: i64,
        from: SubmissionStatus,
        to: SubmissionStatus,
    },

    #[error("corrupt {column} value in database: {value}")]
    Corrupt { column: &'static str, value: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound {
            entity,
            key: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// What the judging engine reads from and writes to persistence
///
/// Reads fail with [`StoreError::NotFound`] when the row is absent. Writes
/// only move a submission forward through its lifecycle.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn find_submission(&self, id: i64) -> Result<Submission, StoreError>;

    async fn find_problem(&self, id: i64) -> Result<Problem, StoreError>;

    /// All testcases of a problem, hidden ones included, oldest first
    async fn list_testcases(&self, problem_id: i64) -> Result<Vec<Testcase>, StoreError>;

    /// Moves a `PENDING` submission to `EXECUTING`. Returns `false` if it was
    /// not pending, in which case nothing changes.
    async fn mark_executing(&self, id: i64) -> Result<bool, StoreError>;

    async fn insert_result(
        &self,
        result: &NewSubmissionResult,
    ) -> Result<SubmissionResult, StoreError>;

    /// Writes the terminal status, summary, score and counters of an `EXECUTING` submission
    async fn finish_submission(&self, id: i64, aggregate: &Aggregate) -> Result<(), StoreError>;
}
