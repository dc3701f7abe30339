use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::create_timestamp;
use crate::store::{
    NewSubmissionResult, Problem, StoreError, Submission, SubmissionResult, SubmissionStore,
    Testcase, User,
};
use crate::verdict::{Aggregate, SubmissionStatus, Verdict};

const DATABASE_NAME: &str = "codejudge.sqlite3";

pub fn get_db_path() -> PathBuf {
    use directories::ProjectDirs;

    let proj_dirs =
        ProjectDirs::from("", "", "codejudge").expect("Unable to find user directory");
    let data_dir = proj_dirs.data_local_dir();

    fs::create_dir_all(data_dir).expect("Failed to create local data dir");

    data_dir.join(DATABASE_NAME)
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display()); // rwc = read/write/create
    let db_pool = SqlitePoolOptions::new()
        .max_connections(4)
        .min_connections(0)
        .connect(&db_url)
        .await?;

    // PRAGMA statements cannot run inside a transaction
    for pragma_sql in &[
        "PRAGMA foreign_keys = ON;",
        "PRAGMA busy_timeout = 2000;", // 2 seconds timeout for lock contention
        "PRAGMA journal_mode = WAL;",
        "PRAGMA synchronous = NORMAL;",
    ] {
        sqlx::query(pragma_sql).execute(&db_pool).await?;
    }

    let mut tx = db_pool.begin().await?;

    for sql in &[
        r"
        CREATE TABLE IF NOT EXISTS users (
            id            INTEGER PRIMARY KEY,
            username      TEXT    NOT NULL UNIQUE
        );",
        r"
        CREATE TABLE IF NOT EXISTS problems (
            id            INTEGER PRIMARY KEY,
            title         TEXT    NOT NULL,
            is_active     INTEGER NOT NULL DEFAULT 1
        );",
        r"
        CREATE TABLE IF NOT EXISTS testcases (
            id               INTEGER PRIMARY KEY,
            problem_id       INTEGER NOT NULL,
            input            TEXT    NOT NULL,
            expected_output  TEXT    NOT NULL,
            hidden           INTEGER NOT NULL DEFAULT 0,
            created_at       TEXT    NOT NULL,
            FOREIGN KEY (problem_id) REFERENCES problems (id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS submissions (
            id                INTEGER PRIMARY KEY,
            user_id           INTEGER NOT NULL,
            problem_id        INTEGER NOT NULL,
            code              TEXT    NOT NULL,
            status            TEXT    NOT NULL,
            output            TEXT,
            score             INTEGER NOT NULL DEFAULT 0,
            passed_testcases  INTEGER NOT NULL DEFAULT 0,
            total_testcases   INTEGER NOT NULL DEFAULT 0,
            created_at        TEXT    NOT NULL,
            updated_at        TEXT    NOT NULL,
            FOREIGN KEY (user_id)    REFERENCES users (id),
            FOREIGN KEY (problem_id) REFERENCES problems (id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS submission_results (
            id                 INTEGER PRIMARY KEY,
            submission_id      INTEGER NOT NULL,
            testcase_id        INTEGER NOT NULL,
            verdict            TEXT    NOT NULL,
            passed             INTEGER NOT NULL,
            stdout             TEXT    NOT NULL DEFAULT '',
            stderr             TEXT    NOT NULL DEFAULT '',
            execution_time_ms  INTEGER NOT NULL,
            created_at         TEXT    NOT NULL,
            FOREIGN KEY (submission_id) REFERENCES submissions (id),
            FOREIGN KEY (testcase_id)   REFERENCES testcases (id)
        );",
        "CREATE INDEX IF NOT EXISTS idx_testcases_problem ON testcases(problem_id);",
        "CREATE INDEX IF NOT EXISTS idx_results_submission ON submission_results(submission_id);",
    ] {
        sqlx::query(sql).execute(tx.as_mut()).await?;
    }

    tx.commit().await?;

    log::info!("Initialized database at {}", db_path.as_ref().display());

    Ok(db_pool)
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    // WAL and SHM files might not exist
    let wal_path = format!("{}-wal", db_path.as_ref().display());
    let shm_path = format!("{}-shm", db_path.as_ref().display());
    let _ = fs::remove_file(wal_path);
    let _ = fs::remove_file(shm_path);

    if let Err(e) = std::fs::remove_file(&db_path) {
        log::warn!(
            "Unable to remove database at {}: {e}",
            db_path.as_ref().display()
        );
    } else {
        log::info!("Removed database at {}", db_path.as_ref().display());
    }
}

#[derive(sqlx::FromRow)]
struct SubmissionRow {
    id: i64,
    user_id: i64,
    problem_id: i64,
    code: String,
    status: String,
    output: Option<String>,
    score: i64,
    passed_testcases: i64,
    total_testcases: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = StoreError;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        Ok(Submission {
            id: row.id,
            user_id: row.user_id,
            problem_id: row.problem_id,
            code: row.code,
            status: parse_status(&row.status)?,
            output: row.output,
            score: row.score as u32,
            passed_testcases: row.passed_testcases as u32,
            total_testcases: row.total_testcases as u32,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ResultRow {
    id: i64,
    submission_id: i64,
    testcase_id: i64,
    verdict: String,
    passed: bool,
    stdout: String,
    stderr: String,
    execution_time_ms: i64,
    created_at: String,
}

impl TryFrom<ResultRow> for SubmissionResult {
    type Error = StoreError;

    fn try_from(row: ResultRow) -> Result<Self, Self::Error> {
        let verdict = row
            .verdict
            .parse::<Verdict>()
            .map_err(|_| StoreError::Corrupt {
                column: "submission_results.verdict",
                value: row.verdict.clone(),
            })?;
        Ok(SubmissionResult {
            id: row.id,
            submission_id: row.submission_id,
            testcase_id: row.testcase_id,
            verdict,
            passed: row.passed,
            stdout: row.stdout,
            stderr: row.stderr,
            execution_time_ms: row.execution_time_ms,
            created_at: row.created_at,
        })
    }
}

fn parse_status(value: &str) -> Result<SubmissionStatus, StoreError> {
    value
        .parse::<SubmissionStatus>()
        .map_err(|_| StoreError::Corrupt {
            column: "submissions.status",
            value: value.to_string(),
        })
}

/// [`SubmissionStore`] backed by a SQLite database
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `db_path` and ensures the schema
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let pool = init_db(db_path).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_user(&self, username: &str) -> Result<User, StoreError> {
        let result = sqlx::query("INSERT INTO users (username) VALUES (?)")
            .bind(username)
            .execute(&self.pool)
            .await?;

        Ok(User {
            id: result.last_insert_rowid(),
            username: username.to_string(),
        })
    }

    pub async fn find_user_by_name(&self, username: &str) -> Result<User, StoreError> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT id, username FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(id, username)| User { id, username })
            .ok_or_else(|| StoreError::NotFound {
                entity: "user",
                key: username.to_string(),
            })
    }

    pub async fn create_problem(&self, title: &str, is_active: bool) -> Result<Problem, StoreError> {
        let result = sqlx::query("INSERT INTO problems (title, is_active) VALUES (?, ?)")
            .bind(title)
            .bind(is_active)
            .execute(&self.pool)
            .await?;

        Ok(Problem {
            id: result.last_insert_rowid(),
            title: title.to_string(),
            is_active,
        })
    }

    pub async fn create_testcase(
        &self,
        problem_id: i64,
        input: &str,
        expected_output: &str,
        hidden: bool,
    ) -> Result<Testcase, StoreError> {
        let now = create_timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO testcases (problem_id, input, expected_output, hidden, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(problem_id)
        .bind(input)
        .bind(expected_output)
        .bind(hidden)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Testcase {
            id: result.last_insert_rowid(),
            problem_id,
            input: input.to_string(),
            expected_output: expected_output.to_string(),
            hidden,
            created_at: now,
        })
    }

    pub async fn create_submission(
        &self,
        user_id: i64,
        problem_id: i64,
        code: &str,
    ) -> Result<Submission, StoreError> {
        let now = create_timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO submissions (user_id, problem_id, code, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(problem_id)
        .bind(code)
        .bind(SubmissionStatus::Pending.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.find_submission(result.last_insert_rowid()).await
    }

    pub async fn list_results(&self, submission_id: i64) -> Result<Vec<SubmissionResult>, StoreError> {
        let rows: Vec<ResultRow> = sqlx::query_as(
            r#"
            SELECT id, submission_id, testcase_id, verdict, passed, stdout, stderr,
                   execution_time_ms, created_at
            FROM submission_results
            WHERE submission_id = ?
            ORDER BY id
            "#,
        )
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SubmissionResult::try_from).collect()
    }
}

#[async_trait]
impl SubmissionStore for SqliteStore {
    async fn find_submission(&self, id: i64) -> Result<Submission, StoreError> {
        log::debug!("Trying to fetch submission {id} from database");

        let row: Option<SubmissionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, problem_id, code, status, output, score,
                   passed_testcases, total_testcases, created_at, updated_at
            FROM submissions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::not_found("submission", id))?
        .try_into()
    }

    async fn find_problem(&self, id: i64) -> Result<Problem, StoreError> {
        let row: Option<(i64, String, bool)> =
            sqlx::query_as("SELECT id, title, is_active FROM problems WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(id, title, is_active)| Problem {
            id,
            title,
            is_active,
        })
        .ok_or(StoreError::not_found("problem", id))
    }

    async fn list_testcases(&self, problem_id: i64) -> Result<Vec<Testcase>, StoreError> {
        let rows: Vec<(i64, i64, String, String, bool, String)> = sqlx::query_as(
            r#"
            SELECT id, problem_id, input, expected_output, hidden, created_at
            FROM testcases
            WHERE problem_id = ?
            ORDER BY created_at, id
            "#,
        )
        .bind(problem_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, problem_id, input, expected_output, hidden, created_at)| Testcase {
                    id,
                    problem_id,
                    input,
                    expected_output,
                    hidden,
                    created_at,
                },
            )
            .collect())
    }

    async fn mark_executing(&self, id: i64) -> Result<bool, StoreError> {
        let now = create_timestamp();
        let updated = sqlx::query(
            r#"
            UPDATE submissions
            SET status = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(SubmissionStatus::Executing.as_str())
        .bind(&now)
        .bind(id)
        .bind(SubmissionStatus::Pending.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            // Tell a missing row apart from one that already left PENDING
            self.find_submission(id).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn insert_result(
        &self,
        result: &NewSubmissionResult,
    ) -> Result<SubmissionResult, StoreError> {
        let now = create_timestamp();
        let passed = result.verdict.is_passed();
        let inserted = sqlx::query(
            r#"
            INSERT INTO submission_results
                (submission_id, testcase_id, verdict, passed, stdout, stderr, execution_time_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.submission_id)
        .bind(result.testcase_id)
        .bind(result.verdict.as_str())
        .bind(passed)
        .bind(&result.stdout)
        .bind(&result.stderr)
        .bind(result.execution_time_ms)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(SubmissionResult {
            id: inserted.last_insert_rowid(),
            submission_id: result.submission_id,
            testcase_id: result.testcase_id,
            verdict: result.verdict,
            passed,
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            execution_time_ms: result.execution_time_ms,
            created_at: now,
        })
    }

    async fn finish_submission(&self, id: i64, aggregate: &Aggregate) -> Result<(), StoreError> {
        if !aggregate.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                id,
                from: SubmissionStatus::Executing,
                to: aggregate.status,
            });
        }

        let now = create_timestamp();
        let updated = sqlx::query(
            r#"
            UPDATE submissions
            SET status = ?, output = ?, score = ?, passed_testcases = ?, total_testcases = ?,
                updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(aggregate.status.as_str())
        .bind(&aggregate.output)
        .bind(aggregate.score as i64)
        .bind(aggregate.passed as i64)
        .bind(aggregate.total as i64)
        .bind(&now)
        .bind(id)
        .bind(SubmissionStatus::Executing.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            let current = self.find_submission(id).await?;
            return Err(StoreError::InvalidTransition {
                id,
                from: current.status,
                to: aggregate.status,
            });
        }
        Ok(())
    }
}
