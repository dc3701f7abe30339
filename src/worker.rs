use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::orchestrator::{ExecuteError, Orchestrator, SubmissionOutcome};
use crate::queue::{JobMessage, JobQueue};

pub async fn worker(
    id: u8,
    orchestrator: Arc<Orchestrator>,
    queue: Arc<JobQueue>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    log::info!("Worker {id} initialized");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("Worker {id} received shutdown signal, stopping");
                break;
            }

            job_message = queue.pop() => {
                let submission_id = job_message.id();
                log::info!("Worker {id} got submission {submission_id} from queue");

                let reply = handle_submission(&orchestrator, submission_id).await;
                log::info!("Submission {submission_id} finished on worker {id}");

                if let JobMessage::Blocking { responder, .. } = job_message {
                    if responder.send(reply).is_err() {
                        log::warn!("Failed to send blocking submission {submission_id} result back to server");
                    } else {
                        log::debug!("Blocking submission {submission_id} result sent back from worker {id}");
                    }
                }
            }
        };
    }

    log::info!("Worker {id} has shut down gracefully");
    Ok(())
}

/// Judges one submission, marking it `ERROR` when judging cannot complete
pub async fn handle_submission(
    orchestrator: &Orchestrator,
    submission_id: i64,
) -> Result<SubmissionOutcome, ExecuteError> {
    let result = orchestrator.judge_submission(submission_id).await;

    if let Err(e) = &result {
        log::error!("Judging submission {submission_id} failed: {e}");
        if e.leaves_submission_claimed() {
            let reason = match e {
                ExecuteError::ProblemInactive(_) => "Problem not found or inactive".to_string(),
                ExecuteError::Store(store_error) if store_error.is_not_found() => {
                    "Problem not found or inactive".to_string()
                }
                _ => "Internal error while judging".to_string(),
            };
            if let Err(mark_error) = orchestrator.fail_submission(submission_id, &reason).await {
                log::error!("Failed to mark submission {submission_id} as ERROR: {mark_error}");
            }
        }
    }

    result
}
