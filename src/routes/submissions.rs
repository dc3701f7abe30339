use actix_web::{HttpResponse, Responder, post, web};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::{ErrorResponse, ErrorResponseWithMessage};
use crate::orchestrator::{ExecuteError, Orchestrator};
use crate::queue::{JobMessage, JobQueue, JobReply};
use crate::verdict::SubmissionStatus;

#[derive(Deserialize)]
pub struct ExecuteQueryParams {
    #[serde(default)]
    pub blocking: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ExecuteAccepted {
    pub submission_id: i64,
    pub status: SubmissionStatus,
}

/// Queues a pending submission for judging
///
/// With `?blocking=true` the response waits for the verdict and carries the
/// full outcome; otherwise it returns `202 Accepted` right away.
#[post("/submissions/{id}/execute")]
pub async fn post_execute_handler(
    job_queue: web::Data<JobQueue>,
    orchestrator: web::Data<Orchestrator>,
    path: web::Path<(i64,)>,
    query: web::Query<ExecuteQueryParams>,
) -> impl Responder {
    let submission_id = path.into_inner().0;

    let submission = match orchestrator.store().find_submission(submission_id).await {
        Ok(submission) => submission,
        Err(e) if e.is_not_found() => {
            log::info!("Got nothing with submission id {submission_id}");
            return HttpResponse::NotFound().json(ErrorResponseWithMessage {
                reason: "ERR_NOT_FOUND",
                code: 3,
                message: format!("Submission {submission_id} not found."),
            });
        }
        Err(e) => {
            log::error!("Failed to look up submission {submission_id}: {e}");
            return HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_EXTERNAL",
                code: 5,
            });
        }
    };

    if submission.status != SubmissionStatus::Pending {
        return not_pending(submission_id, submission.status);
    }

    if query.blocking {
        let (tx, rx) = oneshot::channel::<JobReply>();
        job_queue
            .push(JobMessage::Blocking {
                submission_id,
                responder: tx,
            })
            .await;
        log::debug!("Sent blocking submission {submission_id} to queue");

        match rx.await {
            Ok(Ok(outcome)) => {
                log::info!("Received final result of blocking submission {submission_id}");
                HttpResponse::Ok().json(outcome)
            }
            // another request claimed it between the status check and the worker
            Ok(Err(ExecuteError::AlreadyJudged(_))) => {
                log::info!("Blocking submission {submission_id} was judged by another request");
                let status = orchestrator
                    .store()
                    .find_submission(submission_id)
                    .await
                    .map(|s| s.status)
                    .unwrap_or(SubmissionStatus::Executing);
                not_pending(submission_id, status)
            }
            Ok(Err(e)) => HttpResponse::InternalServerError().json(ErrorResponseWithMessage {
                reason: "ERR_INTERNAL",
                code: 6,
                message: e.to_string(),
            }),
            Err(e) => {
                log::error!("Failed to receive submission response: {e}");
                HttpResponse::InternalServerError().json(ErrorResponse {
                    reason: "ERR_INTERNAL",
                    code: 6,
                })
            }
        }
    } else {
        job_queue
            .push(JobMessage::FireAndForget { submission_id })
            .await;
        log::debug!("Sent non-blocking submission {submission_id} to queue");

        HttpResponse::Accepted().json(ExecuteAccepted {
            submission_id,
            status: SubmissionStatus::Pending,
        })
    }
}

fn not_pending(submission_id: i64, status: SubmissionStatus) -> HttpResponse {
    HttpResponse::Conflict().json(ErrorResponseWithMessage {
        reason: "ERR_INVALID_STATE",
        code: 2,
        message: format!("Submission {submission_id} is {status} and cannot be executed again."),
    })
}
