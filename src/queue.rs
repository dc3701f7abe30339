use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify, oneshot};

use crate::orchestrator::{ExecuteError, SubmissionOutcome};

/// What a blocking caller receives once its submission has been handled
pub type JobReply = Result<SubmissionOutcome, ExecuteError>;

pub enum JobMessage {
    FireAndForget {
        submission_id: i64,
    },
    Blocking {
        submission_id: i64,
        responder: oneshot::Sender<JobReply>,
    },
}

impl JobMessage {
    pub fn id(&self) -> i64 {
        match self {
            Self::FireAndForget { submission_id } => *submission_id,
            Self::Blocking { submission_id, .. } => *submission_id,
        }
    }
}

pub struct JobQueue {
    queue: Mutex<VecDeque<JobMessage>>,
    notify: Notify,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub async fn push(&self, job: JobMessage) {
        self.queue.lock().await.push_back(job);
        self.notify.notify_one();
    }

    pub async fn pop(&self) -> JobMessage {
        loop {
            if let Some(job) = self.queue.lock().await.pop_front() {
                return job;
            }
            self.notify.notified().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }
}
