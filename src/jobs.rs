use crate::{
    models::{ApiError, BatchSummary},
    optimizer::Optimizer,
    security::AuthContext,
};
use serde::Serialize;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::info;
use uuid::Uuid;

/// Background bulk optimisation. Jobs outlive the request that queued them.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    statuses: Arc<Mutex<JobTable>>,
}

/// Job states; only the newest `retention` finished jobs are kept.
struct JobTable {
    states: HashMap<Uuid, JobState>,
    finished: VecDeque<Uuid>,
    retention: usize,
}

impl JobTable {
    fn new(retention: usize) -> Self {
        Self {
            states: HashMap::new(),
            finished: VecDeque::new(),
            retention: retention.max(1),
        }
    }

    fn set(&mut self, id: Uuid, state: JobState) {
        let terminal = matches!(state, JobState::Completed { .. } | JobState::Failed { .. });
        self.states.insert(id, state);
        if terminal {
            self.finished.push_back(id);
            while self.finished.len() > self.retention {
                if let Some(evicted) = self.finished.pop_front() {
                    self.states.remove(&evicted);
                }
            }
        }
    }
}

struct Job {
    id: Uuid,
    product_ids: Vec<String>,
    context: AuthContext,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed { summary: BatchSummary },
    Failed { error: String, stage: Option<String> },
}

#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    #[serde(flatten)]
    pub state: JobState,
}

impl JobQueue {
    pub fn spawn(
        optimizer: Optimizer,
        capacity: usize,
        retention: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        let statuses = Arc::new(Mutex::new(JobTable::new(retention)));
        let statuses_bg = statuses.clone();

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                statuses_bg.lock().await.set(job.id, JobState::Running);
                info!(
                    target = "optimizer.api",
                    job_id = %job.id,
                    caller = %job.context.label,
                    products = job.product_ids.len(),
                    "bulk_job_started"
                );

                let state = match optimizer.optimize_many(&job.product_ids).await {
                    Ok(summary) => JobState::Completed { summary },
                    Err(err) => JobState::Failed {
                        error: err.detail().to_string(),
                        stage: Some(err.stage().to_string()),
                    },
                };
                statuses_bg.lock().await.set(job.id, state);
            }
        });

        (Self { tx, statuses }, handle)
    }

    pub async fn enqueue_bulk(
        &self,
        product_ids: Vec<String>,
        context: AuthContext,
    ) -> Result<Uuid, ApiError> {
        let id = Uuid::new_v4();
        self.statuses.lock().await.set(id, JobState::Queued);
        let job = Job {
            id,
            product_ids,
            context,
        };
        if self.tx.send(job).await.is_err() {
            self.statuses.lock().await.states.remove(&id);
            return Err(ApiError {
                error: "queue_send_failed".into(),
                detail: Some("worker not available".into()),
            });
        }
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Option<JobInfo> {
        let guard = self.statuses.lock().await;
        guard.states.get(&id).cloned().map(|state| JobInfo {
            id: id.to_string(),
            state,
        })
    }
}
