//! Background runs of the estimate and monthly report jobs, on demand or on
//! a fixed interval, with their outcome kept for later lookup.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::KitchenResult;

pub mod handlers;
pub mod jobs;
pub mod scheduler;

const MAX_FINISHED: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    EstimateRecalculation,
    MonthlyReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: Uuid,
    pub kind: TaskKind,
    pub status: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<Uuid, TaskRecord>>>,
}

impl TaskRegistry {
    pub fn get(&self, id: Uuid) -> Option<TaskRecord> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn insert_pending(&self, kind: TaskKind) -> Uuid {
        let task_id = Uuid::new_v4();
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        prune(&mut tasks);
        tasks.insert(
            task_id,
            TaskRecord {
                task_id,
                kind,
                status: TaskState::Pending,
                result: None,
                created_at: OffsetDateTime::now_utc(),
            },
        );
        task_id
    }

    fn finish(&self, task_id: Uuid, outcome: KitchenResult<Value>) -> TaskState {
        let (status, result) = match outcome {
            Ok(value) => (TaskState::Success, value),
            Err(e) => {
                error!(error = %e, task_id = %task_id, "background task failed");
                (TaskState::Error, json!({ "status": "error", "message": e.to_string() }))
            }
        };
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = tasks.get_mut(&task_id) {
            record.status = status;
            record.result = Some(result);
        }
        status
    }

    /// Runs `job` to completion, recording it under a fresh task id.
    pub async fn run<F>(&self, kind: TaskKind, job: F) -> Uuid
    where
        F: Future<Output = KitchenResult<Value>>,
    {
        let task_id = self.insert_pending(kind);
        let status = self.finish(task_id, job.await);
        info!(task_id = %task_id, ?kind, ?status, "task finished");
        task_id
    }

    /// Records `job` as pending and runs it on the runtime; returns at once.
    pub fn spawn<F>(&self, kind: TaskKind, job: F) -> Uuid
    where
        F: Future<Output = KitchenResult<Value>> + Send + 'static,
    {
        let task_id = self.insert_pending(kind);
        let registry = self.clone();
        tokio::spawn(async move {
            let status = registry.finish(task_id, job.await);
            info!(task_id = %task_id, ?kind, ?status, "task finished");
        });
        task_id
    }
}

/// Drops the oldest finished records once the registry grows past its cap.
fn prune(tasks: &mut HashMap<Uuid, TaskRecord>) {
    if tasks.len() < MAX_FINISHED {
        return;
    }
    let mut finished: Vec<(OffsetDateTime, Uuid)> = tasks
        .values()
        .filter(|t| t.status != TaskState::Pending)
        .map(|t| (t.created_at, t.task_id))
        .collect();
    finished.sort();
    let excess = tasks.len() + 1 - MAX_FINISHED;
    for (_, id) in finished.into_iter().take(excess) {
        tasks.remove(&id);
    }
}
