use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use super::{jobs, TaskKind, TaskRecord};
use crate::{
    error::{KitchenError, KitchenResult},
    reports::{dto::MonthQuery, services::parse_month},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct TaskStarted {
    pub status: &'static str,
    pub message: String,
    pub task_id: Uuid,
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/estimates/recalculate", post(start_recalculation))
        .route("/reports/monthly-summary/generate", post(start_monthly_report))
}

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/estimates/task/:id", get(estimate_task))
        .route("/reports/task/:id", get(report_task))
}

#[instrument(skip(state))]
pub async fn start_recalculation(State(state): State<AppState>) -> (StatusCode, Json<TaskStarted>) {
    let store = state.store.clone();
    let task_id = state.tasks.spawn(TaskKind::EstimateRecalculation, async move {
        jobs::recalculate_estimates(store.as_ref()).await
    });
    (
        StatusCode::ACCEPTED,
        Json(TaskStarted {
            status: "success",
            message: "Estimate recalculation task started".into(),
            task_id,
        }),
    )
}

#[instrument(skip(state))]
pub async fn start_monthly_report(
    State(state): State<AppState>,
    Query(q): Query<MonthQuery>,
) -> KitchenResult<(StatusCode, Json<TaskStarted>)> {
    let period = parse_month(&q.month)?;
    let store = state.store.clone();
    let threshold = state.config.alerts.discrepancy_percent;
    let task_id = state.tasks.spawn(TaskKind::MonthlyReport, async move {
        jobs::generate_monthly_report(store.as_ref(), threshold, Some(period), OffsetDateTime::now_utc())
            .await
    });
    Ok((
        StatusCode::ACCEPTED,
        Json(TaskStarted {
            status: "success",
            message: format!("Monthly report generation for {} started", q.month.trim()),
            task_id,
        }),
    ))
}

fn lookup(state: &AppState, id: Uuid, kind: TaskKind) -> KitchenResult<Json<TaskRecord>> {
    state
        .tasks
        .get(id)
        .filter(|t| t.kind == kind)
        .map(Json)
        .ok_or(KitchenError::NotFound { entity: "Task", id })
}

#[instrument(skip(state))]
pub async fn estimate_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> KitchenResult<Json<TaskRecord>> {
    lookup(&state, id, TaskKind::EstimateRecalculation)
}

#[instrument(skip(state))]
pub async fn report_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> KitchenResult<Json<TaskRecord>> {
    lookup(&state, id, TaskKind::MonthlyReport)
}
