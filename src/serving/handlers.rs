use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{dto::ServeRequest, services};
use crate::{error::KitchenResult, state::AppState, store::ServingLog};

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/meals/serve", get(list_servings))
}

pub fn write_routes() -> Router<AppState> {
    Router::new().route("/meals/:id/serve", post(serve_meal))
}

#[instrument(skip(state))]
pub async fn serve_meal(
    State(state): State<AppState>,
    Path(meal_id): Path<Uuid>,
    Json(body): Json<ServeRequest>,
) -> KitchenResult<(StatusCode, Json<ServingLog>)> {
    let log = services::serve(
        state.store.as_ref(),
        state.events.as_ref(),
        state.config.serving.max_retries,
        meal_id,
        body.portions,
        body.user_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(log)))
}

#[instrument(skip(state))]
pub async fn list_servings(State(state): State<AppState>) -> KitchenResult<Json<Vec<ServingLog>>> {
    Ok(Json(state.store.list_servings().await?))
}
