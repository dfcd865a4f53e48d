use axum::{extract::State, routing::get, Json, Router};
use tracing::instrument;

use super::{dto::MealEstimate, services};
use crate::{error::KitchenResult, state::AppState};

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/estimates", get(list_estimates))
}

#[instrument(skip(state))]
pub async fn list_estimates(State(state): State<AppState>) -> KitchenResult<Json<Vec<MealEstimate>>> {
    let estimates = services::estimate_all(state.store.as_ref()).await?;
    Ok(Json(estimates))
}
