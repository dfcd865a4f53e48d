use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::{
    CreateIngredientRequest, CreateMealRequest, IngredientSearch, UpdateIngredientRequest,
    UpdateMealRequest,
};
use super::services;
use crate::{
    error::KitchenResult,
    state::AppState,
    store::{Ingredient, MealWithRecipe},
};

pub fn ingredient_routes() -> Router<AppState> {
    Router::new()
        .route("/ingredients", get(list_ingredients).post(create_ingredient))
        .route(
            "/ingredients/:id",
            get(get_ingredient)
                .patch(update_ingredient)
                .delete(delete_ingredient),
        )
}

pub fn meal_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", get(list_meals).post(create_meal))
        .route(
            "/meals/:id",
            get(get_meal).put(update_meal).delete(delete_meal),
        )
}

// --- ingredients ---

#[instrument(skip(state))]
pub async fn list_ingredients(
    State(state): State<AppState>,
    Query(q): Query<IngredientSearch>,
) -> KitchenResult<Json<Vec<Ingredient>>> {
    let items = services::list_ingredients(state.store.as_ref(), q.search.as_deref()).await?;
    Ok(Json(items))
}

#[instrument(skip(state))]
pub async fn get_ingredient(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> KitchenResult<Json<Ingredient>> {
    Ok(Json(services::get_ingredient(state.store.as_ref(), id).await?))
}

#[instrument(skip(state, body))]
pub async fn create_ingredient(
    State(state): State<AppState>,
    Json(body): Json<CreateIngredientRequest>,
) -> KitchenResult<(StatusCode, Json<Ingredient>)> {
    let created = services::create_ingredient(state.store.as_ref(), body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip(state, body))]
pub async fn update_ingredient(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateIngredientRequest>,
) -> KitchenResult<Json<Ingredient>> {
    let updated =
        services::update_ingredient(state.store.as_ref(), state.events.as_ref(), id, body).await?;
    Ok(Json(updated))
}

#[instrument(skip(state))]
pub async fn delete_ingredient(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> KitchenResult<StatusCode> {
    services::delete_ingredient(state.store.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- meals ---

#[instrument(skip(state))]
pub async fn list_meals(State(state): State<AppState>) -> KitchenResult<Json<Vec<MealWithRecipe>>> {
    Ok(Json(services::list_meals(state.store.as_ref()).await?))
}

#[instrument(skip(state))]
pub async fn get_meal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> KitchenResult<Json<MealWithRecipe>> {
    Ok(Json(services::get_meal(state.store.as_ref(), id).await?))
}

#[instrument(skip(state, body))]
pub async fn create_meal(
    State(state): State<AppState>,
    Json(body): Json<CreateMealRequest>,
) -> KitchenResult<(StatusCode, Json<MealWithRecipe>)> {
    let created = services::create_meal(state.store.as_ref(), body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip(state, body))]
pub async fn update_meal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateMealRequest>,
) -> KitchenResult<Json<MealWithRecipe>> {
    Ok(Json(services::update_meal(state.store.as_ref(), id, body).await?))
}

#[instrument(skip(state))]
pub async fn delete_meal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> KitchenResult<StatusCode> {
    services::delete_meal(state.store.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
