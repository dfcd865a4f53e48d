use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::{ClearedRecipe, MealQuery, RecipeItemFilter, UpdateRecipeItemRequest};
use super::services;
use crate::{catalog::dto::RecipeLine, error::KitchenResult, state::AppState, store::RecipeItem};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/recipe-items", get(list_recipe_items).post(add_recipe_item))
        .route("/recipe-items/bulk", post(add_recipe_items))
        .route(
            "/recipe-items/:id",
            get(get_recipe_item)
                .put(update_recipe_item)
                .delete(delete_recipe_item),
        )
        .route(
            "/recipe-items/meal/:meal_id",
            get(list_for_meal).delete(clear_recipe),
        )
}

#[instrument(skip(state))]
pub async fn list_recipe_items(
    State(state): State<AppState>,
    Query(filter): Query<RecipeItemFilter>,
) -> KitchenResult<Json<Vec<RecipeItem>>> {
    Ok(Json(services::list_recipe_items(state.store.as_ref(), filter).await?))
}

#[instrument(skip(state))]
pub async fn get_recipe_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> KitchenResult<Json<RecipeItem>> {
    Ok(Json(services::get_recipe_item(state.store.as_ref(), id).await?))
}

#[instrument(skip(state))]
pub async fn list_for_meal(
    State(state): State<AppState>,
    Path(meal_id): Path<Uuid>,
) -> KitchenResult<Json<Vec<RecipeItem>>> {
    Ok(Json(services::list_for_meal(state.store.as_ref(), meal_id).await?))
}

#[instrument(skip(state, body))]
pub async fn add_recipe_item(
    State(state): State<AppState>,
    Query(q): Query<MealQuery>,
    Json(body): Json<RecipeLine>,
) -> KitchenResult<(StatusCode, Json<RecipeItem>)> {
    let item = services::add_recipe_item(state.store.as_ref(), q.meal_id, body).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[instrument(skip(state, body))]
pub async fn add_recipe_items(
    State(state): State<AppState>,
    Query(q): Query<MealQuery>,
    Json(body): Json<Vec<RecipeLine>>,
) -> KitchenResult<(StatusCode, Json<Vec<RecipeItem>>)> {
    let items = services::add_recipe_items(state.store.as_ref(), q.meal_id, body).await?;
    Ok((StatusCode::CREATED, Json(items)))
}

#[instrument(skip(state, body))]
pub async fn update_recipe_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateRecipeItemRequest>,
) -> KitchenResult<Json<RecipeItem>> {
    Ok(Json(services::update_recipe_item(state.store.as_ref(), id, body).await?))
}

#[instrument(skip(state))]
pub async fn delete_recipe_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> KitchenResult<Json<RecipeItem>> {
    Ok(Json(services::delete_recipe_item(state.store.as_ref(), id).await?))
}

#[instrument(skip(state))]
pub async fn clear_recipe(
    State(state): State<AppState>,
    Path(meal_id): Path<Uuid>,
) -> KitchenResult<Json<ClearedRecipe>> {
    Ok(Json(services::clear_recipe(state.store.as_ref(), meal_id).await?))
}
