//! Ingredient stock and meal recipe maintenance.

pub mod dto;
pub mod handlers;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::ingredient_routes())
        .merge(handlers::meal_routes())
}
