//! Editing a meal's recipe one item at a time, alongside the whole-recipe
//! replacement offered by `PUT /meals/:id`.

pub mod dto;
pub mod handlers;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
