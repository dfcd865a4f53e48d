use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::store::StoreError;

pub type KitchenResult<T> = Result<T, KitchenError>;

#[derive(Debug, Error)]
pub enum KitchenError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// The meal cannot be served in its current shape (e.g. no recipe).
    #[error("{0}")]
    InvalidState(String),

    #[error("Not enough stock for ingredient '{ingredient}'. Required: {required}g, Available: {available}g")]
    InsufficientStock {
        ingredient: String,
        required: i64,
        available: i64,
    },

    #[error("stock changed concurrently, gave up after {attempts} attempts; try again")]
    ConflictDuringCommit { attempts: u32 },

    /// A recipe points at an ingredient that no longer exists.
    #[error("{0}")]
    DataIntegrity(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("{0} is still in use")]
    InUse(String),

    #[error("storage failure")]
    Store(#[source] StoreError),
}

impl From<StoreError> for KitchenError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => KitchenError::ConflictDuringCommit { attempts: 1 },
            StoreError::Duplicate(what) => KitchenError::Duplicate(what),
            StoreError::InUse(what) => KitchenError::InUse(what),
            StoreError::MissingIngredient(id) => KitchenError::NotFound {
                entity: "Ingredient",
                id,
            },
            other => KitchenError::Store(other),
        }
    }
}

impl KitchenError {
    /// Stable, client-facing failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            KitchenError::NotFound { .. } | KitchenError::DataIntegrity(_) => "not_found",
            KitchenError::InvalidState(_) => "invalid_state",
            KitchenError::InsufficientStock { .. } => "insufficient_stock",
            KitchenError::ConflictDuringCommit { .. } => "conflict",
            KitchenError::InvalidInput(_) => "invalid_input",
            KitchenError::Duplicate(_) => "duplicate",
            KitchenError::InUse(_) => "in_use",
            KitchenError::Store(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            KitchenError::NotFound { .. } | KitchenError::DataIntegrity(_) => StatusCode::NOT_FOUND,
            KitchenError::InvalidState(_)
            | KitchenError::InsufficientStock { .. }
            | KitchenError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            KitchenError::Duplicate(_) | KitchenError::InUse(_) => StatusCode::CONFLICT,
            KitchenError::ConflictDuringCommit { .. } => StatusCode::SERVICE_UNAVAILABLE,
            KitchenError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for KitchenError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // never leak driver text to clients
            KitchenError::Store(e) => {
                error!(error = ?e, "store failure");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": self.kind(), "message": message }))).into_response()
    }
}
