use serde::Deserialize;
use uuid::Uuid;

/// Body of `POST /meals/:id/serve`.
///
/// `user_id` is whoever the caller says served the meal; this service does
/// not authenticate users itself.
#[derive(Debug, Deserialize)]
pub struct ServeRequest {
    pub user_id: Uuid,
    pub portions: i64,
}
