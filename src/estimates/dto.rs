use serde::Serialize;
use uuid::Uuid;

/// Live portion capacity of one meal. Goes stale as soon as stock changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MealEstimate {
    pub meal_id: Uuid,
    pub meal_name: String,
    pub max_portions_possible: i64,
}
