use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct RecipeItemFilter {
    pub meal_id: Option<Uuid>,
    pub ingredient_id: Option<Uuid>,
}

/// `?meal_id=` on the add endpoints.
#[derive(Debug, Deserialize)]
pub struct MealQuery {
    pub meal_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRecipeItemRequest {
    pub amount_grams: i64,
}

#[derive(Debug, Serialize)]
pub struct ClearedRecipe {
    pub meal_id: Uuid,
    pub deleted_count: u64,
}
