use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::store::NewRecipeItem;

#[derive(Debug, Deserialize)]
pub struct IngredientSearch {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateIngredientRequest {
    pub name: String,
    pub quantity_grams: i64,
    pub low_threshold_grams: i64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub delivery_date: Option<OffsetDateTime>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateIngredientRequest {
    pub name: Option<String>,
    pub quantity_grams: Option<i64>,
    pub low_threshold_grams: Option<i64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub delivery_date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RecipeLine {
    pub ingredient_id: Uuid,
    pub amount_grams: i64,
}

impl From<RecipeLine> for NewRecipeItem {
    fn from(line: RecipeLine) -> Self {
        NewRecipeItem {
            ingredient_id: line.ingredient_id,
            amount_grams: line.amount_grams,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMealRequest {
    pub name: String,
    #[serde(default)]
    pub recipe: Vec<RecipeLine>,
}

/// `recipe`, when present, replaces the whole recipe.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateMealRequest {
    pub name: Option<String>,
    pub recipe: Option<Vec<RecipeLine>>,
}
