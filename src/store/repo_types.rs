use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Ingredient stock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Ingredient {
    pub id: Uuid,
    pub name: String,
    pub quantity_grams: i64,          // never negative
    pub low_threshold_grams: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub delivery_date: OffsetDateTime,
}

impl Ingredient {
    pub fn is_low(&self) -> bool {
        self.quantity_grams <= self.low_threshold_grams
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Meal {
    pub id: Uuid,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// One (ingredient, grams per portion) requirement of a meal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RecipeItem {
    pub id: Uuid,
    pub meal_id: Uuid,
    pub ingredient_id: Uuid,
    pub amount_grams: i64,
}

/// A meal together with its recipe, in recipe order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MealWithRecipe {
    #[serde(flatten)]
    pub meal: Meal,
    pub recipe: Vec<RecipeItem>,
}

/// Immutable record of one successful serve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ServingLog {
    pub id: Uuid,
    pub meal_id: Uuid,
    pub user_id: Uuid,
    pub portions: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub served_at: OffsetDateTime,
}

// ---- write models ----

#[derive(Debug, Clone)]
pub struct NewIngredient {
    pub name: String,
    pub quantity_grams: i64,
    pub low_threshold_grams: i64,
    pub delivery_date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct IngredientPatch {
    pub name: Option<String>,
    pub quantity_grams: Option<i64>,
    pub low_threshold_grams: Option<i64>,
    pub delivery_date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewRecipeItem {
    pub ingredient_id: Uuid,
    pub amount_grams: i64,
}

#[derive(Debug, Clone)]
pub struct NewMeal {
    pub name: String,
    pub recipe: Vec<NewRecipeItem>,
}

#[derive(Debug, Clone, Copy)]
pub struct NewServingLog {
    pub meal_id: Uuid,
    pub user_id: Uuid,
    pub portions: i64,
}
