use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use super::dto::MealEstimate;
use crate::error::KitchenResult;
use crate::store::{Ingredient, KitchenStore, MealWithRecipe, RecipeItem};

/// Maximum whole portions makeable from `stock` (ingredient id -> grams).
///
/// An empty recipe, a missing ingredient or a non-positive amount all yield 0.
pub fn estimate(recipe: &[RecipeItem], stock: &HashMap<Uuid, i64>) -> i64 {
    let mut portions: Option<i64> = None;
    for item in recipe {
        let Some(&quantity) = stock.get(&item.ingredient_id) else {
            return 0;
        };
        if item.amount_grams <= 0 {
            return 0;
        }
        let here = if quantity <= 0 { 0 } else { quantity / item.amount_grams };
        portions = Some(portions.map_or(here, |p| p.min(here)));
    }
    portions.unwrap_or(0)
}

pub fn stock_map(ingredients: &[Ingredient]) -> HashMap<Uuid, i64> {
    ingredients
        .iter()
        .map(|i| (i.id, i.quantity_grams))
        .collect()
}

/// Estimates every meal against one stock snapshot, in catalog order.
pub fn estimate_meals(meals: &[MealWithRecipe], ingredients: &[Ingredient]) -> Vec<MealEstimate> {
    let stock = stock_map(ingredients);
    meals
        .iter()
        .map(|m| MealEstimate {
            meal_id: m.meal.id,
            meal_name: m.meal.name.clone(),
            max_portions_possible: estimate(&m.recipe, &stock),
        })
        .collect()
}

pub async fn estimate_all(store: &dyn KitchenStore) -> KitchenResult<Vec<MealEstimate>> {
    let ingredients = store.list_ingredients(None).await?;
    let meals = store.list_meals().await?;
    let estimates = estimate_meals(&meals, &ingredients);
    debug!(meals = estimates.len(), "estimates computed");
    Ok(estimates)
}
