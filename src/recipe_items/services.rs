use tracing::info;
use uuid::Uuid;

use super::dto::{ClearedRecipe, RecipeItemFilter, UpdateRecipeItemRequest};
use crate::catalog::dto::RecipeLine;
use crate::catalog::services::{validate_amount, validate_recipe};
use crate::error::{KitchenError, KitchenResult};
use crate::store::{KitchenStore, RecipeItem, StoreError};

const ITEM: &str = "Recipe item";

pub async fn list_recipe_items(
    store: &dyn KitchenStore,
    filter: RecipeItemFilter,
) -> KitchenResult<Vec<RecipeItem>> {
    Ok(store
        .list_recipe_items(filter.meal_id, filter.ingredient_id)
        .await?)
}

pub async fn get_recipe_item(store: &dyn KitchenStore, id: Uuid) -> KitchenResult<RecipeItem> {
    store
        .get_recipe_item(id)
        .await?
        .ok_or(KitchenError::NotFound { entity: ITEM, id })
}

/// A meal's recipe in recipe order.
pub async fn list_for_meal(
    store: &dyn KitchenStore,
    meal_id: Uuid,
) -> KitchenResult<Vec<RecipeItem>> {
    let meal = store
        .get_meal(meal_id)
        .await?
        .ok_or(KitchenError::NotFound { entity: "Meal", id: meal_id })?;
    Ok(meal.recipe)
}

/// Appends `lines` to the meal's recipe. Each ingredient may appear once per
/// meal, so a line naming an ingredient already in the recipe is a duplicate.
pub async fn add_recipe_items(
    store: &dyn KitchenStore,
    meal_id: Uuid,
    lines: Vec<RecipeLine>,
) -> KitchenResult<Vec<RecipeItem>> {
    let meal = store
        .get_meal(meal_id)
        .await?
        .ok_or(KitchenError::NotFound { entity: "Meal", id: meal_id })?;
    let items = validate_recipe(store, lines).await?;
    if let Some(taken) = items
        .iter()
        .find(|item| meal.recipe.iter().any(|r| r.ingredient_id == item.ingredient_id))
    {
        return Err(KitchenError::Duplicate(format!(
            "recipe item for ingredient {}",
            taken.ingredient_id
        )));
    }

    let added = store
        .add_recipe_items(meal_id, &items)
        .await?
        .ok_or(KitchenError::NotFound { entity: "Meal", id: meal_id })?;
    info!(meal_id = %meal_id, added = added.len(), "recipe items added");
    Ok(added)
}

pub async fn add_recipe_item(
    store: &dyn KitchenStore,
    meal_id: Uuid,
    line: RecipeLine,
) -> KitchenResult<RecipeItem> {
    add_recipe_items(store, meal_id, vec![line])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            KitchenError::Store(StoreError::Backend(anyhow::anyhow!(
                "recipe insert returned no row"
            )))
        })
}

pub async fn update_recipe_item(
    store: &dyn KitchenStore,
    id: Uuid,
    req: UpdateRecipeItemRequest,
) -> KitchenResult<RecipeItem> {
    let amount_grams = validate_amount(req.amount_grams)?;
    store
        .update_recipe_item(id, amount_grams)
        .await?
        .ok_or(KitchenError::NotFound { entity: ITEM, id })
}

pub async fn delete_recipe_item(store: &dyn KitchenStore, id: Uuid) -> KitchenResult<RecipeItem> {
    let removed = store
        .delete_recipe_item(id)
        .await?
        .ok_or(KitchenError::NotFound { entity: ITEM, id })?;
    info!(item_id = %id, meal_id = %removed.meal_id, "recipe item deleted");
    Ok(removed)
}

pub async fn clear_recipe(store: &dyn KitchenStore, meal_id: Uuid) -> KitchenResult<ClearedRecipe> {
    let deleted_count = store
        .clear_recipe(meal_id)
        .await?
        .ok_or(KitchenError::NotFound { entity: "Meal", id: meal_id })?;
    info!(meal_id = %meal_id, deleted_count, "recipe cleared");
    Ok(ClearedRecipe { meal_id, deleted_count })
}
