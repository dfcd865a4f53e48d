use std::collections::HashSet;

use tracing::info;
use uuid::Uuid;

use super::dto::{
    CreateIngredientRequest, CreateMealRequest, RecipeLine, UpdateIngredientRequest,
    UpdateMealRequest,
};
use crate::error::{KitchenError, KitchenResult};
use crate::events::{EventPublisher, KitchenEvent};
use crate::store::{
    Ingredient, IngredientPatch, KitchenStore, MealWithRecipe, NewIngredient, NewMeal,
    NewRecipeItem,
};

const MAX_NAME_LEN: usize = 100;

fn validate_name(raw: &str) -> KitchenResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(KitchenError::InvalidInput("name must not be empty".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(KitchenError::InvalidInput(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn validate_grams(field: &str, grams: i64) -> KitchenResult<i64> {
    if grams < 0 {
        return Err(KitchenError::InvalidInput(format!("{field} must not be negative")));
    }
    Ok(grams)
}

pub(crate) fn validate_amount(grams: i64) -> KitchenResult<i64> {
    if grams <= 0 {
        return Err(KitchenError::InvalidInput("amount_grams must be positive".into()));
    }
    Ok(grams)
}

/// Checks amounts, rejects repeated ingredients and makes sure every
/// referenced ingredient exists.
pub(crate) async fn validate_recipe(
    store: &dyn KitchenStore,
    lines: Vec<RecipeLine>,
) -> KitchenResult<Vec<NewRecipeItem>> {
    let mut seen = HashSet::new();
    for line in &lines {
        validate_amount(line.amount_grams)?;
        if !seen.insert(line.ingredient_id) {
            return Err(KitchenError::InvalidInput(format!(
                "ingredient {} appears twice in the recipe",
                line.ingredient_id
            )));
        }
        if store.get_ingredient(line.ingredient_id).await?.is_none() {
            return Err(KitchenError::NotFound {
                entity: "Ingredient",
                id: line.ingredient_id,
            });
        }
    }
    Ok(lines.into_iter().map(NewRecipeItem::from).collect())
}

pub async fn list_ingredients(
    store: &dyn KitchenStore,
    search: Option<&str>,
) -> KitchenResult<Vec<Ingredient>> {
    let search = search.map(str::trim).filter(|s| !s.is_empty());
    Ok(store.list_ingredients(search).await?)
}

pub async fn get_ingredient(store: &dyn KitchenStore, id: Uuid) -> KitchenResult<Ingredient> {
    store
        .get_ingredient(id)
        .await?
        .ok_or(KitchenError::NotFound { entity: "Ingredient", id })
}

pub async fn create_ingredient(
    store: &dyn KitchenStore,
    req: CreateIngredientRequest,
) -> KitchenResult<Ingredient> {
    let new = NewIngredient {
        name: validate_name(&req.name)?,
        quantity_grams: validate_grams("quantity_grams", req.quantity_grams)?,
        low_threshold_grams: validate_grams("low_threshold_grams", req.low_threshold_grams)?,
        delivery_date: req.delivery_date,
    };
    let ingredient = store.create_ingredient(new).await?;
    info!(ingredient_id = %ingredient.id, name = %ingredient.name, "ingredient created");
    Ok(ingredient)
}

/// Applies a partial update. A stock change is pushed to live subscribers.
pub async fn update_ingredient(
    store: &dyn KitchenStore,
    events: &dyn EventPublisher,
    id: Uuid,
    req: UpdateIngredientRequest,
) -> KitchenResult<Ingredient> {
    let patch = IngredientPatch {
        name: req.name.as_deref().map(validate_name).transpose()?,
        quantity_grams: req
            .quantity_grams
            .map(|g| validate_grams("quantity_grams", g))
            .transpose()?,
        low_threshold_grams: req
            .low_threshold_grams
            .map(|g| validate_grams("low_threshold_grams", g))
            .transpose()?,
        delivery_date: req.delivery_date,
    };
    let stock_changed = patch.quantity_grams.is_some();

    let ingredient = store
        .update_ingredient(id, patch)
        .await?
        .ok_or(KitchenError::NotFound { entity: "Ingredient", id })?;

    if stock_changed {
        events.publish(KitchenEvent::InventoryUpdate {
            ingredient_id: ingredient.id,
            new_quantity_grams: ingredient.quantity_grams,
        });
    }
    Ok(ingredient)
}

pub async fn delete_ingredient(store: &dyn KitchenStore, id: Uuid) -> KitchenResult<()> {
    if !store.delete_ingredient(id).await? {
        return Err(KitchenError::NotFound { entity: "Ingredient", id });
    }
    info!(ingredient_id = %id, "ingredient deleted");
    Ok(())
}

pub async fn list_meals(store: &dyn KitchenStore) -> KitchenResult<Vec<MealWithRecipe>> {
    Ok(store.list_meals().await?)
}

pub async fn get_meal(store: &dyn KitchenStore, id: Uuid) -> KitchenResult<MealWithRecipe> {
    store
        .get_meal(id)
        .await?
        .ok_or(KitchenError::NotFound { entity: "Meal", id })
}

pub async fn create_meal(
    store: &dyn KitchenStore,
    req: CreateMealRequest,
) -> KitchenResult<MealWithRecipe> {
    let name = validate_name(&req.name)?;
    let recipe = validate_recipe(store, req.recipe).await?;
    let meal = store.create_meal(NewMeal { name, recipe }).await?;
    info!(meal_id = %meal.meal.id, items = meal.recipe.len(), "meal created");
    Ok(meal)
}

pub async fn update_meal(
    store: &dyn KitchenStore,
    id: Uuid,
    req: UpdateMealRequest,
) -> KitchenResult<MealWithRecipe> {
    let name = req.name.as_deref().map(validate_name).transpose()?;
    let recipe = match req.recipe {
        Some(lines) => Some(validate_recipe(store, lines).await?),
        None => None,
    };
    store
        .update_meal(id, name, recipe)
        .await?
        .ok_or(KitchenError::NotFound { entity: "Meal", id })
}

pub async fn delete_meal(store: &dyn KitchenStore, id: Uuid) -> KitchenResult<()> {
    if !store.delete_meal(id).await? {
        return Err(KitchenError::NotFound { entity: "Meal", id });
    }
    info!(meal_id = %id, "meal deleted");
    Ok(())
}
