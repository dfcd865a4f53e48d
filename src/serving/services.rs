use std::collections::HashMap;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{KitchenError, KitchenResult};
use crate::events::{EventPublisher, KitchenEvent, ServeStatus};
use crate::store::{KitchenStore, NewServingLog, RecipeItem, ServingLog};

/// Per-ingredient requirement, kept in recipe order.
fn requirements(recipe: &[RecipeItem], portions: i64) -> KitchenResult<Vec<(Uuid, i64)>> {
    let mut required: Vec<(Uuid, i64)> = Vec::with_capacity(recipe.len());
    for item in recipe {
        let grams = item
            .amount_grams
            .checked_mul(portions)
            .ok_or_else(|| KitchenError::InvalidInput("portions too large".into()))?;
        match required.iter_mut().find(|(id, _)| *id == item.ingredient_id) {
            Some((_, total)) => {
                *total = total
                    .checked_add(grams)
                    .ok_or_else(|| KitchenError::InvalidInput("portions too large".into()))?;
            }
            None => required.push((item.ingredient_id, grams)),
        }
    }
    Ok(required)
}

struct Served {
    log: ServingLog,
    stock: Vec<(Uuid, i64)>,
}

/// One validate-deduct-log pass inside a single store transaction.
async fn attempt(
    store: &dyn KitchenStore,
    meal_id: Uuid,
    portions: i64,
    user_id: Uuid,
) -> KitchenResult<Served> {
    let mut tx = store.begin_serving().await?;

    let meal = tx.load_meal(meal_id).await?.ok_or(KitchenError::NotFound {
        entity: "Meal",
        id: meal_id,
    })?;
    if meal.recipe.is_empty() {
        return Err(KitchenError::InvalidState(format!(
            "meal '{}' has no recipe and cannot be served",
            meal.meal.name
        )));
    }

    let required = requirements(&meal.recipe, portions)?;
    let ids: Vec<Uuid> = required.iter().map(|(id, _)| *id).collect();
    let locked: HashMap<Uuid, _> = tx
        .lock_ingredients(&ids)
        .await?
        .into_iter()
        .map(|i| (i.id, i))
        .collect();

    for (ingredient_id, grams) in &required {
        let Some(ingredient) = locked.get(ingredient_id) else {
            error!(
                meal_id = %meal_id,
                ingredient_id = %ingredient_id,
                "recipe references a missing ingredient"
            );
            return Err(KitchenError::DataIntegrity(format!(
                "ingredient {ingredient_id} used by meal '{}' no longer exists",
                meal.meal.name
            )));
        };
        if ingredient.quantity_grams < *grams {
            return Err(KitchenError::InsufficientStock {
                ingredient: ingredient.name.clone(),
                required: *grams,
                available: ingredient.quantity_grams,
            });
        }
    }

    let mut stock = Vec::with_capacity(required.len());
    for (ingredient_id, grams) in &required {
        let left = tx.deduct(*ingredient_id, *grams).await?;
        stock.push((*ingredient_id, left));
    }
    let log = tx
        .insert_serving(NewServingLog {
            meal_id,
            user_id,
            portions,
        })
        .await?;
    tx.commit().await?;

    Ok(Served { log, stock })
}

/// Serves `portions` of a meal: checks every ingredient, deducts stock and
/// records the serving atomically.
///
/// Commit conflicts are retried up to `max_retries` times. Events go out only
/// once the outcome is final.
pub async fn serve(
    store: &dyn KitchenStore,
    events: &dyn EventPublisher,
    max_retries: u32,
    meal_id: Uuid,
    portions: i64,
    user_id: Uuid,
) -> KitchenResult<ServingLog> {
    let outcome = run_with_retries(store, max_retries.max(1), meal_id, portions, user_id).await;

    match &outcome {
        Ok(served) => {
            for (ingredient_id, left) in &served.stock {
                events.publish(KitchenEvent::InventoryUpdate {
                    ingredient_id: *ingredient_id,
                    new_quantity_grams: *left,
                });
            }
            events.publish(KitchenEvent::ServeAttempt {
                meal_id,
                portions,
                status: ServeStatus::Success,
                message: None,
            });
            info!(meal_id = %meal_id, portions, serving_id = %served.log.id, "meal served");
        }
        Err(e) => {
            events.publish(KitchenEvent::ServeAttempt {
                meal_id,
                portions,
                status: ServeStatus::Error,
                message: Some(e.to_string()),
            });
        }
    }

    outcome.map(|served| served.log)
}

async fn run_with_retries(
    store: &dyn KitchenStore,
    max_retries: u32,
    meal_id: Uuid,
    portions: i64,
    user_id: Uuid,
) -> KitchenResult<Served> {
    if portions <= 0 {
        return Err(KitchenError::InvalidInput(
            "portions must be a positive integer".into(),
        ));
    }

    let mut attempts = 0;
    loop {
        attempts += 1;
        match attempt(store, meal_id, portions, user_id).await {
            Err(KitchenError::ConflictDuringCommit { .. }) if attempts < max_retries => {
                warn!(meal_id = %meal_id, attempt = attempts, "serve conflicted, retrying");
            }
            Err(KitchenError::ConflictDuringCommit { .. }) => {
                warn!(meal_id = %meal_id, attempts, "serve conflicted, giving up");
                return Err(KitchenError::ConflictDuringCommit { attempts });
            }
            other => return other,
        }
    }
}
