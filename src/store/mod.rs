//! Persistence seam for ingredients, meals, recipes and the serving history.
//!
//! Everything above this module talks to `dyn KitchenStore`; `postgres` is the
//! production backend and the test-only `memory` store backs `AppState::fake`
//! and the unit tests.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

#[cfg(test)]
pub mod memory;
pub mod postgres;
pub mod repo_types;

pub use repo_types::{
    Ingredient, IngredientPatch, Meal, MealWithRecipe, NewIngredient, NewMeal, NewRecipeItem,
    NewServingLog, RecipeItem, ServingLog,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Concurrent modification detected while committing; safe to retry.
    #[error("concurrent modification detected")]
    Conflict,
    #[error("{0} already exists")]
    Duplicate(String),
    #[error("{0} is still referenced")]
    InUse(String),
    /// A recipe write referenced an ingredient row that does not exist.
    #[error("ingredient {0} does not exist")]
    MissingIngredient(Uuid),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait KitchenStore: Send + Sync {
    /// Ingredients in name order, optionally filtered by a case-insensitive substring.
    async fn list_ingredients(&self, search: Option<&str>) -> Result<Vec<Ingredient>, StoreError>;
    async fn get_ingredient(&self, id: Uuid) -> Result<Option<Ingredient>, StoreError>;
    async fn create_ingredient(&self, new: NewIngredient) -> Result<Ingredient, StoreError>;
    async fn update_ingredient(
        &self,
        id: Uuid,
        patch: IngredientPatch,
    ) -> Result<Option<Ingredient>, StoreError>;
    async fn delete_ingredient(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Meals in name order, each with its recipe.
    async fn list_meals(&self) -> Result<Vec<MealWithRecipe>, StoreError>;
    async fn get_meal(&self, id: Uuid) -> Result<Option<MealWithRecipe>, StoreError>;
    async fn create_meal(&self, new: NewMeal) -> Result<MealWithRecipe, StoreError>;
    /// Renames the meal and/or replaces its whole recipe.
    async fn update_meal(
        &self,
        id: Uuid,
        name: Option<String>,
        recipe: Option<Vec<NewRecipeItem>>,
    ) -> Result<Option<MealWithRecipe>, StoreError>;
    async fn delete_meal(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn list_recipe_items(
        &self,
        meal_id: Option<Uuid>,
        ingredient_id: Option<Uuid>,
    ) -> Result<Vec<RecipeItem>, StoreError>;
    async fn get_recipe_item(&self, id: Uuid) -> Result<Option<RecipeItem>, StoreError>;
    /// Appends items to the end of a meal's recipe, all or nothing. `None`
    /// when the meal does not exist.
    async fn add_recipe_items(
        &self,
        meal_id: Uuid,
        items: &[NewRecipeItem],
    ) -> Result<Option<Vec<RecipeItem>>, StoreError>;
    async fn update_recipe_item(
        &self,
        id: Uuid,
        amount_grams: i64,
    ) -> Result<Option<RecipeItem>, StoreError>;
    /// Returns the removed item.
    async fn delete_recipe_item(&self, id: Uuid) -> Result<Option<RecipeItem>, StoreError>;
    /// Empties a meal's recipe and returns how many items went. `None` when
    /// the meal does not exist.
    async fn clear_recipe(&self, meal_id: Uuid) -> Result<Option<u64>, StoreError>;

    /// Serving history, newest first.
    async fn list_servings(&self) -> Result<Vec<ServingLog>, StoreError>;
    /// Servings with `from <= served_at < to`.
    async fn servings_between(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<ServingLog>, StoreError>;

    /// Opens the scoped transaction used by a single serve.
    async fn begin_serving(&self) -> Result<Box<dyn ServingTx>, StoreError>;
}

/// Validate-deduct-log unit of work.
///
/// Nothing is visible to other callers until `commit`; dropping the value
/// without committing rolls every change back.
#[async_trait]
pub trait ServingTx: Send {
    async fn load_meal(&mut self, meal_id: Uuid) -> Result<Option<MealWithRecipe>, StoreError>;
    /// Locks the given ingredient rows until the transaction ends and returns
    /// the ones that exist.
    async fn lock_ingredients(&mut self, ids: &[Uuid]) -> Result<Vec<Ingredient>, StoreError>;
    /// Subtracts `grams` and returns the new quantity. Fails with `Conflict`
    /// if the row no longer holds enough stock.
    async fn deduct(&mut self, ingredient_id: Uuid, grams: i64) -> Result<i64, StoreError>;
    async fn insert_serving(&mut self, log: NewServingLog) -> Result<ServingLog, StoreError>;
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
