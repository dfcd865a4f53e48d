use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    Ingredient, IngredientPatch, KitchenStore, Meal, MealWithRecipe, NewIngredient, NewMeal,
    NewRecipeItem, NewServingLog, RecipeItem, ServingLog, ServingTx, StoreError,
};

#[derive(Debug, Default)]
struct Tables {
    ingredients: Vec<Ingredient>,
    meals: Vec<Meal>,
    recipe_items: Vec<RecipeItem>, // recipe order is insertion order
    servings: Vec<ServingLog>,
}

impl Tables {
    fn meal_with_recipe(&self, meal: &Meal) -> MealWithRecipe {
        MealWithRecipe {
            meal: meal.clone(),
            recipe: self
                .recipe_items
                .iter()
                .filter(|r| r.meal_id == meal.id)
                .cloned()
                .collect(),
        }
    }

    fn check_recipe(&self, recipe: &[NewRecipeItem]) -> Result<(), StoreError> {
        for item in recipe {
            if !self.ingredients.iter().any(|i| i.id == item.ingredient_id) {
                return Err(StoreError::MissingIngredient(item.ingredient_id));
            }
        }
        Ok(())
    }

    fn push_recipe(&mut self, meal_id: Uuid, recipe: &[NewRecipeItem]) {
        self.recipe_items.extend(recipe.iter().map(|item| RecipeItem {
            id: Uuid::new_v4(),
            meal_id,
            ingredient_id: item.ingredient_id,
            amount_grams: item.amount_grams,
        }));
    }
}

/// Single-process store. Every write, including a whole serving
/// transaction, holds the table lock, so serves are fully serialized.
#[derive(Clone, Default)]
pub struct MemoryKitchenStore {
    tables: Arc<Mutex<Tables>>,
    injected_conflicts: Arc<AtomicUsize>,
    fail_history_reads: Arc<AtomicBool>,
}

impl MemoryKitchenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` serving commits fail with `StoreError::Conflict`.
    #[cfg(test)]
    pub fn inject_conflicts(&self, n: usize) {
        self.injected_conflicts.store(n, Ordering::SeqCst);
    }

    /// Makes serving-history reads fail with a backend error.
    #[cfg(test)]
    pub fn fail_history_reads(&self, fail: bool) {
        self.fail_history_reads.store(fail, Ordering::SeqCst);
    }

    /// Inserts a serving log with an explicit timestamp, bypassing stock checks.
    #[cfg(test)]
    pub async fn record_serving_at(
        &self,
        meal_id: Uuid,
        user_id: Uuid,
        portions: i64,
        served_at: OffsetDateTime,
    ) -> ServingLog {
        let log = ServingLog {
            id: Uuid::new_v4(),
            meal_id,
            user_id,
            portions,
            served_at,
        };
        self.tables.lock().await.servings.push(log.clone());
        log
    }

    /// Removes an ingredient even if recipes still reference it, leaving
    /// those recipes dangling.
    #[cfg(test)]
    pub async fn force_remove_ingredient(&self, id: Uuid) {
        self.tables.lock().await.ingredients.retain(|i| i.id != id);
    }

    fn history_guard(&self) -> Result<(), StoreError> {
        if self.fail_history_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!("serving history unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl KitchenStore for MemoryKitchenStore {
    async fn list_ingredients(&self, search: Option<&str>) -> Result<Vec<Ingredient>, StoreError> {
        let tables = self.tables.lock().await;
        let needle = search.map(str::to_lowercase);
        let mut rows: Vec<Ingredient> = tables
            .ingredients
            .iter()
            .filter(|i| match &needle {
                Some(n) => i.name.to_lowercase().contains(n.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn get_ingredient(&self, id: Uuid) -> Result<Option<Ingredient>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.ingredients.iter().find(|i| i.id == id).cloned())
    }

    async fn create_ingredient(&self, new: NewIngredient) -> Result<Ingredient, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.ingredients.iter().any(|i| i.name == new.name) {
            return Err(StoreError::Duplicate(format!("ingredient '{}'", new.name)));
        }
        let row = Ingredient {
            id: Uuid::new_v4(),
            name: new.name,
            quantity_grams: new.quantity_grams,
            low_threshold_grams: new.low_threshold_grams,
            delivery_date: new.delivery_date.unwrap_or_else(OffsetDateTime::now_utc),
        };
        tables.ingredients.push(row.clone());
        Ok(row)
    }

    async fn update_ingredient(
        &self,
        id: Uuid,
        patch: IngredientPatch,
    ) -> Result<Option<Ingredient>, StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(name) = &patch.name {
            if tables.ingredients.iter().any(|i| &i.name == name && i.id != id) {
                return Err(StoreError::Duplicate(format!("ingredient '{}'", name)));
            }
        }
        let Some(row) = tables.ingredients.iter_mut().find(|i| i.id == id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            row.name = name;
        }
        if let Some(q) = patch.quantity_grams {
            row.quantity_grams = q;
        }
        if let Some(t) = patch.low_threshold_grams {
            row.low_threshold_grams = t;
        }
        if let Some(d) = patch.delivery_date {
            row.delivery_date = d;
        }
        Ok(Some(row.clone()))
    }

    async fn delete_ingredient(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.recipe_items.iter().any(|r| r.ingredient_id == id) {
            return Err(StoreError::InUse("ingredient".into()));
        }
        let before = tables.ingredients.len();
        tables.ingredients.retain(|i| i.id != id);
        Ok(tables.ingredients.len() < before)
    }

    async fn list_meals(&self) -> Result<Vec<MealWithRecipe>, StoreError> {
        let tables = self.tables.lock().await;
        let mut meals: Vec<MealWithRecipe> =
            tables.meals.iter().map(|m| tables.meal_with_recipe(m)).collect();
        meals.sort_by(|a, b| a.meal.name.cmp(&b.meal.name));
        Ok(meals)
    }

    async fn get_meal(&self, id: Uuid) -> Result<Option<MealWithRecipe>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .meals
            .iter()
            .find(|m| m.id == id)
            .map(|m| tables.meal_with_recipe(m)))
    }

    async fn create_meal(&self, new: NewMeal) -> Result<MealWithRecipe, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.meals.iter().any(|m| m.name == new.name) {
            return Err(StoreError::Duplicate(format!("meal '{}'", new.name)));
        }
        tables.check_recipe(&new.recipe)?;
        let meal = Meal {
            id: Uuid::new_v4(),
            name: new.name,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.meals.push(meal.clone());
        tables.push_recipe(meal.id, &new.recipe);
        Ok(tables.meal_with_recipe(&meal))
    }

    async fn update_meal(
        &self,
        id: Uuid,
        name: Option<String>,
        recipe: Option<Vec<NewRecipeItem>>,
    ) -> Result<Option<MealWithRecipe>, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.meals.iter().any(|m| m.id == id) {
            return Ok(None);
        }
        if let Some(name) = &name {
            if tables.meals.iter().any(|m| &m.name == name && m.id != id) {
                return Err(StoreError::Duplicate(format!("meal '{}'", name)));
            }
        }
        if let Some(items) = &recipe {
            tables.check_recipe(items)?;
        }
        if let Some(name) = name {
            if let Some(meal) = tables.meals.iter_mut().find(|m| m.id == id) {
                meal.name = name;
            }
        }
        if let Some(items) = recipe {
            tables.recipe_items.retain(|r| r.meal_id != id);
            tables.push_recipe(id, &items);
        }
        let meal = tables.meals.iter().find(|m| m.id == id).cloned();
        Ok(meal.map(|m| tables.meal_with_recipe(&m)))
    }

    async fn delete_meal(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.servings.iter().any(|s| s.meal_id == id) {
            return Err(StoreError::InUse("meal".into()));
        }
        let before = tables.meals.len();
        tables.meals.retain(|m| m.id != id);
        tables.recipe_items.retain(|r| r.meal_id != id);
        Ok(tables.meals.len() < before)
    }

    async fn list_recipe_items(
        &self,
        meal_id: Option<Uuid>,
        ingredient_id: Option<Uuid>,
    ) -> Result<Vec<RecipeItem>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .recipe_items
            .iter()
            .filter(|r| meal_id.map_or(true, |m| r.meal_id == m))
            .filter(|r| ingredient_id.map_or(true, |i| r.ingredient_id == i))
            .cloned()
            .collect())
    }

    async fn get_recipe_item(&self, id: Uuid) -> Result<Option<RecipeItem>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.recipe_items.iter().find(|r| r.id == id).cloned())
    }

    async fn add_recipe_items(
        &self,
        meal_id: Uuid,
        items: &[NewRecipeItem],
    ) -> Result<Option<Vec<RecipeItem>>, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.meals.iter().any(|m| m.id == meal_id) {
            return Ok(None);
        }
        tables.check_recipe(items)?;
        if let Some(taken) = items.iter().find(|item| {
            tables
                .recipe_items
                .iter()
                .any(|r| r.meal_id == meal_id && r.ingredient_id == item.ingredient_id)
        }) {
            return Err(StoreError::Duplicate(format!(
                "recipe item for ingredient {}",
                taken.ingredient_id
            )));
        }
        let start = tables.recipe_items.len();
        tables.push_recipe(meal_id, items);
        Ok(Some(tables.recipe_items[start..].to_vec()))
    }

    async fn update_recipe_item(
        &self,
        id: Uuid,
        amount_grams: i64,
    ) -> Result<Option<RecipeItem>, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.recipe_items.iter_mut().find(|r| r.id == id).map(|row| {
            row.amount_grams = amount_grams;
            row.clone()
        }))
    }

    async fn delete_recipe_item(&self, id: Uuid) -> Result<Option<RecipeItem>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(idx) = tables.recipe_items.iter().position(|r| r.id == id) else {
            return Ok(None);
        };
        Ok(Some(tables.recipe_items.remove(idx)))
    }

    async fn clear_recipe(&self, meal_id: Uuid) -> Result<Option<u64>, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.meals.iter().any(|m| m.id == meal_id) {
            return Ok(None);
        }
        let before = tables.recipe_items.len();
        tables.recipe_items.retain(|r| r.meal_id != meal_id);
        Ok(Some((before - tables.recipe_items.len()) as u64))
    }

    async fn list_servings(&self) -> Result<Vec<ServingLog>, StoreError> {
        self.history_guard()?;
        let tables = self.tables.lock().await;
        let mut rows = tables.servings.clone();
        rows.sort_by(|a, b| b.served_at.cmp(&a.served_at));
        Ok(rows)
    }

    async fn servings_between(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<ServingLog>, StoreError> {
        self.history_guard()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .servings
            .iter()
            .filter(|s| s.served_at >= from && s.served_at < to)
            .cloned()
            .collect())
    }

    async fn begin_serving(&self) -> Result<Box<dyn ServingTx>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        Ok(Box::new(MemoryServingTx {
            guard,
            deductions: HashMap::new(),
            logs: Vec::new(),
            injected_conflicts: self.injected_conflicts.clone(),
        }))
    }
}

/// Holds the table lock for its whole lifetime and stages writes until commit.
pub struct MemoryServingTx {
    guard: OwnedMutexGuard<Tables>,
    deductions: HashMap<Uuid, i64>,
    logs: Vec<ServingLog>,
    injected_conflicts: Arc<AtomicUsize>,
}

impl MemoryServingTx {
    fn staged_quantity(&self, ingredient: &Ingredient) -> i64 {
        ingredient.quantity_grams - self.deductions.get(&ingredient.id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ServingTx for MemoryServingTx {
    async fn load_meal(&mut self, meal_id: Uuid) -> Result<Option<MealWithRecipe>, StoreError> {
        Ok(self
            .guard
            .meals
            .iter()
            .find(|m| m.id == meal_id)
            .map(|m| self.guard.meal_with_recipe(m)))
    }

    async fn lock_ingredients(&mut self, ids: &[Uuid]) -> Result<Vec<Ingredient>, StoreError> {
        Ok(self
            .guard
            .ingredients
            .iter()
            .filter(|i| ids.contains(&i.id))
            .map(|i| Ingredient {
                quantity_grams: self.staged_quantity(i),
                ..i.clone()
            })
            .collect())
    }

    async fn deduct(&mut self, ingredient_id: Uuid, grams: i64) -> Result<i64, StoreError> {
        let Some(row) = self.guard.ingredients.iter().find(|i| i.id == ingredient_id) else {
            return Err(StoreError::Conflict);
        };
        let available = self.staged_quantity(row);
        if available < grams {
            return Err(StoreError::Conflict);
        }
        *self.deductions.entry(ingredient_id).or_insert(0) += grams;
        Ok(available - grams)
    }

    async fn insert_serving(&mut self, log: NewServingLog) -> Result<ServingLog, StoreError> {
        let row = ServingLog {
            id: Uuid::new_v4(),
            meal_id: log.meal_id,
            user_id: log.user_id,
            portions: log.portions,
            served_at: OffsetDateTime::now_utc(),
        };
        self.logs.push(row.clone());
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let injected = &self.injected_conflicts;
        if injected
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Conflict);
        }
        let MemoryServingTx {
            mut guard,
            deductions,
            logs,
            ..
        } = *self;
        for row in guard.ingredients.iter_mut() {
            if let Some(grams) = deductions.get(&row.id) {
                row.quantity_grams -= grams;
            }
        }
        guard.servings.extend(logs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (MemoryKitchenStore, Ingredient) {
        let store = MemoryKitchenStore::new();
        let flour = store
            .create_ingredient(NewIngredient {
                name: "Flour".into(),
                quantity_grams: 1000,
                low_threshold_grams: 100,
                delivery_date: None,
            })
            .await
            .expect("create ingredient");
        (store, flour)
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_stock_untouched() {
        let (store, flour) = seeded().await;
        {
            let mut tx = store.begin_serving().await.unwrap();
            let left = tx.deduct(flour.id, 400).await.unwrap();
            assert_eq!(left, 600);
            // dropped without commit
        }
        let row = store.get_ingredient(flour.id).await.unwrap().unwrap();
        assert_eq!(row.quantity_grams, 1000);
    }

    #[tokio::test]
    async fn committed_transaction_applies_deductions_and_logs() {
        let (store, flour) = seeded().await;
        let meal = store
            .create_meal(NewMeal {
                name: "Bread".into(),
                recipe: vec![NewRecipeItem { ingredient_id: flour.id, amount_grams: 200 }],
            })
            .await
            .unwrap();

        let mut tx = store.begin_serving().await.unwrap();
        tx.deduct(flour.id, 400).await.unwrap();
        tx.insert_serving(NewServingLog { meal_id: meal.meal.id, user_id: Uuid::new_v4(), portions: 2 })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let row = store.get_ingredient(flour.id).await.unwrap().unwrap();
        assert_eq!(row.quantity_grams, 600);
        assert_eq!(store.list_servings().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deduct_below_zero_is_a_conflict() {
        let (store, flour) = seeded().await;
        let mut tx = store.begin_serving().await.unwrap();
        tx.deduct(flour.id, 900).await.unwrap();
        let err = tx.deduct(flour.id, 200).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let (store, _) = seeded().await;
        let err = store
            .create_ingredient(NewIngredient {
                name: "Flour".into(),
                quantity_grams: 1,
                low_threshold_grams: 0,
                delivery_date: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn ingredient_used_by_recipe_cannot_be_deleted() {
        let (store, flour) = seeded().await;
        store
            .create_meal(NewMeal {
                name: "Bread".into(),
                recipe: vec![NewRecipeItem { ingredient_id: flour.id, amount_grams: 200 }],
            })
            .await
            .unwrap();
        let err = store.delete_ingredient(flour.id).await.unwrap_err();
        assert!(matches!(err, StoreError::InUse(_)));
    }

    #[tokio::test]
    async fn recipe_with_unknown_ingredient_reports_the_missing_id() {
        let (store, _) = seeded().await;
        let gone = Uuid::new_v4();
        let err = store
            .create_meal(NewMeal {
                name: "Bread".into(),
                recipe: vec![NewRecipeItem { ingredient_id: gone, amount_grams: 200 }],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingIngredient(id) if id == gone));
    }

    #[tokio::test]
    async fn added_items_append_and_reject_a_taken_ingredient() {
        let (store, flour) = seeded().await;
        let water = store
            .create_ingredient(NewIngredient {
                name: "Water".into(),
                quantity_grams: 5000,
                low_threshold_grams: 0,
                delivery_date: None,
            })
            .await
            .unwrap();
        let bread = store
            .create_meal(NewMeal {
                name: "Bread".into(),
                recipe: vec![NewRecipeItem { ingredient_id: flour.id, amount_grams: 200 }],
            })
            .await
            .unwrap();

        let added = store
            .add_recipe_items(
                bread.meal.id,
                &[NewRecipeItem { ingredient_id: water.id, amount_grams: 120 }],
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(added.len(), 1);
        let recipe = store.get_meal(bread.meal.id).await.unwrap().unwrap().recipe;
        assert_eq!(recipe.last(), added.first());

        let err = store
            .add_recipe_items(
                bread.meal.id,
                &[NewRecipeItem { ingredient_id: flour.id, amount_grams: 10 }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert!(store
            .add_recipe_items(Uuid::new_v4(), &[])
            .await
            .unwrap()
            .is_none());
    }
}
