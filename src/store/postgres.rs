use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, Executor, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::{
    Ingredient, IngredientPatch, KitchenStore, Meal, MealWithRecipe, NewIngredient, NewMeal,
    NewRecipeItem, NewServingLog, RecipeItem, ServingLog, ServingTx, StoreError,
};

const INGREDIENT_COLS: &str = "id, name, quantity_grams, low_threshold_grams, delivery_date";

#[derive(Clone)]
pub struct PgKitchenStore {
    db: PgPool,
}

impl PgKitchenStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }
}

/// Maps driver errors onto the store taxonomy. Serialization failures and
/// deadlocks are reported as `Conflict` so the serving engine can retry them.
fn classify(e: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            Some("40001") | Some("40P01") => return StoreError::Conflict,
            Some("23505") => return StoreError::Duplicate(what.to_string()),
            Some("23503") => return StoreError::InUse(what.to_string()),
            _ => {}
        }
    }
    StoreError::Backend(anyhow::Error::new(e).context(what.to_string()))
}

async fn fetch_recipes<'e, E>(exec: E, meal_ids: &[Uuid]) -> Result<Vec<RecipeItem>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, RecipeItem>(
        r#"
        SELECT id, meal_id, ingredient_id, amount_grams
          FROM recipe_items
         WHERE meal_id = ANY($1)
         ORDER BY meal_id, position
        "#,
    )
    .bind(meal_ids.to_vec())
    .fetch_all(exec)
    .await
}

fn attach_recipes(meals: Vec<Meal>, items: Vec<RecipeItem>) -> Vec<MealWithRecipe> {
    let mut by_meal: HashMap<Uuid, Vec<RecipeItem>> = HashMap::new();
    for item in items {
        by_meal.entry(item.meal_id).or_default().push(item);
    }
    meals
        .into_iter()
        .map(|meal| {
            let recipe = by_meal.remove(&meal.id).unwrap_or_default();
            MealWithRecipe { meal, recipe }
        })
        .collect()
}

/// A foreign-key failure on a recipe insert can only be the ingredient: the
/// meal row is created or locked by the same transaction.
fn classify_recipe_insert(e: sqlx::Error, ingredient_id: Uuid) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23503") {
            return StoreError::MissingIngredient(ingredient_id);
        }
    }
    classify(e, "recipe item")
}

async fn lock_meal(
    tx: &mut Transaction<'static, Postgres>,
    meal_id: Uuid,
) -> Result<bool, StoreError> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM meals WHERE id = $1 FOR UPDATE")
        .bind(meal_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| classify(e, "lock meal"))?;
    Ok(row.is_some())
}

/// Locks the meal owning a recipe item, so a running serve never sees a
/// half-edited recipe. `false` when the item does not exist.
async fn lock_item_meal(
    tx: &mut Transaction<'static, Postgres>,
    item_id: Uuid,
) -> Result<bool, StoreError> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT m.id
          FROM meals m
          JOIN recipe_items r ON r.meal_id = m.id
         WHERE r.id = $1
           FOR UPDATE OF m
        "#,
    )
    .bind(item_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| classify(e, "lock meal"))?;
    Ok(row.is_some())
}

async fn insert_recipe(
    tx: &mut Transaction<'static, Postgres>,
    meal_id: Uuid,
    first_position: i32,
    recipe: &[NewRecipeItem],
) -> Result<Vec<RecipeItem>, StoreError> {
    let mut rows = Vec::with_capacity(recipe.len());
    for (offset, item) in recipe.iter().enumerate() {
        let row = sqlx::query_as::<_, RecipeItem>(
            r#"
            INSERT INTO recipe_items (id, meal_id, ingredient_id, amount_grams, position)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, meal_id, ingredient_id, amount_grams
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(meal_id)
        .bind(item.ingredient_id)
        .bind(item.amount_grams)
        .bind(first_position + offset as i32)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| classify_recipe_insert(e, item.ingredient_id))?;
        rows.push(row);
    }
    Ok(rows)
}

#[async_trait]
impl KitchenStore for PgKitchenStore {
    async fn list_ingredients(&self, search: Option<&str>) -> Result<Vec<Ingredient>, StoreError> {
        let pattern = search.map(|s| format!("%{}%", s));
        sqlx::query_as::<_, Ingredient>(&format!(
            "SELECT {INGREDIENT_COLS} FROM ingredients \
             WHERE $1::text IS NULL OR name ILIKE $1 \
             ORDER BY name"
        ))
        .bind(pattern)
        .fetch_all(&self.db)
        .await
        .map_err(|e| classify(e, "list ingredients"))
    }

    async fn get_ingredient(&self, id: Uuid) -> Result<Option<Ingredient>, StoreError> {
        sqlx::query_as::<_, Ingredient>(&format!(
            "SELECT {INGREDIENT_COLS} FROM ingredients WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| classify(e, "get ingredient"))
    }

    async fn create_ingredient(&self, new: NewIngredient) -> Result<Ingredient, StoreError> {
        sqlx::query_as::<_, Ingredient>(&format!(
            "INSERT INTO ingredients (id, name, quantity_grams, low_threshold_grams, delivery_date) \
             VALUES ($1, $2, $3, $4, COALESCE($5, now())) \
             RETURNING {INGREDIENT_COLS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(new.quantity_grams)
        .bind(new.low_threshold_grams)
        .bind(new.delivery_date)
        .fetch_one(&self.db)
        .await
        .map_err(|e| classify(e, &format!("ingredient '{}'", new.name)))
    }

    async fn update_ingredient(
        &self,
        id: Uuid,
        patch: IngredientPatch,
    ) -> Result<Option<Ingredient>, StoreError> {
        sqlx::query_as::<_, Ingredient>(&format!(
            "UPDATE ingredients SET \
                 name = COALESCE($2, name), \
                 quantity_grams = COALESCE($3, quantity_grams), \
                 low_threshold_grams = COALESCE($4, low_threshold_grams), \
                 delivery_date = COALESCE($5, delivery_date) \
             WHERE id = $1 \
             RETURNING {INGREDIENT_COLS}"
        ))
        .bind(id)
        .bind(patch.name.as_deref())
        .bind(patch.quantity_grams)
        .bind(patch.low_threshold_grams)
        .bind(patch.delivery_date)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| classify(e, "ingredient name"))
    }

    async fn delete_ingredient(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM ingredients WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| classify(e, "ingredient"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_meals(&self) -> Result<Vec<MealWithRecipe>, StoreError> {
        let meals = sqlx::query_as::<_, Meal>(
            "SELECT id, name, created_at FROM meals ORDER BY name",
        )
        .fetch_all(&self.db)
        .await
        .map_err(|e| classify(e, "list meals"))?;
        let ids: Vec<Uuid> = meals.iter().map(|m| m.id).collect();
        let items = fetch_recipes(&self.db, &ids)
            .await
            .map_err(|e| classify(e, "list recipes"))?;
        Ok(attach_recipes(meals, items))
    }

    async fn get_meal(&self, id: Uuid) -> Result<Option<MealWithRecipe>, StoreError> {
        let Some(meal) = sqlx::query_as::<_, Meal>(
            "SELECT id, name, created_at FROM meals WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| classify(e, "get meal"))?
        else {
            return Ok(None);
        };
        let recipe = fetch_recipes(&self.db, &[id])
            .await
            .map_err(|e| classify(e, "get recipe"))?;
        Ok(Some(MealWithRecipe { meal, recipe }))
    }

    async fn create_meal(&self, new: NewMeal) -> Result<MealWithRecipe, StoreError> {
        let mut tx = self.db.begin().await.map_err(|e| classify(e, "begin tx"))?;
        let meal = sqlx::query_as::<_, Meal>(
            r#"
            INSERT INTO meals (id, name)
            VALUES ($1, $2)
            RETURNING id, name, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| classify(e, &format!("meal '{}'", new.name)))?;

        let recipe = insert_recipe(&mut tx, meal.id, 0, &new.recipe).await?;
        tx.commit().await.map_err(|e| classify(e, "commit tx"))?;
        Ok(MealWithRecipe { meal, recipe })
    }

    async fn update_meal(
        &self,
        id: Uuid,
        name: Option<String>,
        recipe: Option<Vec<NewRecipeItem>>,
    ) -> Result<Option<MealWithRecipe>, StoreError> {
        let mut tx = self.db.begin().await.map_err(|e| classify(e, "begin tx"))?;
        let Some(mut meal) = sqlx::query_as::<_, Meal>(
            "SELECT id, name, created_at FROM meals WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| classify(e, "lock meal"))?
        else {
            return Ok(None);
        };

        if let Some(name) = name {
            meal = sqlx::query_as::<_, Meal>(
                "UPDATE meals SET name = $2 WHERE id = $1 RETURNING id, name, created_at",
            )
            .bind(id)
            .bind(&name)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify(e, &format!("meal '{}'", name)))?;
        }

        if let Some(items) = recipe {
            sqlx::query("DELETE FROM recipe_items WHERE meal_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| classify(e, "clear recipe"))?;
            insert_recipe(&mut tx, id, 0, &items).await?;
        }

        let recipe = fetch_recipes(&mut *tx, &[id])
            .await
            .map_err(|e| classify(e, "get recipe"))?;
        tx.commit().await.map_err(|e| classify(e, "commit tx"))?;
        Ok(Some(MealWithRecipe { meal, recipe }))
    }

    async fn delete_meal(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM meals WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| classify(e, "meal"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_recipe_items(
        &self,
        meal_id: Option<Uuid>,
        ingredient_id: Option<Uuid>,
    ) -> Result<Vec<RecipeItem>, StoreError> {
        sqlx::query_as::<_, RecipeItem>(
            r#"
            SELECT id, meal_id, ingredient_id, amount_grams
              FROM recipe_items
             WHERE ($1::uuid IS NULL OR meal_id = $1)
               AND ($2::uuid IS NULL OR ingredient_id = $2)
             ORDER BY meal_id, position
            "#,
        )
        .bind(meal_id)
        .bind(ingredient_id)
        .fetch_all(&self.db)
        .await
        .map_err(|e| classify(e, "list recipe items"))
    }

    async fn get_recipe_item(&self, id: Uuid) -> Result<Option<RecipeItem>, StoreError> {
        sqlx::query_as::<_, RecipeItem>(
            "SELECT id, meal_id, ingredient_id, amount_grams FROM recipe_items WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| classify(e, "get recipe item"))
    }

    async fn add_recipe_items(
        &self,
        meal_id: Uuid,
        items: &[NewRecipeItem],
    ) -> Result<Option<Vec<RecipeItem>>, StoreError> {
        let mut tx = self.db.begin().await.map_err(|e| classify(e, "begin tx"))?;
        if !lock_meal(&mut tx, meal_id).await? {
            return Ok(None);
        }
        let (next,): (i32,) = sqlx::query_as(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM recipe_items WHERE meal_id = $1",
        )
        .bind(meal_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| classify(e, "next recipe position"))?;

        let added = insert_recipe(&mut tx, meal_id, next, items).await?;
        tx.commit().await.map_err(|e| classify(e, "commit tx"))?;
        Ok(Some(added))
    }

    async fn update_recipe_item(
        &self,
        id: Uuid,
        amount_grams: i64,
    ) -> Result<Option<RecipeItem>, StoreError> {
        let mut tx = self.db.begin().await.map_err(|e| classify(e, "begin tx"))?;
        if !lock_item_meal(&mut tx, id).await? {
            return Ok(None);
        }
        let row = sqlx::query_as::<_, RecipeItem>(
            r#"
            UPDATE recipe_items SET amount_grams = $2
             WHERE id = $1
            RETURNING id, meal_id, ingredient_id, amount_grams
            "#,
        )
        .bind(id)
        .bind(amount_grams)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| classify(e, "update recipe item"))?;
        tx.commit().await.map_err(|e| classify(e, "commit tx"))?;
        Ok(row)
    }

    async fn delete_recipe_item(&self, id: Uuid) -> Result<Option<RecipeItem>, StoreError> {
        let mut tx = self.db.begin().await.map_err(|e| classify(e, "begin tx"))?;
        if !lock_item_meal(&mut tx, id).await? {
            return Ok(None);
        }
        let row = sqlx::query_as::<_, RecipeItem>(
            "DELETE FROM recipe_items WHERE id = $1 RETURNING id, meal_id, ingredient_id, amount_grams",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| classify(e, "delete recipe item"))?;
        tx.commit().await.map_err(|e| classify(e, "commit tx"))?;
        Ok(row)
    }

    async fn clear_recipe(&self, meal_id: Uuid) -> Result<Option<u64>, StoreError> {
        let mut tx = self.db.begin().await.map_err(|e| classify(e, "begin tx"))?;
        if !lock_meal(&mut tx, meal_id).await? {
            return Ok(None);
        }
        let res = sqlx::query("DELETE FROM recipe_items WHERE meal_id = $1")
            .bind(meal_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify(e, "clear recipe"))?;
        tx.commit().await.map_err(|e| classify(e, "commit tx"))?;
        Ok(Some(res.rows_affected()))
    }

    async fn list_servings(&self) -> Result<Vec<ServingLog>, StoreError> {
        sqlx::query_as::<_, ServingLog>(
            r#"
            SELECT id, meal_id, user_id, portions, served_at
              FROM serving_logs
             ORDER BY served_at DESC
            "#,
        )
        .fetch_all(&self.db)
        .await
        .map_err(|e| classify(e, "list servings"))
    }

    async fn servings_between(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<ServingLog>, StoreError> {
        sqlx::query_as::<_, ServingLog>(
            r#"
            SELECT id, meal_id, user_id, portions, served_at
              FROM serving_logs
             WHERE served_at >= $1 AND served_at < $2
             ORDER BY served_at
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.db)
        .await
        .map_err(|e| classify(e, "servings in period"))
    }

    async fn begin_serving(&self) -> Result<Box<dyn ServingTx>, StoreError> {
        let tx = self.db.begin().await.map_err(|e| classify(e, "begin tx"))?;
        Ok(Box::new(PgServingTx { tx }))
    }
}

pub struct PgServingTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ServingTx for PgServingTx {
    async fn load_meal(&mut self, meal_id: Uuid) -> Result<Option<MealWithRecipe>, StoreError> {
        // FOR SHARE keeps a concurrent recipe edit out until this serve finishes
        let Some(meal) = sqlx::query_as::<_, Meal>(
            "SELECT id, name, created_at FROM meals WHERE id = $1 FOR SHARE",
        )
        .bind(meal_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| classify(e, "load meal"))?
        else {
            return Ok(None);
        };
        let recipe = fetch_recipes(&mut *self.tx, &[meal_id])
            .await
            .map_err(|e| classify(e, "load recipe"))?;
        Ok(Some(MealWithRecipe { meal, recipe }))
    }

    async fn lock_ingredients(&mut self, ids: &[Uuid]) -> Result<Vec<Ingredient>, StoreError> {
        // stable lock order so overlapping serves cannot deadlock
        let mut sorted = ids.to_vec();
        sorted.sort();
        sorted.dedup();
        let requested = sorted.len();
        let rows = sqlx::query_as::<_, Ingredient>(&format!(
            "SELECT {INGREDIENT_COLS} FROM ingredients WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(sorted)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| classify(e, "lock ingredients"))?;
        debug!(requested, locked = rows.len(), "ingredient rows locked");
        Ok(rows)
    }

    async fn deduct(&mut self, ingredient_id: Uuid, grams: i64) -> Result<i64, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE ingredients
               SET quantity_grams = quantity_grams - $2
             WHERE id = $1 AND quantity_grams >= $2
            RETURNING quantity_grams
            "#,
        )
        .bind(ingredient_id)
        .bind(grams)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| classify(e, "deduct stock"))?;
        row.map(|(q,)| q).ok_or(StoreError::Conflict)
    }

    async fn insert_serving(&mut self, log: NewServingLog) -> Result<ServingLog, StoreError> {
        sqlx::query_as::<_, ServingLog>(
            r#"
            INSERT INTO serving_logs (id, meal_id, user_id, portions)
            VALUES ($1, $2, $3, $4)
            RETURNING id, meal_id, user_id, portions, served_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(log.meal_id)
        .bind(log.user_id)
        .bind(log.portions)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| classify(e, "insert serving log"))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(|e| classify(e, "commit serving"))
    }
}
