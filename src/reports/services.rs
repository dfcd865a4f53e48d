use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use time::{macros::format_description, Date, Month, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::dto::{MonthlySummaryReport, UsageItem};
use crate::error::{KitchenError, KitchenResult};
use crate::estimates::services::estimate_all;
use crate::store::KitchenStore;

lazy_static! {
    static ref MONTH_RE: Regex = Regex::new(r"^(\d{4})-(\d{2})$").unwrap();
}

/// Parses `YYYY-MM` into `(year, month)`.
pub fn parse_month(raw: &str) -> KitchenResult<(i32, u8)> {
    let invalid = || KitchenError::InvalidInput(format!("invalid month '{raw}', expected YYYY-MM"));
    let caps = MONTH_RE.captures(raw.trim()).ok_or_else(invalid)?;
    let year: i32 = caps[1].parse().map_err(|_| invalid())?;
    let month: u8 = caps[2].parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(KitchenError::InvalidInput(
            "month must be between 01 and 12".into(),
        ));
    }
    Ok((year, month))
}

pub fn parse_date(raw: &str) -> KitchenResult<Date> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| KitchenError::InvalidInput(format!("invalid date '{raw}', expected YYYY-MM-DD")))
}

/// `[first of month, first of next month)` in UTC.
pub fn month_bounds(year: i32, month: u8) -> KitchenResult<(OffsetDateTime, OffsetDateTime)> {
    let bad = |_| KitchenError::InvalidInput(format!("invalid month {year}-{month:02}"));
    let month = Month::try_from(month).map_err(bad)?;
    let start = Date::from_calendar_date(year, month, 1).map_err(bad)?;
    let (next_year, next_month) = match month {
        Month::December => (year + 1, Month::January),
        m => (year, m.next()),
    };
    let end = Date::from_calendar_date(next_year, next_month, 1).map_err(bad)?;
    Ok((
        start.midnight().assume_utc(),
        end.midnight().assume_utc(),
    ))
}

/// The calendar month before the one containing `date`.
pub fn previous_month(date: Date) -> (i32, u8) {
    match date.month() {
        Month::January => (date.year() - 1, 12),
        m => (date.year(), u8::from(m.previous())),
    }
}

/// `(possible - served) / possible` as a percentage rounded to one decimal,
/// ties to even.
pub fn discrepancy_rate(possible: i64, served: i64) -> f64 {
    if possible > 0 {
        let rate = (possible - served) as f64 / possible as f64 * 100.0;
        (rate * 10.0).round_ties_even() / 10.0
    } else if served == 0 {
        0.0
    } else {
        100.0
    }
}

/// Grams of each ingredient used by servings between `start` and `end`, both
/// days inclusive. Usage is derived from each meal's current recipe.
pub async fn ingredient_usage(
    store: &dyn KitchenStore,
    start: Date,
    end: Date,
) -> KitchenResult<Vec<UsageItem>> {
    if start > end {
        return Err(KitchenError::InvalidInput(
            "start date cannot be after end date".into(),
        ));
    }
    let until = end
        .next_day()
        .ok_or_else(|| KitchenError::InvalidInput("end date out of range".into()))?;
    let servings = store
        .servings_between(start.midnight().assume_utc(), until.midnight().assume_utc())
        .await?;

    let recipes: HashMap<Uuid, _> = store
        .list_meals()
        .await?
        .into_iter()
        .map(|m| (m.meal.id, m.recipe))
        .collect();

    let mut used: HashMap<Uuid, i64> = HashMap::new();
    for serving in &servings {
        let Some(recipe) = recipes.get(&serving.meal_id) else {
            continue;
        };
        for item in recipe {
            let grams = item.amount_grams.saturating_mul(serving.portions);
            let total = used.entry(item.ingredient_id).or_insert(0);
            *total = total.saturating_add(grams);
        }
    }

    let ingredients = store.list_ingredients(None).await?;
    debug!(servings = servings.len(), ingredients = ingredients.len(), "usage aggregated");
    Ok(ingredients
        .into_iter()
        .map(|i| UsageItem {
            used_grams: used.get(&i.id).copied().unwrap_or(0),
            ingredient_id: i.id,
            ingredient_name: i.name,
            delivered_grams: 0,
        })
        .collect())
}

/// Portions served during the month against what current stock could make.
pub async fn monthly_summary(
    store: &dyn KitchenStore,
    year: i32,
    month: u8,
) -> KitchenResult<MonthlySummaryReport> {
    let (from, to) = month_bounds(year, month)?;
    let portions_served: i64 = store
        .servings_between(from, to)
        .await?
        .iter()
        .map(|s| s.portions)
        .sum();
    let portions_possible: i64 = estimate_all(store)
        .await?
        .iter()
        .map(|e| e.max_portions_possible)
        .sum();

    Ok(MonthlySummaryReport {
        portions_served,
        portions_possible,
        discrepancy_rate: discrepancy_rate(portions_possible, portions_served),
    })
}
