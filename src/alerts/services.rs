use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::dto::{Alert, AlertKind};
use crate::error::KitchenResult;
use crate::events::{EventPublisher, KitchenEvent};
use crate::reports::services::{monthly_summary, previous_month};
use crate::store::KitchenStore;

/// Low-stock alerts for every ingredient at or under its threshold, plus a
/// discrepancy alert when last month's rate exceeds `discrepancy_percent`.
///
/// Only listing ingredients can fail the call; a broken monthly summary just
/// drops the discrepancy check.
pub async fn active_alerts(
    store: &dyn KitchenStore,
    events: &dyn EventPublisher,
    discrepancy_percent: f64,
    now: OffsetDateTime,
) -> KitchenResult<Vec<Alert>> {
    let mut alerts = Vec::new();

    for ing in store.list_ingredients(None).await? {
        if !ing.is_low() {
            continue;
        }
        events.publish(KitchenEvent::LowStock {
            ingredient_id: ing.id,
            name: ing.name.clone(),
            quantity_grams: ing.quantity_grams,
            threshold: ing.low_threshold_grams,
        });
        alerts.push(Alert {
            id: format!("low_stock_{}", ing.id),
            kind: AlertKind::LowStock,
            message: format!(
                "Ingredient '{}' is low in stock ({}g remaining, threshold is {}g).",
                ing.name, ing.quantity_grams, ing.low_threshold_grams
            ),
            details: json!({
                "ingredient_id": ing.id,
                "ingredient_name": ing.name,
                "current_quantity": ing.quantity_grams,
                "threshold": ing.low_threshold_grams,
            }),
            created_at: now,
        });
    }

    let (year, month) = previous_month(now.date());
    match monthly_summary(store, year, month).await {
        Ok(summary) if summary.discrepancy_rate > discrepancy_percent => {
            alerts.push(Alert {
                id: format!("discrepancy_{year}_{month}"),
                kind: AlertKind::Discrepancy,
                message: format!(
                    "Monthly discrepancy for {year}-{month:02} is {}%, which is above the {}% threshold.",
                    summary.discrepancy_rate, discrepancy_percent
                ),
                details: json!({
                    "month": format!("{year}-{month:02}"),
                    "discrepancy_rate": summary.discrepancy_rate,
                    "portions_served": summary.portions_served,
                    "portions_possible": summary.portions_possible,
                }),
                created_at: now,
            });
        }
        Ok(summary) => {
            debug!(year, month, rate = summary.discrepancy_rate, "discrepancy within bounds");
        }
        Err(e) => {
            warn!(error = %e, year, month, "skipping discrepancy check");
        }
    }

    Ok(alerts)
}
