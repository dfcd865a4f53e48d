use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::error::KitchenResult;
use crate::estimates::services::estimate_all;
use crate::reports::services::{monthly_summary, previous_month};
use crate::store::KitchenStore;

/// Fresh estimate for every meal, as `{status, estimates, total_meals}`.
pub async fn recalculate_estimates(store: &dyn KitchenStore) -> KitchenResult<Value> {
    let estimates = estimate_all(store).await?;
    Ok(json!({
        "status": "success",
        "total_meals": estimates.len(),
        "estimates": estimates,
    }))
}

/// Monthly summary for `period`, or for the month before `now` when absent.
///
/// Carries an `alert` entry when the discrepancy exceeds `discrepancy_percent`.
pub async fn generate_monthly_report(
    store: &dyn KitchenStore,
    discrepancy_percent: f64,
    period: Option<(i32, u8)>,
    now: OffsetDateTime,
) -> KitchenResult<Value> {
    let (year, month) = period.unwrap_or_else(|| previous_month(now.date()));
    let summary = monthly_summary(store, year, month).await?;
    let report_period = format!("{year}-{month:02}");

    let mut result = json!({
        "status": "success",
        "report_period": report_period,
        "data": summary,
    });
    if summary.discrepancy_rate > discrepancy_percent {
        result["alert"] = json!({
            "type": "discrepancy",
            "message": format!(
                "Monthly discrepancy for {report_period} is {}%, which is above the {}% threshold.",
                summary.discrepancy_rate, discrepancy_percent
            ),
        });
    }
    Ok(result)
}
