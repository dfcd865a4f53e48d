use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageItem {
    pub ingredient_id: Uuid,
    pub ingredient_name: String,
    /// Always 0: stock is a running total and deliveries are not logged per period.
    pub delivered_grams: i64,
    pub used_grams: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummaryReport {
    pub portions_served: i64,
    pub portions_possible: i64,
    /// Percent, one decimal place. Negative when more was served than is now possible.
    pub discrepancy_rate: f64,
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub month: String,
}
