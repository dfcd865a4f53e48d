use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use super::{jobs, TaskKind};
use crate::state::AppState;

/// Re-runs both jobs every `every`, forever. The first run happens at once.
pub async fn run(state: AppState, every: Duration) {
    info!(every_secs = every.as_secs(), "scheduler started");
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        tick(&state).await;
    }
}

async fn tick(state: &AppState) {
    let store = state.store.as_ref();
    state
        .tasks
        .run(
            TaskKind::EstimateRecalculation,
            jobs::recalculate_estimates(store),
        )
        .await;
    state
        .tasks
        .run(
            TaskKind::MonthlyReport,
            jobs::generate_monthly_report(
                store,
                state.config.alerts.discrepancy_percent,
                None,
                OffsetDateTime::now_utc(),
            ),
        )
        .await;
}
