use std::time::Duration;

mod alerts;
mod app;
mod catalog;
mod config;
mod error;
mod estimates;
mod events;
mod recipe_items;
mod reports;
mod serving;
mod state;
mod store;
mod tasks;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "kinderkitchen=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;

    if let Some(secs) = app_state.config.scheduler_interval_secs {
        tokio::spawn(tasks::scheduler::run(
            app_state.clone(),
            Duration::from_secs(secs),
        ));
    } else {
        tracing::info!("scheduler disabled, jobs run on demand only");
    }

    let app = app::build_app(app_state);
    app::serve(app).await
}
