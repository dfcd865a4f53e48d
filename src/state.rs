use crate::config::AppConfig;
use crate::events::BroadcastPublisher;
use crate::store::{postgres::PgKitchenStore, KitchenStore};
use crate::tasks::TaskRegistry;
use anyhow::Context;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KitchenStore>,
    pub events: Arc<BroadcastPublisher>,
    pub config: Arc<AppConfig>,
    pub tasks: TaskRegistry,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let pg = PgKitchenStore::connect(&config.database_url, config.db_max_connections).await?;
        sqlx::migrate!("./migrations")
            .run(pg.pool())
            .await
            .context("run migrations")?;

        let store = Arc::new(pg) as Arc<dyn KitchenStore>;
        Ok(Self::from_parts(store, config))
    }

    pub fn from_parts(store: Arc<dyn KitchenStore>, config: Arc<AppConfig>) -> Self {
        let events = Arc::new(BroadcastPublisher::new(config.event_channel_capacity));
        Self {
            store,
            events,
            config,
            tasks: TaskRegistry::default(),
        }
    }

    /// In-memory state for tests; no database involved.
    #[cfg(test)]
    pub fn fake() -> Self {
        let store = Arc::new(crate::store::memory::MemoryKitchenStore::new()) as Arc<dyn KitchenStore>;
        Self::from_parts(store, Arc::new(AppConfig::test()))
    }
}
