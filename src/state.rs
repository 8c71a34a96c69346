use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::clock::{Clock, SystemClock};
use crate::config::{AppConfig, StoreBackend};
use crate::store::{Bounded, MemoryStore, PgDocumentStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Connects the configured store. Failure here is fatal to startup.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let timeout = config.store.timeout();
        let users: Arc<dyn UserStore> = match config.store.backend {
            StoreBackend::Postgres => {
                let url = config
                    .store
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL not set")?;
                tracing::info!("connecting to document store");
                let pool = PgPoolOptions::new()
                    .max_connections(config.store.max_connections)
                    .acquire_timeout(timeout)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .context("run migrations")?;
                tracing::info!("connection established");
                Arc::new(Bounded::new(PgDocumentStore::new(pool), timeout))
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory store; sessions and users are lost on restart");
                Arc::new(Bounded::new(MemoryStore::new(), timeout))
            }
        };

        Ok(Self::from_parts(users, Arc::new(config), Arc::new(SystemClock)))
    }

    pub fn from_parts(
        users: Arc<dyn UserStore>,
        config: Arc<AppConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            config,
            clock,
        }
    }

    #[cfg(test)]
    pub fn fake(store: MemoryStore, clock: Arc<dyn Clock>) -> Self {
        let config = Arc::new(AppConfig::in_memory());
        let users = Arc::new(Bounded::new(store, config.store.timeout()));
        Self::from_parts(users, config, clock)
    }
}
