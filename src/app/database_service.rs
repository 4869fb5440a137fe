//! The generic resource service.
//!
//! Owns the connection pool, the schema registry and the dispatcher. Construction
//! performs the first schema refresh; a schema error there is fatal, so a
//! `DatabaseService` that exists is always ready to serve requests.

use crate::app::dispatcher::TransactionalDispatcher;
use crate::domain::hooks::HookRegistry;
use crate::domain::schema::{SchemaRegistry, SchemaSnapshot};
use crate::infra::config::ServiceConfig;
use crate::transport::http::{create_router, AppState};
use anyhow::Context;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

pub struct DatabaseService {
    pool: PgPool,
    schema: Arc<SchemaRegistry>,
    dispatcher: Arc<TransactionalDispatcher>,
    base_path: String,
}

impl DatabaseService {
    /// Connects to the database described by `config` and loads the schema.
    pub async fn new(config: &ServiceConfig, hooks: HookRegistry) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .context("failed to connect to the database")?;
        Self::with_pool(pool, config, hooks).await
    }

    /// Like [`DatabaseService::new`] with an existing pool.
    pub async fn with_pool(
        pool: PgPool,
        config: &ServiceConfig,
        hooks: HookRegistry,
    ) -> anyhow::Result<Self> {
        let schema = Arc::new(SchemaRegistry::new(
            config.schema.clone(),
            config.naming.clone(),
        ));
        schema
            .refresh(&pool)
            .await
            .context("schema refresh failed")?;

        let dispatcher = Arc::new(
            TransactionalDispatcher::new(pool.clone(), schema.clone(), hooks)
                .with_default_page_size(config.default_page_size),
        );

        Ok(Self {
            pool,
            schema,
            dispatcher,
            base_path: config.base_path.clone(),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn dispatcher(&self) -> &Arc<TransactionalDispatcher> {
        &self.dispatcher
    }

    /// Re-reads the schema, e.g. after a migration. The old snapshot stays on failure.
    pub async fn refresh_schema(&self) -> anyhow::Result<Arc<SchemaSnapshot>> {
        Ok(self.schema.refresh(&self.pool).await?)
    }

    /// Swaps the hook registry for subsequent requests.
    pub async fn replace_hooks(&self, hooks: HookRegistry) {
        self.dispatcher.replace_hooks(hooks).await;
    }

    pub fn router(&self) -> Router {
        create_router(AppState::new(self.dispatcher.clone()), &self.base_path)
    }
}
