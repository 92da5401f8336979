use std::sync::Arc;

use axum::Router;
use buycar_agent::ConfigProviderFactory;
#[cfg(test)]
use buycar_core::config::LoadOptions;
use buycar_core::config::{AppConfig, ConfigError};
use buycar_db::{connect, migrations, DbPool, SqlConsultRepository};
use thiserror::Error;
use tracing::info;

use crate::lifecycle::ConsultLifecycle;
use crate::{consult, health};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub lifecycle: ConsultLifecycle,
}

impl Application {
    /// Consult API plus the health probe.
    pub fn router(&self) -> Router {
        consult::router(self.lifecycle.clone()).merge(health::router(self.db_pool.clone()))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

#[cfg(test)]
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    bootstrap_with_config(AppConfig::load(options)?).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let lifecycle = ConsultLifecycle::new(
        Arc::new(SqlConsultRepository::new(db_pool.clone())),
        Arc::new(ConfigProviderFactory::new(config.llm.clone())),
        &config.generation,
    );
    info!(
        event_name = "system.bootstrap.lifecycle_ready",
        llm_enabled = config.llm.enabled,
        llm_provider = %config.llm.provider,
        max_in_flight = config.generation.max_in_flight,
        "consult lifecycle wired"
    );

    Ok(Application { config, db_pool, lifecycle })
}
