use deadpool_postgres::{Config as PgConfig, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use crate::config::Config;
use crate::error::{AppError, Result};
use std::time::Duration;

/// Tables and indexes, applied idempotently at startup.
const SCHEMA: &str = include_str!("schema.sql");

/// Creates a new database connection pool.
///
/// No connection is opened here; the first checkout connects.
///
/// # Arguments
///
/// * `config` - The application's configuration.
///
/// # Returns
///
/// A `Result` containing the `Pool`.
pub fn create_pool(config: &Config) -> Result<Pool> {
    let mut cfg = PgConfig::new();
    cfg.host = Some(config.db_host.clone());
    cfg.port = Some(config.db_port);
    cfg.user = Some(config.db_user.clone());
    cfg.password = config.db_password.as_ref().map(|p| p.as_str().to_owned());
    cfg.dbname = Some(config.db_name.clone());

    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    cfg.pool = Some(PoolConfig {
        max_size: 100,
        timeouts: deadpool_postgres::Timeouts {
            wait: Some(Duration::from_secs(5)),
            create: Some(Duration::from_secs(2)),
            recycle: Some(Duration::from_secs(1)),
        },
        ..Default::default()
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(AppError::from)
}

/// Applies the schema. Safe to run on every boot.
pub async fn migrate(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;
    client.batch_execute(SCHEMA).await?;
    tracing::info!("✅ Database schema is up to date");
    Ok(())
}
