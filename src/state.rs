use deadpool_postgres::Pool;
use crate::config::Config;
use crate::error::Result;
use crate::services::storage::AssetStorage;

/// The application's state.
///
/// Every field is a cheap, shareable handle; all cross-request state lives in
/// PostgreSQL.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: Pool,
    /// The application's configuration.
    pub config: Config,
    /// Per-asset blob storage on the local filesystem.
    pub storage: AssetStorage,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(config)?;
        tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");

        let storage = AssetStorage::new(config.data_dir.clone());
        tracing::info!("✅ Asset storage rooted at {}", config.data_dir.display());

        Ok(AppState {
            db,
            config: config.clone(),
            storage,
        })
    }
}
