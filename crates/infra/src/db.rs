use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::LedgerConfig;

/// Open a Postgres pool sized from `config`.
pub async fn init_pool(database_url: &str, config: &LedgerConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(0)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await
}
