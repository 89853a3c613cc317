//! Shared application state with explicit startup and teardown.
//!
//! Holds the configuration snapshot, the readings table (loaded once and
//! shared read-only), the optional database pool, and the shutdown token
//! that in-flight forecasts derive their cancellation from.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::store::{self, ReadingTable};
use crate::{schema, Config};

// ---

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Config,
    pub readings: Arc<ReadingTable>,
    pool: Option<PgPool>,
    shutdown: CancellationToken,
}

impl AppState {
    /// State over an already loaded table, without a database.
    pub fn new(config: Config, readings: ReadingTable) -> Self {
        Self {
            config,
            readings: Arc::new(readings),
            pool: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Connect to the database (if configured), ensure the schema, optionally
    /// seed it from the CSV, and load the readings table.
    ///
    /// An unreachable database is not fatal: the CSV fallback is used.
    pub async fn init(config: Config) -> Result<Self> {
        // ---
        let pool = match &config.db_url {
            Some(url) => connect(url, config.db_pool_max).await,
            None => {
                info!("DATABASE_URL not set, using CSV dataset only");
                None
            }
        };

        if let Some(pool) = &pool {
            schema::create_schema(pool).await?;
            if config.import_csv_on_empty {
                seed_from_csv(pool, &config).await?;
            }
        }

        let readings = store::load(&config, pool.as_ref()).await?;
        match readings.date_range() {
            Some((first, last)) => info!(
                "Readings table ready: {} rows, {} varieties, {} to {}",
                readings.len(),
                readings.varieties().len(),
                first,
                last
            ),
            None => warn!("Readings table is empty; forecasts will report no model"),
        }

        Ok(Self {
            config,
            readings: Arc::new(readings),
            pool,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token tripped on shutdown. Per-request tokens are children of it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel outstanding work and close the database pool.
    pub async fn shutdown(self) {
        // ---
        self.shutdown.cancel();
        if let Some(pool) = self.pool {
            pool.close().await;
            info!("Database pool closed");
        }
    }
}

async fn connect(url: &str, max_connections: u32) -> Option<PgPool> {
    // ---
    match PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
    {
        Ok(pool) => {
            info!("Successfully connected to database");
            Some(pool)
        }
        Err(e) => {
            warn!("Failed to connect to database, falling back to CSV: {}", e);
            None
        }
    }
}

async fn seed_from_csv(pool: &PgPool, config: &Config) -> Result<()> {
    // ---
    if store::count_readings(pool).await? > 0 {
        return Ok(());
    }
    if !Path::new(&config.readings_csv).exists() {
        warn!(
            "Database is empty and {} does not exist; nothing to import",
            config.readings_csv
        );
        return Ok(());
    }

    let table = store::read_csv(&config.readings_csv)?;
    store::import_readings(pool, &table).await?;
    Ok(())
}
