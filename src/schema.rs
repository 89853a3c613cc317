//! Database schema management for `aquamind-forecast`.
//!
//! Ensures the readings table and its indexes exist before serving requests.
//! Applied once on startup from `AppState::init` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `strawberry_readings` table, unique on
/// `(date, variety, time_of_day)`. Safe to call on every startup; no-op if
/// objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // One row per variety, date and time of day
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS strawberry_readings (
            id            SERIAL PRIMARY KEY,
            date          DATE             NOT NULL,
            variety       VARCHAR(50)      NOT NULL,
            time_of_day   VARCHAR(20)      NOT NULL,
            ph            DOUBLE PRECISION NOT NULL,
            ec_ms_cm      DOUBLE PRECISION NOT NULL,
            humidity_pct  DOUBLE PRECISION NOT NULL,
            water_temp_c  DOUBLE PRECISION NOT NULL,
            air_temp_c    DOUBLE PRECISION NOT NULL,
            created_at    TIMESTAMPTZ      DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (date, variety, time_of_day)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Per-variety history lookups
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_strawberry_readings_variety_date
            ON strawberry_readings (variety, date);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
