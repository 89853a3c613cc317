// src/routes/health.rs
//! API health check endpoint.
//!
//! Used by container orchestrators and CI to verify the service responds and
//! to see how many readings it loaded. It never touches the database; the
//! count comes from the in-memory table.

use axum::{extract::State, routing::get, Json, Router};
use chrono::NaiveDate;
use serde::Serialize;

use crate::AppState;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    readings: usize,
    first_date: Option<NaiveDate>,
    last_date: Option<NaiveDate>,
}

/// Handle `GET /health`.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    // ---
    let range = state.readings.date_range();
    Json(HealthResponse {
        status: "ok",
        readings: state.readings.len(),
        first_date: range.map(|(first, _)| first),
        last_date: range.map(|(_, last)| last),
    })
}

/// Create a subrouter containing the `/health` route.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::config::create_test_config;
    use crate::store::{synthetic_table, ReadingTable};

    #[test]
    fn test_health_reports_row_count() {
        // ---
        let state = AppState::new(create_test_config(), synthetic_table(&["Albion"], 3));
        let Json(body) = tokio_test::block_on(health(State(state)));
        assert_eq!(body.status, "ok");
        assert_eq!(body.readings, 6);
        assert_eq!(body.first_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(body.last_date, NaiveDate::from_ymd_opt(2024, 1, 3));
    }

    #[test]
    fn test_health_with_empty_table() {
        // ---
        let state = AppState::new(create_test_config(), ReadingTable::default());
        let Json(body) = tokio_test::block_on(health(State(state)));
        assert_eq!(body.readings, 0);
        assert!(body.last_date.is_none());
    }
}
