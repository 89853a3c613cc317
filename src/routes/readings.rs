// src/routes/readings.rs
//! `GET /readings`: historical readings with optional filters.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use super::error_response;
use crate::store::ReadingFilter;
use crate::{AppState, Reading, TimeOfDay};

const DEFAULT_LIMIT: usize = 1000;

/// Query parameters accepted by `/readings` and `/stats`.
#[derive(Debug, Default, Deserialize)]
pub(super) struct ReadingsQuery {
    pub(super) variety: Option<String>,
    pub(super) start: Option<NaiveDate>,
    pub(super) end: Option<NaiveDate>,
    pub(super) time_of_day: Option<String>,
    pub(super) limit: Option<usize>,
}

impl ReadingsQuery {
    pub(super) fn to_filter(&self) -> Result<ReadingFilter, String> {
        // ---
        let time_of_day = self
            .time_of_day
            .as_deref()
            .map(str::parse::<TimeOfDay>)
            .transpose()
            .map_err(|e| e.to_string())?;

        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(format!("start ({}) is after end ({})", start, end));
            }
        }

        Ok(ReadingFilter {
            variety: self.variety.clone(),
            start: self.start,
            end: self.end,
            time_of_day,
        })
    }
}

async fn get_readings(
    State(state): State<AppState>,
    Query(params): Query<ReadingsQuery>,
) -> Response {
    // ---
    info!("GET /readings - {:?}", params);

    let filter = match params.to_filter() {
        Ok(filter) => filter,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);

    let rows: Vec<&Reading> = state
        .readings
        .filter(&filter)
        .into_iter()
        .take(limit)
        .collect();

    info!("Returning {} readings", rows.len());
    (StatusCode::OK, Json(rows)).into_response()
}

pub fn router() -> Router<AppState> {
    Router::new().route("/readings", get(get_readings))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::config::create_test_config;
    use crate::routes::test_support::body_json;
    use crate::store::synthetic_table;

    fn create_test_state() -> AppState {
        AppState::new(
            create_test_config(),
            synthetic_table(&["Albion", "Chandler"], 10),
        )
    }

    fn call(params: ReadingsQuery) -> Response {
        tokio_test::block_on(get_readings(State(create_test_state()), Query(params)))
    }

    #[test]
    fn test_filters_and_limit() {
        // ---
        let response = call(ReadingsQuery {
            variety: Some("Chandler".to_string()),
            time_of_day: Some("morning".to_string()),
            limit: Some(4),
            ..Default::default()
        });
        assert_eq!(response.status(), StatusCode::OK);

        let body = tokio_test::block_on(body_json(response));
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 4);
        for row in rows {
            assert_eq!(row["variety"], "Chandler");
            assert_eq!(row["time_of_day"], "Morning");
        }
    }

    #[test]
    fn test_default_returns_everything_under_limit() {
        // ---
        let body = tokio_test::block_on(body_json(call(ReadingsQuery::default())));
        assert_eq!(body.as_array().unwrap().len(), 40);
    }

    #[test]
    fn test_bad_time_of_day_is_rejected() {
        // ---
        let response = call(ReadingsQuery {
            time_of_day: Some("Noon".to_string()),
            ..Default::default()
        });
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_inverted_date_range_is_rejected() {
        // ---
        let response = call(ReadingsQuery {
            start: NaiveDate::from_ymd_opt(2024, 1, 5),
            end: NaiveDate::from_ymd_opt(2024, 1, 2),
            ..Default::default()
        });
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
