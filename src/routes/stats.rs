// src/routes/stats.rs
//! `GET /stats`: average conditions over the same filters as `/readings`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tracing::info;

use super::error_response;
use super::readings::ReadingsQuery;
use crate::AppState;

async fn get_stats(State(state): State<AppState>, Query(params): Query<ReadingsQuery>) -> Response {
    // ---
    let filter = match params.to_filter() {
        Ok(filter) => filter,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let summary = state.readings.summary(&filter);
    info!("GET /stats - {} readings summarized", summary.readings);
    (StatusCode::OK, Json(summary)).into_response()
}

pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(get_stats))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::config::create_test_config;
    use crate::routes::test_support::body_json;
    use crate::store::synthetic_table;
    use chrono::NaiveDate;

    fn call(params: ReadingsQuery) -> (StatusCode, serde_json::Value) {
        // ---
        let state = AppState::new(create_test_config(), synthetic_table(&["Albion", "Chandler"], 4));
        tokio_test::block_on(async {
            let response = get_stats(State(state), Query(params)).await;
            let status = response.status();
            (status, body_json(response).await)
        })
    }

    #[test]
    fn test_stats_for_one_variety() {
        // ---
        let (status, body) = call(ReadingsQuery {
            variety: Some("Albion".to_string()),
            time_of_day: Some("Morning".to_string()),
            ..Default::default()
        });

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["readings"], 4);
        // Albion mornings carry pH 0, 1, 2, 3.
        assert_eq!(body["ph"], 1.5);
    }

    #[test]
    fn test_stats_with_no_matching_rows() {
        // ---
        let (status, body) = call(ReadingsQuery {
            start: NaiveDate::from_ymd_opt(2030, 1, 1),
            ..Default::default()
        });

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["readings"], 0);
        assert!(body["ph"].is_null());
        assert!(body["water_temp_c"].is_null());
    }

    #[test]
    fn test_stats_rejects_bad_time_of_day() {
        // ---
        let (status, _) = call(ReadingsQuery {
            time_of_day: Some("Noon".to_string()),
            ..Default::default()
        });
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
