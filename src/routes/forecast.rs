// src/routes/forecast.rs
//! `GET /forecast`: train on the loaded readings and roll a forecast forward.
//!
//! Training is CPU bound, so the run happens on a blocking thread. Each
//! request carries a child of the shutdown token; dropping the request
//! (client gone, server stopping) cancels the run between steps.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::error_response;
use crate::forecast::{self, ForecastError, ForecastRequest};
use crate::{AppState, Parameter};

#[derive(Debug, Default, Deserialize)]
struct ForecastQuery {
    target: Option<String>,
    horizon: Option<usize>,
    variety: Option<String>,
}

/// Body returned when there is nothing to train on.
#[derive(Serialize)]
struct NoModelResponse {
    model: Option<()>,
    reason: String,
}

async fn get_forecast(
    State(state): State<AppState>,
    Query(params): Query<ForecastQuery>,
) -> Response {
    // ---
    info!("GET /forecast - {:?}", params);

    let target = match params.target.as_deref().unwrap_or("pH").parse::<Parameter>() {
        Ok(target) => target,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let max_horizon = state.config.forecast_max_horizon;
    let mut horizon = params.horizon.unwrap_or(state.config.forecast_horizon);
    if horizon > max_horizon {
        warn!("Horizon {} capped to {}", horizon, max_horizon);
        horizon = max_horizon;
    }

    let request = ForecastRequest {
        target,
        horizon,
        options: state.config.trainer_options(),
    };
    let readings = Arc::clone(&state.readings);
    let cancel = state.shutdown_token().child_token();
    let guard = cancel.clone().drop_guard();

    let joined =
        tokio::task::spawn_blocking(move || forecast::run(&readings, &request, &cancel)).await;
    guard.disarm();

    let run = match joined {
        Ok(Ok(run)) => run,
        Ok(Err(e)) => return forecast_error_response(e),
        Err(e) => {
            error!("Forecast task failed: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "forecast task failed");
        }
    };

    info!(
        "Model for {} trained on {} encoded features",
        run.model.target(),
        run.model.feature_names().len()
    );

    let mut report = run.report;
    match params.variety.as_deref() {
        Some(v) if v.eq_ignore_ascii_case("all") => report.points = report.mean_by_date_and_time(),
        Some(v) => report.points = report.for_variety(v),
        None => {}
    }

    (StatusCode::OK, Json(report)).into_response()
}

fn forecast_error_response(err: ForecastError) -> Response {
    // ---
    if err.is_no_model() {
        info!("No model: {}", err);
        let body = NoModelResponse {
            model: None,
            reason: err.to_string(),
        };
        return (StatusCode::OK, Json(body)).into_response();
    }

    match err {
        ForecastError::InsufficientData { .. } => {
            warn!("Forecast rejected: {}", err);
            error_response(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        ForecastError::Cancelled => {
            warn!("Forecast cancelled");
            error_response(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        ForecastError::EmptyInput | ForecastError::Model(_) => {
            error!("Forecast failed: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/forecast", get(get_forecast))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::config::create_test_config;
    use crate::routes::test_support::body_json;
    use crate::store::{synthetic_table, ReadingTable};
    use serde_json::Value;

    fn create_test_state(table: ReadingTable) -> AppState {
        AppState::new(create_test_config(), table)
    }

    fn call(state: AppState, params: ForecastQuery) -> (StatusCode, Value) {
        // ---
        tokio_test::block_on(async {
            let response = get_forecast(State(state), Query(params)).await;
            let status = response.status();
            (status, body_json(response).await)
        })
    }

    #[test]
    fn test_forecast_defaults() {
        // ---
        let state = create_test_state(synthetic_table(&["Albion", "Chandler"], 20));
        let (status, body) = call(state, ForecastQuery::default());

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["target"], "Ph");
        assert_eq!(body["horizon"], 5);
        // 5 days x 2 varieties x 2 times of day
        assert_eq!(body["points"].as_array().unwrap().len(), 20);
        assert_eq!(body["last_historical_date"], "2024-01-20");
        assert_eq!(body["points"][0]["date"], "2024-01-21");
    }

    #[test]
    fn test_horizon_is_capped() {
        // ---
        let state = create_test_state(synthetic_table(&["Albion"], 20));
        let params = ForecastQuery {
            target: Some("ec".to_string()),
            horizon: Some(1000),
            ..Default::default()
        };
        let (status, body) = call(state, params);

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["target"], "Ec");
        assert_eq!(body["horizon"], 10);
        assert_eq!(body["points"].as_array().unwrap().len(), 20);
    }

    #[test]
    fn test_variety_filter_and_mean() {
        // ---
        let table = synthetic_table(&["Albion", "Chandler"], 20);

        let one = ForecastQuery {
            variety: Some("Chandler".to_string()),
            ..Default::default()
        };
        let (_, body) = call(create_test_state(table.clone()), one);
        let points = body["points"].as_array().unwrap();
        assert_eq!(points.len(), 10);
        assert!(points.iter().all(|p| p["variety"] == "Chandler"));

        let all = ForecastQuery {
            variety: Some("All".to_string()),
            ..Default::default()
        };
        let (_, body) = call(create_test_state(table), all);
        let points = body["points"].as_array().unwrap();
        assert_eq!(points.len(), 10);
        assert!(points.iter().all(|p| p["variety"] == "All"));
    }

    #[test]
    fn test_empty_store_reports_no_model() {
        // ---
        let (status, body) = call(
            create_test_state(ReadingTable::default()),
            ForecastQuery::default(),
        );
        assert_eq!(status, StatusCode::OK);
        assert!(body["model"].is_null());
        assert_eq!(body["reason"], "no readings available to train on");
    }

    #[test]
    fn test_short_history_is_unprocessable() {
        // ---
        let (status, body) = call(
            create_test_state(synthetic_table(&["Albion"], 5)),
            ForecastQuery::default(),
        );
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("insufficient data"));
    }

    #[test]
    fn test_unknown_target_is_bad_request() {
        // ---
        let params = ForecastQuery {
            target: Some("nitrogen".to_string()),
            ..Default::default()
        };
        let (status, _) = call(create_test_state(ReadingTable::default()), params);
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_shutdown_cancels_forecast() {
        // ---
        let state = create_test_state(synthetic_table(&["Albion"], 20));
        state.shutdown_token().cancel();
        let (status, _) = call(state, ForecastQuery::default());
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_error_mapping() {
        // ---
        let response = forecast_error_response(ForecastError::Model("bad fit".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
