// src/routes/status.rs
//! `GET /status`: system status of the latest reading for each variety.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error_response;
use crate::status::{default_rules, evaluate, StatusReport};
use crate::{AppState, Reading, TimeOfDay};

#[derive(Debug, Default, Deserialize)]
struct StatusQuery {
    time_of_day: Option<String>,
}

#[derive(Serialize)]
struct VarietyStatus<'a> {
    reading: &'a Reading,
    #[serde(flatten)]
    report: StatusReport,
}

async fn get_status(State(state): State<AppState>, Query(params): Query<StatusQuery>) -> Response {
    // ---
    let time_of_day = match params.time_of_day.as_deref() {
        None => TimeOfDay::Evening,
        Some(raw) => match raw.parse::<TimeOfDay>() {
            Ok(t) => t,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        },
    };

    let rules = default_rules();
    let statuses: Vec<VarietyStatus> = state
        .readings
        .latest_per_variety(time_of_day)
        .into_iter()
        .map(|reading| VarietyStatus {
            reading,
            report: evaluate(reading, &rules),
        })
        .collect();

    info!("GET /status - {} varieties at {}", statuses.len(), time_of_day);
    (StatusCode::OK, Json(statuses)).into_response()
}

pub fn router() -> Router<AppState> {
    Router::new().route("/status", get(get_status))
}
