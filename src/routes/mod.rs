use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;

use crate::AppState;

mod forecast;
mod health;
mod readings;
mod stats;
mod status;

// ---

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(readings::router())
        .merge(stats::router())
        .merge(status::router())
        .merge(forecast::router())
        .merge(health::router())
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// JSON error body shared by the sub-routers.
fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod test_support {
    // ---
    use axum::response::Response;
    use serde_json::Value;

    pub async fn body_json(response: Response) -> Value {
        // ---
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
