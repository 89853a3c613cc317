//! Autoregressive forecasting of strawberry growing conditions.
//!
//! Gateway for the forecasting core. [`run`] builds lag features from the
//! reading table, trains a random forest for one parameter and rolls it
//! forward day by day, feeding each prediction back in as a lag.
//!
//! Everything here is synchronous CPU work; callers in async contexts should
//! move it onto a blocking thread.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span};
use uuid::Uuid;

use crate::store::ReadingTable;
use crate::{ForecastPoint, Metrics, Parameter, TimeOfDay};

mod engine;
mod error;
mod features;
mod preprocess;
mod trainer;

pub use error::{ForecastError, Result};
pub use trainer::{FeatureImportance, TrainedModel, TrainerOptions};

use engine::forecast;
use features::{feature_names, FeatureFrame};
use trainer::train;

// ---

/// What to forecast and how to train for it.
#[derive(Debug, Clone)]
pub struct ForecastRequest {
    pub target: Parameter,
    pub horizon: usize,
    pub options: TrainerOptions,
}

/// Serializable summary of one forecast run.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastReport {
    pub run_id: Uuid,
    pub target: Parameter,
    pub horizon: usize,
    pub metrics: Metrics,
    /// Model inputs before encoding.
    pub input_features: Vec<String>,
    /// Encoded columns seen by the regressor.
    pub feature_names: Vec<String>,
    pub feature_importances: Vec<FeatureImportance>,
    pub last_historical_date: Option<NaiveDate>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub points: Vec<ForecastPoint>,
}

/// The deployed model together with its report.
#[derive(Debug)]
pub struct ForecastRun {
    pub model: TrainedModel,
    pub report: ForecastReport,
}

impl ForecastReport {
    /// Points for one variety; `All` keeps every point.
    pub fn for_variety(&self, variety: &str) -> Vec<ForecastPoint> {
        self.points
            .iter()
            .filter(|p| variety.eq_ignore_ascii_case("all") || p.variety == variety)
            .cloned()
            .collect()
    }

    /// Mean prediction across varieties for each (date, time of day),
    /// labelled with the variety `All`.
    pub fn mean_by_date_and_time(&self) -> Vec<ForecastPoint> {
        // ---
        let mut sums: BTreeMap<(NaiveDate, TimeOfDay), (f64, usize)> = BTreeMap::new();
        for p in &self.points {
            let entry = sums.entry((p.date, p.time_of_day)).or_insert((0.0, 0));
            entry.0 += p.value;
            entry.1 += 1;
        }

        sums.into_iter()
            .map(|((date, time_of_day), (sum, count))| ForecastPoint {
                date,
                variety: "All".to_string(),
                time_of_day,
                value: sum / count as f64,
            })
            .collect()
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(ForecastError::Cancelled)
    } else {
        Ok(())
    }
}

/// Build features, train, and forecast `request.horizon` days ahead.
pub fn run(
    table: &ReadingTable,
    request: &ForecastRequest,
    cancel: &CancellationToken,
) -> Result<ForecastRun> {
    // ---
    let run_id = Uuid::new_v4();
    let span = info_span!("forecast", %run_id, target = %request.target);
    let _entered = span.enter();

    check_cancelled(cancel)?;
    let frame = FeatureFrame::build(table);
    info!(
        "Built {} feature rows from {} readings across {} groups",
        frame.len(),
        frame.source_rows(),
        frame.groups().len()
    );

    check_cancelled(cancel)?;
    let outcome = train(&frame, request.target, &request.options)?;

    check_cancelled(cancel)?;
    let points = forecast(&outcome.model, &frame, request.horizon, cancel)?;

    info!(
        "Forecast complete: {} points over {} days",
        points.len(),
        request.horizon
    );

    let report = ForecastReport {
        run_id,
        target: request.target,
        horizon: request.horizon,
        metrics: outcome.metrics,
        input_features: feature_names(request.target),
        feature_names: outcome.model.feature_names().to_vec(),
        feature_importances: outcome.model.feature_importances().to_vec(),
        last_historical_date: frame.last_date(),
        train_rows: outcome.train_rows,
        test_rows: outcome.test_rows,
        points,
    };

    Ok(ForecastRun {
        model: outcome.model,
        report,
    })
}
