//! Forecast engine: recursive multi-step prediction per group.
//!
//! Each group carries a lag window seeded from its latest feature row. After
//! every prediction the window shifts: lag1 takes the new value, lag3 and
//! lag7 take the prediction made 3 and 7 steps back once that many exist,
//! and keep the historical carry-over until then. Lookback counts emission
//! steps, not calendar days.
//!
//! Groups never share state, so each group's day-by-day loop runs on its own
//! rayon worker; results are interleaved back into day-major order.

use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{ForecastPoint, GroupKey};

use super::error::{ForecastError, Result};
use super::features::{FeatureFrame, FeatureSample, LAGS};
use super::trainer::TrainedModel;

// ---

/// Rolling `[lag1, lag3, lag7]` for one group, plus its own emissions.
#[derive(Debug, Clone, PartialEq)]
pub struct LagWindow {
    lags: [f64; 3],
    history: Vec<f64>,
}

impl LagWindow {
    pub fn seed(lags: [f64; 3]) -> Self {
        Self {
            lags,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> [f64; 3] {
        self.lags
    }

    pub fn advance(&mut self, prediction: f64) {
        self.history.push(prediction);
        let n = self.history.len();
        for (slot, &lag) in LAGS.iter().enumerate() {
            if n >= lag {
                self.lags[slot] = self.history[n - lag];
            }
        }
    }
}

/// One emitted step with the features that produced it.
#[derive(Debug, Clone)]
struct ForecastStep {
    sample: FeatureSample,
    value: f64,
}

/// `horizon` consecutive days following `last`.
pub fn future_dates(last: NaiveDate, horizon: usize) -> Vec<NaiveDate> {
    (1..=horizon as i64)
        .map(|i| last + Duration::days(i))
        .collect()
}

/// Forecast `horizon` days past the frame's last date for every group.
///
/// Points come out day by day, with groups in frame order inside each day.
pub fn forecast(
    model: &TrainedModel,
    frame: &FeatureFrame,
    horizon: usize,
    cancel: &CancellationToken,
) -> Result<Vec<ForecastPoint>> {
    // ---
    let Some(last) = frame.last_date() else {
        return Ok(Vec::new());
    };
    let dates = future_dates(last, horizon);
    let target = model.target();

    let seeds: Vec<(&GroupKey, [f64; 3])> = frame
        .groups()
        .iter()
        .filter_map(|g| frame.latest_row(g).map(|row| (g, row.lags(target))))
        .collect();

    debug!(
        "Forecasting {} for {} groups over {} days from {}",
        target,
        seeds.len(),
        horizon,
        last
    );

    let per_group: Vec<Vec<ForecastStep>> = seeds
        .par_iter()
        .map(|(group, lags)| forecast_group(model, group, *lags, &dates, cancel))
        .collect::<Result<_>>()?;

    let mut points = Vec::with_capacity(dates.len() * seeds.len());
    for (day, date) in dates.iter().enumerate() {
        for ((group, _), steps) in seeds.iter().zip(&per_group) {
            points.push(ForecastPoint {
                date: *date,
                variety: group.variety.clone(),
                time_of_day: group.time_of_day,
                value: steps[day].value,
            });
        }
    }
    Ok(points)
}

fn forecast_group(
    model: &TrainedModel,
    group: &GroupKey,
    seed: [f64; 3],
    dates: &[NaiveDate],
    cancel: &CancellationToken,
) -> Result<Vec<ForecastStep>> {
    // ---
    let mut window = LagWindow::seed(seed);
    let mut steps = Vec::with_capacity(dates.len());

    for &date in dates {
        if cancel.is_cancelled() {
            return Err(ForecastError::Cancelled);
        }
        let sample = FeatureSample::new(date, group, window.current());
        let value = model.predict(&sample)?;
        window.advance(value);
        steps.push(ForecastStep { sample, value });
    }
    if let Some(last) = steps.last() {
        debug!("{}: last step used lags {:?}", group, last.sample.lags);
    }
    Ok(steps)
}
