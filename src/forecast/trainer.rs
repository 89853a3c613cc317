//! Model trainer: preprocessing + random forest regression for one target.
//!
//! The model fitted on the 80% train split is the model that gets deployed;
//! the 20% held-out split only feeds the reported metrics.

use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use tracing::{debug, info};

use crate::{Metrics, Parameter};

use super::error::{ForecastError, Result};
use super::features::{FeatureFrame, FeatureSample};
use super::preprocess::Preprocessor;

// ---

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Fewest engineered rows that can be split into train and test.
pub const MIN_TRAINING_ROWS: usize = 2;

/// Rows scored per column when measuring permutation importance.
const IMPORTANCE_SAMPLE_LIMIT: usize = 2000;

/// Trainer settings. Defaults: 100 trees, seed 42, 20% held out.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerOptions {
    pub n_trees: usize,
    pub seed: u64,
    pub test_fraction: f64,
}

impl Default for TrainerOptions {
    fn default() -> Self {
        Self {
            n_trees: 100,
            seed: 42,
            test_fraction: 0.2,
        }
    }
}

/// Relative weight of one transformed feature column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub name: String,
    pub weight: f64,
}

/// A fitted preprocessing + regression pipeline for a single parameter.
///
/// Read-only after training, so it can be shared between threads.
pub struct TrainedModel {
    target: Parameter,
    preprocessor: Preprocessor,
    forest: Forest,
    importances: Vec<FeatureImportance>,
}

impl fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainedModel")
            .field("target", &self.target)
            .field("features", &self.preprocessor.output_names())
            .finish_non_exhaustive()
    }
}

impl TrainedModel {
    pub fn target(&self) -> Parameter {
        self.target
    }

    /// Transformed feature names, categorical levels expanded.
    pub fn feature_names(&self) -> &[String] {
        self.preprocessor.output_names()
    }

    pub fn predict(&self, sample: &FeatureSample) -> Result<f64> {
        let predictions = predict_rows(&self.forest, &[self.preprocessor.transform(sample)])?;
        predictions
            .first()
            .copied()
            .ok_or_else(|| ForecastError::Model("regressor returned no prediction".to_string()))
    }

    pub fn predict_batch(&self, samples: &[FeatureSample]) -> Result<Vec<f64>> {
        predict_rows(&self.forest, &self.preprocessor.transform_all(samples))
    }

    /// Importances sorted by weight, heaviest first.
    pub fn feature_importances(&self) -> &[FeatureImportance] {
        &self.importances
    }
}

/// Everything produced by one training run.
#[derive(Debug)]
pub struct TrainingOutcome {
    pub model: TrainedModel,
    pub metrics: Metrics,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Train a model for `target` on the frame.
///
/// Fails with [`ForecastError::EmptyInput`] when the frame was built from an
/// empty table, and with [`ForecastError::InsufficientData`] when fewer than
/// [`MIN_TRAINING_ROWS`] rows survived lag construction.
pub fn train(
    frame: &FeatureFrame,
    target: Parameter,
    options: &TrainerOptions,
) -> Result<TrainingOutcome> {
    // ---
    if frame.source_rows() == 0 {
        return Err(ForecastError::EmptyInput);
    }

    if frame.is_empty() {
        return Err(ForecastError::InsufficientData {
            needed: MIN_TRAINING_ROWS,
            got: 0,
        });
    }

    let (samples, targets) = frame.samples(target);
    if samples.len() < MIN_TRAINING_ROWS {
        return Err(ForecastError::InsufficientData {
            needed: MIN_TRAINING_ROWS,
            got: samples.len(),
        });
    }

    let (train_idx, test_idx) = train_test_split(samples.len(), options.test_fraction, options.seed);
    let pick_samples = |idx: &[usize]| idx.iter().map(|&i| samples[i].clone()).collect::<Vec<_>>();
    let pick_targets = |idx: &[usize]| idx.iter().map(|&i| targets[i]).collect::<Vec<_>>();

    let train_samples = pick_samples(&train_idx);
    let y_train = pick_targets(&train_idx);
    let test_samples = pick_samples(&test_idx);
    let y_test = pick_targets(&test_idx);

    let preprocessor = Preprocessor::fit(&train_samples, target);
    let x_train = preprocessor.transform_all(&train_samples);
    let n_features = preprocessor.output_names().len();

    info!(
        "Training RandomForest for {} with {} trees: {} train rows, {} test rows, {} features",
        target,
        options.n_trees,
        train_samples.len(),
        test_samples.len(),
        n_features
    );

    let params = RandomForestRegressorParameters::default()
        .with_n_trees(options.n_trees)
        .with_m(n_features)
        .with_seed(options.seed);
    let forest = Forest::fit(&DenseMatrix::from_2d_vec(&x_train)?, &y_train, params)?;

    let importances = permutation_importances(
        &forest,
        &x_train,
        &y_train,
        preprocessor.output_names(),
        options.seed,
    )?;
    if let Some(top) = importances.first() {
        debug!("Most important feature: {} ({:.3})", top.name, top.weight);
    }

    let model = TrainedModel {
        target,
        preprocessor,
        forest,
        importances,
    };

    let y_pred = model.predict_batch(&test_samples)?;
    let metrics = Metrics {
        r2: r2_score(&y_test, &y_pred),
        rmse: rmse(&y_test, &y_pred),
    };
    info!(
        "Model for {} trained: R2={:.3}, RMSE={:.3}",
        target, metrics.r2, metrics.rmse
    );

    Ok(TrainingOutcome {
        model,
        metrics,
        train_rows: train_idx.len(),
        test_rows: test_idx.len(),
    })
}

/// Seeded shuffle split into `(train, test)` row indices.
///
/// The test split holds `ceil(test_fraction * n)` rows, clamped so both
/// sides keep at least one row.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    // ---
    let n_test = ((test_fraction * n as f64).ceil() as usize).clamp(1, n.saturating_sub(1).max(1));

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test.min(n));
    (train, indices)
}

/// Coefficient of determination. NaN for fewer than two samples; for a
/// constant target, 1.0 on a perfect fit and 0.0 otherwise.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    // ---
    if actual.len() < 2 {
        return f64::NAN;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    mse(actual, predicted).sqrt()
}

fn mse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64
}

fn predict_rows(forest: &Forest, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let x = DenseMatrix::from_2d_vec(&rows.to_vec())?;
    Ok(forest.predict(&x)?)
}

/// Increase in squared error when a single column is shuffled, clipped at
/// zero and normalized to sum to one.
fn permutation_importances(
    forest: &Forest,
    rows: &[Vec<f64>],
    targets: &[f64],
    names: &[String],
    seed: u64,
) -> Result<Vec<FeatureImportance>> {
    // ---
    let mut rng = StdRng::seed_from_u64(seed);

    let mut picked: Vec<usize> = (0..rows.len()).collect();
    if picked.len() > IMPORTANCE_SAMPLE_LIMIT {
        picked.shuffle(&mut rng);
        picked.truncate(IMPORTANCE_SAMPLE_LIMIT);
    }
    let base: Vec<Vec<f64>> = picked.iter().map(|&i| rows[i].clone()).collect();
    let y: Vec<f64> = picked.iter().map(|&i| targets[i]).collect();
    let baseline = mse(&y, &predict_rows(forest, &base)?);

    let mut raw = Vec::with_capacity(names.len());
    for col in 0..names.len() {
        let mut column: Vec<f64> = base.iter().map(|r| r[col]).collect();
        column.shuffle(&mut rng);

        let permuted: Vec<Vec<f64>> = base
            .iter()
            .zip(&column)
            .map(|(row, v)| {
                let mut row = row.clone();
                row[col] = *v;
                row
            })
            .collect();
        let score = mse(&y, &predict_rows(forest, &permuted)?);
        raw.push((score - baseline).max(0.0));
    }

    let total: f64 = raw.iter().sum();
    let mut importances: Vec<FeatureImportance> = names
        .iter()
        .zip(raw)
        .map(|(name, w)| FeatureImportance {
            name: name.clone(),
            weight: if total > 0.0 { w / total } else { 0.0 },
        })
        .collect();
    importances.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    Ok(importances)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::store::{synthetic_table, ReadingTable};
    use crate::{GroupKey, TimeOfDay};
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    fn quick_options() -> TrainerOptions {
        TrainerOptions {
            n_trees: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_table_is_empty_input() {
        // ---
        let frame = FeatureFrame::build(&ReadingTable::default());
        let err = train(&frame, Parameter::Ph, &quick_options()).unwrap_err();
        assert_eq!(err, ForecastError::EmptyInput);
    }

    #[test]
    fn test_short_history_is_insufficient_data() {
        // ---
        let frame = FeatureFrame::build(&synthetic_table(&["Albion", "Chandler"], 5));
        let err = train(&frame, Parameter::Ph, &quick_options()).unwrap_err();
        assert_eq!(err, ForecastError::InsufficientData { needed: 2, got: 0 });
    }

    #[test]
    fn test_split_sizes() {
        // ---
        let (train, test) = train_test_split(52, 0.2, 42);
        assert_eq!(test.len(), 11);
        assert_eq!(train.len(), 41);

        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..52).collect::<Vec<_>>());

        let (train, test) = train_test_split(2, 0.2, 42);
        assert_eq!((train.len(), test.len()), (1, 1));

        assert_eq!(train_test_split(52, 0.2, 42), train_test_split(52, 0.2, 42));
    }

    #[test]
    fn test_training_is_reproducible() {
        // ---
        let frame = FeatureFrame::build(&synthetic_table(&["Albion", "Chandler"], 20));
        let a = train(&frame, Parameter::Ph, &quick_options()).unwrap();
        let b = train(&frame, Parameter::Ph, &quick_options()).unwrap();

        assert_eq!(a.metrics.r2.to_bits(), b.metrics.r2.to_bits());
        assert_eq!(a.metrics.rmse.to_bits(), b.metrics.rmse.to_bits());
        assert_eq!((a.train_rows, a.test_rows), (41, 11));

        let (samples, _) = frame.samples(Parameter::Ph);
        let pa = a.model.predict_batch(&samples).unwrap();
        let pb = b.model.predict_batch(&samples).unwrap();
        assert_eq!(pa.len(), samples.len());
        assert!(pa.iter().zip(&pb).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn test_model_surface() {
        // ---
        let frame = FeatureFrame::build(&synthetic_table(&["Albion", "Chandler"], 20));
        let outcome = train(&frame, Parameter::Ec, &quick_options()).unwrap();
        let model = &outcome.model;

        assert_eq!(model.target(), Parameter::Ec);
        assert_eq!(model.feature_names().len(), 7 + 2 + 2);

        let importances = model.feature_importances();
        assert_eq!(importances.len(), model.feature_names().len());
        assert!(importances.iter().all(|i| i.weight >= 0.0));
        assert!(importances.windows(2).all(|w| w[0].weight >= w[1].weight));
        let total: f64 = importances.iter().map(|i| i.weight).sum();
        assert!(total == 0.0 || (total - 1.0).abs() < 1e-9);

        // Unseen variety is absorbed by the encoder.
        let sample = FeatureSample::new(
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            &GroupKey::new("Tribute", TimeOfDay::Morning),
            [100.0, 98.0, 94.0],
        );
        assert!(model.predict(&sample).unwrap().is_finite());
    }

    #[test]
    fn test_metric_formulas() {
        // ---
        let actual = [1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(r2_score(&actual, &actual), 1.0);
        assert_abs_diff_eq!(rmse(&actual, &actual), 0.0);

        let predicted = [2.0, 3.0, 4.0, 5.0];
        assert_abs_diff_eq!(rmse(&actual, &predicted), 1.0);
        assert_abs_diff_eq!(r2_score(&actual, &predicted), 1.0 - 4.0 / 5.0, epsilon = 1e-12);

        assert!(r2_score(&[1.0], &[1.0]).is_nan());
        assert_eq!(r2_score(&[2.0, 2.0], &[2.0, 2.0]), 1.0);
        assert_eq!(r2_score(&[2.0, 2.0], &[1.0, 2.0]), 0.0);
    }
}
