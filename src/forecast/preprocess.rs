//! Preprocessing ahead of the regressor: standard scaling for numeric
//! columns, one-hot encoding for the group columns.

use std::collections::BTreeSet;

use crate::Parameter;

use super::features::{numeric_feature_names, FeatureSample, CATEGORICAL_FEATURES};

// ---

/// Zero mean, unit variance per column, using population statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>], columns: usize) -> Self {
        // ---
        if rows.is_empty() {
            return Self {
                mean: vec![0.0; columns],
                scale: vec![1.0; columns],
            };
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; columns];
        for row in rows {
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0; columns];
        for row in rows {
            for ((v, x), m) in var.iter_mut().zip(row).zip(&mean) {
                *v += (x - m).powi(2);
            }
        }

        // Constant columns are centred but not scaled.
        let scale = var
            .iter()
            .map(|v| {
                let std = (v / n).sqrt();
                if std == 0.0 {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        Self { mean, scale }
    }

    pub fn transform_into(&self, row: &[f64], out: &mut Vec<f64>) {
        out.extend(
            row.iter()
                .zip(self.mean.iter().zip(&self.scale))
                .map(|(x, (m, s))| (x - m) / s),
        );
    }
}

/// One-hot encoding with sorted levels; unseen levels encode as all zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct OneHotEncoder {
    categories: Vec<Vec<String>>,
}

impl OneHotEncoder {
    pub fn fit<'a, I>(rows: I, columns: usize) -> Self
    where
        I: IntoIterator<Item = Vec<&'a str>>,
    {
        // ---
        let mut levels: Vec<BTreeSet<&str>> = vec![BTreeSet::new(); columns];
        for row in rows {
            for (set, value) in levels.iter_mut().zip(row) {
                set.insert(value);
            }
        }

        Self {
            categories: levels
                .into_iter()
                .map(|set| set.into_iter().map(str::to_string).collect())
                .collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.categories.iter().map(Vec::len).sum()
    }

    pub fn encode_into(&self, row: &[&str], out: &mut Vec<f64>) {
        // ---
        for (levels, value) in self.categories.iter().zip(row) {
            let hit = levels.iter().position(|level| level == value);
            out.extend((0..levels.len()).map(|i| if Some(i) == hit { 1.0 } else { 0.0 }));
        }
    }

    /// `<column>_<level>` for every encoded output column.
    pub fn output_names(&self, columns: &[&str]) -> Vec<String> {
        self.categories
            .iter()
            .zip(columns)
            .flat_map(|(levels, column)| {
                levels
                    .iter()
                    .map(move |level| format!("{}_{}", column, level))
            })
            .collect()
    }
}

/// Fitted column transform: scaled numeric columns, then one-hot columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessor {
    scaler: StandardScaler,
    encoder: OneHotEncoder,
    output_names: Vec<String>,
}

impl Preprocessor {
    /// Fit on training samples only.
    pub fn fit(samples: &[FeatureSample], target: Parameter) -> Self {
        // ---
        let numeric: Vec<Vec<f64>> = samples.iter().map(|s| s.numeric().to_vec()).collect();
        let numeric_names = numeric_feature_names(target);
        let scaler = StandardScaler::fit(&numeric, numeric_names.len());

        let encoder = OneHotEncoder::fit(
            samples.iter().map(|s| s.categorical().to_vec()),
            CATEGORICAL_FEATURES.len(),
        );

        let mut output_names = Vec::with_capacity(numeric_names.len() + encoder.width());
        output_names.extend(numeric_names);
        output_names.extend(encoder.output_names(&CATEGORICAL_FEATURES));

        Self {
            scaler,
            encoder,
            output_names,
        }
    }

    pub fn transform(&self, sample: &FeatureSample) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.output_names.len());
        self.scaler.transform_into(&sample.numeric(), &mut out);
        self.encoder.encode_into(&sample.categorical(), &mut out);
        out
    }

    pub fn transform_all(&self, samples: &[FeatureSample]) -> Vec<Vec<f64>> {
        samples.iter().map(|s| self.transform(s)).collect()
    }

    /// Names of the transformed columns, with categorical levels expanded.
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }
}
