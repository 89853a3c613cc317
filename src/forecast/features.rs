//! Feature builder: calendar fields plus per-group lag features.
//!
//! Lags are computed on fresh per-group sequences (one buffer per
//! variety/time-of-day key) and merged back in source-table order, so lag
//! values never cross group boundaries and the reading table is never
//! mutated.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, NaiveDate};
use tracing::{debug, warn};

use crate::store::ReadingTable;
use crate::{GroupKey, Parameter, TimeOfDay};

// ---

/// Lag distances, in observations within the same group.
pub const LAGS: [usize; 3] = [1, 3, 7];

/// Observations a group needs before its first complete feature row.
pub const MAX_LAG: usize = 7;

pub const CALENDAR_FEATURES: [&str; 4] = ["year", "month", "day", "dayofweek"];
pub const CATEGORICAL_FEATURES: [&str; 2] = ["Variety", "Time"];

/// Calendar fields derived from a date. `day_of_week` is 0 for Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub day_of_week: u32,
}

impl Calendar {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
            day_of_week: date.weekday().num_days_from_monday(),
        }
    }

    pub fn to_features(&self) -> [f64; 4] {
        [
            self.year as f64,
            self.month as f64,
            self.day as f64,
            self.day_of_week as f64,
        ]
    }
}

/// A reading with complete lag history for all five parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub group: GroupKey,
    pub calendar: Calendar,
    /// Observed values, indexed by [`Parameter::index`].
    pub values: [f64; 5],
    /// `lags[p][i]` is parameter `p` observed `LAGS[i]` steps earlier.
    pub lags: [[f64; 3]; 5],
}

impl FeatureRow {
    pub fn value(&self, parameter: Parameter) -> f64 {
        self.values[parameter.index()]
    }

    /// `[lag1, lag3, lag7]` for one parameter.
    pub fn lags(&self, parameter: Parameter) -> [f64; 3] {
        self.lags[parameter.index()]
    }
}

/// Model input for a single target: calendar, raw group fields, target lags.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSample {
    pub calendar: Calendar,
    pub variety: String,
    pub time_of_day: TimeOfDay,
    pub lags: [f64; 3],
}

impl FeatureSample {
    pub fn new(date: NaiveDate, group: &GroupKey, lags: [f64; 3]) -> Self {
        Self {
            calendar: Calendar::from_date(date),
            variety: group.variety.clone(),
            time_of_day: group.time_of_day,
            lags,
        }
    }

    /// Numeric columns: calendar fields then lag1, lag3, lag7.
    pub fn numeric(&self) -> [f64; 7] {
        let [year, month, day, dow] = self.calendar.to_features();
        let [lag1, lag3, lag7] = self.lags;
        [year, month, day, dow, lag1, lag3, lag7]
    }

    /// Categorical columns, in [`CATEGORICAL_FEATURES`] order.
    pub fn categorical(&self) -> [&str; 2] {
        [self.variety.as_str(), self.time_of_day.as_str()]
    }
}

pub fn lag_name(target: Parameter, lag: usize) -> String {
    format!("{}_lag{}", target.column(), lag)
}

/// Raw feature names: calendar fields, group fields, then the target lags.
pub fn feature_names(target: Parameter) -> Vec<String> {
    CALENDAR_FEATURES
        .iter()
        .chain(CATEGORICAL_FEATURES.iter())
        .map(|s| s.to_string())
        .chain(LAGS.iter().map(|&lag| lag_name(target, lag)))
        .collect()
}

/// Names of the columns returned by [`FeatureSample::numeric`].
pub fn numeric_feature_names(target: Parameter) -> Vec<String> {
    CALENDAR_FEATURES
        .iter()
        .map(|s| s.to_string())
        .chain(LAGS.iter().map(|&lag| lag_name(target, lag)))
        .collect()
}

// ---

/// Engineered rows for every reading with full lag history.
#[derive(Debug, Clone, Default)]
pub struct FeatureFrame {
    rows: Vec<FeatureRow>,
    groups: Vec<GroupKey>,
    source_rows: usize,
}

impl FeatureFrame {
    /// Build the frame from a reading table. An empty table gives an empty
    /// frame; rows without seven prior observations in their group are dropped.
    ///
    /// An incomplete reading (any value missing) still occupies its position
    /// in the group, but it is dropped together with every row that would take
    /// a lag from it.
    pub fn build(table: &ReadingTable) -> Self {
        // ---
        let readings = table.readings();

        let mut buffers: HashMap<GroupKey, Vec<usize>> = HashMap::new();
        for (i, r) in readings.iter().enumerate() {
            buffers.entry(r.group()).or_default().push(i);
        }

        let mut merged: Vec<(usize, FeatureRow)> = Vec::with_capacity(readings.len());
        let mut incomplete = 0;
        for (group, indices) in buffers.iter_mut() {
            indices.sort_by_key(|&i| readings[i].date);

            if indices.len() <= MAX_LAG {
                warn!(
                    "Group {} has {} readings, needs more than {} for lag history; dropped",
                    group,
                    indices.len(),
                    MAX_LAG
                );
                continue;
            }

            for pos in MAX_LAG..indices.len() {
                let current = &readings[indices[pos]];
                let complete = current.is_complete()
                    && LAGS
                        .iter()
                        .all(|&lag| readings[indices[pos - lag]].is_complete());
                if !complete {
                    incomplete += 1;
                    continue;
                }

                let mut lags = [[0.0; 3]; 5];
                for (li, &lag) in LAGS.iter().enumerate() {
                    let prior = &readings[indices[pos - lag]];
                    for p in Parameter::ALL {
                        lags[p.index()][li] = prior.value(p);
                    }
                }

                merged.push((
                    indices[pos],
                    FeatureRow {
                        date: current.date,
                        group: group.clone(),
                        calendar: Calendar::from_date(current.date),
                        values: current.values(),
                        lags,
                    },
                ));
            }
        }

        if incomplete > 0 {
            warn!(
                "Dropped {} feature rows with missing values in the reading or its lags",
                incomplete
            );
        }

        merged.sort_by_key(|(i, _)| *i);
        let rows: Vec<FeatureRow> = merged.into_iter().map(|(_, row)| row).collect();
        let groups = ordered_groups(&rows);

        debug!(
            "Built {} feature rows in {} groups from {} readings",
            rows.len(),
            groups.len(),
            readings.len()
        );

        Self {
            rows,
            groups,
            source_rows: readings.len(),
        }
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of readings the frame was built from, before any were dropped.
    pub fn source_rows(&self) -> usize {
        self.source_rows
    }

    /// Groups with at least one feature row: varieties in order of first
    /// appearance, `Morning` before `Evening`.
    pub fn groups(&self) -> &[GroupKey] {
        &self.groups
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows().iter().map(|r| r.date).max()
    }

    /// The group's most recent feature row.
    pub fn latest_row(&self, group: &GroupKey) -> Option<&FeatureRow> {
        self.rows()
            .iter()
            .filter(|r| &r.group == group)
            .max_by_key(|r| r.date)
    }

    /// Samples and targets for supervised training on `target`.
    pub fn samples(&self, target: Parameter) -> (Vec<FeatureSample>, Vec<f64>) {
        // ---
        self.rows
            .iter()
            .map(|row| {
                (
                    FeatureSample::new(row.date, &row.group, row.lags(target)),
                    row.value(target),
                )
            })
            .unzip()
    }
}

fn ordered_groups(rows: &[FeatureRow]) -> Vec<GroupKey> {
    // ---
    let mut seen = HashSet::new();
    let varieties: Vec<&str> = rows
        .iter()
        .map(|r| r.group.variety.as_str())
        .filter(|v| seen.insert(*v))
        .collect();
    let present: HashSet<&GroupKey> = rows.iter().map(|r| &r.group).collect();

    varieties
        .iter()
        .flat_map(|v| TimeOfDay::ALL.map(|t| GroupKey::new(v, t)))
        .filter(|g| present.contains(g))
        .collect()
}
