//! Data models for the strawberry readings pipeline.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---

/// Time of day a reading was taken. Readings come in twice per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeOfDay {
    Morning,
    Evening,
}

impl TimeOfDay {
    /// Both slots, in the order groups are enumerated.
    pub const ALL: [TimeOfDay; 2] = [TimeOfDay::Morning, TimeOfDay::Evening];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "Morning",
            TimeOfDay::Evening => "Evening",
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeOfDay {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" => Ok(TimeOfDay::Morning),
            "evening" => Ok(TimeOfDay::Evening),
            other => Err(anyhow!("Unknown time of day '{}'", other)),
        }
    }
}

/// The five numeric water/air parameters tracked per reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Parameter {
    Ph,
    Ec,
    Humidity,
    WaterTemp,
    AirTemp,
}

impl Parameter {
    pub const ALL: [Parameter; 5] = [
        Parameter::Ph,
        Parameter::Ec,
        Parameter::Humidity,
        Parameter::WaterTemp,
        Parameter::AirTemp,
    ];

    /// Position of this parameter in per-parameter arrays.
    pub fn index(&self) -> usize {
        match self {
            Parameter::Ph => 0,
            Parameter::Ec => 1,
            Parameter::Humidity => 2,
            Parameter::WaterTemp => 3,
            Parameter::AirTemp => 4,
        }
    }

    /// Column name as used in the dashboard dataset and in feature names.
    pub fn column(&self) -> &'static str {
        match self {
            Parameter::Ph => "pH",
            Parameter::Ec => "EC_mS_cm",
            Parameter::Humidity => "Humidity_pct",
            Parameter::WaterTemp => "Water_Temp_C",
            Parameter::AirTemp => "Air_Temp_C",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Parameter::Ph => "pH",
            Parameter::Ec => "EC (mS/cm)",
            Parameter::Humidity => "Humidity (%)",
            Parameter::WaterTemp => "Water Temperature (°C)",
            Parameter::AirTemp => "Air Temperature (°C)",
        }
    }

    /// Optimal `(low, high)` range for strawberry growth.
    pub fn optimal_range(&self) -> (f64, f64) {
        match self {
            Parameter::Ph => (5.8, 6.2),
            Parameter::Ec => (1.5, 2.0),
            Parameter::Humidity => (65.0, 75.0),
            Parameter::WaterTemp => (18.0, 22.0),
            Parameter::AirTemp => (20.0, 25.0),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Parameter {
    type Err = anyhow::Error;

    /// Accepts the dataset column (`EC_mS_cm`), the database column
    /// (`ec_ms_cm`) or the short name (`ec`), case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ph" => Ok(Parameter::Ph),
            "ec" | "ec_ms_cm" => Ok(Parameter::Ec),
            "humidity" | "humidity_pct" => Ok(Parameter::Humidity),
            "watertemp" | "water_temp" | "water_temp_c" => Ok(Parameter::WaterTemp),
            "airtemp" | "air_temp" | "air_temp_c" => Ok(Parameter::AirTemp),
            other => Err(anyhow!("Unknown parameter '{}'", other)),
        }
    }
}

/// Raw reading row as found in the CSV dataset or the database.
///
/// Accepts both the dashboard headers (`Date`, `Variety`, `Time`, `pH`, ...)
/// and the lower-case database column names. An empty numeric field is a
/// missing value, carried into [`Reading`] as NaN.
#[derive(Debug, Clone, Deserialize, sqlx::FromRow)]
pub struct RawReading {
    // ---
    #[serde(alias = "Date")]
    pub date: String,
    #[serde(alias = "Variety")]
    pub variety: String,
    #[serde(alias = "Time")]
    pub time_of_day: String,
    #[serde(alias = "pH")]
    pub ph: Option<f64>,
    #[serde(alias = "EC_mS_cm")]
    pub ec_ms_cm: Option<f64>,
    #[serde(alias = "Humidity_pct")]
    pub humidity_pct: Option<f64>,
    #[serde(alias = "Water_Temp_C")]
    pub water_temp_c: Option<f64>,
    #[serde(alias = "Air_Temp_C")]
    pub air_temp_c: Option<f64>,
}

/// A validated reading. Immutable once loaded. Missing values are NaN.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    // ---
    pub date: NaiveDate,
    pub variety: String,
    pub time_of_day: TimeOfDay,
    pub ph: f64,
    pub ec_ms_cm: f64,
    pub humidity_pct: f64,
    pub water_temp_c: f64,
    pub air_temp_c: f64,
}

impl RawReading {
    // ---
    pub fn to_reading(&self) -> Result<Reading> {
        // ---
        let date = parse_date(&self.date)?;
        let time_of_day = self.time_of_day.parse::<TimeOfDay>()?;
        let variety = self.variety.trim();
        if variety.is_empty() {
            return Err(anyhow!("Reading on {} has an empty variety", date));
        }

        Ok(Reading {
            date,
            variety: variety.to_string(),
            time_of_day,
            ph: self.ph.unwrap_or(f64::NAN),
            ec_ms_cm: self.ec_ms_cm.unwrap_or(f64::NAN),
            humidity_pct: self.humidity_pct.unwrap_or(f64::NAN),
            water_temp_c: self.water_temp_c.unwrap_or(f64::NAN),
            air_temp_c: self.air_temp_c.unwrap_or(f64::NAN),
        })
    }
}

/// Parse `YYYY-MM-DD`, ignoring any trailing time component.
fn parse_date(raw: &str) -> Result<NaiveDate> {
    // ---
    let day_part = raw
        .trim()
        .split(|c: char| c == 'T' || c == ' ')
        .next()
        .unwrap_or_default();
    NaiveDate::parse_from_str(day_part, "%Y-%m-%d")
        .with_context(|| format!("Malformed date '{}'", raw))
}

impl Reading {
    pub fn value(&self, parameter: Parameter) -> f64 {
        match parameter {
            Parameter::Ph => self.ph,
            Parameter::Ec => self.ec_ms_cm,
            Parameter::Humidity => self.humidity_pct,
            Parameter::WaterTemp => self.water_temp_c,
            Parameter::AirTemp => self.air_temp_c,
        }
    }

    /// All five parameter values, indexed by [`Parameter::index`].
    pub fn values(&self) -> [f64; 5] {
        Parameter::ALL.map(|p| self.value(p))
    }

    /// True when no parameter is missing or non-finite.
    pub fn is_complete(&self) -> bool {
        self.values().iter().all(|v| v.is_finite())
    }

    pub fn group(&self) -> GroupKey {
        GroupKey::new(&self.variety, self.time_of_day)
    }
}

/// Partition key over which lags and forecasts are computed independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupKey {
    pub variety: String,
    pub time_of_day: TimeOfDay,
}

impl GroupKey {
    pub fn new(variety: &str, time_of_day: TimeOfDay) -> Self {
        Self {
            variety: variety.to_string(),
            time_of_day,
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.variety, self.time_of_day)
    }
}

/// One forecast value for a future date and group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub variety: String,
    pub time_of_day: TimeOfDay,
    pub value: f64,
}

/// Held-out accuracy of a trained model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub r2: f64,
    pub rmse: f64,
}
