//! Reading store: loads the strawberry readings table once per process.
//!
//! The database is tried first; if it is unavailable or empty the CSV dataset
//! is used instead. An empty table is a valid outcome, the forecast layer
//! reports it as "no model" rather than failing.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::{Config, Parameter, RawReading, Reading, TimeOfDay};

// ---

/// In-memory table of readings, unique on (date, variety, time_of_day).
#[derive(Debug, Clone, Default)]
pub struct ReadingTable {
    readings: Vec<Reading>,
}

/// Mean of each monitored parameter over a filtered set of readings.
///
/// Missing values are skipped; a mean with nothing to average is `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingSummary {
    pub readings: usize,
    pub ph: Option<f64>,
    pub ec_ms_cm: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub water_temp_c: Option<f64>,
}

/// Optional filters applied to a [`ReadingTable`].
#[derive(Debug, Clone, Default)]
pub struct ReadingFilter {
    pub variety: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub time_of_day: Option<TimeOfDay>,
}

impl ReadingTable {
    // ---
    pub fn new(readings: Vec<Reading>) -> Result<Self> {
        // ---
        {
            let mut seen = HashSet::with_capacity(readings.len());
            for r in &readings {
                if !seen.insert((r.date, r.variety.as_str(), r.time_of_day)) {
                    return Err(anyhow!(
                        "Duplicate reading for {} / {} / {}",
                        r.date,
                        r.variety,
                        r.time_of_day
                    ));
                }
            }
        }
        Ok(Self { readings })
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Distinct varieties in order of first appearance.
    pub fn varieties(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.readings
            .iter()
            .map(|r| r.variety.as_str())
            .filter(|v| seen.insert(*v))
            .collect()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.readings.iter().map(|r| r.date).min()?;
        let max = self.readings.iter().map(|r| r.date).max()?;
        Some((min, max))
    }

    /// Readings matching every set filter. A variety of `All` matches everything.
    pub fn filter(&self, filter: &ReadingFilter) -> Vec<&Reading> {
        // ---
        let variety = filter
            .variety
            .as_deref()
            .filter(|v| !v.eq_ignore_ascii_case("all"));

        self.readings
            .iter()
            .filter(|r| variety.map_or(true, |v| r.variety == v))
            .filter(|r| filter.start.map_or(true, |s| r.date >= s))
            .filter(|r| filter.end.map_or(true, |e| r.date <= e))
            .filter(|r| filter.time_of_day.map_or(true, |t| r.time_of_day == t))
            .collect()
    }

    /// Average pH, EC, humidity and water temperature over the filtered rows.
    pub fn summary(&self, filter: &ReadingFilter) -> ReadingSummary {
        // ---
        let rows = self.filter(filter);
        let mean = |parameter: Parameter| {
            let (sum, count) = rows
                .iter()
                .map(|r| r.value(parameter))
                .filter(|v| v.is_finite())
                .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
            (count > 0).then(|| sum / count as f64)
        };

        ReadingSummary {
            readings: rows.len(),
            ph: mean(Parameter::Ph),
            ec_ms_cm: mean(Parameter::Ec),
            humidity_pct: mean(Parameter::Humidity),
            water_temp_c: mean(Parameter::WaterTemp),
        }
    }

    /// For each variety, the reading at `time_of_day` on that variety's latest
    /// date. Varieties whose latest date has no such reading are skipped.
    /// Sorted by variety.
    pub fn latest_per_variety(&self, time_of_day: TimeOfDay) -> Vec<&Reading> {
        // ---
        let mut latest: HashMap<&str, NaiveDate> = HashMap::new();
        for r in &self.readings {
            let entry = latest.entry(r.variety.as_str()).or_insert(r.date);
            if r.date > *entry {
                *entry = r.date;
            }
        }

        let mut out: Vec<&Reading> = self
            .readings
            .iter()
            .filter(|r| r.time_of_day == time_of_day)
            .filter(|r| latest.get(r.variety.as_str()) == Some(&r.date))
            .collect();
        out.sort_by(|a, b| a.variety.cmp(&b.variety));
        out
    }
}

// ---

/// Read the CSV dataset at `path`.
pub fn read_csv(path: impl AsRef<Path>) -> Result<ReadingTable> {
    // ---
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open readings CSV {}", path.display()))?;
    read_csv_from(file).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Parse readings from any CSV source with a header row.
pub fn read_csv_from<R: io::Read>(source: R) -> Result<ReadingTable> {
    // ---
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(source);

    let mut readings = Vec::new();
    for (i, record) in reader.deserialize::<RawReading>().enumerate() {
        // Header is line 1, first data row is line 2.
        let line = i + 2;
        let raw = record.with_context(|| format!("Malformed CSV row at line {}", line))?;
        let reading = raw
            .to_reading()
            .with_context(|| format!("Invalid reading at line {}", line))?;
        readings.push(reading);
    }

    debug!("Parsed {} readings from CSV", readings.len());
    ReadingTable::new(readings)
}

/// Fetch every row of `strawberry_readings`, unvalidated.
async fn fetch_rows(pool: &PgPool) -> std::result::Result<Vec<RawReading>, sqlx::Error> {
    // ---
    sqlx::query_as(
        r#"
        SELECT to_char(date, 'YYYY-MM-DD') AS date,
               variety, time_of_day,
               ph, ec_ms_cm, humidity_pct, water_temp_c, air_temp_c
        FROM strawberry_readings
        ORDER BY date, time_of_day
        "#,
    )
    .fetch_all(pool)
    .await
}

fn table_from_rows(rows: &[RawReading]) -> Result<ReadingTable> {
    // ---
    let readings = rows
        .iter()
        .map(|raw| {
            raw.to_reading()
                .with_context(|| format!("Invalid row in strawberry_readings: {:?}", raw))
        })
        .collect::<Result<Vec<_>>>()?;

    ReadingTable::new(readings)
}

/// Decide what the database contributes to [`load`].
///
/// A failed query falls back to the CSV (`Ok(None)`), as does an empty
/// table. Rows that fail validation are an error.
fn database_table(
    fetched: std::result::Result<Vec<RawReading>, sqlx::Error>,
) -> Result<Option<ReadingTable>> {
    // ---
    match fetched {
        Ok(rows) if rows.is_empty() => {
            info!("Database has no readings, falling back to CSV");
            Ok(None)
        }
        Ok(rows) => table_from_rows(&rows).map(Some),
        Err(e) => {
            warn!("Failed to read readings from database: {}", e);
            Ok(None)
        }
    }
}

pub async fn count_readings(pool: &PgPool) -> Result<i64> {
    // ---
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM strawberry_readings")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Insert a table into `strawberry_readings`, skipping rows already present.
///
/// Returns the number of rows inserted.
pub async fn import_readings(pool: &PgPool, table: &ReadingTable) -> Result<u64> {
    // ---
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for r in table.readings() {
        let result = sqlx::query(
            r#"
            INSERT INTO strawberry_readings (
                date, variety, time_of_day,
                ph, ec_ms_cm, humidity_pct, water_temp_c, air_temp_c
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (date, variety, time_of_day) DO NOTHING
            "#,
        )
        .bind(r.date)
        .bind(&r.variety)
        .bind(r.time_of_day.as_str())
        .bind(r.ph)
        .bind(r.ec_ms_cm)
        .bind(r.humidity_pct)
        .bind(r.water_temp_c)
        .bind(r.air_temp_c)
        .execute(&mut *tx)
        .await?;

        inserted += result.rows_affected();
    }

    tx.commit().await?;
    info!("Imported {} of {} readings into the database", inserted, table.len());
    Ok(inserted)
}

/// Load the readings table: database first, CSV fallback, else empty.
pub async fn load(cfg: &Config, pool: Option<&PgPool>) -> Result<ReadingTable> {
    // ---
    if let Some(pool) = pool {
        if let Some(table) = database_table(fetch_rows(pool).await)? {
            info!("Loaded {} readings from database", table.len());
            return Ok(table);
        }
    }

    let csv_path = Path::new(&cfg.readings_csv);
    if !csv_path.exists() {
        warn!("Data file not found: {}", csv_path.display());
        return Ok(ReadingTable::default());
    }

    let table = read_csv(csv_path)?;
    info!(
        "Loaded {} readings from {}",
        table.len(),
        csv_path.display()
    );
    Ok(table)
}

/// Deterministic readings for tests: every (variety, time) group gets one
/// reading per day, with values encoding variety, time of day and day index
/// so that any cross-group mixing is visible.
#[cfg(test)]
pub(crate) fn synthetic_table(varieties: &[&str], days: usize) -> ReadingTable {
    // ---
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut readings = Vec::new();

    for day in 0..days {
        let date = start + chrono::Duration::days(day as i64);
        for (vi, variety) in varieties.iter().enumerate() {
            for (ti, time_of_day) in TimeOfDay::ALL.iter().enumerate() {
                let code = (vi * 1000 + ti * 100 + day) as f64;
                readings.push(Reading {
                    date,
                    variety: variety.to_string(),
                    time_of_day: *time_of_day,
                    ph: code,
                    ec_ms_cm: code + 0.1,
                    humidity_pct: code + 0.2,
                    water_temp_c: code + 0.3,
                    air_temp_c: code + 0.4,
                });
            }
        }
    }

    ReadingTable::new(readings).unwrap()
}
