//! Live-server checks. Start the service (with a dataset loaded) and point
//! `BASE_URL` at it before running these.

use anyhow::Result;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Health {
    status: String,
    readings: usize,
}

#[derive(Debug, Deserialize)]
struct Reading {
    date: NaiveDate,
    variety: String,
    time_of_day: String,
    ph: f64,
    ec_ms_cm: f64,
    humidity_pct: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastPoint {
    date: NaiveDate,
    variety: String,
    time_of_day: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastReport {
    horizon: usize,
    feature_names: Vec<String>,
    feature_importances: Vec<serde_json::Value>,
    last_historical_date: Option<NaiveDate>,
    points: Vec<ForecastPoint>,
}

fn base_url() -> String {
    std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into())
}

#[tokio::test]
async fn health_reports_loaded_readings() -> Result<()> {
    // ---
    let url = format!("{}/health", base_url());
    let health: Health = Client::new().get(&url).send().await?.json().await?;

    assert_eq!(health.status, "ok");
    assert!(health.readings > 0, "No readings loaded behind {}", url);
    Ok(())
}

#[tokio::test]
async fn readings_filtering_works() -> Result<()> {
    // ---
    let client = Client::new();
    let url = format!(
        "{}/readings?time_of_day=Morning&start=2023-06-01&limit=25",
        base_url()
    );
    let readings: Vec<Reading> = client.get(&url).send().await?.json().await?;

    assert!(readings.len() <= 25, "Limit filter failed");
    let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
    for r in &readings {
        assert_eq!(r.time_of_day, "Morning", "Time filter failed");
        assert!(r.date >= start, "Date filter failed");
        assert!(!r.variety.is_empty());
        assert!(r.ph > 0.0 && r.ec_ms_cm > 0.0 && r.humidity_pct > 0.0);
    }

    let bad = client
        .get(format!("{}/readings?time_of_day=Noon", base_url()))
        .send()
        .await?;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn forecast_covers_every_group_and_day() -> Result<()> {
    // ---
    let client = Client::new();
    let url = format!("{}/forecast?target=pH&horizon=3", base_url());
    let report: ForecastReport = client.get(&url).send().await?.json().await?;

    assert_eq!(report.horizon, 3);
    assert!(!report.feature_names.is_empty());
    assert!(!report.feature_importances.is_empty());
    assert!(!report.points.is_empty());
    assert_eq!(report.points.len() % 3, 0, "Each group should get 3 points");

    let last = report.last_historical_date.expect("history should not be empty");
    for p in &report.points {
        assert!(p.date > last, "Forecast dated inside history");
        assert!(!p.variety.is_empty() && !p.time_of_day.is_empty());
        assert!(p.value.is_finite());
    }
    Ok(())
}

#[tokio::test]
async fn stats_match_filters() -> Result<()> {
    // ---
    let url = format!("{}/stats?time_of_day=Evening", base_url());
    let stats: serde_json::Value = Client::new().get(&url).send().await?.json().await?;

    assert!(stats["readings"].as_u64().unwrap_or(0) > 0);
    assert!(stats["ph"].as_f64().is_some(), "Mean pH missing from {}", url);

    let none = format!("{}/stats?start=2999-01-01", base_url());
    let empty: serde_json::Value = Client::new().get(&none).send().await?.json().await?;
    assert_eq!(empty["readings"], 0);
    assert!(empty["ph"].is_null());
    Ok(())
}
