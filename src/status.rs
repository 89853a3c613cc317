//! Rule-based system status for a single reading.
//!
//! Each rule is a `{parameter, low, high}` band; a reading's status follows
//! from how many rules it breaks.

use serde::Serialize;

use crate::{Parameter, Reading};

// ---

/// Acceptable band for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdRule {
    pub parameter: Parameter,
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Deviation {
    TooLow,
    TooHigh,
}

/// A broken rule and the human-readable message for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub parameter: Parameter,
    pub deviation: Deviation,
    pub value: f64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SystemStatus {
    Optimal,
    NeedsAttention,
    Critical,
}

impl SystemStatus {
    fn from_issue_count(count: usize) -> Self {
        match count {
            0 => SystemStatus::Optimal,
            1 | 2 => SystemStatus::NeedsAttention,
            _ => SystemStatus::Critical,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SystemStatus::Optimal => "Optimal",
            SystemStatus::NeedsAttention => "Needs Attention",
            SystemStatus::Critical => "Critical",
        }
    }

    /// Display colour used by the dashboard.
    pub fn color(&self) -> &'static str {
        match self {
            SystemStatus::Optimal => "#4CAF50",
            SystemStatus::NeedsAttention => "#FFC107",
            SystemStatus::Critical => "#F44336",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub status: SystemStatus,
    pub label: &'static str,
    pub color: &'static str,
    pub issues: Vec<Issue>,
}

impl ThresholdRule {
    pub fn for_parameter(parameter: Parameter) -> Self {
        let (low, high) = parameter.optimal_range();
        Self {
            parameter,
            low,
            high,
        }
    }

    /// Bounds are inclusive.
    pub fn check(&self, value: f64) -> Option<Deviation> {
        if value < self.low {
            Some(Deviation::TooLow)
        } else if value > self.high {
            Some(Deviation::TooHigh)
        } else {
            None
        }
    }
}

/// Rules behind the overall system status. Air temperature is not scored.
pub fn default_rules() -> Vec<ThresholdRule> {
    [
        Parameter::Ph,
        Parameter::Ec,
        Parameter::Humidity,
        Parameter::WaterTemp,
    ]
    .into_iter()
    .map(ThresholdRule::for_parameter)
    .collect()
}

pub fn evaluate(reading: &Reading, rules: &[ThresholdRule]) -> StatusReport {
    // ---
    let issues: Vec<Issue> = rules
        .iter()
        .filter_map(|rule| {
            let value = reading.value(rule.parameter);
            rule.check(value).map(|deviation| Issue {
                parameter: rule.parameter,
                deviation,
                value,
                message: issue_message(rule.parameter, deviation, value),
            })
        })
        .collect();

    let status = SystemStatus::from_issue_count(issues.len());
    StatusReport {
        status,
        label: status.label(),
        color: status.color(),
        issues,
    }
}

fn issue_message(parameter: Parameter, deviation: Deviation, value: f64) -> String {
    // ---
    let direction = match deviation {
        Deviation::TooLow => "low",
        Deviation::TooHigh => "high",
    };
    match parameter {
        Parameter::Ph => format!("pH is too {} ({:.2})", direction, value),
        Parameter::Ec => format!("EC is too {} ({:.2} mS/cm)", direction, value),
        Parameter::Humidity => format!("Humidity is too {} ({:.1}%)", direction, value),
        Parameter::WaterTemp => format!("Water temperature is too {} ({:.1}°C)", direction, value),
        Parameter::AirTemp => format!("Air temperature is too {} ({:.1}°C)", direction, value),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::TimeOfDay;
    use chrono::NaiveDate;

    fn create_test_reading(ph: f64, ec: f64, humidity: f64, water_temp: f64) -> Reading {
        // ---
        Reading {
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            variety: "Albion".to_string(),
            time_of_day: TimeOfDay::Evening,
            ph,
            ec_ms_cm: ec,
            humidity_pct: humidity,
            water_temp_c: water_temp,
            air_temp_c: 40.0,
        }
    }

    #[test]
    fn test_optimal_reading() {
        // ---
        let report = evaluate(&create_test_reading(6.0, 1.8, 70.0, 20.0), &default_rules());
        assert_eq!(report.status, SystemStatus::Optimal);
        assert_eq!(report.color, "#4CAF50");
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_band_edges_are_in_range() {
        // ---
        let low_edge = create_test_reading(5.8, 1.5, 65.0, 18.0);
        let high_edge = create_test_reading(6.2, 2.0, 75.0, 22.0);
        assert!(evaluate(&low_edge, &default_rules()).issues.is_empty());
        assert!(evaluate(&high_edge, &default_rules()).issues.is_empty());
    }

    #[test]
    fn test_status_levels() {
        // ---
        let one = evaluate(&create_test_reading(5.5, 1.8, 70.0, 20.0), &default_rules());
        assert_eq!(one.status, SystemStatus::NeedsAttention);
        assert_eq!(one.issues[0].message, "pH is too low (5.50)");

        let two = evaluate(&create_test_reading(5.5, 2.3, 70.0, 20.0), &default_rules());
        assert_eq!(two.status, SystemStatus::NeedsAttention);
        assert_eq!(two.issues[1].message, "EC is too high (2.30 mS/cm)");

        let three = evaluate(&create_test_reading(5.5, 2.3, 60.0, 23.0), &default_rules());
        assert_eq!(three.status, SystemStatus::Critical);
        assert_eq!(three.label, "Critical");
        assert_eq!(three.issues.len(), 4);
        assert_eq!(three.issues[2].message, "Humidity is too low (60.0%)");
        assert_eq!(
            three.issues[3].message,
            "Water temperature is too high (23.0°C)"
        );
    }

    #[test]
    fn test_air_temperature_not_scored_by_default() {
        // ---
        // The test reading has 40°C air, well outside its band.
        let reading = create_test_reading(6.0, 1.8, 70.0, 20.0);
        assert!(evaluate(&reading, &default_rules()).issues.is_empty());

        let strict = [ThresholdRule::for_parameter(Parameter::AirTemp)];
        let report = evaluate(&reading, &strict);
        assert_eq!(report.issues[0].deviation, Deviation::TooHigh);
    }
}
