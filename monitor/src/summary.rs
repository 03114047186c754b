//! Human-readable cycle lines and the telemetry payload, shared by the host
//! and ESP front ends.

use chrono::{DateTime, Utc};
use serde::Serialize;

use plantiq_common::{CycleReport, Drift, Metric};

pub fn cycle_line(report: &CycleReport) -> String {
    format!(
        "cycle {}: temperature {:.1}°F ({:.1}°C, evaluated at {:.1}°F), air humidity {:.0}%, light {:.0}%, soil moisture {:.0}%",
        report.cycle,
        report.temperature_f,
        report.temperature_c,
        report.adjusted_temperature_f,
        report.air_humidity_pct,
        report.light.normalized_value,
        report.soil.normalized_value,
    )
}

/// Out-of-range messages in evaluation order.
pub fn alert_lines(report: &CycleReport) -> Vec<String> {
    report
        .verdicts
        .iter()
        .filter_map(|verdict| {
            verdict
                .metric
                .out_of_range_message(verdict.classification)
                .map(|message| {
                    format!(
                        "{message} ({:.1}{})",
                        verdict.value,
                        verdict.metric.unit()
                    )
                })
        })
        .collect()
}

pub fn forecast_lines(report: &CycleReport) -> Vec<String> {
    let Some(forecast) = report.forecast else {
        return Vec::new();
    };

    let mut lines = Vec::with_capacity(2);
    if let Some(trend) = report.trend {
        lines.push(format!(
            "the temperature will see a {} in {} hours ({:.1}°F forecast)",
            trend.describe(),
            forecast.lead_time_hours,
            forecast.temperature_f,
        ));
    }
    if let Some(advisory) = report.humidity_advisory {
        lines.push(format!(
            "{} in {} hours ({:.0}% forecast)",
            advisory.describe(),
            forecast.lead_time_hours,
            forecast.humidity_pct,
        ));
    }
    lines
}

/// Raw values the calibration window never saw.
pub fn drift_lines(report: &CycleReport) -> Vec<String> {
    [(Metric::Light, report.light), (Metric::SoilMoisture, report.soil)]
        .into_iter()
        .filter_map(|(metric, sample)| {
            sample.drift.map(|drift| {
                let side = match drift {
                    Drift::BelowRange => "below",
                    Drift::AboveRange => "above",
                };
                format!(
                    "{} raw value {} is {side} its calibrated range; consider recalibrating",
                    metric.as_str(),
                    sample.raw_value
                )
            })
        })
        .collect()
}

#[derive(Serialize)]
struct Envelope<'a> {
    at: DateTime<Utc>,
    #[serde(flatten)]
    report: &'a CycleReport,
}

pub fn telemetry_payload(report: &CycleReport, at: DateTime<Utc>) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&Envelope { at, report })
}
