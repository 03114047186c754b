//! Forecast blending: the temperature correction offset, the qualitative
//! trend, the humidity advisory, and decoding of the remote payload into a
//! typed [`ForecastSample`].

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::{error::ForecastError, types::ForecastSample};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendThresholds {
    pub minor_f: f32,
    pub moderate_f: f32,
    pub substantial_f: f32,
}

impl Default for TrendThresholds {
    fn default() -> Self {
        Self {
            minor_f: 4.0,
            moderate_f: 8.0,
            substantial_f: 12.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrendMagnitude {
    Minor,
    Moderate,
    Substantial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrendDirection {
    Increase,
    Decrease,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Trend {
    pub magnitude: TrendMagnitude,
    pub direction: TrendDirection,
}

impl Trend {
    pub fn describe(&self) -> &'static str {
        match (self.magnitude, self.direction) {
            (TrendMagnitude::Minor, TrendDirection::Increase) => "minor increase",
            (TrendMagnitude::Moderate, TrendDirection::Increase) => "moderate increase",
            (TrendMagnitude::Substantial, TrendDirection::Increase) => "substantial increase",
            (TrendMagnitude::Minor, TrendDirection::Decrease) => "minor decrease",
            (TrendMagnitude::Moderate, TrendDirection::Decrease) => "moderate decrease",
            (TrendMagnitude::Substantial, TrendDirection::Decrease) => "substantial decrease",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastEstimate {
    pub delta_f: f32,
    pub offset_f: f32,
    pub trend: Option<Trend>,
}

/// Offset is half the forecast change; the trend bands count how many
/// thresholds the magnitude of the change strictly exceeds.
pub fn estimate(
    current_temp_f: f32,
    forecast_temp_f: f32,
    thresholds: &TrendThresholds,
) -> ForecastEstimate {
    let delta_f = forecast_temp_f - current_temp_f;
    let magnitude = delta_f.abs();

    let band = if magnitude > thresholds.substantial_f {
        Some(TrendMagnitude::Substantial)
    } else if magnitude > thresholds.moderate_f {
        Some(TrendMagnitude::Moderate)
    } else if magnitude > thresholds.minor_f {
        Some(TrendMagnitude::Minor)
    } else {
        None
    };

    let direction = if delta_f > 0.0 {
        TrendDirection::Increase
    } else {
        TrendDirection::Decrease
    };

    ForecastEstimate {
        delta_f,
        offset_f: delta_f / 2.0,
        trend: band.map(|magnitude| Trend {
            magnitude,
            direction,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HumidityThresholds {
    pub dry_below_pct: f32,
    pub humid_above_pct: f32,
}

impl Default for HumidityThresholds {
    fn default() -> Self {
        Self {
            dry_below_pct: 40.0,
            humid_above_pct: 62.0,
        }
    }
}

/// Informational only; never drives an indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HumidityAdvisory {
    Dry,
    Humid,
}

impl HumidityAdvisory {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Dry => "the air will be very dry",
            Self::Humid => "the air will be very humid",
        }
    }
}

pub fn humidity_advisory(
    humidity_pct: f32,
    thresholds: &HumidityThresholds,
) -> Option<HumidityAdvisory> {
    if humidity_pct < thresholds.dry_below_pct {
        Some(HumidityAdvisory::Dry)
    } else if humidity_pct > thresholds.humid_above_pct {
        Some(HumidityAdvisory::Humid)
    } else {
        None
    }
}

pub fn kelvin_to_fahrenheit(kelvin: f64) -> f64 {
    (kelvin - 273.15) * 1.8 + 32.0
}

/// Each forecast list entry covers three hours.
pub fn lead_time_hours(slot_index: usize) -> u32 {
    u32::try_from(slot_index.saturating_add(1).saturating_mul(3)).unwrap_or(u32::MAX)
}

#[derive(Debug, Deserialize)]
struct ForecastPayload {
    list: Vec<ForecastEntry>,
}

#[derive(Debug, Deserialize)]
struct ForecastEntry {
    #[serde(default)]
    dt: Option<i64>,
    main: ForecastMain,
}

#[derive(Debug, Deserialize)]
struct ForecastMain {
    temp: f64,
    humidity: f64,
}

/// Decodes a 3-hour-step forecast document and picks `list[slot_index]`.
pub fn decode_forecast(body: &[u8], slot_index: usize) -> Result<ForecastSample, ForecastError> {
    let payload: ForecastPayload =
        serde_json::from_slice(body).map_err(|err| ForecastError::Malformed(err.to_string()))?;

    let entry = payload
        .list
        .get(slot_index)
        .ok_or(ForecastError::MissingSlot(slot_index))?;

    if !entry.main.temp.is_finite() || !entry.main.humidity.is_finite() {
        return Err(ForecastError::Malformed(
            "non-finite temperature or humidity".to_string(),
        ));
    }

    Ok(ForecastSample {
        temperature_f: kelvin_to_fahrenheit(entry.main.temp) as f32,
        humidity_pct: entry.main.humidity as f32,
        lead_time_hours: lead_time_hours(slot_index),
        valid_at: entry.dt.and_then(|epoch| DateTime::from_timestamp(epoch, 0)),
    })
}

/// Last-known-value cache for the forecast plus its refresh gate.
#[derive(Debug, Clone)]
pub struct ForecastTracker {
    refresh_interval_ms: u64,
    last_attempt_ms: Option<u64>,
    last_success_ms: Option<u64>,
    sample: Option<ForecastSample>,
    consecutive_failures: u32,
}

impl ForecastTracker {
    pub fn new(refresh_interval_ms: u64) -> Self {
        Self {
            refresh_interval_ms,
            last_attempt_ms: None,
            last_success_ms: None,
            sample: None,
            consecutive_failures: 0,
        }
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.last_attempt_ms
            .map(|last| now_ms.saturating_sub(last) > self.refresh_interval_ms)
            .unwrap_or(true)
    }

    /// Records a refresh attempt. Failures leave the previous sample in
    /// place and are handed back to the caller for logging.
    pub fn record(
        &mut self,
        result: Result<ForecastSample, ForecastError>,
        now_ms: u64,
    ) -> Result<(), ForecastError> {
        self.last_attempt_ms = Some(now_ms);
        match result {
            Ok(sample) => {
                self.sample = Some(sample);
                self.last_success_ms = Some(now_ms);
                self.consecutive_failures = 0;
                Ok(())
            }
            Err(err) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                Err(err)
            }
        }
    }

    pub fn sample(&self) -> Option<&ForecastSample> {
        self.sample.as_ref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn age_ms(&self, now_ms: u64) -> Option<u64> {
        self.last_success_ms.map(|last| now_ms.saturating_sub(last))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn trend(magnitude: TrendMagnitude, direction: TrendDirection) -> Option<Trend> {
        Some(Trend {
            magnitude,
            direction,
        })
    }

    #[test]
    fn no_change_has_no_offset_or_trend() {
        let estimate = estimate(72.5, 72.5, &TrendThresholds::default());
        assert_eq!(estimate.offset_f, 0.0);
        assert_eq!(estimate.trend, None);
    }

    #[test]
    fn twelve_degree_rise_is_moderate() {
        let estimate = estimate(70.0, 82.0, &TrendThresholds::default());
        assert_eq!(estimate.offset_f, 6.0);
        assert_eq!(
            estimate.trend,
            trend(TrendMagnitude::Moderate, TrendDirection::Increase)
        );
        assert_eq!(estimate.trend.unwrap().describe(), "moderate increase");
    }

    #[test]
    fn bands_are_symmetric_and_exclusive() {
        let thresholds = TrendThresholds::default();
        let cases = [
            (3.9, None),
            (4.0, None),
            (4.1, trend(TrendMagnitude::Minor, TrendDirection::Increase)),
            (8.0, trend(TrendMagnitude::Minor, TrendDirection::Increase)),
            (9.0, trend(TrendMagnitude::Moderate, TrendDirection::Increase)),
            (12.5, trend(TrendMagnitude::Substantial, TrendDirection::Increase)),
            (-5.0, trend(TrendMagnitude::Minor, TrendDirection::Decrease)),
            (-12.0, trend(TrendMagnitude::Moderate, TrendDirection::Decrease)),
            (-30.0, trend(TrendMagnitude::Substantial, TrendDirection::Decrease)),
        ];

        for (delta, expected) in cases {
            assert_eq!(estimate(60.0, 60.0 + delta, &thresholds).trend, expected, "{delta}");
        }
    }

    #[test]
    fn decrease_produces_negative_offset() {
        let estimate = estimate(80.0, 70.0, &TrendThresholds::default());
        assert_eq!(estimate.offset_f, -5.0);
    }

    #[test]
    fn humidity_advisory_uses_strict_bounds() {
        let thresholds = HumidityThresholds::default();
        assert_eq!(humidity_advisory(35.0, &thresholds), Some(HumidityAdvisory::Dry));
        assert_eq!(humidity_advisory(40.0, &thresholds), None);
        assert_eq!(humidity_advisory(62.0, &thresholds), None);
        assert_eq!(humidity_advisory(70.0, &thresholds), Some(HumidityAdvisory::Humid));
    }

    #[test]
    fn decodes_requested_slot() {
        let body = br#"{
            "cod": "200",
            "list": [
                {"dt": 1700000000, "main": {"temp": 290.0, "humidity": 50}},
                {"dt": 1700010800, "main": {"temp": 300.15, "humidity": 71}}
            ]
        }"#;

        let sample = decode_forecast(body, 1).unwrap();

        assert!((sample.temperature_f - 80.6).abs() < 0.01);
        assert_eq!(sample.humidity_pct, 71.0);
        assert_eq!(sample.lead_time_hours, 6);
        assert_eq!(
            sample.valid_at.map(|at| at.timestamp()),
            Some(1_700_010_800)
        );
    }

    #[test]
    fn missing_slot_is_reported() {
        let body = br#"{"list": [{"main": {"temp": 290.0, "humidity": 50}}]}"#;
        assert_eq!(decode_forecast(body, 7), Err(ForecastError::MissingSlot(7)));
    }

    #[test]
    fn error_document_is_malformed() {
        let body = br#"{"cod": "401", "message": "Invalid API key"}"#;
        assert!(matches!(
            decode_forecast(body, 0),
            Err(ForecastError::Malformed(_))
        ));
    }

    #[test]
    fn tracker_keeps_last_good_sample_on_failure() {
        let mut tracker = ForecastTracker::new(10_000);
        assert!(tracker.is_due(0));

        let good = ForecastSample {
            temperature_f: 68.0,
            humidity_pct: 45.0,
            lead_time_hours: 24,
            valid_at: None,
        };
        tracker.record(Ok(good), 1_000).unwrap();
        assert!(!tracker.is_due(11_000));
        assert!(tracker.is_due(11_001));

        let err = tracker
            .record(Err(ForecastError::HttpStatus(503)), 11_001)
            .unwrap_err();

        assert_eq!(err, ForecastError::HttpStatus(503));
        assert_eq!(tracker.sample(), Some(&good));
        assert_eq!(tracker.consecutive_failures(), 1);
        assert_eq!(tracker.age_ms(12_000), Some(11_000));
        assert!(!tracker.is_due(12_000));
    }
}
