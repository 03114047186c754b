use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Temperature,
    SoilMoisture,
    Light,
}

impl Metric {
    /// Order in which the alert state machine processes metrics each cycle.
    pub const EVALUATION_ORDER: [Metric; 3] = [Self::Temperature, Self::SoilMoisture, Self::Light];

    pub fn index(self) -> usize {
        match self {
            Self::Temperature => 0,
            Self::SoilMoisture => 1,
            Self::Light => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::SoilMoisture => "soilMoisture",
            Self::Light => "light",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "°F",
            Self::SoilMoisture | Self::Light => "%",
        }
    }

    pub fn out_of_range_message(self, classification: Classification) -> Option<&'static str> {
        match (self, classification) {
            (_, Classification::Within) => None,
            (Self::Temperature, Classification::Above) => Some("the temperature is too warm"),
            (Self::Temperature, Classification::Below) => Some("the temperature is too cold"),
            (Self::SoilMoisture, Classification::Above) => Some("the soil is too moist"),
            (Self::SoilMoisture, Classification::Below) => Some("the soil is too dry"),
            (Self::Light, Classification::Above) => Some("there is too much sunlight"),
            (Self::Light, Classification::Below) => Some("there is too little sunlight"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Below,
    Within,
    Above,
}

impl Classification {
    pub fn is_within(self) -> bool {
        self == Self::Within
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertState {
    #[default]
    Normal,
    OutOfRange,
}

/// The single shared audible channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum BuzzerState {
    #[default]
    Silent,
    Sounding {
        #[serde(rename = "frequencyHz")]
        frequency_hz: u32,
    },
}

/// Learned raw-value domain of one analog input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationRange {
    pub low: i32,
    pub high: i32,
}

impl CalibrationRange {
    pub fn new(low: i32, high: i32) -> Self {
        Self { low, high }
    }

    pub fn is_degenerate(&self) -> bool {
        self.low == self.high
    }
}

/// Raw value outside the learned calibration range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Drift {
    BelowRange,
    AboveRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub raw_value: i32,
    pub normalized_value: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift: Option<Drift>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComfortBand {
    pub floor: f32,
    pub ceiling: f32,
}

impl ComfortBand {
    pub const fn new(floor: f32, ceiling: f32) -> Self {
        Self { floor, ceiling }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastSample {
    pub temperature_f: f32,
    pub humidity_pct: f32,
    pub lead_time_hours: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimateReading {
    pub celsius: f32,
    pub relative_humidity_pct: f32,
}

impl ClimateReading {
    pub fn fahrenheit(&self) -> f32 {
        self.celsius * 1.8 + 32.0
    }
}

/// One cycle's worth of unprocessed sensor input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReadings {
    pub light_raw: i32,
    pub soil_raw: i32,
    pub climate: ClimateReading,
}
