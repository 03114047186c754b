use serde::{Deserialize, Serialize};

use crate::{
    calibration::CalibrationWindow,
    forecast::{lead_time_hours, HumidityThresholds, TrendThresholds},
    types::{ComfortBand, Metric},
};

/// Entries in a 5-day / 3-hour forecast document.
pub const FORECAST_SLOTS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricProfile {
    pub band: ComfortBand,
    pub tone_hz: u32,
}

/// Comfort band and buzzer tone for each monitored metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricProfiles {
    pub temperature: MetricProfile,
    pub soil_moisture: MetricProfile,
    pub light: MetricProfile,
}

impl MetricProfiles {
    pub fn get(&self, metric: Metric) -> &MetricProfile {
        match metric {
            Metric::Temperature => &self.temperature,
            Metric::SoilMoisture => &self.soil_moisture,
            Metric::Light => &self.light,
        }
    }

    fn profiles_mut(&mut self) -> [&mut MetricProfile; 3] {
        [
            &mut self.temperature,
            &mut self.soil_moisture,
            &mut self.light,
        ]
    }
}

impl Default for MetricProfiles {
    fn default() -> Self {
        Self {
            temperature: MetricProfile {
                band: ComfortBand::new(61.0, 76.0),
                tone_hz: 1_548,
            },
            soil_moisture: MetricProfile {
                band: ComfortBand::new(15.0, 85.0),
                tone_hz: 1_048,
            },
            light: MetricProfile {
                band: ComfortBand::new(17.0, 82.0),
                tone_hz: 2_048,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub calibration: CalibrationWindow,
    pub cycle_interval_ms: u64,
    pub forecast_refresh_ms: u64,
    pub buzzer_pulse_ms: u64,
    pub trend: TrendThresholds,
    pub humidity: HumidityThresholds,
    pub metrics: MetricProfiles,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            calibration: CalibrationWindow::default(),
            cycle_interval_ms: 5_000,
            forecast_refresh_ms: 10_000,
            buzzer_pulse_ms: 50,
            trend: TrendThresholds::default(),
            humidity: HumidityThresholds::default(),
            metrics: MetricProfiles::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub base_url: String,
    pub city: String,
    pub country_code: String,
    pub api_key: String,
    pub slot_index: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            base_url: "http://api.openweathermap.org/data/2.5/forecast".to_string(),
            city: "Irvine".to_string(),
            country_code: "US".to_string(),
            api_key: String::new(),
            slot_index: 7,
        }
    }
}

impl ForecastConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.city.is_empty()
    }

    pub fn lead_time_hours(&self) -> u32 {
        lead_time_hours(self.slot_index)
    }

    pub fn location_query(&self) -> String {
        if self.country_code.is_empty() {
            self.city.clone()
        } else {
            format!("{},{}", self.city, self.country_code)
        }
    }

    pub fn request_url(&self) -> String {
        format!(
            "{}?q={}&appid={}",
            self.base_url,
            self.location_query().replace(' ', "%20"),
            self.api_key
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            mqtt_host: String::new(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

impl NetworkConfig {
    pub fn telemetry_enabled(&self) -> bool {
        !self.mqtt_host.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PinConfig {
    pub soil_adc_channel: u32,
    pub light_adc_channel: u32,
    pub climate_sda_pin: i32,
    pub climate_scl_pin: i32,
    pub buzzer_pin: i32,
    pub soil_led_pin: i32,
    pub temperature_led_pin: i32,
    pub light_led_pin: i32,
}

impl Default for PinConfig {
    fn default() -> Self {
        // ADC1 channel 5 is GPIO33, channel 4 is GPIO32 on the ESP32.
        Self {
            soil_adc_channel: 5,
            light_adc_channel: 4,
            climate_sda_pin: 21,
            climate_scl_pin: 22,
            buzzer_pin: 15,
            soil_led_pin: 25,
            temperature_led_pin: 26,
            light_led_pin: 27,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub pins: PinConfig,
}

impl MonitorConfig {
    pub fn sanitize(&mut self) {
        if self.calibration.interval_ms == 0 {
            self.calibration.interval_ms = CalibrationWindow::default().interval_ms;
        }
        self.cycle_interval_ms = self.cycle_interval_ms.max(500);
        self.forecast_refresh_ms = self.forecast_refresh_ms.max(1_000);
        self.buzzer_pulse_ms = self.buzzer_pulse_ms.clamp(10, 1_000);

        for profile in self.metrics.profiles_mut() {
            if profile.band.floor > profile.band.ceiling {
                core::mem::swap(&mut profile.band.floor, &mut profile.band.ceiling);
            }
            profile.tone_hz = profile.tone_hz.clamp(100, 10_000);
        }

        let trend = &mut self.trend;
        if !(trend.minor_f <= trend.moderate_f && trend.moderate_f <= trend.substantial_f) {
            *trend = TrendThresholds::default();
        }

        if self.humidity.dry_below_pct > self.humidity.humid_above_pct {
            self.humidity = HumidityThresholds::default();
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.monitor.sanitize();
        if self.forecast.slot_index >= FORECAST_SLOTS {
            self.forecast.slot_index = FORECAST_SLOTS - 1;
        }
    }
}
