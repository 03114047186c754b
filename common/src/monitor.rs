use serde::Serialize;

use crate::{
    alert::{AlertAction, AlertEngine},
    calibration::{calibrate, CalibrationProgress, Clock},
    config::MonitorConfig,
    error::{CalibrationError, ForecastError, MonitorError},
    forecast::{estimate, humidity_advisory, ForecastTracker, HumidityAdvisory, Trend},
    io::SensorBus,
    normalize,
    threshold::evaluate,
    types::{
        AlertState, CalibrationRange, Classification, ForecastSample, Metric, MetricSample,
        RawReadings,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricVerdict {
    pub metric: Metric,
    pub value: f32,
    pub classification: Classification,
    pub state: AlertState,
}

/// Everything one evaluation cycle observed and decided.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub cycle: u64,
    pub temperature_c: f32,
    pub temperature_f: f32,
    pub adjusted_temperature_f: f32,
    pub air_humidity_pct: f32,
    pub light: MetricSample,
    pub soil: MetricSample,
    pub forecast: Option<ForecastSample>,
    pub forecast_offset_f: f32,
    pub trend: Option<Trend>,
    pub humidity_advisory: Option<HumidityAdvisory>,
    pub verdicts: Vec<MetricVerdict>,
    pub actions: Vec<AlertAction>,
    pub pulsed: Vec<Metric>,
}

/// Cycle controller: owns calibration ranges, the forecast cache and the
/// alert state machine for one plant.
#[derive(Debug, Clone)]
pub struct PlantMonitor {
    config: MonitorConfig,
    light_range: Option<CalibrationRange>,
    soil_range: Option<CalibrationRange>,
    forecast: ForecastTracker,
    alerts: AlertEngine,
    cycles: u64,
}

impl PlantMonitor {
    pub fn new(mut config: MonitorConfig) -> Self {
        config.sanitize();
        Self {
            forecast: ForecastTracker::new(config.forecast_refresh_ms),
            alerts: AlertEngine::new(config.metrics, config.buzzer_pulse_ms),
            light_range: None,
            soil_range: None,
            cycles: 0,
            config,
        }
    }

    pub fn calibrate_light<C, F, P>(
        &mut self,
        clock: &mut C,
        sample: F,
        on_progress: P,
    ) -> Result<CalibrationRange, CalibrationError>
    where
        C: Clock,
        F: FnMut() -> i32,
        P: FnMut(&CalibrationProgress),
    {
        let range = calibrate(clock, self.config.calibration, sample, on_progress)?;
        self.light_range = Some(range);
        Ok(range)
    }

    pub fn calibrate_soil<C, F, P>(
        &mut self,
        clock: &mut C,
        sample: F,
        on_progress: P,
    ) -> Result<CalibrationRange, CalibrationError>
    where
        C: Clock,
        F: FnMut() -> i32,
        P: FnMut(&CalibrationProgress),
    {
        let range = calibrate(clock, self.config.calibration, sample, on_progress)?;
        self.soil_range = Some(range);
        Ok(range)
    }

    /// Startup calibration phase: light first, then soil. Blocks for two
    /// full windows; nothing is evaluated until both ranges exist.
    pub fn calibrate_sensors<C, S, P>(
        &mut self,
        clock: &mut C,
        sensors: &mut S,
        mut on_progress: P,
    ) -> Result<(CalibrationRange, CalibrationRange), CalibrationError>
    where
        C: Clock,
        S: SensorBus,
        P: FnMut(Metric, &CalibrationProgress),
    {
        let light = self.calibrate_light(
            clock,
            || sensors.read_light_raw(),
            |progress| on_progress(Metric::Light, progress),
        )?;
        let soil = self.calibrate_soil(
            clock,
            || sensors.read_soil_raw(),
            |progress| on_progress(Metric::SoilMoisture, progress),
        )?;
        Ok((light, soil))
    }

    pub fn light_range(&self) -> Option<CalibrationRange> {
        self.light_range
    }

    pub fn soil_range(&self) -> Option<CalibrationRange> {
        self.soil_range
    }

    pub fn is_calibrated(&self) -> bool {
        self.light_range.is_some() && self.soil_range.is_some()
    }

    pub fn forecast_due(&self, now_ms: u64) -> bool {
        self.forecast.is_due(now_ms)
    }

    pub fn record_forecast(
        &mut self,
        result: Result<ForecastSample, ForecastError>,
        now_ms: u64,
    ) -> Result<(), ForecastError> {
        self.forecast.record(result, now_ms)
    }

    pub fn forecast(&self) -> &ForecastTracker {
        &self.forecast
    }

    /// Runs one full evaluation cycle over fresh readings.
    ///
    /// The forecast offset only exists for the duration of this call, so a
    /// failed refresh can never carry an old offset into the next cycle.
    /// Before the first successful fetch no offset is applied.
    pub fn evaluate(&mut self, readings: &RawReadings) -> Result<CycleReport, MonitorError> {
        let light_range = self.light_range.ok_or(MonitorError::NotCalibrated("light"))?;
        let soil_range = self.soil_range.ok_or(MonitorError::NotCalibrated("soil"))?;

        let light = normalize::sample(readings.light_raw, light_range, false);
        let soil = normalize::sample(readings.soil_raw, soil_range, true);

        let temperature_f = readings.climate.fahrenheit();
        let forecast = self.forecast.sample().copied();

        let blend = forecast
            .map(|sample| estimate(temperature_f, sample.temperature_f, &self.config.trend));
        let forecast_offset_f = blend.map(|b| b.offset_f).unwrap_or(0.0);
        let advisory = forecast
            .and_then(|sample| humidity_advisory(sample.humidity_pct, &self.config.humidity));

        let adjusted_temperature_f = temperature_f + forecast_offset_f;
        let metrics = &self.config.metrics;
        let classifications = [
            (
                Metric::Temperature,
                adjusted_temperature_f,
                evaluate(adjusted_temperature_f, metrics.temperature.band),
            ),
            (
                Metric::SoilMoisture,
                soil.normalized_value,
                evaluate(soil.normalized_value, metrics.soil_moisture.band),
            ),
            (
                Metric::Light,
                light.normalized_value,
                evaluate(light.normalized_value, metrics.light.band),
            ),
        ];

        let order = classifications.map(|(metric, _, classification)| (metric, classification));
        let outcome = self.alerts.run_cycle(&order);

        let verdicts = classifications
            .iter()
            .map(|&(metric, value, classification)| MetricVerdict {
                metric,
                value,
                classification,
                state: self.alerts.state(metric),
            })
            .collect();

        self.cycles = self.cycles.saturating_add(1);

        Ok(CycleReport {
            cycle: self.cycles,
            temperature_c: readings.climate.celsius,
            temperature_f,
            adjusted_temperature_f,
            air_humidity_pct: readings.climate.relative_humidity_pct,
            light,
            soil,
            forecast,
            forecast_offset_f,
            trend: blend.and_then(|b| b.trend),
            humidity_advisory: advisory,
            verdicts,
            actions: outcome.actions,
            pulsed: outcome.pulsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        calibration::tests::{scripted, FakeClock},
        forecast::{TrendDirection, TrendMagnitude},
        types::{ClimateReading, Drift},
    };

    fn calibrated_monitor() -> PlantMonitor {
        let mut monitor = PlantMonitor::new(MonitorConfig::default());
        let mut clock = FakeClock::default();
        monitor
            .calibrate_light(&mut clock, scripted(&[400, 2_400, 1_400]), |_| {})
            .unwrap();
        monitor
            .calibrate_soil(&mut clock, scripted(&[1_200, 3_200]), |_| {})
            .unwrap();
        monitor
    }

    fn readings(light_raw: i32, soil_raw: i32, celsius: f32) -> RawReadings {
        RawReadings {
            light_raw,
            soil_raw,
            climate: ClimateReading {
                celsius,
                relative_humidity_pct: 45.0,
            },
        }
    }

    fn forecast(temperature_f: f32, humidity_pct: f32) -> ForecastSample {
        ForecastSample {
            temperature_f,
            humidity_pct,
            lead_time_hours: 24,
            valid_at: None,
        }
    }

    struct RampSensors {
        light: i32,
        soil: i32,
    }

    impl SensorBus for RampSensors {
        fn read_light_raw(&mut self) -> i32 {
            self.light += 100;
            self.light
        }

        fn read_soil_raw(&mut self) -> i32 {
            self.soil -= 50;
            self.soil
        }

        fn read_climate(&mut self) -> ClimateReading {
            ClimateReading {
                celsius: 21.0,
                relative_humidity_pct: 50.0,
            }
        }
    }

    #[test]
    fn calibrates_light_then_soil_from_sensor_bus() {
        let mut monitor = PlantMonitor::new(MonitorConfig::default());
        let mut clock = FakeClock::default();
        let mut sensors = RampSensors {
            light: 0,
            soil: 3_000,
        };
        let mut phases = Vec::new();

        let (light, soil) = monitor
            .calibrate_sensors(&mut clock, &mut sensors, |metric, _| phases.push(metric))
            .unwrap();

        // 21 samples per window.
        assert_eq!(light, CalibrationRange::new(100, 2_100));
        assert_eq!(soil, CalibrationRange::new(1_950, 2_950));
        assert_eq!(phases.len(), 42);
        assert_eq!(phases[0], Metric::Light);
        assert_eq!(phases[41], Metric::SoilMoisture);
        assert!(monitor.is_calibrated());
    }

    #[test]
    fn refuses_to_evaluate_before_calibration() {
        let mut monitor = PlantMonitor::new(MonitorConfig::default());
        assert_eq!(
            monitor.evaluate(&readings(0, 0, 20.0)),
            Err(MonitorError::NotCalibrated("light"))
        );
    }

    #[test]
    fn calibration_learns_both_ranges() {
        let monitor = calibrated_monitor();
        assert_eq!(monitor.light_range(), Some(CalibrationRange::new(400, 2_400)));
        assert_eq!(monitor.soil_range(), Some(CalibrationRange::new(1_200, 3_200)));
        assert!(monitor.is_calibrated());
    }

    #[test]
    fn comfortable_plant_raises_no_alert() {
        let mut monitor = calibrated_monitor();
        // light 50 %, soil raw 2200 -> 50 % dryness -> 50 % moisture, 21.1 C ~ 70 F
        let report = monitor.evaluate(&readings(1_400, 2_200, 21.1)).unwrap();

        assert_eq!(report.light.normalized_value, 50.0);
        assert_eq!(report.soil.normalized_value, 50.0);
        assert!(report
            .verdicts
            .iter()
            .all(|verdict| verdict.classification == Classification::Within));
        assert!(report.pulsed.is_empty());
        assert_eq!(report.forecast_offset_f, 0.0);
        assert_eq!(report.cycle, 1);
    }

    #[test]
    fn soil_is_reported_as_moisture() {
        let mut monitor = calibrated_monitor();
        // Near the dry end of the raw range: 5 % moisture.
        let report = monitor.evaluate(&readings(1_400, 3_100, 21.1)).unwrap();

        assert_eq!(report.soil.normalized_value, 5.0);
        assert_eq!(report.verdicts[1].classification, Classification::Below);
        assert_eq!(report.verdicts[1].state, AlertState::OutOfRange);
    }

    #[test]
    fn forecast_offset_shifts_temperature_evaluation() {
        let mut monitor = calibrated_monitor();
        monitor.record_forecast(Ok(forecast(90.0, 50.0)), 0).unwrap();

        // 22 C = 71.6 F, forecast 90 F -> offset 9.2 -> adjusted 80.8 F: too warm.
        let report = monitor.evaluate(&readings(1_400, 2_200, 22.0)).unwrap();

        assert!((report.forecast_offset_f - 9.2).abs() < 0.01);
        assert_eq!(report.verdicts[0].classification, Classification::Above);
        assert_eq!(
            report.trend,
            Some(Trend {
                magnitude: TrendMagnitude::Substantial,
                direction: TrendDirection::Increase,
            })
        );
        assert_eq!(report.pulsed, vec![Metric::Temperature]);
        // Display temperature is left unadjusted.
        assert!((report.temperature_f - 71.6).abs() < 0.01);
    }

    #[test]
    fn failed_refresh_reuses_last_sample() {
        let mut monitor = calibrated_monitor();
        monitor.record_forecast(Ok(forecast(75.0, 30.0)), 0).unwrap();
        let _ = monitor.record_forecast(Err(ForecastError::Transport("timeout".into())), 20_000);

        let first = monitor.evaluate(&readings(1_400, 2_200, 21.0)).unwrap();
        let second = monitor.evaluate(&readings(1_400, 2_200, 21.0)).unwrap();

        assert_eq!(first.forecast, Some(forecast(75.0, 30.0)));
        assert_eq!(first.forecast_offset_f, second.forecast_offset_f);
        assert_eq!(first.humidity_advisory, Some(HumidityAdvisory::Dry));
    }

    #[test]
    fn drift_is_exposed_but_clamped() {
        let mut monitor = calibrated_monitor();
        let report = monitor.evaluate(&readings(3_000, 2_200, 21.1)).unwrap();

        assert_eq!(report.light.normalized_value, 100.0);
        assert_eq!(report.light.drift, Some(Drift::AboveRange));
        assert_eq!(report.verdicts[2].classification, Classification::Above);
    }

    #[test]
    fn zero_variance_calibration_does_not_fault() {
        let mut monitor = PlantMonitor::new(MonitorConfig::default());
        let mut clock = FakeClock::default();
        monitor.calibrate_light(&mut clock, || 900, |_| {}).unwrap();
        monitor.calibrate_soil(&mut clock, || 900, |_| {}).unwrap();

        let report = monitor.evaluate(&readings(900, 900, 21.1)).unwrap();

        assert_eq!(report.light.normalized_value, 0.0);
        assert_eq!(report.soil.normalized_value, 100.0);
    }

    #[test]
    fn report_serializes_to_camel_case_json() {
        let mut monitor = calibrated_monitor();
        let report = monitor.evaluate(&readings(100, 2_200, 21.1)).unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["pulsed"], serde_json::json!(["light"]));
        assert_eq!(json["light"]["drift"], "belowRange");
        assert_eq!(json["verdicts"][2]["classification"], "BELOW");
        assert_eq!(json["actions"][0]["action"], "setIndicator");
    }
}
