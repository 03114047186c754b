use std::{
    convert::Infallible,
    io::{ErrorKind, Read},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tracing::{debug, info, warn};

use plantiq_common::{
    apply_actions, decode_forecast, ClimateReading, Clock, CycleReport, ForecastConfig,
    ForecastError, ForecastSample, IndicatorSink, Metric, MonotonicClock, NetworkConfig,
    PlantMonitor, RuntimeConfig, SensorBus, TOPIC_MONITOR_REPORT, TOPIC_MONITOR_STATUS,
};

use crate::summary;

const DEFAULT_CONFIG_PATH: &str = "plantiq.json";
const FORECAST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_FORECAST_BODY: u64 = 256 * 1024;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("PLANTIQ_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut runtime = load_runtime_config(&config_path).await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from {}: {err:#}", config_path.display());
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut runtime, |key| std::env::var(key).ok());
    runtime.sanitize();

    let clock = MonotonicClock::new();
    let monitor = PlantMonitor::new(runtime.monitor.clone());
    let sensors = SimulatedSensors::default();

    info!(
        "calibrating light then soil for {} ms each; vary the light over the sensor now",
        runtime.monitor.calibration.duration_ms
    );
    let (mut monitor, mut sensors) = tokio::task::spawn_blocking(move || {
        let mut monitor = monitor;
        let mut sensors = sensors;
        let mut clock = clock;
        monitor
            .calibrate_sensors(&mut clock, &mut sensors, |metric, progress| {
                debug!(
                    "calibrating {} {}/{} ms: raw {} (low {}, high {})",
                    metric.as_str(),
                    progress.elapsed_ms,
                    progress.duration_ms,
                    progress.raw,
                    progress.low,
                    progress.high
                );
            })
            .map(|_| (monitor, sensors))
    })
    .await
    .context("calibration task panicked")?
    .context("sensor calibration failed")?;

    if let (Some(light), Some(soil)) = (monitor.light_range(), monitor.soil_range()) {
        info!(
            "calibration complete: light {}..={}, soil {}..={}",
            light.low, light.high, soil.low, soil.high
        );
    }

    let forecast = runtime.forecast.clone();
    let agent = ureq::AgentBuilder::new().timeout(FORECAST_TIMEOUT).build();
    if forecast.is_configured() {
        info!(
            "forecast source: {} ({} h ahead)",
            forecast.location_query(),
            forecast.lead_time_hours()
        );
    } else {
        warn!("forecast source not configured; temperature is evaluated without an offset");
    }

    let telemetry = Telemetry::connect(&runtime.network).await;
    let mut indicators = LogIndicators::default();
    let mut interval =
        tokio::time::interval(Duration::from_millis(runtime.monitor.cycle_interval_ms));

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }

        let now_ms = clock.now_ms();
        if forecast.is_configured() && monitor.forecast_due(now_ms) {
            let agent = agent.clone();
            let request = forecast.clone();
            let result = tokio::task::spawn_blocking(move || fetch_forecast(&agent, &request))
                .await
                .unwrap_or_else(|err| {
                    Err(ForecastError::Transport(format!("forecast task failed: {err}")))
                });

            match monitor.record_forecast(result, now_ms) {
                Ok(()) => {
                    if let Some(sample) = monitor.forecast().sample() {
                        info!(
                            "forecast refreshed: {:.1}°F, {:.0}% humidity in {} h",
                            sample.temperature_f, sample.humidity_pct, sample.lead_time_hours
                        );
                    }
                }
                Err(err) => match monitor.forecast().age_ms(now_ms) {
                    Some(age_ms) => warn!(
                        "forecast unavailable ({} consecutive), keeping sample from {} s ago: {err}",
                        monitor.forecast().consecutive_failures(),
                        age_ms / 1_000
                    ),
                    None => warn!("forecast unavailable, no offset applied yet: {err}"),
                },
            }
        }

        let readings = sensors.read_all();
        let report = monitor
            .evaluate(&readings)
            .context("cycle evaluation failed")?;

        log_report(&report);
        apply_actions(&mut indicators, &report.actions).unwrap_or_else(|never| match never {});

        if let Some(telemetry) = &telemetry {
            telemetry.publish_report(&report);
        }
    }

    Ok(())
}

async fn load_runtime_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!("no config at {}; using defaults", path.display());
            Ok(RuntimeConfig::default())
        }
        Err(err) => Err(err.into()),
    }
}

fn apply_env_overrides<F>(runtime: &mut RuntimeConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup("OWM_API_KEY") {
        runtime.forecast.api_key = key;
    }
    if let Some(city) = lookup("OWM_CITY") {
        runtime.forecast.city = city;
    }
    if let Some(host) = lookup("MQTT_HOST") {
        runtime.network.mqtt_host = host;
    }
    if let Some(port) = lookup("MQTT_PORT").and_then(|value| value.parse::<u16>().ok()) {
        runtime.network.mqtt_port = port;
    }
    if let Some(user) = lookup("MQTT_USER") {
        runtime.network.mqtt_user = user;
    }
    if let Some(pass) = lookup("MQTT_PASS") {
        runtime.network.mqtt_pass = pass;
    }
}

fn fetch_forecast(
    agent: &ureq::Agent,
    config: &ForecastConfig,
) -> Result<ForecastSample, ForecastError> {
    let response = match agent.get(&config.request_url()).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(code, _)) => return Err(ForecastError::HttpStatus(code)),
        Err(ureq::Error::Transport(err)) => return Err(ForecastError::Transport(err.to_string())),
    };

    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_FORECAST_BODY)
        .read_to_end(&mut body)
        .map_err(|err| ForecastError::Transport(err.to_string()))?;

    decode_forecast(&body, config.slot_index)
}

fn log_report(report: &CycleReport) {
    info!("{}", summary::cycle_line(report));
    for line in summary::alert_lines(report) {
        info!("{line}");
    }
    for line in summary::forecast_lines(report) {
        info!("{line}");
    }
    for line in summary::drift_lines(report) {
        warn!("{line}");
    }
    for metric in &report.pulsed {
        debug!("buzzer pulse for {}", metric.as_str());
    }
}

/// Deterministic stand-in for the analog and climate sensors.
#[derive(Debug, Default)]
struct SimulatedSensors {
    light_tick: u32,
    soil_tick: u32,
    climate_tick: u32,
}

impl SimulatedSensors {
    fn triangle(tick: u32, period: u32, low: i32, high: i32) -> i32 {
        let half = period / 2;
        let phase = tick % period;
        let step = if phase <= half { phase } else { period - phase };
        low + (high - low) * step as i32 / half as i32
    }
}

impl SensorBus for SimulatedSensors {
    fn read_light_raw(&mut self) -> i32 {
        self.light_tick = self.light_tick.wrapping_add(1);
        Self::triangle(self.light_tick, 40, 600, 3_400)
    }

    fn read_soil_raw(&mut self) -> i32 {
        self.soil_tick = self.soil_tick.wrapping_add(1);
        Self::triangle(self.soil_tick, 120, 1_400, 3_000)
    }

    fn read_climate(&mut self) -> ClimateReading {
        self.climate_tick = self.climate_tick.wrapping_add(1);
        ClimateReading {
            celsius: 19.0 + (self.climate_tick % 24) as f32 * 0.25,
            relative_humidity_pct: 42.0 + (self.climate_tick % 6) as f32 * 0.5,
        }
    }
}

/// Indicator sink that logs LED transitions and buzzer pulses.
#[derive(Debug, Default)]
struct LogIndicators {
    lit: [bool; 3],
}

impl IndicatorSink for LogIndicators {
    type Error = Infallible;

    fn set_indicator(&mut self, metric: Metric, on: bool) -> Result<(), Self::Error> {
        let slot = &mut self.lit[metric.index()];
        if *slot != on {
            info!("{} LED {}", metric.as_str(), if on { "on" } else { "off" });
            *slot = on;
        }
        Ok(())
    }

    fn sound_tone(&mut self, frequency_hz: u32, duration_ms: u64) -> Result<(), Self::Error> {
        debug!("buzzer {frequency_hz} Hz for {duration_ms} ms");
        Ok(())
    }

    fn silence(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

struct Telemetry {
    client: AsyncClient,
}

impl Telemetry {
    async fn connect(network: &NetworkConfig) -> Option<Self> {
        if !network.telemetry_enabled() {
            info!("mqtt host not configured; telemetry disabled");
            return None;
        }

        let mut options =
            MqttOptions::new("plantiq-monitor", network.mqtt_host.clone(), network.mqtt_port);
        options.set_keep_alive(Duration::from_secs(30));
        if !network.mqtt_user.is_empty() {
            options.set_credentials(network.mqtt_user.clone(), network.mqtt_pass.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 32);
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => info!("mqtt connected"),
                    Ok(_) => {}
                    Err(err) => {
                        warn!("mqtt poll error: {err}");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });

        if let Err(err) = client
            .publish(TOPIC_MONITOR_STATUS, QoS::AtLeastOnce, true, "online")
            .await
        {
            warn!("failed to publish monitor online status: {err}");
        }

        Some(Self { client })
    }

    fn publish_report(&self, report: &CycleReport) {
        let payload = match summary::telemetry_payload(report, Utc::now()) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("failed to encode cycle report: {err}");
                return;
            }
        };

        if let Err(err) = self
            .client
            .try_publish(TOPIC_MONITOR_REPORT, QoS::AtMostOnce, false, payload)
        {
            warn!("failed to queue cycle report: {err}");
        }
    }
}
