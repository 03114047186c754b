use core::convert::TryInto;
use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use chrono::Utc;
use embedded_aht20::{Aht20, DEFAULT_I2C_ADDRESS};
use embedded_svc::{
    http::{client::Client as HttpClient, Method, Status},
    io::Read,
    mqtt::client::QoS,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::Delay,
    gpio::{AnyIOPin, AnyOutputPin, Output, PinDriver},
    i2c::{I2cConfig, I2cDriver, I2C0},
    units::Hertz,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    mqtt::client::{EspMqttClient, EspMqttConnection, MqttClientConfiguration},
    nvs::{EspDefaultNvsPartition, EspNvs},
    sntp::EspSntp,
    sys::{self, EspError},
    wifi::{BlockingWifi, EspWifi},
};
use log::{debug, info, warn};

use plantiq_common::{
    apply_actions, decode_forecast, ClimateReading, Clock, CycleReport, ForecastConfig,
    ForecastError, ForecastSample, IndicatorSink, LastGood, Metric, MonotonicClock,
    NetworkConfig, PinConfig, PlantMonitor, RuntimeConfig, SensorBus, TOPIC_MONITOR_REPORT,
    TOPIC_MONITOR_STATUS,
};

use crate::summary;

const NVS_NAMESPACE: &str = "plantiq";
const NVS_RUNTIME_KEY: &str = "runtime_json";

const WATCHDOG_TIMEOUT_SEC: u32 = 60;
const WIFI_RESTART_GRACE_MS: u64 = 300_000;
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;

const CLIMATE_I2C_BAUDRATE: u32 = 100_000;
const CLIMATE_PROBE_ATTEMPTS: u32 = 3;
// AHT20 wants 40 ms after power-up and 80 ms per conversion.
const CLIMATE_SETTLE_MS: u64 = 100;
const ADC_SEED_ATTEMPTS: u32 = 10;
const ADC_SEED_RETRY_MS: u64 = 50;

const FORECAST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_FORECAST_BODY: usize = 32 * 1024;
const FORECAST_CHUNK_SIZE: usize = 1024;

const BUZZER_LEDC_MODE: sys::ledc_mode_t = sys::ledc_mode_t_LEDC_LOW_SPEED_MODE;
const BUZZER_LEDC_TIMER: sys::ledc_timer_t = sys::ledc_timer_t_LEDC_TIMER_0;
const BUZZER_LEDC_CHANNEL: sys::ledc_channel_t = sys::ledc_channel_t_LEDC_CHANNEL_0;
// Half of the 8-bit duty range: square wave.
const BUZZER_DUTY: u32 = 128;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut runtime = load_runtime_config(&nvs_partition).unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    apply_build_defaults(&mut runtime);
    runtime.sanitize();

    let Peripherals { modem, i2c0, .. } = Peripherals::take()?;

    // No evaluation is meaningful without the climate sensor: refuse to start.
    let mut climate = ClimateSensor::new(i2c0, &runtime.pins)
        .context("AHT20 climate sensor not detected; halting startup")?;
    let first_climate = climate
        .probe()
        .context("AHT20 climate sensor not answering; halting startup")?;
    info!(
        "climate sensor ready on SDA GPIO{} / SCL GPIO{}: {:.1}°C, {:.0}%",
        runtime.pins.climate_sda_pin,
        runtime.pins.climate_scl_pin,
        first_climate.celsius,
        first_climate.relative_humidity_pct
    );

    let analog = AnalogInputs::new(&runtime.pins).context("failed to configure ADC1")?;
    let mut sensors = BoardSensors::new(analog, climate, first_climate)?;
    let mut indicators =
        BoardIndicators::new(&runtime.pins).context("failed to configure indicators")?;

    let wifi = match connect_wifi(modem, sys_loop, nvs_partition, &runtime.network) {
        Ok(wifi) => Some(wifi),
        Err(err) => {
            warn!("wifi unavailable, running without forecast or telemetry: {err:#}");
            None
        }
    };
    let _sntp = if wifi.is_some() {
        EspSntp::new_default()
            .map_err(|err| warn!("failed to start SNTP: {err}"))
            .ok()
    } else {
        None
    };

    watch_main_task(WATCHDOG_TIMEOUT_SEC)?;

    let mut clock = WatchdogClock::default();
    let mut monitor = PlantMonitor::new(runtime.monitor.clone());

    info!(
        "calibrating light then soil for {} ms each",
        runtime.monitor.calibration.duration_ms
    );
    let (light, soil) = monitor
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
        .context("sensor calibration failed")?;
    info!(
        "calibration complete: light {}..={}, soil {}..={}",
        light.low, light.high, soil.low, soil.high
    );

    let mut mqtt = match (&wifi, runtime.network.telemetry_enabled()) {
        (Some(_), true) => match start_telemetry(&runtime.network) {
            Ok(client) => Some(client),
            Err(err) => {
                warn!("telemetry disabled: {err:#}");
                None
            }
        },
        _ => None,
    };

    let forecast_enabled = wifi.is_some() && runtime.forecast.is_configured();
    if !forecast_enabled {
        warn!("forecast source unavailable; temperature is evaluated without an offset");
    }

    let mut station = StationWatch::default();
    let cycle_slices = (runtime.monitor.cycle_interval_ms / 1_000).max(1);

    loop {
        feed_watchdog();
        if wifi.is_some() {
            station.check();
        }

        let now_ms = clock.now_ms();
        if forecast_enabled && monitor.forecast_due(now_ms) {
            let result = fetch_forecast(&runtime.forecast);
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
            feed_watchdog();
        }

        let readings = sensors.read_all();
        let report = monitor
            .evaluate(&readings)
            .context("cycle evaluation failed")?;

        log_report(&report);
        if let Err(err) = apply_actions(&mut indicators, &report.actions) {
            warn!("failed to drive indicators: {err:#}");
        }

        if let Some(client) = mqtt.as_mut() {
            publish_report(client, &report);
        }

        let slice_ms = runtime.monitor.cycle_interval_ms / cycle_slices;
        for _ in 0..cycle_slices {
            feed_watchdog();
            thread::sleep(Duration::from_millis(slice_ms));
        }
    }
}

fn apply_build_defaults(runtime: &mut RuntimeConfig) {
    if runtime.network.wifi_ssid.is_empty() {
        runtime.network.wifi_ssid = option_env!("WIFI_SSID").unwrap_or_default().to_string();
    }
    if runtime.network.wifi_pass.is_empty() {
        runtime.network.wifi_pass = option_env!("WIFI_PASS").unwrap_or_default().to_string();
    }
    if runtime.forecast.api_key.is_empty() {
        runtime.forecast.api_key = option_env!("OWM_API_KEY").unwrap_or_default().to_string();
    }
    if let Some(city) = option_env!("OWM_CITY") {
        if runtime.forecast.city.is_empty() {
            runtime.forecast.city = city.to_string();
        }
    }
}

fn load_runtime_config(partition: &EspDefaultNvsPartition) -> anyhow::Result<RuntimeConfig> {
    let nvs = EspNvs::new(partition.clone(), NVS_NAMESPACE, true)?;
    let mut buffer = vec![0_u8; 4096];

    match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
        Some(value) => Ok(serde_json::from_str::<RuntimeConfig>(value)?),
        None => Ok(RuntimeConfig::default()),
    }
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
}

fn fetch_forecast(config: &ForecastConfig) -> Result<ForecastSample, ForecastError> {
    let http_conf = HttpClientConfiguration {
        timeout: Some(FORECAST_TIMEOUT),
        crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
        ..Default::default()
    };
    let connection = EspHttpConnection::new(&http_conf).map_err(transport_error)?;
    let mut client = HttpClient::wrap(connection);

    let url = config.request_url();
    let request = client
        .request(Method::Get, &url, &[("accept", "application/json")])
        .map_err(transport_error)?;
    let mut response = request.submit().map_err(transport_error)?;

    let status = response.status();
    if !(200..300).contains(&status) {
        return Err(ForecastError::HttpStatus(status));
    }

    let mut body = Vec::with_capacity(FORECAST_CHUNK_SIZE * 16);
    let mut chunk = [0_u8; FORECAST_CHUNK_SIZE];
    loop {
        let read = response.read(&mut chunk).map_err(transport_error)?;
        if read == 0 {
            break;
        }
        if body.len() + read > MAX_FORECAST_BODY {
            return Err(ForecastError::Malformed(format!(
                "payload exceeds {MAX_FORECAST_BODY} bytes"
            )));
        }
        body.extend_from_slice(&chunk[..read]);
    }

    decode_forecast(&body, config.slot_index)
}

fn transport_error<E: core::fmt::Debug>(err: E) -> ForecastError {
    ForecastError::Transport(format!("{err:?}"))
}

/// Monotonic clock that keeps the task watchdog fed while calibration blocks.
#[derive(Default)]
struct WatchdogClock {
    inner: MonotonicClock,
}

impl Clock for WatchdogClock {
    fn now_ms(&self) -> u64 {
        self.inner.now_ms()
    }

    fn delay_ms(&mut self, ms: u64) {
        feed_watchdog();
        self.inner.delay_ms(ms);
    }
}

/// ADC1 oneshot unit with the light and soil channels configured.
struct AnalogInputs {
    handle: sys::adc_oneshot_unit_handle_t,
    light_channel: sys::adc_channel_t,
    soil_channel: sys::adc_channel_t,
}

impl AnalogInputs {
    fn new(pins: &PinConfig) -> anyhow::Result<Self> {
        let init_cfg = sys::adc_oneshot_unit_init_cfg_t {
            unit_id: sys::adc_unit_t_ADC_UNIT_1,
            ulp_mode: sys::adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
            ..Default::default()
        };
        let mut handle: sys::adc_oneshot_unit_handle_t = core::ptr::null_mut();
        // SAFETY: called once at boot; the handle is owned by this struct.
        EspError::convert(unsafe { sys::adc_oneshot_new_unit(&init_cfg, &mut handle) })
            .context("adc_oneshot_new_unit")?;

        let chan_cfg = sys::adc_oneshot_chan_cfg_t {
            atten: sys::adc_atten_t_ADC_ATTEN_DB_12,
            bitwidth: sys::adc_bitwidth_t_ADC_BITWIDTH_12,
        };
        for channel in [pins.light_adc_channel, pins.soil_adc_channel] {
            // SAFETY: handle was created above and is not shared.
            EspError::convert(unsafe {
                sys::adc_oneshot_config_channel(handle, channel, &chan_cfg)
            })
            .with_context(|| format!("adc_oneshot_config_channel({channel})"))?;
        }

        info!(
            "ADC1 configured (light CH{}, soil CH{})",
            pins.light_adc_channel, pins.soil_adc_channel
        );
        Ok(Self {
            handle,
            light_channel: pins.light_adc_channel,
            soil_channel: pins.soil_adc_channel,
        })
    }

    fn read(&self, channel: sys::adc_channel_t) -> Option<i32> {
        let mut raw: i32 = 0;
        // SAFETY: single-threaded access from the main loop.
        let rc = unsafe { sys::adc_oneshot_read(self.handle, channel, &mut raw) };
        (rc == sys::ESP_OK as sys::esp_err_t).then_some(raw)
    }

    fn seed(&self, channel: sys::adc_channel_t, name: &str) -> anyhow::Result<LastGood<i32>> {
        LastGood::seed(
            ADC_SEED_ATTEMPTS,
            || self.read(channel),
            |attempt| {
                warn!("{name} ADC read {attempt}/{ADC_SEED_ATTEMPTS} failed");
                thread::sleep(Duration::from_millis(ADC_SEED_RETRY_MS));
            },
        )
        .ok_or_else(|| anyhow!("{name} ADC channel {channel} never returned a sample"))
    }
}

/// AHT20 temperature and humidity sensor on I2C0.
struct ClimateSensor {
    aht20: Aht20<I2cDriver<'static>, Delay>,
}

impl ClimateSensor {
    fn new(i2c: I2C0, pins: &PinConfig) -> anyhow::Result<Self> {
        let (sda, scl) = (pins.climate_sda_pin, pins.climate_scl_pin);
        if sda < 0 || scl < 0 || sda == scl {
            return Err(anyhow!("invalid climate sensor pins: SDA {sda}, SCL {scl}"));
        }

        let config = I2cConfig::new().baudrate(Hertz(CLIMATE_I2C_BAUDRATE));
        // SAFETY: the pin numbers come from configuration and are not claimed elsewhere.
        let (sda_pin, scl_pin) = unsafe { (AnyIOPin::new(sda), AnyIOPin::new(scl)) };
        let bus = I2cDriver::new(i2c, sda_pin, scl_pin, &config)
            .with_context(|| format!("failed to start I2C on SDA GPIO{sda} / SCL GPIO{scl}"))?;

        thread::sleep(Duration::from_millis(CLIMATE_SETTLE_MS));
        let aht20 = Aht20::new(bus, DEFAULT_I2C_ADDRESS, Delay::new_default())
            .map_err(|err| anyhow!("AHT20 at 0x{DEFAULT_I2C_ADDRESS:02x}: {err:?}"))?;

        Ok(Self { aht20 })
    }

    fn read(&mut self) -> anyhow::Result<ClimateReading> {
        let reading = self
            .aht20
            .measure()
            .map_err(|err| anyhow!("AHT20 measurement failed: {err:?}"))?;

        Ok(ClimateReading {
            celsius: reading.temperature.celcius(),
            relative_humidity_pct: reading.relative_humidity,
        })
    }

    fn probe(&mut self) -> anyhow::Result<ClimateReading> {
        let mut last_err = None;
        for attempt in 1..=CLIMATE_PROBE_ATTEMPTS {
            match self.read() {
                Ok(reading) => return Ok(reading),
                Err(err) => {
                    warn!("climate probe {attempt}/{CLIMATE_PROBE_ATTEMPTS} failed: {err:#}");
                    last_err = Some(err);
                }
            }
            thread::sleep(Duration::from_millis(CLIMATE_SETTLE_MS));
        }
        Err(last_err.unwrap_or_else(|| anyhow!("climate sensor never answered")))
    }
}

/// Real sensors; a failed read repeats the last good value.
struct BoardSensors {
    analog: AnalogInputs,
    climate: ClimateSensor,
    light: LastGood<i32>,
    soil: LastGood<i32>,
    last_climate: LastGood<ClimateReading>,
}

impl BoardSensors {
    /// Waits for one real sample per ADC channel so calibration never starts
    /// from a made-up value.
    fn new(
        analog: AnalogInputs,
        climate: ClimateSensor,
        first_climate: ClimateReading,
    ) -> anyhow::Result<Self> {
        let light = analog.seed(analog.light_channel, "light")?;
        let soil = analog.seed(analog.soil_channel, "soil")?;
        debug!("first ADC samples: light {}, soil {}", light.get(), soil.get());

        Ok(Self {
            analog,
            climate,
            light,
            soil,
            last_climate: LastGood::new(first_climate),
        })
    }
}

impl SensorBus for BoardSensors {
    fn read_light_raw(&mut self) -> i32 {
        let fresh = self.analog.read(self.analog.light_channel);
        if fresh.is_none() {
            warn!("light ADC read failed; reusing {}", self.light.get());
        }
        self.light.update(fresh)
    }

    fn read_soil_raw(&mut self) -> i32 {
        let fresh = self.analog.read(self.analog.soil_channel);
        if fresh.is_none() {
            warn!("soil ADC read failed; reusing {}", self.soil.get());
        }
        self.soil.update(fresh)
    }

    fn read_climate(&mut self) -> ClimateReading {
        let fresh = self
            .climate
            .read()
            .map_err(|err| warn!("{err:#}; reusing last climate reading"))
            .ok();
        self.last_climate.update(fresh)
    }
}

/// Three LEDs in `Metric::index` order and the LEDC-driven buzzer.
struct BoardIndicators {
    leds: [PinDriver<'static, AnyOutputPin, Output>; 3],
}

impl BoardIndicators {
    fn new(pins: &PinConfig) -> anyhow::Result<Self> {
        let leds = [
            output_pin(pins.temperature_led_pin)?,
            output_pin(pins.soil_led_pin)?,
            output_pin(pins.light_led_pin)?,
        ];

        let timer = sys::ledc_timer_config_t {
            speed_mode: BUZZER_LEDC_MODE,
            timer_num: BUZZER_LEDC_TIMER,
            duty_resolution: sys::ledc_timer_bit_t_LEDC_TIMER_8_BIT,
            freq_hz: 2_000,
            clk_cfg: sys::soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
            ..Default::default()
        };
        // SAFETY: configured once at boot from the main task.
        EspError::convert(unsafe { sys::ledc_timer_config(&timer) })
            .context("ledc_timer_config")?;

        let channel = sys::ledc_channel_config_t {
            speed_mode: BUZZER_LEDC_MODE,
            channel: BUZZER_LEDC_CHANNEL,
            timer_sel: BUZZER_LEDC_TIMER,
            gpio_num: pins.buzzer_pin,
            duty: 0,
            hpoint: 0,
            ..Default::default()
        };
        EspError::convert(unsafe { sys::ledc_channel_config(&channel) })
            .context("ledc_channel_config")?;

        info!(
            "indicators ready: LEDs GPIO{}/{}/{}, buzzer GPIO{}",
            pins.temperature_led_pin, pins.soil_led_pin, pins.light_led_pin, pins.buzzer_pin
        );
        Ok(Self { leds })
    }

    fn set_buzzer_duty(&mut self, duty: u32) -> Result<(), EspError> {
        // SAFETY: the channel was configured in `new`; only the main loop writes it.
        EspError::convert(unsafe {
            sys::ledc_set_duty(BUZZER_LEDC_MODE, BUZZER_LEDC_CHANNEL, duty)
        })?;
        EspError::convert(unsafe { sys::ledc_update_duty(BUZZER_LEDC_MODE, BUZZER_LEDC_CHANNEL) })
    }
}

impl IndicatorSink for BoardIndicators {
    type Error = anyhow::Error;

    fn set_indicator(&mut self, metric: Metric, on: bool) -> Result<(), Self::Error> {
        let led = &mut self.leds[metric.index()];
        if on {
            led.set_high()?;
        } else {
            led.set_low()?;
        }
        Ok(())
    }

    fn sound_tone(&mut self, frequency_hz: u32, duration_ms: u64) -> Result<(), Self::Error> {
        EspError::convert(unsafe {
            sys::ledc_set_freq(BUZZER_LEDC_MODE, BUZZER_LEDC_TIMER, frequency_hz)
        })
        .with_context(|| format!("ledc_set_freq({frequency_hz})"))?;
        self.set_buzzer_duty(BUZZER_DUTY)?;
        thread::sleep(Duration::from_millis(duration_ms));
        Ok(())
    }

    fn silence(&mut self) -> Result<(), Self::Error> {
        self.set_buzzer_duty(0)?;
        Ok(())
    }
}

fn output_pin(gpio: i32) -> anyhow::Result<PinDriver<'static, AnyOutputPin, Output>> {
    // SAFETY: the pin number comes from configuration and is not claimed elsewhere.
    let mut pin = unsafe { PinDriver::output(AnyOutputPin::new(gpio)) }
        .with_context(|| format!("failed to claim GPIO{gpio}"))?;
    pin.set_low()?;
    Ok(pin)
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    if network.wifi_ssid.trim().is_empty() {
        return Err(anyhow!("wifi credentials missing"));
    }

    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("joining `{}`", network.wifi_ssid);

    let mut attempt = 1;
    loop {
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("station up after {attempt} attempt(s)");
                return Ok(esp_wifi);
            }
            Err(err) if attempt < WIFI_CONNECT_ATTEMPTS => {
                warn!("join attempt {attempt}/{WIFI_CONNECT_ATTEMPTS} failed: {err}");
                let _ = wifi.disconnect();
                thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
                attempt += 1;
            }
            Err(err) => {
                let _ = wifi.stop();
                return Err(anyhow::Error::from(err)
                    .context(format!("could not join `{}`", network.wifi_ssid)));
            }
        }
    }
}

fn start_telemetry(network: &NetworkConfig) -> anyhow::Result<EspMqttClient<'static>> {
    let (mut client, mut conn) = create_mqtt_client(network)?;

    thread::Builder::new()
        .name("mqtt-poll".to_string())
        .stack_size(6144)
        .spawn(move || loop {
            if let Err(err) = conn.next() {
                warn!("mqtt poll error: {err:?}");
                thread::sleep(Duration::from_secs(2));
            }
        })
        .context("failed to spawn mqtt thread")?;

    if let Err(err) = client.publish(TOPIC_MONITOR_STATUS, QoS::AtLeastOnce, true, b"online") {
        warn!("failed to publish monitor online status: {err:?}");
    }
    Ok(client)
}

fn create_mqtt_client(
    network: &NetworkConfig,
) -> anyhow::Result<(EspMqttClient<'static>, EspMqttConnection)> {
    let url = format!("mqtt://{}:{}", network.mqtt_host, network.mqtt_port);

    let conf = MqttClientConfiguration {
        client_id: Some("plantiq-monitor"),
        username: (!network.mqtt_user.is_empty()).then_some(network.mqtt_user.as_str()),
        password: (!network.mqtt_pass.is_empty()).then_some(network.mqtt_pass.as_str()),
        ..Default::default()
    };

    Ok(EspMqttClient::new(&url, &conf)?)
}

fn publish_report(client: &mut EspMqttClient<'static>, report: &CycleReport) {
    let payload = match summary::telemetry_payload(report, Utc::now()) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("failed to encode cycle report: {err}");
            return;
        }
    };

    if let Err(err) = client.enqueue(TOPIC_MONITOR_REPORT, QoS::AtMostOnce, false, &payload) {
        warn!("failed to queue cycle report: {err:?}");
    }
}

/// Arms the task watchdog and subscribes the calling task to it.
fn watch_main_task(timeout_sec: u32) -> anyhow::Result<()> {
    let config = sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1_000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    // SAFETY: plain ESP-IDF calls; a watchdog armed by the bootloader reports
    // ESP_ERR_INVALID_STATE, which is fine.
    for (name, rc) in [
        ("esp_task_wdt_init", unsafe { sys::esp_task_wdt_init(&config) }),
        ("esp_task_wdt_add", unsafe { sys::esp_task_wdt_add(core::ptr::null_mut()) }),
    ] {
        if rc != sys::ESP_OK && rc != sys::ESP_ERR_INVALID_STATE {
            return Err(anyhow!("{name} returned {rc}"));
        }
    }
    Ok(())
}

fn feed_watchdog() {
    // SAFETY: resets the watchdog entry of the calling task only.
    let _ = unsafe { sys::esp_task_wdt_reset() };
}

/// Restarts the board once the station has been down for too long.
#[derive(Default)]
struct StationWatch {
    down_since: Option<Instant>,
}

impl StationWatch {
    fn check(&mut self) {
        let mut ap = sys::wifi_ap_record_t::default();
        // SAFETY: `ap` outlives the call.
        let associated = unsafe { sys::esp_wifi_sta_get_ap_info(&mut ap) } == sys::ESP_OK;
        if associated {
            if self.down_since.take().is_some() {
                info!("station link restored");
            }
            return;
        }

        let down_since = *self.down_since.get_or_insert_with(Instant::now);
        let down_ms = u64::try_from(down_since.elapsed().as_millis()).unwrap_or(u64::MAX);
        if down_ms >= WIFI_RESTART_GRACE_MS {
            warn!("station down for {} s; restarting", down_ms / 1_000);
            thread::sleep(Duration::from_millis(100));
            // SAFETY: does not return.
            unsafe { sys::esp_restart() };
        }
    }
}
