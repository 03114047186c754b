pub mod alert;
pub mod calibration;
pub mod config;
pub mod error;
pub mod forecast;
pub mod io;
pub mod monitor;
pub mod normalize;
pub mod threshold;
pub mod topics;
pub mod types;

pub use alert::{AlertAction, AlertEngine, AlertOutcome};
pub use calibration::{
    calibrate, CalibrationProgress, CalibrationWindow, Clock, MonotonicClock, RangeCalibrator,
};
pub use config::{
    ForecastConfig, MetricProfile, MetricProfiles, MonitorConfig, NetworkConfig, PinConfig,
    RuntimeConfig,
};
pub use error::{CalibrationError, ForecastError, MonitorError};
pub use forecast::{
    decode_forecast, estimate, humidity_advisory, ForecastEstimate, ForecastTracker,
    HumidityAdvisory, HumidityThresholds, Trend, TrendDirection, TrendMagnitude, TrendThresholds,
};
pub use io::{apply_actions, IndicatorSink, LastGood, SensorBus};
pub use monitor::{CycleReport, MetricVerdict, PlantMonitor};
pub use normalize::normalize;
pub use threshold::evaluate;
pub use topics::*;
pub use types::{
    AlertState, BuzzerState, CalibrationRange, Classification, ClimateReading, ComfortBand, Drift,
    ForecastSample, Metric, MetricSample, RawReadings,
};
