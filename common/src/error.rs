use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalibrationError {
    #[error("calibration window produced no samples")]
    NoSamples,
    #[error("calibration sample interval must be non-zero")]
    InvalidWindow,
}

/// Every way a forecast refresh can fail. All of them map to
/// "forecast unavailable": the last good sample stays in use.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForecastError {
    #[error("forecast transport failed: {0}")]
    Transport(String),
    #[error("forecast request returned HTTP {0}")]
    HttpStatus(u16),
    #[error("forecast payload is malformed: {0}")]
    Malformed(String),
    #[error("forecast payload has no entry at slot {0}")]
    MissingSlot(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("{0} sensor has not been calibrated")]
    NotCalibrated(&'static str),
}
