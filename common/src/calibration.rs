//! Startup range learning for the analog sensors.
//!
//! A calibration phase samples one input at a fixed cadence for a fixed
//! window and keeps the running minimum and maximum. There is no smoothing
//! or outlier rejection: one spurious extreme skews the range for the whole
//! session.

use std::{
    thread,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::{error::CalibrationError, types::CalibrationRange};

/// Time source for the blocking calibration loop.
pub trait Clock {
    fn now_ms(&self) -> u64;
    fn delay_ms(&mut self, ms: u64);
}

/// Wall-clock implementation backed by `Instant` and `thread::sleep`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start
            .elapsed()
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }

    fn delay_ms(&mut self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationWindow {
    pub duration_ms: u64,
    pub interval_ms: u64,
}

impl Default for CalibrationWindow {
    fn default() -> Self {
        Self {
            duration_ms: 10_000,
            interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationProgress {
    pub elapsed_ms: u64,
    pub duration_ms: u64,
    pub raw: i32,
    pub low: i32,
    pub high: i32,
}

#[derive(Debug, Clone)]
pub struct RangeCalibrator {
    low: i32,
    high: i32,
    samples: u32,
}

impl RangeCalibrator {
    pub fn new() -> Self {
        Self {
            low: i32::MAX,
            high: i32::MIN,
            samples: 0,
        }
    }

    pub fn observe(&mut self, raw: i32) {
        self.low = self.low.min(raw);
        self.high = self.high.max(raw);
        self.samples = self.samples.saturating_add(1);
    }

    pub fn finish(&self) -> Result<CalibrationRange, CalibrationError> {
        if self.samples == 0 {
            return Err(CalibrationError::NoSamples);
        }
        Ok(CalibrationRange::new(self.low, self.high))
    }
}

impl Default for RangeCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Samples until the elapsed time exceeds `window.duration_ms`.
///
/// The first sample is taken at elapsed zero, so a window always yields at
/// least one sample.
pub fn calibrate<C, F, P>(
    clock: &mut C,
    window: CalibrationWindow,
    mut sample: F,
    mut on_progress: P,
) -> Result<CalibrationRange, CalibrationError>
where
    C: Clock,
    F: FnMut() -> i32,
    P: FnMut(&CalibrationProgress),
{
    if window.interval_ms == 0 {
        return Err(CalibrationError::InvalidWindow);
    }

    let start_ms = clock.now_ms();
    let mut calibrator = RangeCalibrator::new();

    loop {
        let elapsed_ms = clock.now_ms().saturating_sub(start_ms);
        if elapsed_ms > window.duration_ms {
            break;
        }

        let raw = sample();
        calibrator.observe(raw);
        on_progress(&CalibrationProgress {
            elapsed_ms,
            duration_ms: window.duration_ms,
            raw,
            low: calibrator.low,
            high: calibrator.high,
        });

        clock.delay_ms(window.interval_ms);
    }

    calibrator.finish()
}
