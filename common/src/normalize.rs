use crate::types::{CalibrationRange, Drift, MetricSample};

pub const PERCENT_MIN: f32 = 0.0;
pub const PERCENT_MAX: f32 = 100.0;

/// Maps `raw` linearly from the calibrated range onto 0..=100 and clamps.
///
/// A degenerate range (`low == high`) maps everything to 0. With `invert`
/// the result is `100 - value`.
pub fn normalize(raw: i32, range: CalibrationRange, invert: bool) -> f32 {
    let percent = if range.is_degenerate() {
        PERCENT_MIN
    } else {
        let span = f64::from(range.high) - f64::from(range.low);
        let scaled = (f64::from(raw) - f64::from(range.low)) * f64::from(PERCENT_MAX) / span;
        (scaled as f32).clamp(PERCENT_MIN, PERCENT_MAX)
    };

    if invert {
        PERCENT_MAX - percent
    } else {
        percent
    }
}

/// Reports a raw value the calibration window never saw.
pub fn drift(raw: i32, range: CalibrationRange) -> Option<Drift> {
    if raw < range.low {
        Some(Drift::BelowRange)
    } else if raw > range.high {
        Some(Drift::AboveRange)
    } else {
        None
    }
}

pub fn sample(raw: i32, range: CalibrationRange, invert: bool) -> MetricSample {
    MetricSample {
        raw_value: raw,
        normalized_value: normalize(raw, range, invert),
        drift: drift(raw, range),
    }
}
