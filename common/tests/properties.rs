//! Property tests for normalization, band evaluation and range learning.
//!
//! Host only: proptest is not built for the ESP32 targets.

#![cfg(not(any(target_arch = "xtensa", target_arch = "riscv32")))]

use plantiq_common::{
    calibrate, estimate, evaluate, normalize, CalibrationRange, CalibrationWindow,
    Classification, Clock, ComfortBand, TrendThresholds,
};
use proptest::prelude::*;

/// Advances only when the calibration loop delays.
#[derive(Default)]
struct StepClock {
    now_ms: u64,
}

impl Clock for StepClock {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }

    fn delay_ms(&mut self, ms: u64) {
        self.now_ms += ms;
    }
}

fn range_strategy() -> impl Strategy<Value = CalibrationRange> {
    (0i32..4_096, 1i32..4_096).prop_map(|(low, span)| CalibrationRange::new(low, low + span))
}

proptest! {
    #[test]
    fn normalization_is_monotonic_inside_range(
        range in range_strategy(),
        a in 0u32..=10_000,
        b in 0u32..=10_000,
    ) {
        let span = i64::from(range.high - range.low);
        let pick = |t: u32| range.low + (span * i64::from(t) / 10_000) as i32;
        let (lo, hi) = if a <= b { (pick(a), pick(b)) } else { (pick(b), pick(a)) };

        prop_assert!(normalize(lo, range, false) <= normalize(hi, range, false));
    }

    #[test]
    fn inversion_mirrors_plain_normalization(range in range_strategy(), raw in -1_000i32..6_000) {
        let plain = normalize(raw, range, false);
        let inverted = normalize(raw, range, true);

        prop_assert_eq!(inverted, 100.0 - plain);
    }

    #[test]
    fn output_is_always_clamped(
        low in i32::MIN / 2..i32::MAX / 2,
        high in i32::MIN / 2..i32::MAX / 2,
        raw in any::<i32>(),
        invert in any::<bool>(),
    ) {
        let value = normalize(raw, CalibrationRange::new(low.min(high), low.max(high)), invert);

        prop_assert!((0.0..=100.0).contains(&value), "{value}");
    }

    #[test]
    fn within_exactly_when_inside_inclusive_band(
        floor in -50.0f32..50.0,
        width in 0.0f32..100.0,
        value in -200.0f32..200.0,
    ) {
        let band = ComfortBand::new(floor, floor + width);
        let inside = band.floor <= value && value <= band.ceiling;

        prop_assert_eq!(evaluate(value, band) == Classification::Within, inside);
        prop_assert_eq!(evaluate(band.floor, band), Classification::Within);
        prop_assert_eq!(evaluate(band.ceiling, band), Classification::Within);
    }

    #[test]
    fn unchanged_forecast_never_reports_a_trend(temp in -40.0f32..120.0) {
        let blend = estimate(temp, temp, &TrendThresholds::default());

        prop_assert_eq!(blend.offset_f, 0.0);
        prop_assert!(blend.trend.is_none());
    }

    #[test]
    fn calibration_learns_extremes_in_any_order(
        samples in proptest::collection::vec(0i32..4_096, 1..=21),
    ) {
        let mut reversed = samples.clone();
        reversed.reverse();
        let window = CalibrationWindow { duration_ms: 10_000, interval_ms: 500 };

        let learn = |sequence: &[i32]| {
            let mut clock = StepClock::default();
            let mut index = 0;
            calibrate(
                &mut clock,
                window,
                || {
                    let value = sequence[index % sequence.len()];
                    index += 1;
                    value
                },
                |_| {},
            )
        };

        let expected = CalibrationRange::new(
            *samples.iter().min().unwrap(),
            *samples.iter().max().unwrap(),
        );

        prop_assert_eq!(learn(&samples), Ok(expected));
        prop_assert_eq!(learn(&reversed), Ok(expected));
    }

    #[test]
    fn zero_variance_calibration_is_defined(k in 0i32..4_096) {
        let mut clock = StepClock::default();
        let range = calibrate(&mut clock, CalibrationWindow::default(), || k, |_| {}).unwrap();

        prop_assert!(range.is_degenerate());
        prop_assert_eq!(normalize(k, range, false), 0.0);
    }
}
