//! Seams between the monitor logic and the board: analog/digital sensor
//! reads on one side, LEDs and the buzzer on the other.

use crate::{
    alert::AlertAction,
    types::{ClimateReading, Metric, RawReadings},
};

/// Synchronous sensor reads. Implementations decide how to cope with a
/// transient fault; the monitor always expects a value.
pub trait SensorBus {
    fn read_light_raw(&mut self) -> i32;
    fn read_soil_raw(&mut self) -> i32;
    fn read_climate(&mut self) -> ClimateReading;

    fn read_all(&mut self) -> RawReadings {
        RawReadings {
            light_raw: self.read_light_raw(),
            soil_raw: self.read_soil_raw(),
            climate: self.read_climate(),
        }
    }
}

/// Last good value of a sensor that can fail transiently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastGood<T> {
    value: T,
}

impl<T: Copy> LastGood<T> {
    pub fn new(first: T) -> Self {
        Self { value: first }
    }

    /// Polls `read` up to `attempts` times for a first real value, calling
    /// `between` after each miss. Nothing is invented when every poll fails.
    pub fn seed(
        attempts: u32,
        mut read: impl FnMut() -> Option<T>,
        mut between: impl FnMut(u32),
    ) -> Option<Self> {
        for attempt in 1..=attempts {
            if let Some(value) = read() {
                return Some(Self::new(value));
            }
            between(attempt);
        }
        None
    }

    /// Stores a fresh value if there is one and returns the current value.
    pub fn update(&mut self, fresh: Option<T>) -> T {
        if let Some(value) = fresh {
            self.value = value;
        }
        self.value
    }

    pub fn get(&self) -> T {
        self.value
    }
}

pub trait IndicatorSink {
    type Error;

    fn set_indicator(&mut self, metric: Metric, on: bool) -> Result<(), Self::Error>;
    /// Plays a tone for at most `duration_ms`; a following `silence` cuts it.
    fn sound_tone(&mut self, frequency_hz: u32, duration_ms: u64) -> Result<(), Self::Error>;
    fn silence(&mut self) -> Result<(), Self::Error>;
}

/// Applies every action in order and returns the first hardware error.
///
/// A failing LED must not hide the other metrics' indicators or leave the
/// buzzer sounding, so later actions still run after an error.
pub fn apply_actions<S: IndicatorSink>(
    sink: &mut S,
    actions: &[AlertAction],
) -> Result<(), S::Error> {
    let mut first_error = None;
    for action in actions {
        let result = match *action {
            AlertAction::SetIndicator { metric, on } => sink.set_indicator(metric, on),
            AlertAction::SoundTone {
                frequency_hz,
                duration_ms,
                ..
            } => sink.sound_tone(frequency_hz, duration_ms),
            AlertAction::Silence => sink.silence(),
        };
        if let Err(err) = result {
            first_error.get_or_insert(err);
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
