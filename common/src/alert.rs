//! Per-metric alert state machine driving one LED per metric and the single
//! shared buzzer.
//!
//! Buzzer arbitration: each out-of-range metric toggles the buzzer, and the
//! buzzer is then forced silent before the next metric is evaluated. A tone
//! never outlives its own step: every out-of-range metric gets one pulse of
//! at most `buzzer_pulse_ms`, played back to back in evaluation order. The
//! LEDs are the reliable alert channel.

use serde::Serialize;

use crate::{
    config::MetricProfiles,
    types::{AlertState, BuzzerState, Classification, Metric},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AlertAction {
    SetIndicator {
        metric: Metric,
        on: bool,
    },
    SoundTone {
        metric: Metric,
        #[serde(rename = "frequencyHz")]
        frequency_hz: u32,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
    Silence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertOutcome {
    pub actions: Vec<AlertAction>,
    /// Metrics whose step pulsed the buzzer this cycle, in evaluation order.
    pub pulsed: Vec<Metric>,
}

#[derive(Debug, Clone)]
pub struct AlertEngine {
    profiles: MetricProfiles,
    buzzer_pulse_ms: u64,
    states: [AlertState; 3],
    buzzer: BuzzerState,
}

impl AlertEngine {
    pub fn new(profiles: MetricProfiles, buzzer_pulse_ms: u64) -> Self {
        Self {
            profiles,
            buzzer_pulse_ms,
            states: [AlertState::Normal; 3],
            buzzer: BuzzerState::Silent,
        }
    }

    pub fn state(&self, metric: Metric) -> AlertState {
        self.states[metric.index()]
    }

    pub fn buzzer(&self) -> BuzzerState {
        self.buzzer
    }

    pub fn is_indicator_on(&self, metric: Metric) -> bool {
        self.state(metric) == AlertState::OutOfRange
    }

    /// Runs one metric's evaluation step and returns the hardware actions
    /// in the order they must be applied.
    pub fn step(&mut self, metric: Metric, classification: Classification) -> Vec<AlertAction> {
        let mut actions = Vec::with_capacity(3);
        let out_of_range = !classification.is_within();

        self.states[metric.index()] = if out_of_range {
            AlertState::OutOfRange
        } else {
            AlertState::Normal
        };
        actions.push(AlertAction::SetIndicator {
            metric,
            on: out_of_range,
        });

        if out_of_range {
            self.toggle_buzzer(metric, &mut actions);
        }

        self.buzzer = BuzzerState::Silent;
        actions.push(AlertAction::Silence);

        actions
    }

    /// Evaluates metrics in the given order (normally
    /// [`Metric::EVALUATION_ORDER`]).
    pub fn run_cycle(&mut self, verdicts: &[(Metric, Classification)]) -> AlertOutcome {
        let mut actions = Vec::with_capacity(verdicts.len() * 3);
        let mut pulsed = Vec::new();

        for &(metric, classification) in verdicts {
            let step = self.step(metric, classification);
            if step
                .iter()
                .any(|action| matches!(action, AlertAction::SoundTone { .. }))
            {
                pulsed.push(metric);
            }
            actions.extend(step);
        }

        AlertOutcome { actions, pulsed }
    }

    fn toggle_buzzer(&mut self, metric: Metric, actions: &mut Vec<AlertAction>) {
        match self.buzzer {
            BuzzerState::Silent => {
                let frequency_hz = self.profiles.get(metric).tone_hz;
                self.buzzer = BuzzerState::Sounding { frequency_hz };
                actions.push(AlertAction::SoundTone {
                    metric,
                    frequency_hz,
                    duration_ms: self.buzzer_pulse_ms,
                });
            }
            BuzzerState::Sounding { .. } => {
                self.buzzer = BuzzerState::Silent;
                actions.push(AlertAction::Silence);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn engine() -> AlertEngine {
        AlertEngine::new(MetricProfiles::default(), 50)
    }

    #[test]
    fn starts_normal_and_silent() {
        let engine = engine();
        for metric in Metric::EVALUATION_ORDER {
            assert_eq!(engine.state(metric), AlertState::Normal);
        }
        assert_eq!(engine.buzzer(), BuzzerState::Silent);
    }

    #[test]
    fn within_turns_indicator_off_without_tone() {
        let mut engine = engine();
        let actions = engine.step(Metric::Temperature, Classification::Within);

        assert_eq!(
            actions,
            vec![
                AlertAction::SetIndicator {
                    metric: Metric::Temperature,
                    on: false
                },
                AlertAction::Silence,
            ]
        );
    }

    #[test]
    fn out_of_range_pulses_metric_tone_then_silences() {
        let mut engine = engine();
        let actions = engine.step(Metric::SoilMoisture, Classification::Below);

        assert_eq!(
            actions,
            vec![
                AlertAction::SetIndicator {
                    metric: Metric::SoilMoisture,
                    on: true
                },
                AlertAction::SoundTone {
                    metric: Metric::SoilMoisture,
                    frequency_hz: 1_048,
                    duration_ms: 50
                },
                AlertAction::Silence,
            ]
        );
        assert_eq!(engine.state(Metric::SoilMoisture), AlertState::OutOfRange);
        assert_eq!(engine.buzzer(), BuzzerState::Silent);
    }

    #[test]
    fn each_out_of_range_metric_pulses_in_order() {
        let mut engine = engine();
        let outcome = engine.run_cycle(&[
            (Metric::Temperature, Classification::Within),
            (Metric::SoilMoisture, Classification::Above),
            (Metric::Light, Classification::Below),
        ]);

        assert!(!engine.is_indicator_on(Metric::Temperature));
        assert!(engine.is_indicator_on(Metric::SoilMoisture));
        assert!(engine.is_indicator_on(Metric::Light));
        assert_eq!(outcome.pulsed, vec![Metric::SoilMoisture, Metric::Light]);
        assert_eq!(outcome.actions.last(), Some(&AlertAction::Silence));
        assert_eq!(engine.buzzer(), BuzzerState::Silent);

        // The soil tone ends with its own step, before the light step starts.
        let soil_tone = outcome
            .actions
            .iter()
            .position(|action| {
                matches!(
                    action,
                    AlertAction::SoundTone {
                        metric: Metric::SoilMoisture,
                        ..
                    }
                )
            })
            .unwrap();
        assert_eq!(outcome.actions[soil_tone + 1], AlertAction::Silence);
    }

    #[test]
    fn recovery_clears_indicator() {
        let mut engine = engine();
        engine.step(Metric::Light, Classification::Above);
        assert!(engine.is_indicator_on(Metric::Light));

        engine.step(Metric::Light, Classification::Within);
        assert!(!engine.is_indicator_on(Metric::Light));
        assert_eq!(engine.state(Metric::Light), AlertState::Normal);
    }

    #[test]
    fn all_within_is_silent_cycle() {
        let mut engine = engine();
        let outcome = engine.run_cycle(&[
            (Metric::Temperature, Classification::Within),
            (Metric::SoilMoisture, Classification::Within),
            (Metric::Light, Classification::Within),
        ]);

        assert!(outcome.pulsed.is_empty());
        assert!(!outcome
            .actions
            .iter()
            .any(|action| matches!(action, AlertAction::SoundTone { .. })));
    }
}
