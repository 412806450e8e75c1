//! Window classification.
//!
//! A window is reduced to one scalar motion metric which is then compared
//! against two ascending thresholds:
//!
//! - `metric < movement_threshold` → [`MovementState::NoMovement`]
//! - `movement_threshold <= metric < crisis_threshold` → [`MovementState::Movement`]
//! - `metric >= crisis_threshold` → [`MovementState::Crisis`]
//!
//! Samples are finite by construction (see [`crate::AcquisitionWindow`]),
//! so the metric is always finite and classification is total.

use crate::{BsnConfig, MotionMetric, MovementState, Sample};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classifier {
    metric: MotionMetric,
    movement_threshold: f64,
    crisis_threshold: f64,
}

impl Classifier {
    pub fn new(metric: MotionMetric, movement_threshold: f64, crisis_threshold: f64) -> Self {
        Self {
            metric,
            movement_threshold,
            crisis_threshold,
        }
    }

    pub fn from_config(config: &BsnConfig) -> Self {
        Self::new(
            config.metric,
            config.movement_threshold,
            config.crisis_threshold,
        )
    }

    /// Scalar motion metric of a window. An empty window scores 0.
    pub fn motion_metric(&self, samples: &[Sample]) -> f64 {
        match self.metric {
            MotionMetric::MeanAbsoluteDeviation => mean_absolute_deviation(samples),
            MotionMetric::PeakDelta => peak_delta(samples),
        }
    }

    pub fn classify(&self, samples: &[Sample]) -> MovementState {
        let metric = self.motion_metric(samples);

        if metric >= self.crisis_threshold {
            MovementState::Crisis
        } else if metric >= self.movement_threshold {
            MovementState::Movement
        } else {
            MovementState::NoMovement
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::from_config(&BsnConfig::default())
    }
}

fn mean_absolute_deviation(samples: &[Sample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let n = samples.len() as f64;
    let mean = samples.iter().map(|s| s.into_inner()).sum::<f64>() / n;

    samples
        .iter()
        .map(|s| (s.into_inner() - mean).abs())
        .sum::<f64>()
        / n
}

fn peak_delta(samples: &[Sample]) -> f64 {
    samples
        .windows(2)
        .map(|pair| (pair[1].into_inner() - pair[0].into_inner()).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordered_float::NotNan;

    fn window(values: &[f64]) -> Vec<Sample> {
        values.iter().map(|v| NotNan::new(*v).unwrap()).collect()
    }

    /// Square wave alternating between `-amplitude` and `+amplitude`; its
    /// mean absolute deviation is exactly `amplitude`.
    fn square(amplitude: f64, len: usize) -> Vec<Sample> {
        let values: Vec<f64> = (0..len)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect();
        window(&values)
    }

    #[test]
    fn flat_window_is_no_movement() {
        let classifier = Classifier::default();
        assert_eq!(
            classifier.classify(&window(&[9.81; 200])),
            MovementState::NoMovement
        );
    }

    #[test]
    fn thresholds_are_inclusive_on_the_lower_bound() {
        let classifier = Classifier::default();

        assert_eq!(classifier.classify(&square(0.49, 200)), MovementState::NoMovement);
        assert_eq!(classifier.classify(&square(0.5, 200)), MovementState::Movement);
        assert_eq!(classifier.classify(&square(1.99, 200)), MovementState::Movement);
        assert_eq!(classifier.classify(&square(2.0, 200)), MovementState::Crisis);
        assert_eq!(classifier.classify(&square(7.5, 200)), MovementState::Crisis);
    }

    #[test]
    fn empty_window_is_no_movement() {
        let classifier = Classifier::default();
        assert_eq!(classifier.motion_metric(&[]), 0.0);
        assert_eq!(classifier.classify(&[]), MovementState::NoMovement);
    }

    #[test]
    fn deterministic_and_input_untouched() {
        let classifier = Classifier::default();
        let samples: Vec<Sample> = window(
            &(0..200)
                .map(|i| ((i * 37) % 11) as f64 * 0.3)
                .collect::<Vec<_>>(),
        );
        let before = samples.clone();

        let first = classifier.classify(&samples);
        for _ in 0..10 {
            assert_eq!(classifier.classify(&samples), first);
        }
        assert_eq!(samples, before);
    }

    #[test]
    fn peak_delta_reacts_to_a_single_jolt() {
        let mut values = vec![1.0; 200];
        values[120] = 4.0;
        let samples = window(&values);

        let mad = Classifier::new(MotionMetric::MeanAbsoluteDeviation, 0.5, 2.0);
        let peak = Classifier::new(MotionMetric::PeakDelta, 0.5, 2.0);

        assert_eq!(mad.classify(&samples), MovementState::NoMovement);
        assert_eq!(peak.motion_metric(&samples), 3.0);
        assert_eq!(peak.classify(&samples), MovementState::Crisis);
    }

    #[test]
    fn peak_delta_of_single_sample_is_zero() {
        let peak = Classifier::new(MotionMetric::PeakDelta, 0.5, 2.0);
        assert_eq!(peak.motion_metric(&window(&[3.0])), 0.0);
    }

    #[test]
    fn thresholds_follow_config() {
        let config = BsnConfig {
            movement_threshold: 0.1,
            crisis_threshold: 0.3,
            ..Default::default()
        };
        let classifier = Classifier::from_config(&config);

        assert_eq!(classifier.classify(&square(0.2, 50)), MovementState::Movement);
        assert_eq!(classifier.classify(&square(0.4, 50)), MovementState::Crisis);
    }
}
