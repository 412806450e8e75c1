use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of peripheral nodes polled by the coordinator.
pub const N_PNS: usize = 4;
/// Samples per acquisition window.
pub const BUF_SIZE: usize = 200;
/// Acquisition period (20 Hz).
pub const F_ACQ_MS: u64 = 50;
/// Longest a peripheral may spend acquiring one window.
pub const PN_TOUT_MS: u64 = 15_000;
/// Coordinator wait, measured from the first classification received.
pub const CN_TOUT_MS: u64 = 10_000;
/// Motion metric at or above which a window counts as movement.
pub const M_THR: f64 = 0.5;
/// Motion metric at or above which a window counts as a crisis.
pub const C_THR: f64 = 2.0;

/// Scalar computed over a window before thresholding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionMetric {
    /// Mean of `|x - mean(x)|`.
    #[default]
    MeanAbsoluteDeviation,
    /// Largest `|x[i+1] - x[i]|`.
    PeakDelta,
}

/// What a peripheral does when its watchdog fires before the window is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartialWindowPolicy {
    /// Discard the samples and stay silent for the round.
    #[default]
    Drop,
    /// Classify what was collected, provided there is at least `min_samples`.
    Classify { min_samples: usize },
}

/// How a coordinator folds a complete, crisis-free round into one state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Movement if any peripheral reported movement.
    #[default]
    AnyMovement,
    /// Movement if strictly more than half of the reports are movement.
    Majority,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("n_pns must be at least 1")]
    NoPeripherals,
    #[error("buf_size must be at least 1")]
    EmptyWindow,
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
    #[error("movement_threshold ({movement}) must be below crisis_threshold ({crisis})")]
    ThresholdOrder { movement: f64, crisis: f64 },
    #[error("expected {expected} distinct peripherals, got {actual}")]
    PeripheralCount { expected: usize, actual: usize },
    #[error("partial window min_samples ({min_samples}) must be within 1..={buf_size}")]
    PartialMinSamples { min_samples: usize, buf_size: usize },
}

/// Protocol parameters shared by every node in the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BsnConfig {
    pub n_pns: usize,
    pub buf_size: usize,
    pub acq_period_ms: u64,
    pub pn_timeout_ms: u64,
    pub cn_timeout_ms: u64,
    pub movement_threshold: f64,
    pub crisis_threshold: f64,
    pub metric: MotionMetric,
    pub partial_window: PartialWindowPolicy,
    pub aggregation: AggregationPolicy,
    /// Run one local, unreported acquisition right after boot.
    pub acquire_on_boot: bool,
}

impl Default for BsnConfig {
    fn default() -> Self {
        Self {
            n_pns: N_PNS,
            buf_size: BUF_SIZE,
            acq_period_ms: F_ACQ_MS,
            pn_timeout_ms: PN_TOUT_MS,
            cn_timeout_ms: CN_TOUT_MS,
            movement_threshold: M_THR,
            crisis_threshold: C_THR,
            metric: MotionMetric::default(),
            partial_window: PartialWindowPolicy::default(),
            aggregation: AggregationPolicy::default(),
            acquire_on_boot: false,
        }
    }
}

impl BsnConfig {
    pub fn acq_period(&self) -> Duration {
        Duration::from_millis(self.acq_period_ms)
    }

    pub fn pn_timeout(&self) -> Duration {
        Duration::from_millis(self.pn_timeout_ms)
    }

    pub fn cn_timeout(&self) -> Duration {
        Duration::from_millis(self.cn_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_pns == 0 {
            return Err(ConfigError::NoPeripherals);
        }
        if self.buf_size == 0 {
            return Err(ConfigError::EmptyWindow);
        }

        for (name, value) in [
            ("acq_period_ms", self.acq_period_ms),
            ("pn_timeout_ms", self.pn_timeout_ms),
            ("cn_timeout_ms", self.cn_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDuration(name));
            }
        }

        for (name, value) in [
            ("movement_threshold", self.movement_threshold),
            ("crisis_threshold", self.crisis_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }

        if self.movement_threshold >= self.crisis_threshold {
            return Err(ConfigError::ThresholdOrder {
                movement: self.movement_threshold,
                crisis: self.crisis_threshold,
            });
        }

        if let PartialWindowPolicy::Classify { min_samples } = self.partial_window {
            if min_samples == 0 || min_samples > self.buf_size {
                return Err(ConfigError::PartialMinSamples {
                    min_samples,
                    buf_size: self.buf_size,
                });
            }
        }

        Ok(())
    }

    /// Whether a full window can be collected before the peripheral
    /// watchdog fires. A config where it cannot is legal but every round
    /// will end on the partial-window policy.
    pub fn window_fits_timeout(&self) -> bool {
        (self.buf_size as u64).saturating_mul(self.acq_period_ms) < self.pn_timeout_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_the_canonical_constants() {
        let config = BsnConfig::default();

        assert_eq!(config.n_pns, 4);
        assert_eq!(config.buf_size, 200);
        assert_eq!(config.acq_period(), Duration::from_millis(50));
        assert_eq!(config.pn_timeout(), Duration::from_secs(15));
        assert_eq!(config.cn_timeout(), Duration::from_secs(10));
        assert_eq!(config.movement_threshold, 0.5);
        assert_eq!(config.crisis_threshold, 2.0);
        assert_eq!(config.partial_window, PartialWindowPolicy::Drop);
        assert_eq!(config.aggregation, AggregationPolicy::AnyMovement);
        assert!(config.validate().is_ok());
        assert!(config.window_fits_timeout());
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let config = BsnConfig {
            movement_threshold: 2.0,
            crisis_threshold: 0.5,
            ..Default::default()
        };

        assert_eq!(
            config.validate(),
            Err(ConfigError::ThresholdOrder {
                movement: 2.0,
                crisis: 0.5
            })
        );
    }

    #[test]
    fn rejects_non_finite_threshold() {
        let config = BsnConfig {
            crisis_threshold: f64::NAN,
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold {
                name: "crisis_threshold",
                ..
            })
        ));
    }

    #[test]
    fn rejects_zero_sizes_and_periods() {
        let no_pns = BsnConfig {
            n_pns: 0,
            ..Default::default()
        };
        assert_eq!(no_pns.validate(), Err(ConfigError::NoPeripherals));

        let zero_tick = BsnConfig {
            acq_period_ms: 0,
            ..Default::default()
        };
        assert_eq!(
            zero_tick.validate(),
            Err(ConfigError::ZeroDuration("acq_period_ms"))
        );
    }

    #[test]
    fn partial_policy_bounds_checked() {
        let config = BsnConfig {
            partial_window: PartialWindowPolicy::Classify { min_samples: 500 },
            ..Default::default()
        };

        assert_eq!(
            config.validate(),
            Err(ConfigError::PartialMinSamples {
                min_samples: 500,
                buf_size: 200
            })
        );
    }

    #[test]
    fn slow_acquisition_does_not_fit_timeout() {
        let config = BsnConfig {
            acq_period_ms: 100,
            ..Default::default()
        };

        assert!(config.validate().is_ok());
        assert!(!config.window_fits_timeout());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: BsnConfig = toml::from_str(
            r#"
            cn_timeout_ms = 15000
            aggregation = "majority"

            [partial_window]
            type = "classify"
            min_samples = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.cn_timeout_ms, 15_000);
        assert_eq!(config.aggregation, AggregationPolicy::Majority);
        assert_eq!(
            config.partial_window,
            PartialWindowPolicy::Classify { min_samples: 100 }
        );
        assert_eq!(config.buf_size, BUF_SIZE);
    }
}
