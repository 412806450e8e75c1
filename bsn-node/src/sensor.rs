use std::f64::consts::TAU;

use bsn_core::Sensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

/// Standard gravity, the resting reading of a vertical accelerometer axis.
const GRAVITY: f64 = 9.81;

/// Kind of motion a simulated wearer is performing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionProfile {
    /// Lying or sitting still: sensor noise only.
    Calm,
    /// Slow, regular oscillation around 1 Hz.
    Walking,
    /// Fast, large oscillation around 5 Hz.
    Seizure,
}

impl MotionProfile {
    /// (amplitude in m/s², oscillation frequency in Hz, noise half-width)
    fn shape(&self) -> (f64, f64, f64) {
        match self {
            MotionProfile::Calm => (0.0, 0.0, 0.3),
            MotionProfile::Walking => (1.3, 1.0, 0.2),
            MotionProfile::Seizure => (5.0, 5.0, 0.5),
        }
    }
}

/// Simulated accelerometer axis producing samples for a motion profile.
pub struct MockSensor {
    profile: MotionProfile,
    sample_rate_hz: f64,
    stall_after: Option<usize>,
    produced: usize,
    rng: StdRng,
}

impl MockSensor {
    pub fn new(profile: MotionProfile, sample_period_ms: u64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            profile,
            sample_rate_hz: 1_000.0 / sample_period_ms.max(1) as f64,
            stall_after: None,
            produced: 0,
            rng,
        }
    }

    /// Make the sensor go silent after `samples` readings.
    pub fn stall_after(mut self, samples: Option<usize>) -> Self {
        self.stall_after = samples;
        self
    }

    pub fn profile(&self) -> MotionProfile {
        self.profile
    }

    pub fn produced(&self) -> usize {
        self.produced
    }
}

impl Sensor for MockSensor {
    fn read_sample(&mut self) -> Option<f64> {
        if self.stall_after.is_some_and(|limit| self.produced >= limit) {
            return None;
        }

        let (amplitude, frequency, noise) = self.profile.shape();
        let t = self.produced as f64 / self.sample_rate_hz;
        let jitter = self.rng.random_range(-noise..=noise);

        self.produced += 1;
        Some(GRAVITY + amplitude * (TAU * frequency * t).sin() + jitter)
    }
}
