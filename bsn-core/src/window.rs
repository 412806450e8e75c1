use ordered_float::NotNan;

/// One finite sensor sample.
pub type Sample = NotNan<f64>;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum WindowError {
    #[error("acquisition window is full ({capacity} samples)")]
    Full { capacity: usize },
    #[error("sample {0} is not finite")]
    NonFinite(f64),
}

/// Fixed-capacity buffer of samples collected during one round.
#[derive(Debug, Clone)]
pub struct AcquisitionWindow {
    samples: Vec<Sample>,
    capacity: usize,
}

impl AcquisitionWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample. Never grows past capacity.
    pub fn push(&mut self, value: f64) -> Result<(), WindowError> {
        if self.is_full() {
            return Err(WindowError::Full {
                capacity: self.capacity,
            });
        }

        if !value.is_finite() {
            return Err(WindowError::NonFinite(value));
        }

        // finite values are never NaN
        let sample = NotNan::new(value).map_err(|_| WindowError::NonFinite(value))?;
        self.samples.push(sample);
        Ok(())
    }

    /// Drop all samples, keeping the allocation for the next round.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }
}
