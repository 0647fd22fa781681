//! Signal conditioning for phase feedback.
//!
//! [`ButterworthFilter`] is a second order low-pass IIR filter designed by
//! the bilinear transform:
//!
//! ```text
//! y[n] = b0·x[n] + b1·x[n-1] + b2·x[n-2] + a1·y[n-1] + a2·y[n-2]
//! ```
//!
//! [`SignChangeDetector`] watches the filtered signal and reports when its
//! slope has reversed for long enough to count as a real turning point.

use std::f64::consts::{PI, SQRT_2};

use sim_types::SimError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Result;

/// Second order Butterworth low-pass filter.
///
/// History starts at zero, so the first outputs ramp up from 0 toward the
/// input level.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ButterworthFilter {
    cutoff_frequency: f64,
    sampling_frequency: f64,
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x: [f64; 3],
    y: [f64; 3],
}

impl ButterworthFilter {
    /// Create a filter for the given cutoff and sampling frequencies (Hz).
    ///
    /// The cutoff must lie strictly between 0 and the Nyquist frequency.
    pub fn new(cutoff_frequency: f64, sampling_frequency: f64) -> Result<Self> {
        let mut filter = Self {
            cutoff_frequency: 0.0,
            sampling_frequency: 0.0,
            b0: 0.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x: [0.0; 3],
            y: [0.0; 3],
        };
        filter.calculate_coefficients(cutoff_frequency, sampling_frequency)?;
        Ok(filter)
    }

    /// Recompute the coefficients. History is kept.
    pub fn calculate_coefficients(
        &mut self,
        cutoff_frequency: f64,
        sampling_frequency: f64,
    ) -> Result<()> {
        if !(sampling_frequency.is_finite() && sampling_frequency > 0.0) {
            return Err(SimError::invalid(
                "ButterworthFilter",
                "SamplingFrequency",
                sampling_frequency.to_string(),
                "must be positive",
            )
            .into());
        }
        if !(cutoff_frequency > 0.0 && cutoff_frequency < 0.5 * sampling_frequency) {
            return Err(SimError::invalid(
                "ButterworthFilter",
                "LowPassFrequency",
                cutoff_frequency.to_string(),
                format!("must be in (0, {})", 0.5 * sampling_frequency),
            )
            .into());
        }
        self.cutoff_frequency = cutoff_frequency;
        self.sampling_frequency = sampling_frequency;

        let ita = 1.0 / (PI * cutoff_frequency / sampling_frequency).tan();
        let q = SQRT_2;
        self.b0 = 1.0 / (1.0 + q * ita + ita * ita);
        self.b1 = 2.0 * self.b0;
        self.b2 = self.b0;
        self.a1 = 2.0 * (ita * ita - 1.0) * self.b0;
        self.a2 = -(1.0 - q * ita + ita * ita) * self.b0;
        Ok(())
    }

    /// Cutoff frequency in Hz.
    #[must_use]
    pub fn cutoff_frequency(&self) -> f64 {
        self.cutoff_frequency
    }

    /// Sampling frequency in Hz.
    #[must_use]
    pub fn sampling_frequency(&self) -> f64 {
        self.sampling_frequency
    }

    /// Feed one sample.
    pub fn add_sample(&mut self, x: f64) {
        self.x = [x, self.x[0], self.x[1]];
        self.y = [0.0, self.y[0], self.y[1]];
        self.y[0] = self.b0 * self.x[0]
            + self.b1 * self.x[1]
            + self.b2 * self.x[2]
            + self.a1 * self.y[1]
            + self.a2 * self.y[2];
    }

    /// Latest filtered value.
    #[must_use]
    pub fn output(&self) -> f64 {
        self.y[0]
    }
}

/// Turning point reported by [`SignChangeDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignChange {
    /// The signal was rising and is now falling.
    Falling,
    /// The signal was falling and is now rising.
    Rising,
}

impl SignChange {
    /// `-1` for a falling turn, `+1` for a rising one.
    #[must_use]
    pub fn signum(self) -> i32 {
        match self {
            Self::Falling => -1,
            Self::Rising => 1,
        }
    }
}

/// Debounced slope reversal detector.
///
/// The detector tracks whether the signal is currently increasing. A
/// reversal is reported only after more than `threshold` consecutive
/// samples move against the current direction; a single sample moving with
/// the current direction resets the count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SignChangeDetector {
    increasing: bool,
    count: u32,
    threshold: u32,
}

impl SignChangeDetector {
    /// Create a detector that starts in the decreasing state.
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self {
            increasing: false,
            count: 0,
            threshold,
        }
    }

    /// Whether the signal is considered to be rising.
    #[must_use]
    pub fn is_increasing(&self) -> bool {
        self.increasing
    }

    /// Opposing samples seen since the last reset.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Number of opposing samples that must be exceeded to flip state.
    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Feed the change in signal since the previous sample.
    pub fn observe(&mut self, delta: f64) -> Option<SignChange> {
        if (self.increasing && delta > 0.0) || (!self.increasing && delta < 0.0) {
            self.count = 0;
            return None;
        }
        let opposing = if self.increasing { delta < 0.0 } else { delta > 0.0 };
        if !opposing {
            return None;
        }
        self.count += 1;
        if self.count <= self.threshold {
            return None;
        }
        self.count = 0;
        let change = if self.increasing {
            SignChange::Falling
        } else {
            SignChange::Rising
        };
        self.increasing = !self.increasing;
        Some(change)
    }
}

impl Default for SignChangeDetector {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_coefficients_unity_dc_gain() {
        let f = ButterworthFilter::new(10.0, 1000.0).unwrap();
        let gain = (f.b0 + f.b1 + f.b2) / (1.0 - f.a1 - f.a2);
        assert_relative_eq!(gain, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_step_response_settles() {
        let mut f = ButterworthFilter::new(5.0, 1000.0).unwrap();
        f.add_sample(1.0);
        assert!(f.output() > 0.0 && f.output() < 0.01);
        for _ in 0..5000 {
            f.add_sample(1.0);
        }
        assert_relative_eq!(f.output(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cutoff_limits() {
        assert!(ButterworthFilter::new(0.0, 100.0).is_err());
        assert!(ButterworthFilter::new(50.0, 100.0).is_err());
        assert!(ButterworthFilter::new(10.0, 0.0).is_err());
    }

    #[test]
    fn test_detector_flips_immediately_at_zero_threshold() {
        let mut d = SignChangeDetector::new(0);
        assert_eq!(d.observe(-1.0), None);
        assert_eq!(d.observe(1.0), Some(SignChange::Rising));
        assert!(d.is_increasing());
        assert_eq!(d.observe(1.0), None);
        assert_eq!(d.observe(-0.5), Some(SignChange::Falling));
    }

    #[test]
    fn test_detector_debounce() {
        let mut d = SignChangeDetector::new(2);
        assert_eq!(d.observe(1.0), None);
        assert_eq!(d.observe(1.0), None);
        // A sample in the current direction resets the count.
        assert_eq!(d.observe(-1.0), None);
        assert_eq!(d.count(), 0);
        assert_eq!(d.observe(1.0), None);
        assert_eq!(d.observe(1.0), None);
        assert_eq!(d.observe(1.0), Some(SignChange::Rising));
        assert_eq!(d.count(), 0);
    }

    #[test]
    fn test_detector_ignores_flat() {
        let mut d = SignChangeDetector::new(0);
        assert_eq!(d.observe(0.0), None);
        assert!(!d.is_increasing());
    }
}
