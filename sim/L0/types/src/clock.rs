//! The fixed-step simulation clock.
//!
//! Drivers are evaluated once per integration step. The clock is the single
//! source of the step count and time handed to them, so that every driver in
//! a step sees identical values.

use crate::{Result, SimError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Step counter and simulation time for a fixed-timestep loop.
///
/// Time is derived as `step_count * timestep` rather than accumulated, so
/// repeated runs produce bit-identical time sequences.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepClock {
    timestep: f64,
    step_count: u64,
}

impl StepClock {
    /// Create a clock at step 0, time 0.
    pub fn new(timestep: f64) -> Result<Self> {
        if !timestep.is_finite() || timestep <= 0.0 {
            return Err(SimError::InvalidTimestep(timestep));
        }
        Ok(Self {
            timestep,
            step_count: 0,
        })
    }

    /// Advance by one step and return the new step count.
    pub fn advance(&mut self) -> u64 {
        self.step_count += 1;
        self.step_count
    }

    /// Current step count. Step 1 is the first evaluated step.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Current simulation time in seconds.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.step_count as f64 * self.timestep
    }

    /// Integration timestep in seconds.
    #[must_use]
    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    /// Sampling frequency in Hz.
    #[must_use]
    pub fn frequency(&self) -> f64 {
        1.0 / self.timestep
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_clock_advances() {
        let mut clock = StepClock::new(0.001).unwrap();
        assert_eq!(clock.step_count(), 0);
        assert_relative_eq!(clock.time(), 0.0);

        assert_eq!(clock.advance(), 1);
        assert_eq!(clock.advance(), 2);
        assert_relative_eq!(clock.time(), 0.002, epsilon = 1e-15);
        assert_relative_eq!(clock.frequency(), 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_clock_rejects_bad_timestep() {
        assert!(StepClock::new(0.0).is_err());
        assert!(StepClock::new(-0.01).is_err());
        assert!(StepClock::new(f64::NAN).is_err());
        assert!(StepClock::new(f64::INFINITY).is_err());
    }
}
