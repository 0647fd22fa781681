//! Periodic piecewise output.

use std::collections::BTreeMap;

use sim_types::{Attributes, SimError};

use crate::driver::{update_time_driver, Driver, DriverBase, StepContext, TimeDriver, TimeMemo};
use crate::schedule::ChangeSchedule;
use crate::{Result, SharedDrivable};

/// Repeats a duration/value table with period `Σ Durations`.
///
/// `PhaseDelay` is a fraction of the cycle. The sampled time is
/// `(t - PhaseDelay·period) mod period`, so a positive delay makes every
/// event happen later.
///
/// With interpolation enabled the output ramps from each value to the next,
/// and the last entry ramps back toward the first.
#[derive(Debug)]
pub struct CyclicDriver {
    base: DriverBase,
    schedule: ChangeSchedule,
    phase_delay: f64,
    memo: TimeMemo,
}

impl CyclicDriver {
    /// Create a cyclic driver.
    pub fn new(base: DriverBase, schedule: ChangeSchedule, phase_delay: f64) -> Result<Self> {
        if schedule.total_duration() <= 0.0 {
            return Err(SimError::invalid(
                base.name(),
                "Durations",
                schedule.total_duration().to_string(),
                "cycle duration must be positive",
            )
            .into());
        }
        if !phase_delay.is_finite() {
            return Err(SimError::invalid(
                base.name(),
                "PhaseDelay",
                phase_delay.to_string(),
                "must be finite",
            )
            .into());
        }
        Ok(Self {
            base,
            schedule,
            phase_delay,
            memo: TimeMemo::default(),
        })
    }

    /// Build from attributes (`Durations`, `Values`, `PhaseDelay`).
    pub fn from_attributes(
        attrs: &Attributes,
        drivables: &BTreeMap<String, SharedDrivable>,
    ) -> Result<Self> {
        let base = DriverBase::from_attributes(attrs, drivables)?;
        let schedule = ChangeSchedule::new(
            base.name(),
            attrs.required_f64_list("Durations")?,
            attrs.required_f64_list("Values")?,
        )?;
        let phase_delay = attrs.required_f64("PhaseDelay")?;
        Self::new(base, schedule, phase_delay)
    }

    /// Cycle period.
    #[must_use]
    pub fn cycle_time(&self) -> f64 {
        self.schedule.total_duration()
    }

    /// Phase delay as a fraction of the cycle.
    #[must_use]
    pub fn phase_delay(&self) -> f64 {
        self.phase_delay
    }

    fn wrap(&self, time: f64) -> f64 {
        let period = self.cycle_time();
        let wrapped = (time - self.phase_delay * period).rem_euclid(period);
        // rem_euclid can round up to the period itself for tiny negatives
        if wrapped >= period {
            0.0
        } else {
            wrapped
        }
    }
}

impl Driver for CyclicDriver {
    fn base(&self) -> &DriverBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut DriverBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "Cyclic"
    }

    fn update(&mut self, ctx: &mut StepContext<'_>) -> Result<()> {
        update_time_driver(self, ctx)
    }

    fn append_to_attributes(&self, attrs: &mut Attributes) {
        self.base.append_to_attributes(attrs, self.type_name());
        attrs.set_f64_list("Durations", self.schedule.durations());
        attrs.set_f64_list("Values", self.schedule.values());
        attrs.set_f64("PhaseDelay", self.phase_delay);
    }
}

impl TimeDriver for CyclicDriver {
    fn value_at(&mut self, time: f64) -> f64 {
        if let Some(value) = self.memo.lookup(time) {
            return value;
        }
        let wrapped = self.wrap(time);
        let index = self.schedule.lookup(wrapped);
        let current = self.schedule.value(index);
        let raw = if self.base.interp() {
            let next = self.schedule.values()[(index + 1) % self.schedule.len()];
            current + self.schedule.segment_fraction(index, wrapped) * (next - current)
        } else {
            current
        };
        let value = self.base.clamp(raw);
        self.memo.store(time, value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn driver(phase_delay: f64, interp: bool) -> CyclicDriver {
        let schedule = ChangeSchedule::new("c", vec![1.0, 1.0], vec![0.0, 1.0]).unwrap();
        CyclicDriver::new(DriverBase::new("c").with_interp(interp), schedule, phase_delay)
            .unwrap()
    }

    #[test]
    fn test_square_wave() {
        let mut d = driver(0.0, false);
        for k in 0..4 {
            let offset = 2.0 * f64::from(k);
            assert_eq!(d.value_at(offset + 0.25), 0.0);
            assert_eq!(d.value_at(offset + 0.75), 0.0);
            assert_eq!(d.value_at(offset + 1.25), 1.0);
            assert_eq!(d.value_at(offset + 1.75), 1.0);
        }
    }

    #[test]
    fn test_phase_delay_shifts_later() {
        let mut d = driver(0.25, false);
        // Delay of half a second: the switch to 1 moves from t=1 to t=1.5.
        assert_eq!(d.value_at(1.25), 0.0);
        assert_eq!(d.value_at(1.75), 1.0);
        // Before time zero the cycle continues backwards.
        assert_eq!(d.value_at(0.25), 1.0);
    }

    #[test]
    fn test_interp_wraps_to_first_value() {
        let mut d = driver(0.0, true);
        assert_relative_eq!(d.value_at(0.5), 0.5);
        assert_relative_eq!(d.value_at(1.5), 0.5);
        assert_relative_eq!(d.value_at(1.9), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_period_rejected() {
        let schedule = ChangeSchedule::new("c", vec![0.0], vec![1.0]).unwrap();
        assert!(CyclicDriver::new(DriverBase::new("c"), schedule, 0.0).is_err());
    }
}
