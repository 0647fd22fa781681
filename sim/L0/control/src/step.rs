//! Piecewise constant output that runs once through its table.

use std::collections::BTreeMap;

use sim_types::Attributes;

use crate::driver::{update_time_driver, Driver, DriverBase, StepContext, TimeDriver, TimeMemo};
use crate::schedule::ChangeSchedule;
use crate::{Result, SharedDrivable};

/// Outputs `Values[i]` during the `i`-th duration window.
///
/// There is no wraparound: once the table is exhausted the last value is
/// held. With interpolation enabled the output ramps linearly from each
/// value to the next across its window.
#[derive(Debug)]
pub struct StepDriver {
    base: DriverBase,
    schedule: ChangeSchedule,
    memo: TimeMemo,
}

impl StepDriver {
    /// Create a step driver.
    #[must_use]
    pub fn new(base: DriverBase, schedule: ChangeSchedule) -> Self {
        Self {
            base,
            schedule,
            memo: TimeMemo::default(),
        }
    }

    /// Build from attributes (`Durations`, `Values`).
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
        Ok(Self::new(base, schedule))
    }

    /// The underlying table.
    #[must_use]
    pub fn schedule(&self) -> &ChangeSchedule {
        &self.schedule
    }
}

impl Driver for StepDriver {
    fn base(&self) -> &DriverBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut DriverBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "Step"
    }

    fn update(&mut self, ctx: &mut StepContext<'_>) -> Result<()> {
        update_time_driver(self, ctx)
    }

    fn append_to_attributes(&self, attrs: &mut Attributes) {
        self.base.append_to_attributes(attrs, self.type_name());
        attrs.set_f64_list("Durations", self.schedule.durations());
        attrs.set_f64_list("Values", self.schedule.values());
    }
}

impl TimeDriver for StepDriver {
    fn value_at(&mut self, time: f64) -> f64 {
        if let Some(value) = self.memo.lookup(time) {
            return value;
        }
        let index = self.schedule.lookup(time);
        let current = self.schedule.value(index);
        let raw = if self.base.interp() && index < self.schedule.len() {
            let next = self.schedule.value(index + 1);
            current + self.schedule.segment_fraction(index, time) * (next - current)
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

    fn driver(interp: bool) -> StepDriver {
        let schedule = ChangeSchedule::new("s", vec![1.0, 1.0], vec![0.0, 2.0]).unwrap();
        StepDriver::new(DriverBase::new("s").with_interp(interp), schedule)
    }

    #[test]
    fn test_holds_last_value() {
        let mut d = driver(false);
        assert_eq!(d.value_at(0.5), 0.0);
        assert_eq!(d.value_at(1.5), 2.0);
        assert_eq!(d.value_at(2.5), 2.0);
        assert_eq!(d.value_at(1000.0), 2.0);
        // Going backwards still works.
        assert_eq!(d.value_at(0.1), 0.0);
    }

    #[test]
    fn test_interpolated_ramp() {
        let mut d = driver(true);
        assert_relative_eq!(d.value_at(0.5), 1.0);
        // Last segment ramps toward itself.
        assert_relative_eq!(d.value_at(1.5), 2.0);
        assert_relative_eq!(d.value_at(5.0), 2.0);
    }
}
