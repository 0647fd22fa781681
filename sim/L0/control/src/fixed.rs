//! Constant output.

use std::collections::BTreeMap;

use sim_types::Attributes;

use crate::driver::{update_time_driver, Driver, DriverBase, StepContext, TimeDriver};
use crate::{Result, SharedDrivable};

/// A driver that outputs the same value every step.
#[derive(Debug)]
pub struct FixedDriver {
    base: DriverBase,
    constant: f64,
}

impl FixedDriver {
    /// Create a fixed driver.
    #[must_use]
    pub fn new(base: DriverBase, constant: f64) -> Self {
        Self { base, constant }
    }

    /// Build from attributes (`Value`).
    pub fn from_attributes(
        attrs: &Attributes,
        drivables: &BTreeMap<String, SharedDrivable>,
    ) -> Result<Self> {
        let base = DriverBase::from_attributes(attrs, drivables)?;
        let constant = attrs.required_f64("Value")?;
        Ok(Self::new(base, constant))
    }

    /// The configured constant, before clamping.
    #[must_use]
    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// Change the constant.
    pub fn set_constant(&mut self, constant: f64) {
        self.constant = constant;
    }
}

impl Driver for FixedDriver {
    fn base(&self) -> &DriverBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut DriverBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "Fixed"
    }

    fn update(&mut self, ctx: &mut StepContext<'_>) -> Result<()> {
        update_time_driver(self, ctx)
    }

    fn append_to_attributes(&self, attrs: &mut Attributes) {
        self.base.append_to_attributes(attrs, self.type_name());
        attrs.set_f64("Value", self.constant);
    }
}

impl TimeDriver for FixedDriver {
    fn value_at(&mut self, _time: f64) -> f64 {
        self.base.clamp(self.constant)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_is_clamped() {
        let base = DriverBase::new("f").with_range(0.0, 1.0).unwrap();
        let mut d = FixedDriver::new(base, 2.0);
        assert_eq!(d.value_at(0.0), 1.0);
        d.set_constant(0.25);
        assert_eq!(d.value_at(10.0), 0.25);
    }

    #[test]
    fn test_fixed_requires_value() {
        let attrs = Attributes::new().with("ID", "f");
        assert!(FixedDriver::from_attributes(&attrs, &BTreeMap::new()).is_err());
    }
}
