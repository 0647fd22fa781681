//! The driver contract.
//!
//! A driver is a per-step signal generator. Every step the step loop calls
//! [`Driver::update`] exactly once, then [`Driver::send_data`] pushes the
//! resulting value to every [`Drivable`](crate::Drivable) on the driver's
//! target list.
//!
//! # Step Sequencing
//!
//! Each driver owns a [`StepGuard`]. An update for any step other than the
//! one directly after the last evaluated step fails with
//! [`ControlError::Sequence`] instead of silently producing a value for the
//! wrong instant.
//!
//! # Common Attributes
//!
//! | Attribute | Meaning |
//! |-----------|---------|
//! | `ID` | Driver name |
//! | `Type` | Driver kind tag |
//! | `TargetIDList` | Space separated drivable names |
//! | `DriverRange` | Output clamp `min max`, with `min < max` |
//! | `LinearInterpolation` | Interpolate between table entries |

use std::collections::BTreeMap;
use std::fmt;

use sim_skeleton::Skeleton;
use sim_types::{attributes, Attributes, SimError};
use tracing::warn;

use crate::drivable::{SharedDrivable, TargetNames};
use crate::{ControlError, Result};

/// Precondition object for once-per-step evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepGuard {
    last: u64,
}

impl StepGuard {
    /// Create a guard expecting step 1 next.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The last step that was accepted.
    #[must_use]
    pub fn last(&self) -> u64 {
        self.last
    }

    /// Accept `current` if it directly follows the last accepted step.
    pub fn advance(&mut self, driver: &str, current: u64) -> Result<()> {
        let expected = self.last + 1;
        if current != expected {
            return Err(ControlError::sequence(driver, expected, current));
        }
        self.last = current;
        Ok(())
    }
}

/// Everything a driver may read or write during one update.
pub struct StepContext<'a> {
    /// Step being evaluated (the first step is 1).
    pub step_count: u64,
    /// Simulation time of this step.
    pub time: f64,
    /// Integration timestep.
    pub timestep: f64,
    /// The live kinematic model.
    pub skeleton: &'a mut Skeleton,
    /// Values of drivers already updated this step.
    pub driver_values: &'a BTreeMap<String, f64>,
}

impl StepContext<'_> {
    /// Value of another driver, if it has been updated.
    #[must_use]
    pub fn driver_value(&self, name: &str) -> Option<f64> {
        self.driver_values.get(name).copied()
    }
}

/// State shared by every driver kind.
pub struct DriverBase {
    name: String,
    targets: BTreeMap<String, SharedDrivable>,
    min_value: f64,
    max_value: f64,
    interp: bool,
    guard: StepGuard,
    value: f64,
}

impl fmt::Debug for DriverBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverBase")
            .field("name", &self.name)
            .field("targets", &TargetNames(&self.targets))
            .field("min_value", &self.min_value)
            .field("max_value", &self.max_value)
            .field("interp", &self.interp)
            .field("guard", &self.guard)
            .field("value", &self.value)
            .finish()
    }
}

impl DriverBase {
    /// Create a base with no targets and an unbounded range.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            targets: BTreeMap::new(),
            min_value: f64::NEG_INFINITY,
            max_value: f64::INFINITY,
            interp: false,
            guard: StepGuard::new(),
            value: 0.0,
        }
    }

    /// Read the common attributes and resolve `TargetIDList`.
    pub fn from_attributes(
        attrs: &Attributes,
        drivables: &BTreeMap<String, SharedDrivable>,
    ) -> Result<Self> {
        let name = attrs.required(attributes::ID)?;
        let mut base = Self::new(name);
        base.targets = resolve_targets(attrs, "TargetIDList", drivables)?;
        if let Some([min, max]) = attrs.optional_f64_array::<2>("DriverRange")? {
            base = base.with_range(min, max)?;
        }
        base.interp = attrs.optional_bool("LinearInterpolation")?.unwrap_or(false);
        Ok(base)
    }

    /// Set the output clamp range.
    pub fn with_range(mut self, min: f64, max: f64) -> Result<Self> {
        if min.is_nan() || max.is_nan() || min >= max {
            return Err(SimError::invalid(
                &self.name,
                "DriverRange",
                format!("{min} {max}"),
                "minimum must be less than maximum",
            )
            .into());
        }
        self.min_value = min;
        self.max_value = max;
        Ok(self)
    }

    /// Enable or disable interpolation.
    #[must_use]
    pub fn with_interp(mut self, interp: bool) -> Self {
        self.interp = interp;
        self
    }

    /// Add a target (builder style).
    #[must_use]
    pub fn with_target(mut self, target: SharedDrivable) -> Self {
        self.add_target(target);
        self
    }

    /// Driver name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lower output bound.
    #[must_use]
    pub fn min_value(&self) -> f64 {
        self.min_value
    }

    /// Upper output bound.
    #[must_use]
    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    /// Whether table lookups interpolate.
    #[must_use]
    pub fn interp(&self) -> bool {
        self.interp
    }

    /// The step guard.
    #[must_use]
    pub fn step_guard(&self) -> &StepGuard {
        &self.guard
    }

    /// Clip a value to the output range.
    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min_value, self.max_value)
    }

    /// Register a target. A target with the same name is replaced.
    pub fn add_target(&mut self, target: SharedDrivable) {
        let name = target.borrow().name().to_string();
        self.targets.insert(name, target);
    }

    /// Look up a target by name.
    #[must_use]
    pub fn target(&self, name: &str) -> Option<&SharedDrivable> {
        self.targets.get(name)
    }

    /// All targets keyed by name.
    #[must_use]
    pub fn targets(&self) -> &BTreeMap<String, SharedDrivable> {
        &self.targets
    }

    /// Accept the given step.
    pub fn advance(&mut self, step_count: u64) -> Result<()> {
        self.guard.advance(&self.name, step_count)
    }

    /// Latest output value.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Store a new output value.
    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    /// Push a value to every target.
    pub fn send_value(&self, value: f64, step_count: u64) {
        send_to(&self.name, &self.targets, value, step_count);
    }

    /// Write the common attributes.
    pub fn append_to_attributes(&self, attrs: &mut Attributes, type_tag: &str) {
        attrs.set(attributes::ID, self.name.as_str());
        attrs.set(attributes::TYPE, type_tag);
        attrs.set_names("TargetIDList", self.targets.keys().map(String::as_str));
        attrs.set_f64_list("DriverRange", &[self.min_value, self.max_value]);
        attrs.set_bool("LinearInterpolation", self.interp);
    }
}

/// Resolve a list of drivable names.
pub(crate) fn resolve_targets(
    attrs: &Attributes,
    key: &str,
    drivables: &BTreeMap<String, SharedDrivable>,
) -> Result<BTreeMap<String, SharedDrivable>> {
    let mut targets = BTreeMap::new();
    for name in attrs.optional_names(key) {
        let target = drivables
            .get(&name)
            .ok_or_else(|| SimError::unknown(attrs.name(), "drivable", name.as_str()))?;
        targets.insert(name, target.clone());
    }
    Ok(targets)
}

/// Push a value to a set of targets, skipping any that are busy.
pub(crate) fn send_to(
    driver: &str,
    targets: &BTreeMap<String, SharedDrivable>,
    value: f64,
    step_count: u64,
) {
    for (name, target) in targets {
        send_one(driver, name, target, value, step_count);
    }
}

/// Push a value to a single target, skipping it if busy.
pub(crate) fn send_one(
    driver: &str,
    name: &str,
    target: &SharedDrivable,
    value: f64,
    step_count: u64,
) {
    match target.try_borrow_mut() {
        Ok(mut sink) => sink.receive_value(value, step_count),
        Err(_) => warn!(driver, target = name, "target busy, value dropped"),
    }
}

/// A per-step signal generator.
pub trait Driver: fmt::Debug {
    /// Shared driver state.
    fn base(&self) -> &DriverBase;

    /// Mutable shared driver state.
    fn base_mut(&mut self) -> &mut DriverBase;

    /// The `Type` attribute tag for this kind.
    fn type_name(&self) -> &'static str;

    /// Driver name.
    fn name(&self) -> &str {
        self.base().name()
    }

    /// Advance internal state for the step in `ctx`.
    ///
    /// Must be called exactly once per step, with consecutive step counts.
    fn update(&mut self, ctx: &mut StepContext<'_>) -> Result<()>;

    /// Output after the latest update.
    fn value(&self) -> f64 {
        self.base().value()
    }

    /// Push the output to the targets.
    fn send_data(&mut self, step_count: u64) {
        let base = self.base();
        base.send_value(base.value(), step_count);
    }

    /// Drivers whose values this driver reads during its update.
    fn upstream_drivers(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Markers whose pose this driver reads during its update.
    fn markers_read(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Markers this driver moves during its update.
    fn markers_written(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Text emitted once before the trace header.
    fn dump_preamble(&self) -> Option<String> {
        None
    }

    /// Trace column names.
    fn dump_header(&self) -> Vec<String> {
        vec!["Time".to_string(), "Value".to_string()]
    }

    /// Trace row for the latest update.
    fn dump_row(&self, time: f64) -> Vec<f64> {
        vec![time, self.value()]
    }

    /// Export the configuration so the driver can be rebuilt.
    fn append_to_attributes(&self, attrs: &mut Attributes);
}

/// A driver whose output is a pure function of time.
pub trait TimeDriver: Driver {
    /// Output at `time`, clamped to the driver range.
    ///
    /// Calling twice with the same time returns the identical value.
    fn value_at(&mut self, time: f64) -> f64;
}

/// Memo of the last `(time, value)` evaluation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimeMemo {
    time: f64,
    value: f64,
}

impl Default for TimeMemo {
    fn default() -> Self {
        Self {
            time: f64::NAN,
            value: 0.0,
        }
    }
}

impl TimeMemo {
    pub(crate) fn lookup(&self, time: f64) -> Option<f64> {
        (time == self.time).then_some(self.value)
    }

    pub(crate) fn store(&mut self, time: f64, value: f64) -> f64 {
        self.time = time;
        self.value = value;
        value
    }
}

/// Shared `update` for time drivers.
pub(crate) fn update_time_driver<D: TimeDriver + ?Sized>(
    driver: &mut D,
    ctx: &StepContext<'_>,
) -> Result<()> {
    driver.base_mut().advance(ctx.step_count)?;
    let value = driver.value_at(ctx.time);
    driver.base_mut().set_value(value);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::drivable::{shared, Recorder};

    #[test]
    fn test_step_guard_sequence() {
        let mut guard = StepGuard::new();
        guard.advance("d", 1).unwrap();
        guard.advance("d", 2).unwrap();

        let repeat = guard.advance("d", 2).unwrap_err();
        assert!(matches!(
            repeat,
            ControlError::Sequence {
                expected: 3,
                actual: 2,
                ..
            }
        ));
        assert!(guard.advance("d", 4).is_err());
        assert_eq!(guard.last(), 2);
        guard.advance("d", 3).unwrap();
    }

    #[test]
    fn test_base_from_attributes() {
        let mut drivables: BTreeMap<String, SharedDrivable> = BTreeMap::new();
        drivables.insert("m1".into(), shared(Recorder::new("m1")));
        drivables.insert("m2".into(), shared(Recorder::new("m2")));

        let attrs = Attributes::new()
            .with("ID", "drv")
            .with("TargetIDList", "m1 m2")
            .with("DriverRange", "0 1")
            .with("LinearInterpolation", "true");
        let base = DriverBase::from_attributes(&attrs, &drivables).unwrap();
        assert_eq!(base.name(), "drv");
        assert_eq!(base.targets().len(), 2);
        assert!(base.interp());
        assert_eq!(base.clamp(1.5), 1.0);
        assert_eq!(base.clamp(-0.5), 0.0);

        let bad = attrs.clone().with("TargetIDList", "m3");
        assert!(DriverBase::from_attributes(&bad, &drivables).is_err());
        let bad = attrs.clone().with("DriverRange", "1 1");
        assert!(DriverBase::from_attributes(&bad, &drivables).is_err());
        let bad = attrs.with("DriverRange", "0 1 2");
        assert!(DriverBase::from_attributes(&bad, &drivables).is_err());
    }

    #[test]
    fn test_duplicate_target_overwrites() {
        let first = Recorder::shared("soleus");
        let second = Recorder::shared("soleus");
        let mut base = DriverBase::new("drv");
        base.add_target(first.clone());
        base.add_target(second.clone());
        assert_eq!(base.targets().len(), 1);

        base.send_value(0.7, 1);
        assert!(first.borrow().received().is_empty());
        assert_eq!(second.borrow().last_value(), Some(0.7));
    }

    #[test]
    fn test_busy_target_is_skipped() {
        let recorder = Recorder::shared("soleus");
        let base = DriverBase::new("drv").with_target(recorder.clone());
        let _held = recorder.borrow_mut();
        base.send_value(1.0, 1);
    }

    #[test]
    fn test_time_memo() {
        let mut memo = TimeMemo::default();
        assert_eq!(memo.lookup(0.0), None);
        memo.store(0.5, 3.0);
        assert_eq!(memo.lookup(0.5), Some(3.0));
        assert_eq!(memo.lookup(0.6), None);
    }
}
