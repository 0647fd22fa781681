//! The per-step driver loop.
//!
//! A [`DriverSet`] owns every driver of a model. After
//! [`finalize`](DriverSet::finalize) fixes an evaluation order, each call to
//! [`step`](DriverSet::step) updates every driver once, in that order, and
//! then lets every driver push its value to its targets.
//!
//! # Ordering
//!
//! A driver whose parameters follow another driver (`OmegaDriverID`,
//! `DesiredLengthDriverID`, ...) always runs after it; a cycle among these
//! is a configuration error. Drivers that move a marker run before drivers
//! that read it, unless that would itself form a cycle, in which case only
//! the value dependencies are kept. Ties keep insertion order.

use std::collections::{BTreeMap, BTreeSet};

use sim_skeleton::Skeleton;
use sim_types::{Attributes, SimError, StepClock};
use tracing::{debug, warn};

use crate::driver::StepContext;
use crate::kind::{AnyDriver, ModelContext};
use crate::trace::TraceLog;
use crate::{ControlError, Result};

/// Outcome of one [`DriverSet::step`].
#[derive(Debug, Default)]
pub struct StepReport {
    /// The step that was evaluated.
    pub step_count: u64,
    /// Recoverable failures; the named drivers kept their previous value.
    pub skipped: Vec<ControlError>,
}

impl StepReport {
    /// Whether every driver updated.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Every driver of a model, evaluated in dependency order.
#[derive(Debug, Default)]
pub struct DriverSet {
    drivers: Vec<AnyDriver>,
    by_name: BTreeMap<String, usize>,
    order: Option<Vec<usize>>,
    values: BTreeMap<String, f64>,
    traces: BTreeMap<String, TraceLog>,
}

impl DriverSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every driver in `configs`, then fix the order.
    pub fn from_attributes(configs: &[Attributes], model: &ModelContext<'_>) -> Result<Self> {
        let mut set = Self::new();
        for attrs in configs {
            set.insert(AnyDriver::from_attributes(attrs, model)?)?;
        }
        set.finalize()?;
        Ok(set)
    }

    /// Add a driver. The set must be finalized again before stepping.
    pub fn insert(&mut self, driver: impl Into<AnyDriver>) -> Result<()> {
        let driver = driver.into();
        let name = driver.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(SimError::DuplicateName { kind: "driver", name }.into());
        }
        self.by_name.insert(name, self.drivers.len());
        self.drivers.push(driver);
        self.order = None;
        Ok(())
    }

    /// Number of drivers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Whether the set has no drivers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Look up a driver.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AnyDriver> {
        self.by_name.get(name).map(|&i| &self.drivers[i])
    }

    /// Look up a driver mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut AnyDriver> {
        self.by_name.get(name).map(|&i| &mut self.drivers[i])
    }

    /// Drivers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &AnyDriver> {
        self.drivers.iter()
    }

    /// Resolve driver references and fix the evaluation order.
    pub fn finalize(&mut self) -> Result<()> {
        let mut hard = BTreeSet::new();
        for (to, driver) in self.drivers.iter().enumerate() {
            let driver = driver.as_driver();
            for upstream in driver.upstream_drivers() {
                let from = *self
                    .by_name
                    .get(upstream)
                    .ok_or_else(|| SimError::unknown(driver.name(), "driver", upstream))?;
                if from == to {
                    return Err(ControlError::DependencyCycle {
                        driver: driver.name().to_string(),
                    });
                }
                hard.insert((from, to));
            }
        }

        let mut soft = hard.clone();
        for (from, writer) in self.drivers.iter().enumerate() {
            let written = writer.as_driver().markers_written();
            for (to, reader) in self.drivers.iter().enumerate() {
                if from != to
                    && reader
                        .as_driver()
                        .markers_read()
                        .iter()
                        .any(|m| written.contains(m))
                {
                    soft.insert((from, to));
                }
            }
        }

        let order = match topological_order(self.drivers.len(), &soft) {
            Ok(order) => order,
            Err(_) => {
                debug!("marker ordering forms a cycle, keeping value dependencies only");
                topological_order(self.drivers.len(), &hard).map_err(|i| {
                    ControlError::DependencyCycle {
                        driver: self.drivers[i].name().to_string(),
                    }
                })?
            }
        };
        debug!(
            order = ?order.iter().map(|&i| self.drivers[i].name()).collect::<Vec<_>>(),
            "driver order"
        );
        self.order = Some(order);
        Ok(())
    }

    /// Driver names in evaluation order.
    pub fn order(&self) -> Result<Vec<&str>> {
        let order = self.order.as_ref().ok_or_else(Self::not_configured)?;
        Ok(order.iter().map(|&i| self.drivers[i].name()).collect())
    }

    /// Update every driver for the clock's current step, then send data.
    ///
    /// A recoverable failure (an unreachable kinematic target) is logged and
    /// reported; any other failure stops the step.
    pub fn step(&mut self, clock: &StepClock, skeleton: &mut Skeleton) -> Result<StepReport> {
        let order = self.order.as_ref().ok_or_else(Self::not_configured)?;
        let step_count = clock.step_count();
        let time = clock.time();
        let mut report = StepReport {
            step_count,
            skipped: Vec::new(),
        };
        self.values.clear();

        for &i in order {
            let driver = self.drivers[i].as_driver_mut();
            let result = {
                let mut ctx = StepContext {
                    step_count,
                    time,
                    timestep: clock.timestep(),
                    skeleton: &mut *skeleton,
                    driver_values: &self.values,
                };
                driver.update(&mut ctx)
            };
            match result {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    warn!(driver = driver.name(), error = %e, "driver update skipped");
                    report.skipped.push(e);
                }
                Err(e) => return Err(e),
            }
            self.values.insert(driver.name().to_string(), driver.value());
            if let Some(trace) = self.traces.get_mut(driver.name()) {
                trace.record(&*driver, time);
            }
        }
        for &i in order {
            self.drivers[i].as_driver_mut().send_data(step_count);
        }
        Ok(report)
    }

    /// Values of every driver after the latest step.
    #[must_use]
    pub fn values(&self) -> &BTreeMap<String, f64> {
        &self.values
    }

    /// Start recording a trace of `name`.
    pub fn enable_trace(&mut self, name: &str) -> Result<()> {
        if !self.by_name.contains_key(name) {
            return Err(SimError::unknown("DriverSet", "driver", name).into());
        }
        self.traces.entry(name.to_string()).or_default();
        Ok(())
    }

    /// The trace of `name`, if enabled.
    #[must_use]
    pub fn trace(&self, name: &str) -> Option<&TraceLog> {
        self.traces.get(name)
    }

    /// Export every driver in insertion order.
    #[must_use]
    pub fn to_attributes(&self) -> Vec<Attributes> {
        self.drivers
            .iter()
            .map(|driver| {
                let mut attrs = Attributes::new();
                driver.as_driver().append_to_attributes(&mut attrs);
                attrs
            })
            .collect()
    }

    fn not_configured() -> ControlError {
        ControlError::NotConfigured {
            object: "DriverSet".to_string(),
        }
    }
}

/// Kahn's algorithm, smallest ready index first. On a cycle, returns a
/// node that could not be placed.
fn topological_order(
    n: usize,
    edges: &BTreeSet<(usize, usize)>,
) -> std::result::Result<Vec<usize>, usize> {
    let mut indegree = vec![0_usize; n];
    for &(_, to) in edges {
        indegree[to] += 1;
    }
    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &(from, to) in edges.range((next, 0)..(next + 1, 0)) {
            debug_assert_eq!(from, next);
            indegree[to] -= 1;
            if indegree[to] == 0 {
                ready.insert(to);
            }
        }
    }
    if order.len() == n {
        Ok(order)
    } else {
        Err((0..n).find(|&i| indegree[i] > 0).unwrap_or(0))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::drivable::Recorder;
    use crate::driver::DriverBase;
    use crate::fixed::FixedDriver;
    use crate::SharedDrivable;
    use std::rc::Rc;

    fn fixed(name: &str, value: f64) -> FixedDriver {
        FixedDriver::new(DriverBase::new(name), value)
    }

    #[test]
    fn test_step_requires_finalize() {
        let mut set = DriverSet::new();
        set.insert(fixed("a", 1.0)).unwrap();
        let mut clock = StepClock::new(0.01).unwrap();
        let mut skeleton = Skeleton::new();
        clock.advance();
        let err = set.step(&clock, &mut skeleton).unwrap_err();
        assert!(err.is_sequence_error());

        set.finalize().unwrap();
        let report = set.step(&clock, &mut skeleton).unwrap();
        assert!(report.is_clean());
        assert_eq!(set.values()["a"], 1.0);

        // the same step twice is a sequencing error
        assert!(set.step(&clock, &mut skeleton).unwrap_err().is_sequence_error());
    }

    #[test]
    fn test_duplicate_and_unknown_names() {
        let mut set = DriverSet::new();
        set.insert(fixed("a", 1.0)).unwrap();
        assert!(set.insert(fixed("a", 2.0)).is_err());
        assert!(set.enable_trace("b").is_err());
        assert!(set.get("a").is_some());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_topological_order() {
        let edges = BTreeSet::from([(2, 0), (0, 1)]);
        assert_eq!(topological_order(3, &edges), Ok(vec![2, 0, 1]));
        let cycle = BTreeSet::from([(0, 1), (1, 0)]);
        assert!(topological_order(3, &cycle).is_err());
    }

    #[test]
    fn test_send_and_trace() {
        let recorder = Recorder::shared("m");
        let target: SharedDrivable = recorder.clone();
        let mut set = DriverSet::new();
        set.insert(FixedDriver::new(DriverBase::new("a").with_target(target), 0.3))
            .unwrap();
        set.finalize().unwrap();
        set.enable_trace("a").unwrap();
        let mut clock = StepClock::new(0.5).unwrap();
        let mut skeleton = Skeleton::new();
        for _ in 0..3 {
            clock.advance();
            set.step(&clock, &mut skeleton).unwrap();
        }
        assert_eq!(recorder.borrow().received().len(), 3);
        assert_eq!(recorder.borrow().last_value(), Some(0.3));
        assert_eq!(set.trace("a").unwrap().rows(), 3);
        assert_eq!(Rc::strong_count(&recorder), 2);
        assert_eq!(set.to_attributes()[0].get("Value"), Some("0.3"));
    }
}
