//! Sinks for driver output.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Anything that accepts one scalar control value per step.
///
/// Muscles take an activation, sub-controllers take a set point. A sink may
/// receive values from several drivers in the same step.
pub trait Drivable {
    /// Sink name, used as the key in driver target lists.
    fn name(&self) -> &str;

    /// Accept a value for the given step.
    fn receive_value(&mut self, value: f64, step_count: u64);
}

/// A drivable shared between the model and the drivers that feed it.
pub type SharedDrivable = Rc<RefCell<dyn Drivable>>;

/// Wrap a drivable for sharing.
pub fn shared<D: Drivable + 'static>(drivable: D) -> SharedDrivable {
    Rc::new(RefCell::new(drivable))
}

/// A drivable that keeps every value it receives.
///
/// Useful as a probe on a driver output and in tests.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    name: String,
    received: Vec<(u64, f64)>,
}

impl Recorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            received: Vec::new(),
        }
    }

    /// Create a recorder already wrapped for sharing.
    #[must_use]
    pub fn shared(name: impl Into<String>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new(name)))
    }

    /// Every `(step, value)` pair received so far.
    #[must_use]
    pub fn received(&self) -> &[(u64, f64)] {
        &self.received
    }

    /// The most recent value, if any.
    #[must_use]
    pub fn last_value(&self) -> Option<f64> {
        self.received.last().map(|(_, v)| *v)
    }
}

impl Drivable for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive_value(&mut self, value: f64, step_count: u64) {
        self.received.push((step_count, value));
    }
}

pub(crate) struct TargetNames<'a>(pub &'a std::collections::BTreeMap<String, SharedDrivable>);

impl fmt::Debug for TargetNames<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.keys()).finish()
    }
}
