//! The closed set of driver kinds.
//!
//! [`AnyDriver`] is the single place where behaviour depends on the
//! concrete kind: building from attributes and reaching kind specific
//! setters such as [`TegotaeDriver::set_reaction_force`]. Everything else
//! goes through the [`Driver`] trait.

use std::collections::BTreeMap;
use std::rc::Rc;

use sim_skeleton::Skeleton;
use sim_types::{attributes, Attributes, SimError};

use crate::boxcar::StackedBoxcarDriver;
use crate::cyclic::CyclicDriver;
use crate::driver::{Driver, TimeDriver};
use crate::ellipse::MarkerEllipseDriver;
use crate::fixed::FixedDriver;
use crate::step::StepDriver;
use crate::target::DataTarget;
use crate::tegotae::TegotaeDriver;
use crate::three_hinge::ThreeHingeJointDriver;
use crate::two_hinge::TwoHingeJointDriver;
use crate::{Result, SharedDrivable};

/// `Type` tags understood by [`AnyDriver::from_attributes`].
pub const DRIVER_TYPES: [&str; 8] = [
    "Fixed",
    "Step",
    "Cyclic",
    "StackedBoxcar",
    "Tegotae",
    "MarkerEllipse",
    "TwoHingeJoint",
    "ThreeHingeJoint",
];

/// The parts of the model a driver resolves names against at construction.
#[derive(Clone, Copy)]
pub struct ModelContext<'a> {
    /// The live kinematic model.
    pub skeleton: &'a Skeleton,
    /// Drivables by name.
    pub drivables: &'a BTreeMap<String, SharedDrivable>,
    /// Data targets by name.
    pub data_targets: &'a BTreeMap<String, Rc<DataTarget>>,
    /// Integration timestep.
    pub timestep: f64,
}

impl ModelContext<'_> {
    /// Look up a data target referenced by `owner`.
    pub fn data_target(&self, owner: &str, name: &str) -> Result<Rc<DataTarget>> {
        self.data_targets
            .get(name)
            .cloned()
            .ok_or_else(|| SimError::unknown(owner, "data target", name).into())
    }
}

/// Any driver, tagged by kind.
#[derive(Debug)]
pub enum AnyDriver {
    /// Constant output.
    Fixed(FixedDriver),
    /// Step table.
    Step(StepDriver),
    /// Repeating step table.
    Cyclic(CyclicDriver),
    /// Sum of periodic pulses.
    StackedBoxcar(StackedBoxcarDriver),
    /// Tegotae oscillator.
    Tegotae(TegotaeDriver),
    /// Elliptical marker oscillator.
    MarkerEllipse(MarkerEllipseDriver),
    /// Two-hinge kinematic solver.
    TwoHingeJoint(TwoHingeJointDriver),
    /// Three-hinge kinematic solver.
    ThreeHingeJoint(ThreeHingeJointDriver),
}

macro_rules! any_driver_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for AnyDriver {
                fn from(driver: $ty) -> Self {
                    Self::$variant(driver)
                }
            }
        )*
    };
}

any_driver_from!(
    Fixed(FixedDriver),
    Step(StepDriver),
    Cyclic(CyclicDriver),
    StackedBoxcar(StackedBoxcarDriver),
    Tegotae(TegotaeDriver),
    MarkerEllipse(MarkerEllipseDriver),
    TwoHingeJoint(TwoHingeJointDriver),
    ThreeHingeJoint(ThreeHingeJointDriver),
);

impl AnyDriver {
    /// Build the driver named by the `Type` attribute.
    pub fn from_attributes(attrs: &Attributes, model: &ModelContext<'_>) -> Result<Self> {
        let driver = match attrs.required(attributes::TYPE)? {
            "Fixed" => FixedDriver::from_attributes(attrs, model.drivables)?.into(),
            "Step" => StepDriver::from_attributes(attrs, model.drivables)?.into(),
            "Cyclic" => CyclicDriver::from_attributes(attrs, model.drivables)?.into(),
            "StackedBoxcar" => StackedBoxcarDriver::from_attributes(attrs, model.drivables)?.into(),
            "Tegotae" => TegotaeDriver::from_attributes(attrs, model)?.into(),
            "MarkerEllipse" => MarkerEllipseDriver::from_attributes(attrs, model)?.into(),
            "TwoHingeJoint" => TwoHingeJointDriver::from_attributes(attrs, model)?.into(),
            "ThreeHingeJoint" => ThreeHingeJointDriver::from_attributes(attrs, model)?.into(),
            other => {
                return Err(SimError::invalid(
                    attrs.name(),
                    attributes::TYPE,
                    other,
                    format!("expected one of {}", DRIVER_TYPES.join(", ")),
                )
                .into())
            }
        };
        Ok(driver)
    }

    /// The driver behind the tag.
    #[must_use]
    pub fn as_driver(&self) -> &dyn Driver {
        match self {
            Self::Fixed(d) => d,
            Self::Step(d) => d,
            Self::Cyclic(d) => d,
            Self::StackedBoxcar(d) => d,
            Self::Tegotae(d) => d,
            Self::MarkerEllipse(d) => d,
            Self::TwoHingeJoint(d) => d,
            Self::ThreeHingeJoint(d) => d,
        }
    }

    /// The driver behind the tag, mutably.
    pub fn as_driver_mut(&mut self) -> &mut dyn Driver {
        match self {
            Self::Fixed(d) => d,
            Self::Step(d) => d,
            Self::Cyclic(d) => d,
            Self::StackedBoxcar(d) => d,
            Self::Tegotae(d) => d,
            Self::MarkerEllipse(d) => d,
            Self::TwoHingeJoint(d) => d,
            Self::ThreeHingeJoint(d) => d,
        }
    }

    /// The pure time function, for the kinds that are one.
    pub fn as_time_driver_mut(&mut self) -> Option<&mut dyn TimeDriver> {
        match self {
            Self::Fixed(d) => Some(d),
            Self::Step(d) => Some(d),
            Self::Cyclic(d) => Some(d),
            Self::StackedBoxcar(d) => Some(d),
            _ => None,
        }
    }

    /// Driver name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.as_driver().name()
    }
}
