//! Drivers for a musculoskeletal simulation.
//!
//! A driver produces one scalar per simulation step and pushes it to the
//! [`Drivable`] objects (usually muscles) on its target list. The drivers
//! in this crate fall into three families:
//!
//! - **Time functions**: [`FixedDriver`], [`StepDriver`], [`CyclicDriver`]
//!   and [`StackedBoxcarDriver`] depend on nothing but the step time
//! - **Oscillators**: [`TegotaeDriver`] and [`MarkerEllipseDriver`] advance
//!   a phase and move a marker around a rim
//! - **Kinematic solvers**: [`TwoHingeJointDriver`] and
//!   [`ThreeHingeJointDriver`] find the joint angles at which a limb
//!   reaches a target length
//!
//! [`DataTarget`] and [`KinematicMatch`] score the model against reference
//! tables, and [`DriverSet`] evaluates every driver of a model in
//! dependency order.
//!
//! # Stepping
//!
//! Every driver guards against being evaluated twice for the same step or
//! skipping a step ([`StepGuard`]). The step count comes from a
//! [`StepClock`](sim_types::StepClock) owned by the caller; the first step
//! is 1.
//!
//! # Example
//!
//! ```
//! use sim_control::{
//!     ChangeSchedule, DriverBase, DriverSet, Recorder, SharedDrivable, StepDriver,
//! };
//! use sim_skeleton::Skeleton;
//! use sim_types::StepClock;
//!
//! let muscle = Recorder::shared("soleus");
//! let target: SharedDrivable = muscle.clone();
//! let schedule = ChangeSchedule::new("activation", vec![0.02, 1.0], vec![0.1, 0.8])?;
//! let driver = StepDriver::new(DriverBase::new("activation").with_target(target), schedule);
//!
//! let mut set = DriverSet::new();
//! set.insert(driver)?;
//! set.finalize()?;
//!
//! let mut clock = StepClock::new(0.01)?;
//! let mut skeleton = Skeleton::new();
//! for _ in 0..3 {
//!     clock.advance();
//!     set.step(&clock, &mut skeleton)?;
//! }
//! assert_eq!(muscle.borrow().last_value(), Some(0.8));
//! # Ok::<(), sim_control::ControlError>(())
//! ```

#![doc(html_root_url = "https://docs.rs/sim-control/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
)]

mod boxcar;
mod chain;
mod cyclic;
mod drivable;
mod driver;
mod ellipse;
mod error;
mod filter;
mod fitness;
mod fixed;
mod hinge;
mod kind;
mod phase;
pub mod roots;
mod schedule;
mod set;
mod step;
mod target;
mod tegotae;
mod three_hinge;
mod trace;
mod two_hinge;

pub use boxcar::{Boxcar, StackedBoxcarDriver};
pub use chain::{
    ChainJoint, ChainLayout, ChainSolution, HingeChain, DEFAULT_TOLERANCE,
    EXTENSION_CURVE_SAMPLES, MONOTONIC_STEP,
};
pub use cyclic::CyclicDriver;
pub use drivable::{shared, Drivable, Recorder, SharedDrivable};
pub use driver::{Driver, DriverBase, StepContext, StepGuard, TimeDriver};
pub use ellipse::{quadrant, EllipseParameters, MarkerEllipseDriver};
pub use error::ControlError;
pub use filter::{ButterworthFilter, SignChange, SignChangeDetector};
pub use fitness::KinematicMatch;
pub use fixed::FixedDriver;
pub use hinge::{ChainKind, HingeJointDriver};
pub use kind::{AnyDriver, ModelContext, DRIVER_TYPES};
pub use phase::{shortest_delta, wrap_phase, ParameterInputs, RimMarkers};
pub use schedule::ChangeSchedule;
pub use set::{DriverSet, StepReport};
pub use step::StepDriver;
pub use target::{
    Comparison, DataTarget, InterpolationType, MatchType, MatchValue, Measurement, Quantity,
    ScalarSource,
};
pub use tegotae::{TegotaeDriver, TegotaeParameters};
pub use three_hinge::{ThreeHinge, ThreeHingeJointDriver};
pub use trace::TraceLog;
pub use two_hinge::{TwoHinge, TwoHingeJointDriver};

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, ControlError>;
