//! Open hinge chains solved for an end-to-end length.
//!
//! A chain starts at a proximal joint (hinge, universal or ball) fixed to a
//! base body and continues through one or more hinges to a distal body
//! marker. A single fraction `t` drives every distal hinge at once:
//!
//! ```text
//! angle_k(t) = low_k + (high_k - low_k) · t^gamma_k
//! length(t)  = |distal marker - proximal joint anchor|
//! ```
//!
//! All posing happens on a private subset of the skeleton taken at
//! construction. The chain is solved in the construction frame of the base
//! body and only copied into the live model by [`HingeChain::apply_to`].
//!
//! # Solving
//!
//! 1. At construction, `length(t)` is sampled on `[0, 1]`; a chain whose
//!    length is not strictly monotonic is rejected.
//! 2. Each solve checks that the desired length lies between `length(0)`
//!    and `length(1)`, then runs [`zeroin`] over the fraction.
//! 3. The proximal joint swings the solved chain toward the target marker.
//!    A hinge keeps its angle within the proximal range; universal and ball
//!    joints add a second rotation about the swung body 1 Y axis.

use nalgebra::{Unit, UnitQuaternion, Vector3};
use sim_skeleton::{JointKind, Skeleton};
use sim_types::{Axis, SimError};
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::roots::{monotonic_test, zeroin, Monotonicity};
use crate::{ControlError, Result};

/// Sampling step of the monotonic check.
pub const MONOTONIC_STEP: f64 = 0.001;

/// Default bound on the length residual of a solve.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Rows in an extension curve dump.
pub const EXTENSION_CURVE_SAMPLES: usize = 1001;

/// A chain joint and the angles its fraction spans.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChainJoint {
    /// Joint name.
    pub joint: String,
    /// Angle at fraction 0.
    pub low: f64,
    /// Angle at fraction 1.
    pub high: f64,
    /// Exponent shaping the fraction. Ignored for the proximal joint.
    pub gamma: f64,
}

impl ChainJoint {
    /// A joint with a linear fraction to angle map.
    #[must_use]
    pub fn new(joint: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            joint: joint.into(),
            low,
            high,
            gamma: 1.0,
        }
    }

    /// Set the shaping exponent.
    #[must_use]
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Joint angle for a fraction.
    #[must_use]
    pub fn angle(&self, fraction: f64) -> f64 {
        self.low + (self.high - self.low) * fraction.powf(self.gamma)
    }

    fn validate(&self, owner: &str, attribute: &str) -> Result<()> {
        if !(self.low.is_finite() && self.high.is_finite()) || self.low == self.high {
            return Err(SimError::invalid(
                owner,
                attribute,
                format!("{} {}", self.low, self.high),
                "range ends must be finite and distinct",
            )
            .into());
        }
        if !(self.gamma.is_finite() && self.gamma > 0.0) {
            return Err(SimError::invalid(
                owner,
                attribute,
                self.gamma.to_string(),
                "gamma must be positive",
            )
            .into());
        }
        Ok(())
    }
}

/// Joints and markers making up a chain.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChainLayout {
    /// Joint between the base body and the first moving body.
    pub proximal: ChainJoint,
    /// Hinges from proximal to distal.
    pub links: Vec<ChainJoint>,
    /// Marker on the base body the chain reaches for.
    pub target_marker: String,
    /// Marker on the last body whose distance is solved for.
    pub distal_marker: String,
}

/// Result of the latest solve.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChainSolution {
    /// Length that was asked for.
    pub desired_length: f64,
    /// Length reached.
    pub length: f64,
    /// Common fraction of the distal hinges.
    pub fraction: f64,
    /// Fraction of the proximal range used by the first proximal angle.
    pub proximal_fraction: f64,
    /// Proximal rotation angles (the second is zero for a hinge).
    pub proximal_angles: [f64; 2],
    /// Root finder iterations.
    pub iterations: usize,
}

/// A hinge chain posed on a private copy of its bodies.
#[derive(Debug, Clone)]
pub struct HingeChain {
    owner: String,
    layout: ChainLayout,
    proximal_kind: JointKind,
    proximal_marker: String,
    base: String,
    /// Bodies moved by the proximal joint, proximal to distal.
    bodies: Vec<String>,
    scratch: Skeleton,
    tolerance: f64,
    monotonicity: Monotonicity,
    /// Lengths at fractions 0 and 1, shortest first.
    reach: (f64, f64),
    solution: ChainSolution,
}

impl HingeChain {
    /// Resolve the layout against the live skeleton, copy the chain bodies
    /// and check that the length is monotonic in the fraction.
    pub fn new(owner: impl Into<String>, skeleton: &Skeleton, layout: ChainLayout) -> Result<Self> {
        let owner = owner.into();
        let joint = |name: &str| {
            skeleton
                .joint(name)
                .ok_or_else(|| SimError::unknown(owner.as_str(), "joint", name))
        };
        let marker = |name: &str| {
            skeleton
                .marker(name)
                .ok_or_else(|| SimError::unknown(owner.as_str(), "marker", name))
        };
        let not_on = |attribute: &str, value: &str, body: &str| {
            SimError::invalid(
                owner.as_str(),
                attribute,
                value,
                format!("must be attached to body {body}"),
            )
        };

        layout.proximal.validate(&owner, "ProximalJointRange")?;
        let proximal = joint(&layout.proximal.joint)?;
        let (Some(base), Some(first)) = (proximal.body1(), proximal.body2()) else {
            return Err(SimError::invalid(
                owner.as_str(),
                "ProximalJointID",
                layout.proximal.joint.as_str(),
                "must connect two bodies",
            )
            .into());
        };
        let mut bodies = vec![first.to_string()];

        if layout.links.is_empty() {
            return Err(SimError::missing(owner.as_str(), "DistalJointID").into());
        }
        for link in &layout.links {
            link.validate(&owner, "JointRange")?;
            let hinge = joint(&link.joint)?;
            if hinge.kind() != JointKind::Hinge {
                return Err(SimError::invalid(
                    owner.as_str(),
                    "JointID",
                    link.joint.as_str(),
                    format!("must be a hinge, found {}", hinge.kind()),
                )
                .into());
            }
            let previous = bodies.last().map_or("", String::as_str);
            if hinge.body1() != Some(previous) {
                return Err(not_on("JointID", &link.joint, previous).into());
            }
            let next = hinge.body2().ok_or_else(|| not_on("JointID", &link.joint, "a body"))?;
            bodies.push(next.to_string());
        }

        let last = bodies.last().map_or("", String::as_str);
        if marker(&layout.distal_marker)?.body() != Some(last) {
            return Err(not_on("DistalBodyMarkerID", &layout.distal_marker, last).into());
        }
        if marker(&layout.target_marker)?.body() != Some(base) {
            return Err(not_on("TargetMarkerID", &layout.target_marker, base).into());
        }

        let mut members = vec![base.to_string()];
        members.extend(bodies.iter().cloned());
        let scratch = skeleton.subset(&members)?;

        let mut chain = Self {
            proximal_kind: proximal.kind(),
            proximal_marker: proximal.marker1().to_string(),
            base: base.to_string(),
            owner,
            layout,
            bodies,
            scratch,
            tolerance: DEFAULT_TOLERANCE,
            monotonicity: Monotonicity::NotMonotonic,
            reach: (0.0, 0.0),
            solution: ChainSolution::default(),
        };
        chain.check_monotonic()?;
        let (at_low, at_high) = (chain.calculate_length(0.0)?, chain.calculate_length(1.0)?);
        chain.reach = if at_low <= at_high {
            (at_low, at_high)
        } else {
            (at_high, at_low)
        };
        Ok(chain)
    }

    /// Set the residual bound.
    pub fn with_tolerance(mut self, tolerance: f64) -> Result<Self> {
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(SimError::invalid(
                self.owner.as_str(),
                "Tolerance",
                tolerance.to_string(),
                "must be positive",
            )
            .into());
        }
        self.tolerance = tolerance;
        Ok(self)
    }

    /// Joints and markers of the chain.
    #[must_use]
    pub fn layout(&self) -> &ChainLayout {
        &self.layout
    }

    /// Residual bound.
    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Whether the length grows or shrinks with the fraction.
    #[must_use]
    pub fn monotonicity(&self) -> Monotonicity {
        self.monotonicity
    }

    /// Shortest and longest reachable lengths.
    #[must_use]
    pub fn reach(&self) -> (f64, f64) {
        self.reach
    }

    /// Latest solve.
    #[must_use]
    pub fn solution(&self) -> &ChainSolution {
        &self.solution
    }

    /// The private copy of the chain bodies.
    #[must_use]
    pub fn scratch(&self) -> &Skeleton {
        &self.scratch
    }

    /// Pose the distal hinges for `fraction` and measure the chain.
    ///
    /// The proximal joint is left at its construction pose.
    pub fn calculate_length(&mut self, fraction: f64) -> Result<f64> {
        self.scratch.reset_to_construction();
        for (i, link) in self.layout.links.iter().enumerate() {
            let pivot = self.scratch.joint_anchor(&link.joint)?;
            let axis = Unit::new_normalize(self.scratch.joint_axis(&link.joint)?);
            let rotation = UnitQuaternion::from_axis_angle(&axis, -link.angle(fraction));
            self.scratch.rotate_bodies(&self.bodies[i + 1..], &pivot, &rotation)?;
        }
        self.current_length()
    }

    fn current_length(&self) -> Result<f64> {
        let pivot = self.scratch.joint_anchor(&self.layout.proximal.joint)?;
        let end = self.scratch.marker_world_position(&self.layout.distal_marker)?;
        Ok((end - pivot).norm())
    }

    /// Copy the live target marker placement into the private chain.
    pub fn sync_target(&mut self, live: &Skeleton) -> Result<()> {
        let target = &self.layout.target_marker;
        let local = *live
            .marker(target)
            .ok_or_else(|| SimError::unknown(self.owner.as_str(), "marker", target.as_str()))?
            .local();
        self.scratch.set_marker_local_pose(target, local)?;
        Ok(())
    }

    /// Distance from the proximal joint to the target marker.
    pub fn target_distance(&self) -> Result<f64> {
        let pivot = self.scratch.joint_anchor(&self.layout.proximal.joint)?;
        let target = self.scratch.marker_world_position(&self.layout.target_marker)?;
        Ok((target - pivot).norm())
    }

    /// Find the fraction giving `desired` and swing the chain onto the target.
    ///
    /// A length outside the reachable range returns
    /// [`ControlError::Unreachable`] and leaves the previous solution and
    /// pose in place.
    pub fn solve(&mut self, desired: f64) -> Result<ChainSolution> {
        let (low, high) = self.reach;
        if !(desired >= low && desired <= high) {
            return Err(ControlError::Unreachable {
                driver: self.owner.clone(),
                desired,
                low,
                high,
            });
        }

        let mut failure = None;
        let root = zeroin(
            |t| match self.calculate_length(t) {
                Ok(length) => length - desired,
                Err(e) => {
                    failure.get_or_insert(e);
                    f64::NAN
                }
            },
            0.0,
            1.0,
            0.0,
        );
        if let Some(e) = failure {
            return Err(e);
        }
        let root = root?;
        if root.fx.abs() > self.tolerance {
            warn!(
                driver = %self.owner,
                desired,
                residual = root.fx,
                tolerance = self.tolerance,
                "hinge chain residual above tolerance"
            );
        }

        let length = self.calculate_length(root.x)?;
        let (proximal_fraction, proximal_angles) = self.aim_proximal()?;
        self.solution = ChainSolution {
            desired_length: desired,
            length,
            fraction: root.x,
            proximal_fraction,
            proximal_angles,
            iterations: root.iterations,
        };
        debug!(
            driver = %self.owner,
            fraction = root.x,
            iterations = root.iterations,
            "hinge chain solved"
        );
        Ok(self.solution)
    }

    fn aim_proximal(&mut self) -> Result<(f64, [f64; 2])> {
        let proximal = &self.layout.proximal;
        let pivot = self.scratch.joint_anchor(&proximal.joint)?;
        let normal1 = self.scratch.joint_axis(&proximal.joint)?;
        let start = self.scratch.marker_world_position(&self.layout.distal_marker)? - pivot;
        let target = self.scratch.marker_world_position(&self.layout.target_marker)? - pivot;

        let swing = plane_angle(&normal1, &start, &target);
        let span = proximal.high - proximal.low;
        let fraction = ((-swing - proximal.low) / span).clamp(0.0, 1.0);
        let angle1 = proximal.low + fraction * span;
        let axis1 = Unit::new_normalize(normal1);
        let mut rotation = UnitQuaternion::from_axis_angle(&axis1, -angle1);

        let mut angle2 = 0.0;
        if self.proximal_kind != JointKind::Hinge {
            let swung = UnitQuaternion::from_axis_angle(&axis1, swing);
            let normal2 = swung * self.scratch.marker_world_axis(&self.proximal_marker, Axis::Y)?;
            angle2 = plane_angle(&normal2, &(swung * start), &target);
            rotation = UnitQuaternion::from_axis_angle(&Unit::new_normalize(normal2), angle2) * rotation;
        }

        self.scratch.rotate_bodies(&self.bodies, &pivot, &rotation)?;
        Ok((fraction, [angle1, angle2]))
    }

    /// Copy the solved body poses into the live skeleton, relative to the
    /// live base body.
    pub fn apply_to(&self, live: &mut Skeleton) -> Result<()> {
        let scratch_base = self.scratch.body_pose(&self.base)?;
        let live_base = live.body_pose(&self.base)?;
        for body in &self.bodies {
            let relative = scratch_base.relative(&self.scratch.body_pose(body)?);
            live.set_body_pose(body, live_base.compose(&relative))?;
        }
        Ok(())
    }

    /// Euler angles of every chain joint in the solved pose, proximal first.
    pub fn joint_euler_angles(&self) -> Result<Vec<Vector3<f64>>> {
        std::iter::once(&self.layout.proximal)
            .chain(&self.layout.links)
            .map(|joint| -> Result<Vector3<f64>> {
                Ok(self.scratch.joint_euler_angles(&joint.joint, false)?)
            })
            .collect()
    }

    /// Whether a strap lies entirely on the chain.
    #[must_use]
    pub fn has_strap(&self, strap: &str) -> bool {
        self.scratch.strap(strap).is_some()
    }

    /// Length of a strap in the solved pose.
    pub fn strap_length(&self, strap: &str) -> Result<f64> {
        Ok(self.scratch.strap_length(strap)?)
    }

    /// `(fraction, length)` pairs over `[0, 1]`.
    ///
    /// Evaluated on a copy so the solved pose is untouched.
    pub fn extension_curve(&self) -> Result<Vec<[f64; 2]>> {
        let mut probe = self.clone();
        let last = (EXTENSION_CURVE_SAMPLES - 1) as f64;
        (0..EXTENSION_CURVE_SAMPLES)
            .map(|i| {
                let fraction = i as f64 / last;
                Ok([fraction, probe.calculate_length(fraction)?])
            })
            .collect()
    }

    fn check_monotonic(&mut self) -> Result<()> {
        let mut failure = None;
        let shape = monotonic_test(
            |t| match self.calculate_length(t) {
                Ok(length) => length,
                Err(e) => {
                    failure.get_or_insert(e);
                    f64::NAN
                }
            },
            0.0,
            1.0 + MONOTONIC_STEP / 2.0,
            MONOTONIC_STEP,
        );
        if let Some(e) = failure {
            return Err(e);
        }
        if !shape.is_strict() {
            warn!(
                driver = %self.owner,
                ?shape,
                links = ?self.layout.links,
                "chain length is not monotonic, narrow the joint ranges"
            );
            return Err(ControlError::NonMonotonic {
                driver: self.owner.clone(),
            });
        }
        self.monotonicity = shape;
        Ok(())
    }
}

/// Signed angle about `normal` taking `from` onto `to`, both projected into
/// the plane normal to `normal`.
fn plane_angle(normal: &Vector3<f64>, from: &Vector3<f64>, to: &Vector3<f64>) -> f64 {
    let project = |v: &Vector3<f64>| normal.cross(&v.cross(normal));
    let (a, b) = (project(from), project(to));
    normal.dot(&a.cross(&b)).atan2(a.dot(&b))
}
