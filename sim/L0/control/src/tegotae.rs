//! Tegotae leg oscillator.
//!
//! The phase advances at
//!
//! ```text
//! φ̇ = ω - σ·N·cos φ        (ω + σ·N·cos φ when mirrored)
//! ```
//!
//! where `N` is the non-negative ground reaction force on the leg. The leg
//! target traces `(B·cos φ, A·sin φ)` during swing (`φ < π`) and
//! `(B·cos φ, A'·sin φ)` during stance, in the frame of the centre marker.
//! The rim marker is moved onto that target every step, and the driver
//! outputs the error between the rim and the error output marker,
//! expressed in the centre marker frame.
//!
//! # Attributes
//!
//! | Attribute | Meaning |
//! |-----------|---------|
//! | `Omega`, `Sigma` | Intrinsic rate and feedback gain |
//! | `A`, `Aprime`, `B` | Swing, stance and fore-aft amplitudes |
//! | `Phi` | Initial phase |
//! | `Mirror` | Flip the sign of the feedback term |
//! | `AllowNegativePhiDot` | Otherwise `φ̇` is floored at 0 |
//! | `CentreMarkerID`, `RimMarkerID` | Oscillator frame and moving marker |
//! | `ErrorOutputMarkerID` | Point the error is measured from |
//! | `TargetIDList1`, `TargetIDList2` | Receivers of the Y and Z errors |
//! | `OmegaDriverID` ... `BDriverID` | Drivers overriding parameters |

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;

use nalgebra::Vector3;
use sim_types::{Attributes, SimError};
use tracing::trace;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::drivable::TargetNames;
use crate::driver::{resolve_targets, send_to, Driver, DriverBase, StepContext};
use crate::kind::ModelContext;
use crate::phase::{wrap_phase, ParameterInputs, RimMarkers};
use crate::{Result, SharedDrivable};

const PARAMETER_INPUTS: [&str; 5] = [
    "OmegaDriverID",
    "SigmaDriverID",
    "ADriverID",
    "AprimeDriverID",
    "BDriverID",
];

/// Oscillator constants.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TegotaeParameters {
    /// Intrinsic angular velocity (rad/s).
    pub omega: f64,
    /// Feedback gain (rad/s/N).
    pub sigma: f64,
    /// Swing amplitude along local Y.
    pub a: f64,
    /// Stance amplitude along local Y.
    pub a_prime: f64,
    /// Fore-aft amplitude along local X.
    pub b: f64,
    /// Initial phase.
    pub phi: f64,
}

/// Tegotae phase oscillator driving a leg target marker.
pub struct TegotaeDriver {
    base: DriverBase,
    params: TegotaeParameters,
    phi: f64,
    phi_dot: f64,
    reaction_force: f64,
    x: f64,
    y: f64,
    mirror: bool,
    allow_negative_phi_dot: bool,
    markers: RimMarkers,
    error_output: String,
    error: Vector3<f64>,
    targets_y: BTreeMap<String, SharedDrivable>,
    targets_z: BTreeMap<String, SharedDrivable>,
    inputs: ParameterInputs,
}

impl fmt::Debug for TegotaeDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TegotaeDriver")
            .field("base", &self.base)
            .field("params", &self.params)
            .field("phi", &self.phi)
            .field("phi_dot", &self.phi_dot)
            .field("reaction_force", &self.reaction_force)
            .field("markers", &self.markers)
            .field("error", &self.error)
            .field("targets_y", &TargetNames(&self.targets_y))
            .field("targets_z", &TargetNames(&self.targets_z))
            .finish_non_exhaustive()
    }
}

impl TegotaeDriver {
    /// Create a Tegotae driver.
    pub fn new(
        base: DriverBase,
        params: TegotaeParameters,
        markers: RimMarkers,
        error_output: impl Into<String>,
    ) -> Self {
        let mut driver = Self {
            base,
            params,
            phi: wrap_phase(params.phi),
            phi_dot: params.omega,
            reaction_force: 0.0,
            x: 0.0,
            y: 0.0,
            mirror: false,
            allow_negative_phi_dot: false,
            markers,
            error_output: error_output.into(),
            error: Vector3::zeros(),
            targets_y: BTreeMap::new(),
            targets_z: BTreeMap::new(),
            inputs: ParameterInputs::default(),
        };
        (driver.x, driver.y) = driver.leg_target();
        driver
    }

    /// Build from attributes.
    pub fn from_attributes(attrs: &Attributes, model: &ModelContext<'_>) -> Result<Self> {
        let base = DriverBase::from_attributes(attrs, model.drivables)?;
        let skeleton = model.skeleton;
        let params = TegotaeParameters {
            omega: attrs.required_f64("Omega")?,
            sigma: attrs.required_f64("Sigma")?,
            a: attrs.required_f64("A")?,
            a_prime: attrs.required_f64("Aprime")?,
            b: attrs.required_f64("B")?,
            phi: attrs.required_f64("Phi")?,
        };
        let markers = RimMarkers::new(
            base.name(),
            skeleton,
            attrs.required("CentreMarkerID")?,
            attrs.required("RimMarkerID")?,
        )?;
        let error_output = attrs.required("ErrorOutputMarkerID")?;
        if skeleton.marker(error_output).is_none() {
            return Err(SimError::unknown(base.name(), "marker", error_output).into());
        }

        let mut driver = Self::new(base, params, markers, error_output)
            .with_mirror(attrs.optional_bool("Mirror")?.unwrap_or(false))
            .with_negative_phi_dot(attrs.optional_bool("AllowNegativePhiDot")?.unwrap_or(false));
        driver.targets_y = resolve_targets(attrs, "TargetIDList1", model.drivables)?;
        driver.targets_z = resolve_targets(attrs, "TargetIDList2", model.drivables)?;
        driver.inputs = ParameterInputs::from_attributes(attrs, &PARAMETER_INPUTS);
        Ok(driver)
    }

    /// Use the `+X forward` feedback sign.
    #[must_use]
    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    /// Let the phase run backwards under strong feedback.
    #[must_use]
    pub fn with_negative_phi_dot(mut self, allow: bool) -> Self {
        self.allow_negative_phi_dot = allow;
        self
    }

    /// Register a receiver of the local Y error.
    pub fn add_target_y(&mut self, target: SharedDrivable) {
        let name = target.borrow().name().to_string();
        self.targets_y.insert(name, target);
    }

    /// Register a receiver of the local Z error.
    pub fn add_target_z(&mut self, target: SharedDrivable) {
        let name = target.borrow().name().to_string();
        self.targets_z.insert(name, target);
    }

    /// Bind a parameter to another driver (`OmegaDriverID`, ...).
    pub fn set_parameter_driver(&mut self, key: &str, driver: impl Into<String>) -> Result<()> {
        if !PARAMETER_INPUTS.contains(&key) {
            return Err(SimError::invalid(
                self.base.name(),
                key,
                driver.into(),
                "not a Tegotae parameter",
            )
            .into());
        }
        self.inputs.insert(key, driver);
        Ok(())
    }

    /// Set the ground reaction force for the next update. Negative forces
    /// are treated as no contact.
    pub fn set_reaction_force(&mut self, force: f64) {
        self.reaction_force = force.max(0.0);
    }

    /// Current parameters.
    #[must_use]
    pub fn parameters(&self) -> &TegotaeParameters {
        &self.params
    }

    /// Current phase in `[0, 2π)`.
    #[must_use]
    pub fn phi(&self) -> f64 {
        self.phi
    }

    /// Phase rate used by the latest update.
    #[must_use]
    pub fn phi_dot(&self) -> f64 {
        self.phi_dot
    }

    /// Ground reaction force.
    #[must_use]
    pub fn reaction_force(&self) -> f64 {
        self.reaction_force
    }

    /// Leg target in the centre frame.
    #[must_use]
    pub fn leg_position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// Error vector in the centre frame.
    #[must_use]
    pub fn error(&self) -> Vector3<f64> {
        self.error
    }

    fn leg_target(&self) -> (f64, f64) {
        let p = &self.params;
        let x = p.b * self.phi.cos();
        let y = if self.phi < PI {
            p.a * self.phi.sin()
        } else {
            p.a_prime * self.phi.sin()
        };
        (x, y)
    }

    fn read_parameters(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let name = self.base.name();
        let p = &mut self.params;
        self.inputs.apply(name, "OmegaDriverID", ctx, &mut p.omega)?;
        self.inputs.apply(name, "SigmaDriverID", ctx, &mut p.sigma)?;
        self.inputs.apply(name, "ADriverID", ctx, &mut p.a)?;
        self.inputs.apply(name, "AprimeDriverID", ctx, &mut p.a_prime)?;
        self.inputs.apply(name, "BDriverID", ctx, &mut p.b)
    }
}

impl Driver for TegotaeDriver {
    fn base(&self) -> &DriverBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut DriverBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "Tegotae"
    }

    fn update(&mut self, ctx: &mut StepContext<'_>) -> Result<()> {
        self.base.advance(ctx.step_count)?;
        self.read_parameters(ctx)?;

        let feedback = self.params.sigma * self.reaction_force * self.phi.cos();
        self.phi_dot = if self.mirror {
            self.params.omega + feedback
        } else {
            self.params.omega - feedback
        };
        if !self.allow_negative_phi_dot && self.phi_dot < 0.0 {
            self.phi_dot = 0.0;
        }

        (self.x, self.y) = self.leg_target();
        let rim = self.markers.place(ctx.skeleton, self.x, self.y)?;
        let output = ctx.skeleton.marker_world_position(&self.error_output)?;
        let centre = ctx.skeleton.marker_world_pose(self.markers.centre())?;
        self.error = centre.inverse_transform_vector(&(rim - output));

        self.phi = wrap_phase(self.phi + self.phi_dot * ctx.timestep);
        let value = self.base.clamp(self.error.x);
        self.base.set_value(value);
        trace!(driver = self.base.name(), phi = self.phi, phi_dot = self.phi_dot, value, "tegotae");
        Ok(())
    }

    fn send_data(&mut self, step_count: u64) {
        self.base.send_value(self.base.value(), step_count);
        let name = self.base.name();
        send_to(name, &self.targets_y, self.base.clamp(self.error.y), step_count);
        send_to(name, &self.targets_z, self.base.clamp(self.error.z), step_count);
    }

    fn upstream_drivers(&self) -> Vec<&str> {
        self.inputs.drivers().collect()
    }

    fn markers_read(&self) -> Vec<&str> {
        vec![self.markers.centre(), self.error_output.as_str()]
    }

    fn markers_written(&self) -> Vec<&str> {
        vec![self.markers.rim()]
    }

    fn dump_header(&self) -> Vec<String> {
        [
            "Time", "omega", "sigma", "A", "Aprime", "B", "X", "Y", "N", "phi", "phi_dot",
            "errorX", "errorY", "errorZ",
        ]
        .iter()
        .map(ToString::to_string)
        .collect()
    }

    fn dump_row(&self, time: f64) -> Vec<f64> {
        let p = &self.params;
        vec![
            time,
            p.omega,
            p.sigma,
            p.a,
            p.a_prime,
            p.b,
            self.x,
            self.y,
            self.reaction_force,
            self.phi,
            self.phi_dot,
            self.error.x,
            self.error.y,
            self.error.z,
        ]
    }

    fn append_to_attributes(&self, attrs: &mut Attributes) {
        self.base.append_to_attributes(attrs, self.type_name());
        let p = &self.params;
        attrs.set_f64("Omega", p.omega);
        attrs.set_f64("Sigma", p.sigma);
        attrs.set_f64("A", p.a);
        attrs.set_f64("Aprime", p.a_prime);
        attrs.set_f64("B", p.b);
        attrs.set_f64("Phi", self.phi);
        attrs.set_bool("Mirror", self.mirror);
        attrs.set_bool("AllowNegativePhiDot", self.allow_negative_phi_dot);
        self.markers.append_to_attributes(attrs);
        attrs.set("ErrorOutputMarkerID", self.error_output.as_str());
        attrs.set_names("TargetIDList1", self.targets_y.keys().map(String::as_str));
        attrs.set_names("TargetIDList2", self.targets_z.keys().map(String::as_str));
        self.inputs.append_to_attributes(attrs);
    }
}
