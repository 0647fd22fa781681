//! Drivers that pose a hinge chain to reach a length.
//!
//! [`HingeJointDriver`] wraps a [`HingeChain`]. Each update it reads the
//! desired length, solves the chain, optionally writes the solved body
//! poses back into the live skeleton and outputs the distal angle
//! fraction. The chain shape is chosen by a [`ChainKind`]; see
//! [`TwoHingeJointDriver`](crate::TwoHingeJointDriver) and
//! [`ThreeHingeJointDriver`](crate::ThreeHingeJointDriver).
//!
//! # Desired Length
//!
//! In order of precedence: the value of `DesiredLengthDriverID`, a length
//! set with [`HingeJointDriver::set_desired_length`], or the distance from
//! the proximal joint to `TargetMarkerID`.
//!
//! # Outputs
//!
//! Targets paired with a strap through `StrapIDList` receive the clamped
//! strap length in the solved pose. Every other target receives the
//! clamped fraction.
//!
//! # Attributes
//!
//! | Attribute | Meaning |
//! |-----------|---------|
//! | `TargetMarkerID` | Marker on the base body to reach |
//! | `DistalBodyMarkerID` | Marker on the last chain body |
//! | `ProximalJointID`, `ProximalJointRange` | First joint and its angle range |
//! | `Tolerance` | Residual bound on the solved length (default `1e-6`) |
//! | `ApplyToModel` | Write the solved pose to the live skeleton (default true) |
//! | `DesiredLengthDriverID` | Driver supplying the desired length |
//! | `StrapIDList` | One strap per `TargetIDList` entry, `-` for none |
//! | `DumpExtensionCurve` | Emit the length curve before the trace |

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::marker::PhantomData;

use nalgebra::Vector3;
use sim_types::{Attributes, SimError};
use tracing::{trace, warn};

use crate::chain::{ChainJoint, ChainLayout, ChainSolution, HingeChain};
use crate::driver::{send_one, Driver, DriverBase, StepContext};
use crate::kind::ModelContext;
use crate::Result;

/// Placeholder in `StrapIDList` for a target that receives the fraction.
const NO_STRAP: &str = "-";

/// The distal part of a chain, as read from attributes.
pub trait ChainKind {
    /// `Type` attribute tag.
    const TYPE_NAME: &'static str;

    /// Read the hinges after the proximal joint, proximal to distal.
    fn read_links(attrs: &Attributes) -> Result<Vec<ChainJoint>>;

    /// Write the hinges after the proximal joint.
    fn write_links(links: &[ChainJoint], attrs: &mut Attributes);
}

/// Kinematic driver solving a hinge chain every step.
pub struct HingeJointDriver<K> {
    base: DriverBase,
    chain: HingeChain,
    desired_driver: Option<String>,
    desired_length: Option<f64>,
    apply_to_model: bool,
    strap_targets: BTreeMap<String, String>,
    extension_curve: bool,
    joint_angles: Vec<Vector3<f64>>,
    kind: PhantomData<K>,
}

impl<K> fmt::Debug for HingeJointDriver<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HingeJointDriver")
            .field("base", &self.base)
            .field("layout", self.chain.layout())
            .field("solution", self.chain.solution())
            .field("desired_driver", &self.desired_driver)
            .field("apply_to_model", &self.apply_to_model)
            .field("strap_targets", &self.strap_targets)
            .finish_non_exhaustive()
    }
}

impl<K: ChainKind> HingeJointDriver<K> {
    /// Drive `chain`, writing solved poses to the live model.
    #[must_use]
    pub fn new(base: DriverBase, chain: HingeChain) -> Self {
        Self {
            base,
            chain,
            desired_driver: None,
            desired_length: None,
            apply_to_model: true,
            strap_targets: BTreeMap::new(),
            extension_curve: false,
            joint_angles: Vec::new(),
            kind: PhantomData,
        }
    }

    /// Build from attributes.
    pub fn from_attributes(attrs: &Attributes, model: &ModelContext<'_>) -> Result<Self> {
        let base = DriverBase::from_attributes(attrs, model.drivables)?;
        let [low, high] = attrs.required_f64_array::<2>("ProximalJointRange")?;
        let layout = ChainLayout {
            proximal: ChainJoint::new(attrs.required("ProximalJointID")?, low, high),
            links: K::read_links(attrs)?,
            target_marker: attrs.required("TargetMarkerID")?.to_string(),
            distal_marker: attrs.required("DistalBodyMarkerID")?.to_string(),
        };
        let mut chain = HingeChain::new(base.name(), model.skeleton, layout)?;
        if let Some(tolerance) = attrs.optional_f64("Tolerance")? {
            chain = chain.with_tolerance(tolerance)?;
        }

        let mut driver = Self::new(base, chain)
            .with_apply_to_model(attrs.optional_bool("ApplyToModel")?.unwrap_or(true))
            .with_extension_curve(attrs.optional_bool("DumpExtensionCurve")?.unwrap_or(false));
        driver.desired_driver = attrs
            .get("DesiredLengthDriverID")
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToString::to_string);

        let straps = attrs.optional_names("StrapIDList");
        if !straps.is_empty() {
            let targets = attrs.optional_names("TargetIDList");
            if straps.len() != targets.len() {
                return Err(SimError::LengthMismatch {
                    object: driver.base.name().to_string(),
                    left: "TargetIDList".to_string(),
                    left_len: targets.len(),
                    right: "StrapIDList".to_string(),
                    right_len: straps.len(),
                }
                .into());
            }
            for (target, strap) in targets.into_iter().zip(straps) {
                if strap != NO_STRAP {
                    driver.set_strap_target(target, strap)?;
                }
            }
        }
        Ok(driver)
    }

    /// Choose whether solved poses are written to the live skeleton.
    #[must_use]
    pub fn with_apply_to_model(mut self, apply: bool) -> Self {
        self.apply_to_model = apply;
        self
    }

    /// Emit the fraction to length curve before the trace.
    #[must_use]
    pub fn with_extension_curve(mut self, enabled: bool) -> Self {
        self.extension_curve = enabled;
        self
    }

    /// Take the desired length from another driver.
    pub fn set_desired_length_driver(&mut self, driver: Option<String>) {
        self.desired_driver = driver;
    }

    /// Fix the desired length instead of measuring the target marker.
    pub fn set_desired_length(&mut self, length: Option<f64>) {
        self.desired_length = length;
    }

    /// Send the length of `strap` to `target` instead of the fraction.
    pub fn set_strap_target(
        &mut self,
        target: impl Into<String>,
        strap: impl Into<String>,
    ) -> Result<()> {
        let (target, strap) = (target.into(), strap.into());
        if self.base.target(&target).is_none() {
            return Err(SimError::unknown(self.base.name(), "drivable", target).into());
        }
        if !self.chain.has_strap(&strap) {
            return Err(SimError::invalid(
                self.base.name(),
                "StrapIDList",
                strap,
                "must be attached to the chain bodies",
            )
            .into());
        }
        self.strap_targets.insert(target, strap);
        Ok(())
    }

    /// The solved chain.
    #[must_use]
    pub fn chain(&self) -> &HingeChain {
        &self.chain
    }

    /// Latest solve.
    #[must_use]
    pub fn solution(&self) -> &ChainSolution {
        self.chain.solution()
    }

    /// Euler angles of each chain joint after the latest solve, proximal
    /// first.
    #[must_use]
    pub fn joint_angles(&self) -> &[Vector3<f64>] {
        &self.joint_angles
    }

    /// Whether solved poses are written to the live skeleton.
    #[must_use]
    pub fn applies_to_model(&self) -> bool {
        self.apply_to_model
    }

    fn desired(&self, ctx: &StepContext<'_>) -> Result<f64> {
        if let Some(driver) = &self.desired_driver {
            return ctx
                .driver_value(driver)
                .ok_or_else(|| SimError::unknown(self.base.name(), "driver", driver.as_str()).into());
        }
        match self.desired_length {
            Some(length) => Ok(length),
            None => self.chain.target_distance(),
        }
    }

    fn joints(&self) -> impl Iterator<Item = &ChainJoint> {
        let layout = self.chain.layout();
        std::iter::once(&layout.proximal).chain(&layout.links)
    }
}

impl<K: ChainKind> Driver for HingeJointDriver<K> {
    fn base(&self) -> &DriverBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut DriverBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        K::TYPE_NAME
    }

    fn update(&mut self, ctx: &mut StepContext<'_>) -> Result<()> {
        self.base.advance(ctx.step_count)?;
        self.chain.sync_target(ctx.skeleton)?;
        let desired = self.desired(ctx)?;
        let solution = self.chain.solve(desired)?;
        if self.apply_to_model {
            self.chain.apply_to(ctx.skeleton)?;
        }
        self.joint_angles = self.chain.joint_euler_angles()?;

        let value = self.base.clamp(solution.fraction);
        self.base.set_value(value);
        trace!(
            driver = self.base.name(),
            desired,
            fraction = solution.fraction,
            proximal = solution.proximal_fraction,
            "hinge joint"
        );
        Ok(())
    }

    fn send_data(&mut self, step_count: u64) {
        let name = self.base.name();
        for (target_name, target) in self.base.targets() {
            let value = match self.strap_targets.get(target_name) {
                Some(strap) => match self.chain.strap_length(strap) {
                    Ok(length) => self.base.clamp(length),
                    Err(e) => {
                        warn!(driver = name, strap = %strap, error = %e, "strap length unavailable");
                        continue;
                    }
                },
                None => self.base.value(),
            };
            send_one(name, target_name, target, value, step_count);
        }
    }

    fn upstream_drivers(&self) -> Vec<&str> {
        self.desired_driver.iter().map(String::as_str).collect()
    }

    fn markers_read(&self) -> Vec<&str> {
        vec![self.chain.layout().target_marker.as_str()]
    }

    fn markers_written(&self) -> Vec<&str> {
        if self.apply_to_model {
            vec![self.chain.layout().distal_marker.as_str()]
        } else {
            Vec::new()
        }
    }

    fn dump_preamble(&self) -> Option<String> {
        if !self.extension_curve {
            return None;
        }
        let curve = match self.chain.extension_curve() {
            Ok(curve) => curve,
            Err(e) => {
                warn!(driver = self.base.name(), error = %e, "extension curve unavailable");
                return None;
            }
        };
        let mut text = String::from("AngleFraction\tLength\n");
        for [fraction, length] in curve {
            let _ = writeln!(text, "{fraction:.17e}\t{length:.17e}");
        }
        Some(text)
    }

    fn dump_header(&self) -> Vec<String> {
        let mut header: Vec<String> = [
            "Time",
            "DesiredLength",
            "Length",
            "AngleFraction",
            "ProximalAngleFraction1",
            "ProximalJointAngle1",
            "ProximalJointAngle2",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        for link in &self.chain.layout().links {
            header.push(format!("{}Angle", link.joint));
        }
        for joint in self.joints() {
            for axis in ["X", "Y", "Z"] {
                header.push(format!("{}Euler{axis}", joint.joint));
            }
        }
        header
    }

    fn dump_row(&self, time: f64) -> Vec<f64> {
        let s = self.chain.solution();
        let mut row = vec![
            time,
            s.desired_length,
            s.length,
            s.fraction,
            s.proximal_fraction,
            s.proximal_angles[0],
            s.proximal_angles[1],
        ];
        row.extend(self.chain.layout().links.iter().map(|link| link.angle(s.fraction)));
        let joints = self.joints().count();
        for i in 0..joints {
            let angles = self.joint_angles.get(i).copied().unwrap_or_else(Vector3::zeros);
            row.extend(angles.iter());
        }
        row
    }

    fn append_to_attributes(&self, attrs: &mut Attributes) {
        self.base.append_to_attributes(attrs, K::TYPE_NAME);
        let layout = self.chain.layout();
        attrs.set("TargetMarkerID", layout.target_marker.as_str());
        attrs.set("DistalBodyMarkerID", layout.distal_marker.as_str());
        attrs.set("ProximalJointID", layout.proximal.joint.as_str());
        attrs.set_f64_list("ProximalJointRange", &[layout.proximal.low, layout.proximal.high]);
        K::write_links(&layout.links, attrs);
        attrs.set_f64("Tolerance", self.chain.tolerance());
        attrs.set_bool("ApplyToModel", self.apply_to_model);
        attrs.set_bool("DumpExtensionCurve", self.extension_curve);
        if let Some(driver) = &self.desired_driver {
            attrs.set("DesiredLengthDriverID", driver.as_str());
        }
        if !self.strap_targets.is_empty() {
            let straps = self
                .base
                .targets()
                .keys()
                .map(|target| self.strap_targets.get(target).map_or(NO_STRAP, String::as_str));
            attrs.set_names("StrapIDList", straps);
        }
    }
}
