//! Pieces shared by the phase oscillators.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use nalgebra::Point3;
use sim_skeleton::Skeleton;
use sim_types::{Attributes, Pose, SimError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::driver::StepContext;
use crate::Result;

/// Wrap a phase into `[0, 2π)`.
///
/// Negative phases come back positive, so `wrap_phase(-0.5)` is `2π - 0.5`.
#[must_use]
pub fn wrap_phase(phi: f64) -> f64 {
    let mut wrapped = phi % TAU;
    if wrapped < 0.0 {
        wrapped += TAU;
    }
    // 2π + tiny negative rounds to 2π
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Shortest signed angle taking `from` to `to`, in `(-π, π]`.
#[must_use]
pub fn shortest_delta(from: f64, to: f64) -> f64 {
    sim_skeleton::wrap_angle(to - from)
}

/// A rim marker driven around a centre marker on the same body.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RimMarkers {
    centre: String,
    rim: String,
}

impl RimMarkers {
    /// Resolve the pair, checking that both markers share a body.
    pub fn new(owner: &str, skeleton: &Skeleton, centre: &str, rim: &str) -> Result<Self> {
        let centre_marker = skeleton
            .marker(centre)
            .ok_or_else(|| SimError::unknown(owner, "marker", centre))?;
        let rim_marker = skeleton
            .marker(rim)
            .ok_or_else(|| SimError::unknown(owner, "marker", rim))?;
        if centre_marker.body() != rim_marker.body() {
            return Err(SimError::invalid(
                owner,
                "RimMarkerID",
                rim,
                format!("must be on the same body as {centre}"),
            )
            .into());
        }
        Ok(Self {
            centre: centre.to_string(),
            rim: rim.to_string(),
        })
    }

    /// Centre marker name.
    #[must_use]
    pub fn centre(&self) -> &str {
        &self.centre
    }

    /// Rim marker name.
    #[must_use]
    pub fn rim(&self) -> &str {
        &self.rim
    }

    /// Put the rim at `(x, y, 0)` in the centre frame, with the centre's
    /// orientation. Returns the rim world position.
    pub fn place(&self, skeleton: &mut Skeleton, x: f64, y: f64) -> Result<Point3<f64>> {
        let centre_local = *skeleton
            .marker(&self.centre)
            .ok_or_else(|| SimError::unknown(&self.rim, "marker", self.centre.as_str()))?
            .local();
        let offset = Pose::from_position(Point3::new(x, y, 0.0));
        skeleton.set_marker_local_pose(&self.rim, centre_local.compose(&offset))?;
        Ok(skeleton.marker_world_position(&self.rim)?)
    }

    /// Write `CentreMarkerID` and `RimMarkerID`.
    pub fn append_to_attributes(&self, attrs: &mut Attributes) {
        attrs.set("CentreMarkerID", self.centre.as_str());
        attrs.set("RimMarkerID", self.rim.as_str());
    }
}

/// Oscillator parameters that follow another driver's output.
///
/// Each entry maps a `<Parameter>DriverID` attribute to the driver whose
/// value replaces the parameter at every update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterInputs {
    inputs: BTreeMap<String, String>,
}

impl ParameterInputs {
    /// Read whichever of `keys` are present.
    #[must_use]
    pub fn from_attributes(attrs: &Attributes, keys: &[&str]) -> Self {
        let inputs = keys
            .iter()
            .filter_map(|key| attrs.get(key).map(|driver| (key, driver.trim())))
            .filter(|(_, driver)| !driver.is_empty())
            .map(|(key, driver)| ((*key).to_string(), driver.to_string()))
            .collect();
        Self { inputs }
    }

    /// Bind `key` to `driver`.
    pub fn insert(&mut self, key: impl Into<String>, driver: impl Into<String>) {
        self.inputs.insert(key.into(), driver.into());
    }

    /// Driver bound to `key`.
    #[must_use]
    pub fn driver(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).map(String::as_str)
    }

    /// Names of every bound driver.
    pub fn drivers(&self) -> impl Iterator<Item = &str> {
        self.inputs.values().map(String::as_str)
    }

    /// Current value of the driver bound to `key`, if one is bound.
    ///
    /// A bound driver that has not been updated this step is an error.
    pub fn read(&self, owner: &str, key: &str, ctx: &StepContext<'_>) -> Result<Option<f64>> {
        let Some(driver) = self.driver(key) else {
            return Ok(None);
        };
        ctx.driver_value(driver)
            .map(Some)
            .ok_or_else(|| SimError::unknown(owner, "driver", driver).into())
    }

    /// Overwrite `value` from the driver bound to `key`.
    pub fn apply(
        &self,
        owner: &str,
        key: &str,
        ctx: &StepContext<'_>,
        value: &mut f64,
    ) -> Result<()> {
        if let Some(v) = self.read(owner, key, ctx)? {
            *value = v;
        }
        Ok(())
    }

    /// Write every binding.
    pub fn append_to_attributes(&self, attrs: &mut Attributes) {
        for (key, driver) in &self.inputs {
            attrs.set(key.as_str(), driver.as_str());
        }
    }
}
