//! Elliptical marker oscillator with phase locking.
//!
//! A rim marker is driven around an ellipse in the frame of a centre marker.
//! Each quadrant of the phase can have its own pair of radii. The driver
//! output is the instantaneous radius `sqrt(X² + Y²)`.
//!
//! Without a phase control input the phase simply advances at `ω`. With
//! one, the input's error signal is low-pass filtered and watched for
//! turning points. At each turning point the rate is re-estimated from the
//! time since the previous one, then nudged toward the wanted phase:
//!
//! ```text
//! φ̇ = clamp(π / (half_period · PeriodMultiplier), 0, MaxPhiDot)
//! φ̇ = clamp(φ̇ - σ · Δφ, 0, MaxPhiDot)
//! ```
//!
//! where the wanted phase is `π/2 + PhaseOffset` at a rising turn and
//! `3π/2 + PhaseOffset` at a falling one, and `Δφ` is the shortest signed
//! angle from the current phase to it.

use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;
use std::rc::Rc;

use sim_types::{Attributes, SimError};
use tracing::{debug, trace};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::driver::{Driver, DriverBase, StepContext};
use crate::filter::{ButterworthFilter, SignChange, SignChangeDetector};
use crate::kind::ModelContext;
use crate::phase::{shortest_delta, wrap_phase, ParameterInputs, RimMarkers};
use crate::target::DataTarget;
use crate::Result;

const XR_INPUTS: [&str; 4] = ["XRDriver0ID", "XRDriver1ID", "XRDriver2ID", "XRDriver3ID"];
const YR_INPUTS: [&str; 4] = ["YRDriver0ID", "YRDriver1ID", "YRDriver2ID", "YRDriver3ID"];

/// Oscillator constants.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EllipseParameters {
    /// Free running angular velocity (rad/s).
    pub omega: f64,
    /// Phase correction gain.
    pub sigma: f64,
    /// X radius per quadrant.
    pub xr: [f64; 4],
    /// Y radius per quadrant.
    pub yr: [f64; 4],
    /// Initial phase.
    pub phi: f64,
    /// Wanted phase lead over the control signal.
    pub phase_offset: f64,
    /// Upper bound on the phase rate.
    pub max_phi_dot: f64,
    /// Ratio of oscillator period to control signal period.
    pub period_multiplier: f64,
}

impl EllipseParameters {
    /// Parameters for a circle of radius `r` turning at `omega`.
    #[must_use]
    pub fn circle(omega: f64, r: f64) -> Self {
        Self {
            omega,
            sigma: 0.0,
            xr: [r; 4],
            yr: [r; 4],
            phi: 0.0,
            phase_offset: 0.0,
            max_phi_dot: f64::INFINITY,
            period_multiplier: 2.0,
        }
    }
}

/// Quadrant of a phase in `[0, 2π)`.
#[must_use]
pub fn quadrant(phi: f64) -> usize {
    if phi < FRAC_PI_2 {
        0
    } else if phi < PI {
        1
    } else if phi < 3.0 * FRAC_PI_2 {
        2
    } else {
        3
    }
}

/// Drives a marker around an ellipse, optionally phase locked to a data target.
pub struct MarkerEllipseDriver {
    base: DriverBase,
    params: EllipseParameters,
    phi: f64,
    phi_dot: f64,
    x: f64,
    y: f64,
    markers: RimMarkers,
    phase_control: Option<Rc<DataTarget>>,
    filter: ButterworthFilter,
    detector: SignChangeDetector,
    last_phase_change_time: f64,
    half_period: f64,
    wanted_phi: f64,
    del_phi: f64,
    change: Option<SignChange>,
    inputs: ParameterInputs,
}

impl fmt::Debug for MarkerEllipseDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerEllipseDriver")
            .field("base", &self.base)
            .field("params", &self.params)
            .field("phi", &self.phi)
            .field("phi_dot", &self.phi_dot)
            .field("markers", &self.markers)
            .field(
                "phase_control",
                &self.phase_control.as_ref().map(|t| t.name()),
            )
            .field("detector", &self.detector)
            .finish_non_exhaustive()
    }
}

impl MarkerEllipseDriver {
    /// Create a free running ellipse driver.
    pub fn new(
        base: DriverBase,
        params: EllipseParameters,
        markers: RimMarkers,
        filter: ButterworthFilter,
    ) -> Result<Self> {
        if params.max_phi_dot.is_nan() || params.max_phi_dot < 0.0 {
            return Err(SimError::invalid(
                base.name(),
                "MaxPhiDot",
                params.max_phi_dot.to_string(),
                "must not be negative",
            )
            .into());
        }
        let phi = wrap_phase(params.phi);
        let mut driver = Self {
            base,
            params,
            phi,
            phi_dot: params.omega,
            x: 0.0,
            y: 0.0,
            markers,
            phase_control: None,
            filter,
            detector: SignChangeDetector::default(),
            last_phase_change_time: 0.0,
            half_period: 0.0,
            wanted_phi: 0.0,
            del_phi: 0.0,
            change: None,
            inputs: ParameterInputs::default(),
        };
        (driver.x, driver.y) = driver.rim_position();
        Ok(driver)
    }

    /// Build from attributes.
    pub fn from_attributes(attrs: &Attributes, model: &ModelContext<'_>) -> Result<Self> {
        let base = DriverBase::from_attributes(attrs, model.drivables)?;
        let name = base.name().to_string();
        let params = EllipseParameters {
            omega: attrs.required_f64("Omega")?,
            sigma: attrs.required_f64("Sigma")?,
            xr: quadrant_radii(attrs, "XR")?,
            yr: quadrant_radii(attrs, "YR")?,
            phi: attrs.required_f64("Phi")?,
            phase_offset: attrs.required_f64("PhaseOffset")?,
            max_phi_dot: attrs.required_f64("MaxPhiDot")?,
            period_multiplier: attrs.required_f64("PeriodMultiplier")?,
        };
        let markers = RimMarkers::new(
            &name,
            model.skeleton,
            attrs.required("CentreMarkerID")?,
            attrs.required("RimMarkerID")?,
        )?;
        let filter = ButterworthFilter::new(
            attrs.required_f64("LowPassFrequency")?,
            1.0 / model.timestep,
        )?;

        let mut driver = Self::new(base, params, markers, filter)?;
        if let Some(id) = attrs.get("PhaseControlInputID") {
            driver.phase_control = Some(model.data_target(&name, id)?);
        }
        if let Some(threshold) = attrs.get("PhaseStateCountThreshold") {
            let threshold = threshold.trim().parse().map_err(|_| {
                SimError::invalid(
                    &name,
                    "PhaseStateCountThreshold",
                    threshold,
                    "expected a non-negative integer",
                )
            })?;
            driver.detector = SignChangeDetector::new(threshold);
        }
        let keys: Vec<&str> = ["OmegaDriverID", "SigmaDriverID"]
            .into_iter()
            .chain(XR_INPUTS)
            .chain(YR_INPUTS)
            .collect();
        driver.inputs = ParameterInputs::from_attributes(attrs, &keys);
        Ok(driver)
    }

    /// Lock the phase to the error signal of `target`.
    #[must_use]
    pub fn with_phase_control(mut self, target: Rc<DataTarget>) -> Self {
        self.phase_control = Some(target);
        self
    }

    /// Require more than `threshold` opposing samples before a turn counts.
    #[must_use]
    pub fn with_count_threshold(mut self, threshold: u32) -> Self {
        self.detector = SignChangeDetector::new(threshold);
        self
    }

    /// Current parameters.
    #[must_use]
    pub fn parameters(&self) -> &EllipseParameters {
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

    /// Rim position in the centre frame.
    #[must_use]
    pub fn rim_offset(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// Time of the latest detected turning point.
    #[must_use]
    pub fn last_phase_change_time(&self) -> f64 {
        self.last_phase_change_time
    }

    /// Turning point detected by the latest update, if any.
    #[must_use]
    pub fn last_change(&self) -> Option<SignChange> {
        self.change
    }

    /// Filter `value` and report a debounced turning point.
    pub fn detect_sign_change(&mut self, value: f64) -> Option<SignChange> {
        let previous = self.filter.output();
        self.filter.add_sample(value);
        self.detector.observe(self.filter.output() - previous)
    }

    fn rim_position(&self) -> (f64, f64) {
        let q = quadrant(self.phi);
        (
            self.params.xr[q] * self.phi.cos(),
            self.params.yr[q] * self.phi.sin(),
        )
    }

    fn read_parameters(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let name = self.base.name();
        let p = &mut self.params;
        self.inputs.apply(name, "OmegaDriverID", ctx, &mut p.omega)?;
        self.inputs.apply(name, "SigmaDriverID", ctx, &mut p.sigma)?;
        for q in 0..4 {
            self.inputs.apply(name, XR_INPUTS[q], ctx, &mut p.xr[q])?;
            self.inputs.apply(name, YR_INPUTS[q], ctx, &mut p.yr[q])?;
        }
        Ok(())
    }

    fn lock_phase(&mut self, change: SignChange, time: f64) {
        let p = &self.params;
        self.half_period = time - self.last_phase_change_time;
        self.last_phase_change_time = time;
        // a zero half period divides to +inf and clamps to the maximum
        self.phi_dot = (PI / (self.half_period * p.period_multiplier)).clamp(0.0, p.max_phi_dot);
        let turn = match change {
            SignChange::Rising => FRAC_PI_2,
            SignChange::Falling => 3.0 * FRAC_PI_2,
        };
        self.wanted_phi = wrap_phase(turn + p.phase_offset);
        self.del_phi = shortest_delta(self.phi, self.wanted_phi);
        self.phi_dot = (self.phi_dot - p.sigma * self.del_phi).clamp(0.0, p.max_phi_dot);
        debug!(
            driver = self.base.name(),
            ?change,
            half_period = self.half_period,
            phi = self.phi,
            wanted_phi = self.wanted_phi,
            phi_dot = self.phi_dot,
            "phase crossing"
        );
    }
}

fn quadrant_radii(attrs: &Attributes, key: &str) -> Result<[f64; 4]> {
    let values = attrs.required_f64_list(key)?;
    match values.as_slice() {
        [r] => Ok([*r; 4]),
        [a, b, c, d] => Ok([*a, *b, *c, *d]),
        _ => Err(SimError::invalid(
            attrs.name(),
            key,
            attrs.get(key).unwrap_or_default(),
            "expected 1 or 4 values",
        )
        .into()),
    }
}

impl Driver for MarkerEllipseDriver {
    fn base(&self) -> &DriverBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut DriverBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "MarkerEllipse"
    }

    fn update(&mut self, ctx: &mut StepContext<'_>) -> Result<()> {
        self.base.advance(ctx.step_count)?;
        self.read_parameters(ctx)?;

        self.change = None;
        match self.phase_control.clone() {
            None => self.phi_dot = self.params.omega,
            Some(target) => {
                let error = target.calculate_error_at_time(ctx.skeleton, ctx.time)?;
                self.change = self.detect_sign_change(error);
                if let Some(change) = self.change {
                    self.lock_phase(change, ctx.time);
                }
            }
        }

        self.phi = wrap_phase(self.phi + self.phi_dot * ctx.timestep);
        (self.x, self.y) = self.rim_position();
        self.markers.place(ctx.skeleton, self.x, self.y)?;

        let value = self.base.clamp(self.x.hypot(self.y));
        self.base.set_value(value);
        trace!(driver = self.base.name(), phi = self.phi, value, "marker ellipse");
        Ok(())
    }

    fn upstream_drivers(&self) -> Vec<&str> {
        self.inputs.drivers().collect()
    }

    fn markers_read(&self) -> Vec<&str> {
        vec![self.markers.centre()]
    }

    fn markers_written(&self) -> Vec<&str> {
        vec![self.markers.rim()]
    }

    fn dump_header(&self) -> Vec<String> {
        [
            "Time",
            "omega",
            "sigma",
            "phaseOffset",
            "XR",
            "YR",
            "X",
            "Y",
            "phi",
            "phi_dot",
            "wantedPhi",
            "delPhi",
            "lastPhaseChangeTime",
            "halfPeriod",
            "valueChangeDirection",
        ]
        .iter()
        .map(ToString::to_string)
        .collect()
    }

    fn dump_row(&self, time: f64) -> Vec<f64> {
        let p = &self.params;
        let q = quadrant(self.phi);
        vec![
            time,
            p.omega,
            p.sigma,
            p.phase_offset,
            p.xr[q],
            p.yr[q],
            self.x,
            self.y,
            self.phi,
            self.phi_dot,
            self.wanted_phi,
            self.del_phi,
            self.last_phase_change_time,
            self.half_period,
            self.change.map_or(0.0, |c| f64::from(c.signum())),
        ]
    }

    fn append_to_attributes(&self, attrs: &mut Attributes) {
        self.base.append_to_attributes(attrs, self.type_name());
        let p = &self.params;
        attrs.set_f64("Omega", p.omega);
        attrs.set_f64("Sigma", p.sigma);
        attrs.set_f64_list("XR", &p.xr);
        attrs.set_f64_list("YR", &p.yr);
        attrs.set_f64("Phi", self.phi);
        self.markers.append_to_attributes(attrs);
        if let Some(target) = &self.phase_control {
            attrs.set("PhaseControlInputID", target.name());
        }
        attrs.set_f64("LowPassFrequency", self.filter.cutoff_frequency());
        attrs.set_f64("PhaseOffset", p.phase_offset);
        attrs.set_f64("MaxPhiDot", p.max_phi_dot);
        attrs.set_f64("PeriodMultiplier", p.period_multiplier);
        attrs.set(
            "PhaseStateCountThreshold",
            self.detector.threshold().to_string(),
        );
        self.inputs.append_to_attributes(attrs);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::target::{Measurement, Quantity};
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use std::collections::BTreeMap;
    use sim_skeleton::{Body, Marker, Skeleton};
    use sim_types::{Axis, Pose};

    const DT: f64 = 0.01;

    fn skeleton() -> Skeleton {
        let mut s = Skeleton::new();
        s.add_body(Body::new("arm", Pose::identity())).unwrap();
        s.add_marker(Marker::on_body(
            "centre",
            "arm",
            Pose::from_position(Point3::new(0.0, 0.0, 1.0)),
        ))
        .unwrap();
        s.add_marker(Marker::on_body("rim", "arm", Pose::identity()))
            .unwrap();
        s.add_marker(Marker::in_world("signal", Pose::identity()))
            .unwrap();
        s
    }

    fn driver(s: &Skeleton, params: EllipseParameters) -> MarkerEllipseDriver {
        let markers = RimMarkers::new("ell", s, "centre", "rim").unwrap();
        let filter = ButterworthFilter::new(10.0, 1.0 / DT).unwrap();
        MarkerEllipseDriver::new(DriverBase::new("ell"), params, markers, filter).unwrap()
    }

    fn step(d: &mut MarkerEllipseDriver, s: &mut Skeleton, n: u64) {
        let values = BTreeMap::new();
        let mut ctx = StepContext {
            step_count: n,
            time: DT * n as f64,
            timestep: DT,
            skeleton: s,
            driver_values: &values,
        };
        d.update(&mut ctx).unwrap();
    }

    #[test]
    fn test_free_running_circle() {
        let mut s = skeleton();
        let mut d = driver(&s, EllipseParameters::circle(PI, 0.5));
        step(&mut d, &mut s, 1);

        assert_relative_eq!(d.phi(), PI * DT, epsilon = 1e-12);
        assert_relative_eq!(d.value(), 0.5, epsilon = 1e-12);
        let (x, y) = d.rim_offset();
        let rim = s.marker_world_position("rim").unwrap();
        assert_relative_eq!(rim, Point3::new(x, y, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_quadrant_radii() {
        let mut s = skeleton();
        let params = EllipseParameters {
            xr: [1.0, 2.0, 3.0, 4.0],
            yr: [0.1, 0.2, 0.3, 0.4],
            phi: 0.75 * PI,
            ..EllipseParameters::circle(0.0, 1.0)
        };
        let mut d = driver(&s, params);
        step(&mut d, &mut s, 1);
        let (x, y) = d.rim_offset();
        assert_relative_eq!(x, 2.0 * (0.75 * PI).cos(), epsilon = 1e-12);
        assert_relative_eq!(y, 0.2 * (0.75 * PI).sin(), epsilon = 1e-12);
        assert_eq!(quadrant(0.0), 0);
        assert_eq!(quadrant(1.5 * PI), 3);
    }

    #[test]
    fn test_phase_locks_on_rising_turn() {
        let mut s = skeleton();
        let measurement =
            Measurement::scalar("sig", &s, "signal", Quantity::Position(Axis::X)).unwrap();
        let target = DataTarget::new("sig", vec![0.0], vec![0.0], measurement).unwrap();
        let params = EllipseParameters {
            sigma: 1.0,
            max_phi_dot: 10.0,
            ..EllipseParameters::circle(1.0, 1.0)
        };
        let mut d = driver(&s, params).with_phase_control(Rc::new(target));

        s.set_marker_world_position("signal", &Point3::new(DT, 0.0, 0.0))
            .unwrap();
        step(&mut d, &mut s, 1);

        // Starts decreasing, so the first rise is a turn at t = DT.
        assert_eq!(d.last_change(), Some(SignChange::Rising));
        assert_eq!(d.last_phase_change_time(), DT);
        // π / (0.01 · 2) clamps to 10, then the pull toward π/2 slows it.
        assert_relative_eq!(d.phi_dot(), 10.0 - FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(d.phi(), (10.0 - FRAC_PI_2) * DT, epsilon = 1e-12);

        s.set_marker_world_position("signal", &Point3::new(2.0 * DT, 0.0, 0.0))
            .unwrap();
        step(&mut d, &mut s, 2);
        assert_eq!(d.last_change(), None);
        assert_relative_eq!(d.phi_dot(), 10.0 - FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_sign_change_debounce() {
        let s = skeleton();
        let mut d = driver(&s, EllipseParameters::circle(1.0, 1.0)).with_count_threshold(1);
        assert_eq!(d.detect_sign_change(1.0), None);
        assert_eq!(d.detect_sign_change(2.0), Some(SignChange::Rising));
    }

    #[test]
    fn test_negative_max_phi_dot_rejected() {
        let s = skeleton();
        let markers = RimMarkers::new("ell", &s, "centre", "rim").unwrap();
        let filter = ButterworthFilter::new(10.0, 100.0).unwrap();
        let params = EllipseParameters {
            max_phi_dot: -1.0,
            ..EllipseParameters::circle(1.0, 1.0)
        };
        assert!(MarkerEllipseDriver::new(DriverBase::new("ell"), params, markers, filter).is_err());
    }

    #[test]
    fn test_attributes() {
        let s = skeleton();
        let measurement =
            Measurement::scalar("sig", &s, "signal", Quantity::Position(Axis::X)).unwrap();
        let mut data_targets = BTreeMap::new();
        data_targets.insert(
            "sig".to_string(),
            Rc::new(DataTarget::new("sig", vec![0.0], vec![0.0], measurement).unwrap()),
        );
        let drivables = BTreeMap::new();
        let model = ModelContext {
            skeleton: &s,
            drivables: &drivables,
            data_targets: &data_targets,
            timestep: DT,
        };
        let attrs = Attributes::new()
            .with("ID", "ell")
            .with("Omega", "3")
            .with("Sigma", "0.1")
            .with("XR", "1")
            .with("YR", "0.5 0.5 0.25 0.25")
            .with("Phi", "0")
            .with("CentreMarkerID", "centre")
            .with("RimMarkerID", "rim")
            .with("PhaseControlInputID", "sig")
            .with("LowPassFrequency", "5")
            .with("PhaseOffset", "0.5")
            .with("MaxPhiDot", "20")
            .with("PeriodMultiplier", "2")
            .with("PhaseStateCountThreshold", "3");
        let d = MarkerEllipseDriver::from_attributes(&attrs, &model).unwrap();
        assert_eq!(d.parameters().xr, [1.0; 4]);
        assert_eq!(d.parameters().yr[2], 0.25);

        let mut exported = Attributes::new();
        d.append_to_attributes(&mut exported);
        let again = MarkerEllipseDriver::from_attributes(&exported, &model).unwrap();
        assert_eq!(again.parameters(), d.parameters());
        assert_eq!(again.detector.threshold(), 3);

        assert!(
            MarkerEllipseDriver::from_attributes(&attrs.clone().with("XR", "1 2"), &model).is_err()
        );
        assert!(MarkerEllipseDriver::from_attributes(
            &attrs.clone().with("LowPassFrequency", "60"),
            &model
        )
        .is_err());
        assert!(
            MarkerEllipseDriver::from_attributes(&attrs.with("PhaseControlInputID", "x"), &model)
                .is_err()
        );
    }
}
