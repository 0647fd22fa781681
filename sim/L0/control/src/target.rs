//! Reference tables and match scoring.
//!
//! A [`DataTarget`] pairs a strictly increasing list of target times with
//! reference values, and a [`Measurement`] that reads the live value from
//! the skeleton. The signed error is `measured - reference`; the match
//! score is
//!
//! ```text
//! score = Intercept + Slope · positive_function(error)
//! ```
//!
//! where the positive function is `|x|`, `x²` or `x` depending on
//! [`MatchType`]. A score outside `[AbortThreshold, AbortAbove]` asks the
//! simulation to stop.
//!
//! Reference lookups never extrapolate: before the first target time the
//! first value is used, after the last the last value is held.
//!
//! # Attributes
//!
//! | Attribute | Meaning |
//! |-----------|---------|
//! | `ID` | Target name |
//! | `Type` | `Scalar` or `MarkerCompare` |
//! | `Intercept`, `Slope` | Score line |
//! | `MatchType` | `Linear`, `Square` or `Raw` |
//! | `TargetTimes` | Strictly increasing times |
//! | `TargetValues` | One value per time |
//! | `AbortThreshold` | Optional lower score bound (alias `AbortBelow`) |
//! | `AbortAbove` | Optional upper score bound |
//! | `InterpolationType` | `Punctuated` (default) or `Continuous` |
//! | `TargetID`, `DataType` | Scalar source and quantity |
//! | `Marker1ID`, `Marker2ID`, `Marker1Comparison`, `Marker2Comparison` | Marker comparison |

use std::fmt;

use nalgebra::UnitQuaternion;
use sim_skeleton::{JointKind, Skeleton};
use sim_types::{attributes, Attributes, Axis, SimError};
use tracing::warn;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{ControlError, Result};

/// How an error is turned into a non-negative penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MatchType {
    /// `|error|`
    #[default]
    Linear,
    /// `error²`
    Square,
    /// `error`, unsigned folding skipped.
    Raw,
}

impl MatchType {
    /// Parse a match type tag.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "Linear" => Some(Self::Linear),
            "Square" => Some(Self::Square),
            "Raw" => Some(Self::Raw),
            _ => None,
        }
    }

    /// Apply the penalty function.
    #[must_use]
    pub fn apply(self, error: f64) -> f64 {
        match self {
            Self::Linear => error.abs(),
            Self::Square => error * error,
            Self::Raw => error,
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => write!(f, "Linear"),
            Self::Square => write!(f, "Square"),
            Self::Raw => write!(f, "Raw"),
        }
    }
}

/// When a target contributes to a fitness sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InterpolationType {
    /// Only at the listed target times.
    #[default]
    Punctuated,
    /// Every step, against the interpolated reference.
    Continuous,
}

impl InterpolationType {
    /// Parse an interpolation type tag.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "Punctuated" => Some(Self::Punctuated),
            "Continuous" => Some(Self::Continuous),
            _ => None,
        }
    }
}

impl fmt::Display for InterpolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Punctuated => write!(f, "Punctuated"),
            Self::Continuous => write!(f, "Continuous"),
        }
    }
}

/// What kind of element a scalar measurement reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ScalarSource {
    /// A body pose.
    Body,
    /// A marker world pose.
    Marker,
    /// A joint anchor or hinge angle.
    Joint,
    /// A strap length.
    Strap,
}

/// Which number a scalar measurement reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Quantity {
    /// World position component.
    Position(Axis),
    /// Orientation quaternion component, `0` is the scalar part.
    Quaternion(usize),
    /// Hinge angle.
    Angle,
    /// Strap length.
    Length,
}

impl Quantity {
    /// Parse a `DataType` tag (`XP`, `YP`, `ZP`, `Q0`..`Q3`, `Angle`, `Length`).
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "XP" => Some(Self::Position(Axis::X)),
            "YP" => Some(Self::Position(Axis::Y)),
            "ZP" => Some(Self::Position(Axis::Z)),
            "Q0" => Some(Self::Quaternion(0)),
            "Q1" => Some(Self::Quaternion(1)),
            "Q2" => Some(Self::Quaternion(2)),
            "Q3" => Some(Self::Quaternion(3)),
            "Angle" => Some(Self::Angle),
            "Length" => Some(Self::Length),
            _ => None,
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Position(axis) => write!(f, "{axis}P"),
            Self::Quaternion(i) => write!(f, "Q{i}"),
            Self::Angle => write!(f, "Angle"),
            Self::Length => write!(f, "Length"),
        }
    }
}

/// How two markers are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Comparison {
    /// `marker2 - marker1` along a world axis.
    Delta(Axis),
    /// Distance between the origins.
    Distance,
    /// Angle of the rotation taking marker 1 to marker 2.
    Angle,
    /// Angle between an axis of marker 1 and an axis of marker 2.
    AxisAngle(Axis, Axis),
}

impl Comparison {
    /// Build from a `Marker1Comparison`/`Marker2Comparison` pair.
    ///
    /// Tags are `XWP`, `YWP`, `ZWP`, `Distance`, `Angle` (both sides the
    /// same) or any pair of `XAD`, `YAD`, `ZAD`.
    #[must_use]
    pub fn parse(first: &str, second: &str) -> Option<Self> {
        let axis_tag = |tag: &str| match tag {
            "XAD" => Some(Axis::X),
            "YAD" => Some(Axis::Y),
            "ZAD" => Some(Axis::Z),
            _ => None,
        };
        let (first, second) = (first.trim(), second.trim());
        if let (Some(a), Some(b)) = (axis_tag(first), axis_tag(second)) {
            return Some(Self::AxisAngle(a, b));
        }
        if first != second {
            return None;
        }
        match first {
            "XWP" => Some(Self::Delta(Axis::X)),
            "YWP" => Some(Self::Delta(Axis::Y)),
            "ZWP" => Some(Self::Delta(Axis::Z)),
            "Distance" => Some(Self::Distance),
            "Angle" => Some(Self::Angle),
            _ => None,
        }
    }

    /// The two attribute tags for this comparison.
    #[must_use]
    pub fn tags(self) -> (String, String) {
        match self {
            Self::Delta(axis) => (format!("{axis}WP"), format!("{axis}WP")),
            Self::Distance => ("Distance".into(), "Distance".into()),
            Self::Angle => ("Angle".into(), "Angle".into()),
            Self::AxisAngle(a, b) => (format!("{a}AD"), format!("{b}AD")),
        }
    }
}

/// Live value read from the skeleton.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Measurement {
    /// One number from one element.
    Scalar {
        /// Element name.
        target: String,
        /// Element kind, resolved at construction.
        source: ScalarSource,
        /// Quantity to read.
        quantity: Quantity,
    },
    /// A relation between two markers.
    MarkerCompare {
        /// First marker.
        marker1: String,
        /// Second marker.
        marker2: String,
        /// What to compare.
        comparison: Comparison,
    },
}

impl Measurement {
    /// Resolve a scalar measurement, checking that the quantity applies.
    ///
    /// Elements are looked up as body, joint, marker, then strap.
    pub fn scalar(
        owner: &str,
        skeleton: &Skeleton,
        target: &str,
        quantity: Quantity,
    ) -> Result<Self> {
        let source = if skeleton.body(target).is_some() {
            ScalarSource::Body
        } else if skeleton.joint(target).is_some() {
            ScalarSource::Joint
        } else if skeleton.marker(target).is_some() {
            ScalarSource::Marker
        } else if skeleton.strap(target).is_some() {
            ScalarSource::Strap
        } else {
            return Err(SimError::unknown(owner, "element", target).into());
        };

        let hinge = skeleton
            .joint(target)
            .is_some_and(|j| j.kind() == JointKind::Hinge);
        let valid = match (source, quantity) {
            (ScalarSource::Body | ScalarSource::Marker, Quantity::Position(_)) => true,
            (ScalarSource::Body | ScalarSource::Marker, Quantity::Quaternion(i)) => i < 4,
            (ScalarSource::Joint, Quantity::Position(_)) => true,
            (ScalarSource::Joint, Quantity::Angle) => hinge,
            (ScalarSource::Strap, Quantity::Length) => true,
            _ => false,
        };
        if !valid {
            return Err(SimError::invalid(
                owner,
                "DataType",
                quantity.to_string(),
                format!("not available for {target}"),
            )
            .into());
        }
        Ok(Self::Scalar {
            target: target.to_string(),
            source,
            quantity,
        })
    }

    /// Resolve a marker comparison.
    pub fn marker_compare(
        owner: &str,
        skeleton: &Skeleton,
        marker1: &str,
        marker2: &str,
        comparison: Comparison,
    ) -> Result<Self> {
        for marker in [marker1, marker2] {
            if skeleton.marker(marker).is_none() {
                return Err(SimError::unknown(owner, "marker", marker).into());
            }
        }
        Ok(Self::MarkerCompare {
            marker1: marker1.to_string(),
            marker2: marker2.to_string(),
            comparison,
        })
    }

    /// Read the current value.
    pub fn measure(&self, skeleton: &Skeleton) -> Result<f64> {
        match self {
            Self::Scalar {
                target,
                source,
                quantity,
            } => Ok(measure_scalar(skeleton, target, *source, *quantity)?),
            Self::MarkerCompare {
                marker1,
                marker2,
                comparison,
            } => {
                let m1 = skeleton.marker_world_pose(marker1)?;
                let m2 = skeleton.marker_world_pose(marker2)?;
                let value = match comparison {
                    Comparison::Delta(axis) => {
                        m2.position[axis.index()] - m1.position[axis.index()]
                    }
                    Comparison::Distance => (m1.position - m2.position).norm(),
                    Comparison::Angle => (m1.rotation.inverse() * m2.rotation).angle(),
                    Comparison::AxisAngle(a, b) => {
                        m1.axis(*a).dot(&m2.axis(*b)).clamp(-1.0, 1.0).acos()
                    }
                };
                Ok(value)
            }
        }
    }

    fn append_to_attributes(&self, attrs: &mut Attributes) {
        match self {
            Self::Scalar {
                target, quantity, ..
            } => {
                attrs.set(attributes::TYPE, "Scalar");
                attrs.set("TargetID", target.as_str());
                attrs.set("DataType", quantity.to_string());
            }
            Self::MarkerCompare {
                marker1,
                marker2,
                comparison,
            } => {
                let (first, second) = comparison.tags();
                attrs.set(attributes::TYPE, "MarkerCompare");
                attrs.set("Marker1ID", marker1.as_str());
                attrs.set("Marker2ID", marker2.as_str());
                attrs.set("Marker1Comparison", first);
                attrs.set("Marker2Comparison", second);
            }
        }
    }
}

fn measure_scalar(
    skeleton: &Skeleton,
    target: &str,
    source: ScalarSource,
    quantity: Quantity,
) -> sim_types::Result<f64> {
    let quaternion = |q: UnitQuaternion<f64>, i: usize| match i {
        0 => q.w,
        1 => q.i,
        2 => q.j,
        _ => q.k,
    };
    match (source, quantity) {
        (ScalarSource::Body, Quantity::Position(axis)) => {
            Ok(skeleton.body_pose(target)?.position[axis.index()])
        }
        (ScalarSource::Body, Quantity::Quaternion(i)) => {
            Ok(quaternion(skeleton.body_pose(target)?.rotation, i))
        }
        (ScalarSource::Marker, Quantity::Position(axis)) => {
            Ok(skeleton.marker_world_position(target)?[axis.index()])
        }
        (ScalarSource::Marker, Quantity::Quaternion(i)) => {
            Ok(quaternion(skeleton.marker_world_pose(target)?.rotation, i))
        }
        (ScalarSource::Joint, Quantity::Position(axis)) => {
            Ok(skeleton.joint_anchor(target)?[axis.index()])
        }
        (ScalarSource::Joint, Quantity::Angle) => skeleton.hinge_angle(target),
        (ScalarSource::Strap, Quantity::Length) => skeleton.strap_length(target),
        _ => Err(SimError::invalid(
            target,
            "DataType",
            quantity.to_string(),
            "not available for this element",
        )),
    }
}

/// Score for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchValue {
    /// Signed error `measured - reference`.
    pub error: f64,
    /// `Intercept + Slope · positive_function(error)`.
    pub score: f64,
    /// The score crossed an abort bound.
    pub abort: bool,
}

/// A reference table scored against a live measurement.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DataTarget {
    name: String,
    target_times: Vec<f64>,
    values: Vec<f64>,
    intercept: f64,
    slope: f64,
    match_type: MatchType,
    abort_below: Option<f64>,
    abort_above: Option<f64>,
    interpolation: InterpolationType,
    measurement: Measurement,
}

impl DataTarget {
    /// Create a data target.
    ///
    /// `target_times` must be non-empty and strictly increasing, with one
    /// value per time.
    pub fn new(
        name: impl Into<String>,
        target_times: Vec<f64>,
        values: Vec<f64>,
        measurement: Measurement,
    ) -> Result<Self> {
        let name = name.into();
        if target_times.is_empty() {
            return Err(SimError::invalid(&name, "TargetTimes", "", "no times given").into());
        }
        if let Some(bad) = target_times.iter().find(|t| !t.is_finite()) {
            return Err(SimError::invalid(
                &name,
                "TargetTimes",
                bad.to_string(),
                "times must be finite",
            )
            .into());
        }
        if let Some(w) = target_times
            .windows(2)
            .find(|w| w[1].is_nan() || w[0].is_nan() || w[1] <= w[0])
        {
            return Err(SimError::invalid(
                &name,
                "TargetTimes",
                format!("{} {}", w[0], w[1]),
                "times must be strictly increasing",
            )
            .into());
        }
        if values.len() != target_times.len() {
            return Err(SimError::LengthMismatch {
                object: name,
                left: "TargetTimes".to_string(),
                left_len: target_times.len(),
                right: "TargetValues".to_string(),
                right_len: values.len(),
            }
            .into());
        }
        Ok(Self {
            name,
            target_times,
            values,
            intercept: 0.0,
            slope: 1.0,
            match_type: MatchType::Linear,
            abort_below: None,
            abort_above: None,
            interpolation: InterpolationType::Punctuated,
            measurement,
        })
    }

    /// Build from attributes, resolving the measurement against `skeleton`.
    pub fn from_attributes(attrs: &Attributes, skeleton: &Skeleton) -> Result<Self> {
        let name = attrs.required(attributes::ID)?;
        let measurement = match attrs.required(attributes::TYPE)? {
            "Scalar" => {
                let tag = attrs.required("DataType")?;
                let quantity = Quantity::parse(tag).ok_or_else(|| {
                    SimError::invalid(name, "DataType", tag, "unrecognised data type")
                })?;
                Measurement::scalar(name, skeleton, attrs.required("TargetID")?, quantity)?
            }
            "MarkerCompare" => {
                let first = attrs.required("Marker1Comparison")?;
                let second = attrs.required("Marker2Comparison")?;
                let comparison = Comparison::parse(first, second).ok_or_else(|| {
                    SimError::invalid(
                        name,
                        "Marker2Comparison",
                        second,
                        format!("not compatible with {first}"),
                    )
                })?;
                Measurement::marker_compare(
                    name,
                    skeleton,
                    attrs.required("Marker1ID")?,
                    attrs.required("Marker2ID")?,
                    comparison,
                )?
            }
            other => {
                return Err(
                    SimError::invalid(name, attributes::TYPE, other, "unknown data target type")
                        .into(),
                )
            }
        };

        let mut target = Self::new(
            name,
            attrs.required_f64_list("TargetTimes")?,
            attrs.required_f64_list("TargetValues")?,
            measurement,
        )?
        .with_score(attrs.required_f64("Intercept")?, attrs.required_f64("Slope")?);

        let tag = attrs.required("MatchType")?;
        target.match_type = MatchType::parse(tag)
            .ok_or_else(|| SimError::invalid(name, "MatchType", tag, "unrecognised match type"))?;
        target.abort_below = match attrs.optional_f64("AbortThreshold")? {
            Some(below) => Some(below),
            None => attrs.optional_f64("AbortBelow")?,
        };
        target.abort_above = attrs.optional_f64("AbortAbove")?;
        if let Some(tag) = attrs.get("InterpolationType") {
            target.interpolation = InterpolationType::parse(tag).ok_or_else(|| {
                SimError::invalid(name, "InterpolationType", tag, "unrecognised interpolation")
            })?;
        }
        Ok(target)
    }

    /// Set the score line.
    #[must_use]
    pub fn with_score(mut self, intercept: f64, slope: f64) -> Self {
        self.intercept = intercept;
        self.slope = slope;
        self
    }

    /// Set the penalty function.
    #[must_use]
    pub fn with_match_type(mut self, match_type: MatchType) -> Self {
        self.match_type = match_type;
        self
    }

    /// Set the abort bounds.
    #[must_use]
    pub fn with_abort(mut self, below: Option<f64>, above: Option<f64>) -> Self {
        self.abort_below = below;
        self.abort_above = above;
        self
    }

    /// Set when the target is scored.
    #[must_use]
    pub fn with_interpolation(mut self, interpolation: InterpolationType) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Target name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target times.
    #[must_use]
    pub fn target_times(&self) -> &[f64] {
        &self.target_times
    }

    /// Reference values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Penalty function.
    #[must_use]
    pub fn match_type(&self) -> MatchType {
        self.match_type
    }

    /// When the target is scored.
    #[must_use]
    pub fn interpolation(&self) -> InterpolationType {
        self.interpolation
    }

    /// The live measurement.
    #[must_use]
    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    /// Reference value at `time`, interpolated and held at both ends. A NaN
    /// time gives the first value.
    #[must_use]
    pub fn reference_at_time(&self, time: f64) -> f64 {
        let last = self.target_times.len() - 1;
        if time.is_nan() || time <= self.target_times[0] {
            return self.values[0];
        }
        if time >= self.target_times[last] {
            return self.values[last];
        }
        let upper = self.target_times.partition_point(|t| *t <= time);
        let lower = upper - 1;
        let (t0, t1) = (self.target_times[lower], self.target_times[upper]);
        let (v0, v1) = (self.values[lower], self.values[upper]);
        v0 + (time - t0) / (t1 - t0) * (v1 - v0)
    }

    /// Reference value of sample `index`.
    pub fn reference_at_index(&self, index: usize) -> Result<f64> {
        self.values
            .get(index)
            .copied()
            .ok_or_else(|| ControlError::IndexOutOfRange {
                object: self.name.clone(),
                index,
                len: self.values.len(),
            })
    }

    /// Index of a target time within `tolerance` of `time`.
    #[must_use]
    pub fn target_match(&self, time: f64, tolerance: f64) -> Option<usize> {
        let upper = self.target_times.partition_point(|t| *t <= time);
        let candidates = [upper.checked_sub(1), Some(upper)];
        candidates
            .into_iter()
            .flatten()
            .filter(|i| *i < self.target_times.len())
            .find(|i| (self.target_times[*i] - time).abs() <= tolerance)
    }

    /// Signed error against the interpolated reference at `time`.
    pub fn calculate_error_at_time(&self, skeleton: &Skeleton, time: f64) -> Result<f64> {
        let measured = self.measurement.measure(skeleton)?;
        Ok(self.coerce("error", measured - self.reference_at_time(time)))
    }

    /// Signed error against sample `index`.
    pub fn calculate_error_at_index(&self, skeleton: &Skeleton, index: usize) -> Result<f64> {
        let reference = self.reference_at_index(index)?;
        let measured = self.measurement.measure(skeleton)?;
        Ok(self.coerce("error", measured - reference))
    }

    /// The penalty function for this target.
    #[must_use]
    pub fn positive_function(&self, error: f64) -> f64 {
        self.match_type.apply(error)
    }

    /// Score an error.
    #[must_use]
    pub fn match_value(&self, error: f64) -> MatchValue {
        let score = self.coerce(
            "score",
            self.intercept + self.slope * self.positive_function(error),
        );
        let abort = self.abort_below.is_some_and(|b| score < b)
            || self.abort_above.is_some_and(|a| score > a);
        MatchValue {
            error,
            score,
            abort,
        }
    }

    /// Score the live measurement at `time`.
    pub fn match_value_at_time(&self, skeleton: &Skeleton, time: f64) -> Result<MatchValue> {
        Ok(self.match_value(self.calculate_error_at_time(skeleton, time)?))
    }

    /// Score the live measurement against sample `index`.
    pub fn match_value_at_index(&self, skeleton: &Skeleton, index: usize) -> Result<MatchValue> {
        Ok(self.match_value(self.calculate_error_at_index(skeleton, index)?))
    }

    fn coerce(&self, what: &str, value: f64) -> f64 {
        if value.is_finite() && (value == 0.0 || value.is_normal()) {
            value
        } else {
            warn!(target = %self.name, what, value, "non-finite or subnormal value coerced to 0");
            0.0
        }
    }

    /// Export the configuration.
    pub fn append_to_attributes(&self, attrs: &mut Attributes) {
        attrs.set(attributes::ID, self.name.as_str());
        self.measurement.append_to_attributes(attrs);
        attrs.set_f64("Intercept", self.intercept);
        attrs.set_f64("Slope", self.slope);
        attrs.set("MatchType", self.match_type.to_string());
        if let Some(below) = self.abort_below {
            attrs.set_f64("AbortThreshold", below);
        }
        if let Some(above) = self.abort_above {
            attrs.set_f64("AbortAbove", above);
        }
        attrs.set("InterpolationType", self.interpolation.to_string());
        attrs.set_f64_list("TargetTimes", &self.target_times);
        attrs.set_f64_list("TargetValues", &self.values);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};
    use sim_skeleton::{Body, Joint, Marker, Strap};
    use sim_types::Pose;

    fn skeleton() -> Skeleton {
        let mut s = Skeleton::new();
        s.add_body(Body::new("pelvis", Pose::from_position(Point3::new(1.0, 2.0, 3.0))))
            .unwrap();
        s.add_marker(Marker::on_body(
            "hip",
            "pelvis",
            Pose::from_position(Point3::new(0.0, 0.0, -1.0)),
        ))
        .unwrap();
        s.add_marker(Marker::in_world("ground", Pose::identity()))
            .unwrap();
        s
    }

    fn scalar(quantity: Quantity, target: &str) -> Measurement {
        Measurement::scalar("dt", &skeleton(), target, quantity).unwrap()
    }

    #[test]
    fn test_reference_interpolation_holds_ends() {
        let t = DataTarget::new(
            "dt",
            vec![0.0, 1.0, 2.0],
            vec![0.0, 10.0, 0.0],
            scalar(Quantity::Position(Axis::X), "pelvis"),
        )
        .unwrap();
        assert_relative_eq!(t.reference_at_time(0.5), 5.0);
        assert_relative_eq!(t.reference_at_time(1.5), 5.0);
        assert_eq!(t.reference_at_time(1.0), 10.0);
        assert_eq!(t.reference_at_time(3.0), 0.0);
        assert_eq!(t.reference_at_time(-1.0), 0.0);
        assert!(t.reference_at_index(3).is_err());
    }

    #[test]
    fn test_errors_and_scores() {
        let s = skeleton();
        let t = DataTarget::new(
            "dt",
            vec![0.0, 1.0],
            vec![0.0, 2.0],
            scalar(Quantity::Position(Axis::Z), "hip"),
        )
        .unwrap()
        .with_score(1.0, -0.5)
        .with_match_type(MatchType::Square)
        .with_abort(Some(0.0), None);

        // hip world z = 2, reference at 0.5 is 1
        assert_relative_eq!(t.calculate_error_at_time(&s, 0.5).unwrap(), 1.0);
        assert_relative_eq!(t.calculate_error_at_index(&s, 0).unwrap(), 2.0);

        let m = t.match_value_at_index(&s, 0).unwrap();
        assert_relative_eq!(m.score, -1.0);
        assert!(m.abort);
        let m = t.match_value_at_time(&s, 1.0).unwrap();
        assert_relative_eq!(m.score, 1.0);
        assert!(!m.abort);
    }

    #[test]
    fn test_nan_coerced_to_zero() {
        let t = DataTarget::new(
            "dt",
            vec![0.0],
            vec![f64::NAN],
            scalar(Quantity::Position(Axis::X), "pelvis"),
        )
        .unwrap();
        assert_eq!(t.calculate_error_at_time(&skeleton(), 0.0).unwrap(), 0.0);
        assert_eq!(t.match_value(f64::INFINITY).score, 0.0);
        assert_eq!(t.match_value(1e-320).score, 0.0);
    }

    #[test]
    fn test_target_match() {
        let t = DataTarget::new(
            "dt",
            vec![0.0, 1.0, 2.0],
            vec![0.0; 3],
            scalar(Quantity::Position(Axis::X), "pelvis"),
        )
        .unwrap();
        assert_eq!(t.target_match(0.9995, 1e-3), Some(1));
        assert_eq!(t.target_match(1.0005, 1e-3), Some(1));
        assert_eq!(t.target_match(1.5, 1e-3), None);
        assert_eq!(t.target_match(2.0, 0.0), Some(2));
        assert_eq!(t.target_match(-0.0001, 1e-3), Some(0));
    }

    #[test]
    fn test_table_validation() {
        let m = scalar(Quantity::Position(Axis::X), "pelvis");
        assert!(DataTarget::new("dt", vec![], vec![], m.clone()).is_err());
        assert!(DataTarget::new("dt", vec![1.0, 1.0], vec![0.0, 0.0], m.clone()).is_err());
        assert!(DataTarget::new("dt", vec![0.0, 1.0], vec![0.0], m.clone()).is_err());
        assert!(DataTarget::new("dt", vec![f64::NAN], vec![1.0], m.clone()).is_err());
        assert!(DataTarget::new("dt", vec![f64::INFINITY], vec![1.0], m.clone()).is_err());
        assert!(DataTarget::new("dt", vec![0.0, f64::INFINITY], vec![1.0, 2.0], m).is_err());
    }

    #[test]
    fn test_non_finite_times_rejected_from_attributes() {
        let attrs = Attributes::new()
            .with("ID", "height")
            .with("Type", "Scalar")
            .with("TargetID", "pelvis")
            .with("DataType", "ZP")
            .with("TargetTimes", "NaN")
            .with("TargetValues", "1");
        let err = DataTarget::from_attributes(&attrs, &skeleton()).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_nan_time_holds_first_value() {
        let s = skeleton();
        let t = DataTarget::new(
            "dt",
            vec![0.0, 1.0, 2.0],
            vec![3.0, 3.5, 3.0],
            scalar(Quantity::Position(Axis::Z), "pelvis"),
        )
        .unwrap();
        assert_eq!(t.reference_at_time(f64::NAN), 3.0);
        // pelvis world z = 3
        assert_eq!(t.calculate_error_at_time(&s, f64::NAN).unwrap(), 0.0);
    }

    #[test]
    fn test_scalar_quantity_checks() {
        let mut s = skeleton();
        s.add_body(Body::new("femur", Pose::identity())).unwrap();
        s.add_marker(Marker::on_body("hip_femur", "femur", Pose::identity()))
            .unwrap();
        s.add_joint(Joint::hinge("hip_joint", "hip", "hip_femur"))
            .unwrap();
        s.add_strap(Strap::new("glut", "hip", "hip_femur")).unwrap();

        assert!(Measurement::scalar("dt", &s, "hip_joint", Quantity::Angle).is_ok());
        assert!(Measurement::scalar("dt", &s, "pelvis", Quantity::Angle).is_err());
        assert!(Measurement::scalar("dt", &s, "glut", Quantity::Length).is_ok());
        assert!(Measurement::scalar("dt", &s, "nothing", Quantity::Length).is_err());

        let glut = Measurement::scalar("dt", &s, "glut", Quantity::Length).unwrap();
        // pelvis (1,2,3) hip at z-1, femur origin at 0
        let expected = Vector3::new(1.0, 2.0, 2.0).norm();
        assert_relative_eq!(glut.measure(&s).unwrap(), expected);
    }

    #[test]
    fn test_marker_compare() {
        let s = skeleton();
        let m = Measurement::marker_compare("dt", &s, "ground", "hip", Comparison::Delta(Axis::Y))
            .unwrap();
        assert_relative_eq!(m.measure(&s).unwrap(), 2.0);
        let m = Measurement::marker_compare("dt", &s, "ground", "hip", Comparison::Distance)
            .unwrap();
        assert_relative_eq!(m.measure(&s).unwrap(), Vector3::new(1.0, 2.0, 2.0).norm());
        let m = Measurement::marker_compare(
            "dt",
            &s,
            "ground",
            "hip",
            Comparison::AxisAngle(Axis::X, Axis::Y),
        )
        .unwrap();
        assert_relative_eq!(m.measure(&s).unwrap(), std::f64::consts::FRAC_PI_2);

        assert_eq!(
            Comparison::parse("XAD", "ZAD"),
            Some(Comparison::AxisAngle(Axis::X, Axis::Z))
        );
        assert_eq!(Comparison::parse("Distance", "XWP"), None);
    }

    #[test]
    fn test_attribute_round_trip() {
        let s = skeleton();
        let attrs = Attributes::new()
            .with("ID", "height")
            .with("Type", "Scalar")
            .with("TargetID", "pelvis")
            .with("DataType", "ZP")
            .with("Intercept", "0")
            .with("Slope", "-1")
            .with("MatchType", "Square")
            .with("AbortThreshold", "-10")
            .with("TargetTimes", "0 1 2")
            .with("TargetValues", "3 3.5 3");
        let t = DataTarget::from_attributes(&attrs, &s).unwrap();
        assert_eq!(t.match_type(), MatchType::Square);

        let mut exported = Attributes::new();
        t.append_to_attributes(&mut exported);
        let again = DataTarget::from_attributes(&exported, &s).unwrap();
        assert_eq!(t, again);
    }
}
