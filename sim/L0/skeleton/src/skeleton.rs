//! The skeleton arena.

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::{PI, TAU};

use nalgebra::{Point3, UnitQuaternion, Vector3};
use sim_types::{Axis, Pose, Result, SimError};
use tracing::debug;

use crate::{Body, Joint, Marker, Strap};

const OWNER: &str = "skeleton";

/// Bodies, markers, joints and straps, addressed by name.
///
/// The skeleton is the only mutable geometric state the drivers see. It is
/// plain data and cheap to clone, which is how kinematic solvers obtain a
/// private scratch copy that never aliases the live model.
///
/// # Example
///
/// ```
/// use sim_skeleton::{Body, Marker, Skeleton};
/// use sim_types::Pose;
/// use nalgebra::Point3;
///
/// let mut skeleton = Skeleton::new();
/// skeleton.add_body(Body::new("femur", Pose::from_position(Point3::new(0.0, 0.0, 1.0))))?;
/// skeleton.add_marker(Marker::on_body(
///     "knee",
///     "femur",
///     Pose::from_position(Point3::new(0.0, 0.0, -0.4)),
/// ))?;
///
/// let knee = skeleton.marker_world_position("knee")?;
/// assert!((knee.z - 0.6).abs() < 1e-12);
/// # Ok::<(), sim_types::SimError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    bodies: BTreeMap<String, Body>,
    markers: BTreeMap<String, Marker>,
    joints: BTreeMap<String, Joint>,
    straps: BTreeMap<String, Strap>,
}

impl Skeleton {
    /// Create an empty skeleton.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    /// Add a body.
    pub fn add_body(&mut self, body: Body) -> Result<()> {
        if self.bodies.contains_key(body.name()) {
            return Err(SimError::DuplicateName {
                kind: "body",
                name: body.name().to_string(),
            });
        }
        self.bodies.insert(body.name().to_string(), body);
        Ok(())
    }

    /// Add a marker. Its parent body must already exist.
    pub fn add_marker(&mut self, marker: Marker) -> Result<()> {
        if self.markers.contains_key(marker.name()) {
            return Err(SimError::DuplicateName {
                kind: "marker",
                name: marker.name().to_string(),
            });
        }
        if let Some(body) = marker.body() {
            if !self.bodies.contains_key(body) {
                return Err(SimError::unknown(marker.name(), "body", body));
            }
        }
        self.markers.insert(marker.name().to_string(), marker);
        Ok(())
    }

    /// Add a joint. Both markers must already exist.
    pub fn add_joint(&mut self, mut joint: Joint) -> Result<()> {
        if self.joints.contains_key(joint.name()) {
            return Err(SimError::DuplicateName {
                kind: "joint",
                name: joint.name().to_string(),
            });
        }
        let marker1 = self
            .markers
            .get(joint.marker1())
            .ok_or_else(|| SimError::unknown(joint.name(), "marker", joint.marker1()))?;
        let marker2 = self
            .markers
            .get(joint.marker2())
            .ok_or_else(|| SimError::unknown(joint.name(), "marker", joint.marker2()))?;
        joint.body1 = marker1.body().map(str::to_string);
        joint.body2 = marker2.body().map(str::to_string);
        self.joints.insert(joint.name().to_string(), joint);
        Ok(())
    }

    /// Add a strap. All of its markers must already exist.
    pub fn add_strap(&mut self, strap: Strap) -> Result<()> {
        if self.straps.contains_key(strap.name()) {
            return Err(SimError::DuplicateName {
                kind: "strap",
                name: strap.name().to_string(),
            });
        }
        if let Some(missing) = strap.points().find(|m| !self.markers.contains_key(*m)) {
            return Err(SimError::unknown(strap.name(), "marker", missing));
        }
        self.straps.insert(strap.name().to_string(), strap);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// Get a body by name.
    #[must_use]
    pub fn body(&self, name: &str) -> Option<&Body> {
        self.bodies.get(name)
    }

    /// Get a marker by name.
    #[must_use]
    pub fn marker(&self, name: &str) -> Option<&Marker> {
        self.markers.get(name)
    }

    /// Get a joint by name.
    #[must_use]
    pub fn joint(&self, name: &str) -> Option<&Joint> {
        self.joints.get(name)
    }

    /// Get a strap by name.
    #[must_use]
    pub fn strap(&self, name: &str) -> Option<&Strap> {
        self.straps.get(name)
    }

    /// All bodies in name order.
    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.bodies.values()
    }

    /// All markers in name order.
    pub fn markers(&self) -> impl Iterator<Item = &Marker> {
        self.markers.values()
    }

    /// All joints in name order.
    pub fn joints(&self) -> impl Iterator<Item = &Joint> {
        self.joints.values()
    }

    /// All straps in name order.
    pub fn straps(&self) -> impl Iterator<Item = &Strap> {
        self.straps.values()
    }

    fn require_body(&self, name: &str) -> Result<&Body> {
        self.bodies
            .get(name)
            .ok_or_else(|| SimError::unknown(OWNER, "body", name))
    }

    fn require_marker(&self, name: &str) -> Result<&Marker> {
        self.markers
            .get(name)
            .ok_or_else(|| SimError::unknown(OWNER, "marker", name))
    }

    fn require_joint(&self, name: &str) -> Result<&Joint> {
        self.joints
            .get(name)
            .ok_or_else(|| SimError::unknown(OWNER, "joint", name))
    }

    // ------------------------------------------------------------------------
    // Body state
    // ------------------------------------------------------------------------

    /// Current world pose of a body.
    pub fn body_pose(&self, name: &str) -> Result<Pose> {
        Ok(*self.require_body(name)?.pose())
    }

    /// Set the world pose of a body.
    pub fn set_body_pose(&mut self, name: &str, pose: Pose) -> Result<()> {
        let body = self
            .bodies
            .get_mut(name)
            .ok_or_else(|| SimError::unknown(OWNER, "body", name))?;
        body.set_pose(pose);
        Ok(())
    }

    /// Move every body back to its construction pose.
    pub fn reset_to_construction(&mut self) {
        for body in self.bodies.values_mut() {
            let pose = *body.construction_pose();
            body.set_pose(pose);
        }
    }

    /// Rotate a set of bodies rigidly about a pivot point.
    pub fn rotate_bodies<S: AsRef<str>>(
        &mut self,
        names: &[S],
        pivot: &Point3<f64>,
        rotation: &UnitQuaternion<f64>,
    ) -> Result<()> {
        for name in names {
            let name = name.as_ref();
            let body = self
                .bodies
                .get_mut(name)
                .ok_or_else(|| SimError::unknown(OWNER, "body", name))?;
            let pose = body.pose().rotated_about(pivot, rotation);
            body.set_pose(pose);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Marker queries
    // ------------------------------------------------------------------------

    /// World pose of a marker.
    pub fn marker_world_pose(&self, name: &str) -> Result<Pose> {
        let marker = self.require_marker(name)?;
        match marker.body() {
            Some(body) => Ok(self.require_body(body)?.pose().compose(marker.local())),
            None => Ok(*marker.local()),
        }
    }

    /// World position of a marker.
    pub fn marker_world_position(&self, name: &str) -> Result<Point3<f64>> {
        Ok(self.marker_world_pose(name)?.position)
    }

    /// One of a marker's axes in world coordinates.
    pub fn marker_world_axis(&self, name: &str, axis: Axis) -> Result<Vector3<f64>> {
        Ok(self.marker_world_pose(name)?.axis(axis))
    }

    /// Set a marker's pose relative to its parent body.
    pub fn set_marker_local_pose(&mut self, name: &str, local: Pose) -> Result<()> {
        let marker = self
            .markers
            .get_mut(name)
            .ok_or_else(|| SimError::unknown(OWNER, "marker", name))?;
        marker.set_local(local);
        Ok(())
    }

    /// Move a marker so that its origin is at `world`, keeping its orientation.
    pub fn set_marker_world_position(&mut self, name: &str, world: &Point3<f64>) -> Result<()> {
        let marker = self.require_marker(name)?;
        let local_position = match marker.body() {
            Some(body) => self.require_body(body)?.pose().inverse_transform_point(world),
            None => *world,
        };
        let local = Pose::from_position_rotation(local_position, marker.local().rotation);
        self.set_marker_local_pose(name, local)
    }

    // ------------------------------------------------------------------------
    // Joint queries
    // ------------------------------------------------------------------------

    /// World position of a joint anchor (its first marker).
    pub fn joint_anchor(&self, name: &str) -> Result<Point3<f64>> {
        let joint = self.require_joint(name)?;
        self.marker_world_position(joint.marker1())
    }

    /// Primary rotation axis of a joint in world coordinates.
    ///
    /// For a universal joint this is the body 1 axis; see
    /// [`joint_second_axis`](Self::joint_second_axis) for the other.
    pub fn joint_axis(&self, name: &str) -> Result<Vector3<f64>> {
        let joint = self.require_joint(name)?;
        self.marker_world_axis(joint.marker1(), Axis::X)
    }

    /// Body 2 axis of a universal joint in world coordinates.
    pub fn joint_second_axis(&self, name: &str) -> Result<Vector3<f64>> {
        let joint = self.require_joint(name)?;
        self.marker_world_axis(joint.marker2(), Axis::Y)
    }

    /// Hinge angle in radians, wrapped into `(-π, π]`.
    ///
    /// Any rotation of the two marker frames about axes other than the
    /// hinge axis is ignored.
    pub fn hinge_angle(&self, name: &str) -> Result<f64> {
        let joint = self.require_joint(name)?;
        let m1 = self.marker_world_pose(joint.marker1())?;
        let m2 = self.marker_world_pose(joint.marker2())?;
        let relative = m1.rotation.inverse() * m2.rotation;
        let q = relative.quaternion();
        let body2_angle = 2.0 * q.i.atan2(q.w);
        Ok(wrap_angle(-body2_angle))
    }

    /// Euler decomposition of a joint rotation in the frame of marker 1.
    ///
    /// Returns roll, pitch and yaw about the marker 1 X, Y and Z axes. By
    /// default the rotation of body 1 relative to body 2 is decomposed;
    /// `reverse` decomposes body 2 relative to body 1.
    pub fn joint_euler_angles(&self, name: &str, reverse: bool) -> Result<Vector3<f64>> {
        let joint = self.require_joint(name)?;
        let m1 = self.marker_world_pose(joint.marker1())?.rotation;
        let m2 = self.marker_world_pose(joint.marker2())?.rotation;
        let world = if reverse {
            m2 * m1.inverse()
        } else {
            m1 * m2.inverse()
        };
        let in_basis = m1.inverse() * world * m1;
        let (roll, pitch, yaw) = in_basis.euler_angles();
        Ok(Vector3::new(roll, pitch, yaw))
    }

    // ------------------------------------------------------------------------
    // Strap queries
    // ------------------------------------------------------------------------

    /// Current path length of a strap.
    pub fn strap_length(&self, name: &str) -> Result<f64> {
        let strap = self
            .straps
            .get(name)
            .ok_or_else(|| SimError::unknown(OWNER, "strap", name))?;
        let mut length = 0.0;
        let mut previous: Option<Point3<f64>> = None;
        for marker in strap.points() {
            let point = self.marker_world_position(marker)?;
            if let Some(prev) = previous {
                length += (point - prev).norm();
            }
            previous = Some(point);
        }
        Ok(length)
    }

    // ------------------------------------------------------------------------
    // Cloning
    // ------------------------------------------------------------------------

    /// Copy a subset of bodies into a new, independent skeleton.
    ///
    /// Markers on those bodies come along, as do joints and straps whose
    /// markers are all included. World markers are not copied.
    pub fn subset<S: AsRef<str>>(&self, bodies: &[S]) -> Result<Self> {
        let mut sub = Self::new();
        let mut names = BTreeSet::new();
        for name in bodies {
            let body = self.require_body(name.as_ref())?;
            if names.insert(body.name().to_string()) {
                sub.bodies.insert(body.name().to_string(), body.clone());
            }
        }
        for marker in self.markers.values() {
            if marker.body().is_some_and(|b| names.contains(b)) {
                sub.markers.insert(marker.name().to_string(), marker.clone());
            }
        }
        for joint in self.joints.values() {
            if sub.markers.contains_key(joint.marker1()) && sub.markers.contains_key(joint.marker2())
            {
                sub.joints.insert(joint.name().to_string(), joint.clone());
            }
        }
        for strap in self.straps.values() {
            if strap.points().all(|m| sub.markers.contains_key(m)) {
                sub.straps.insert(strap.name().to_string(), strap.clone());
            }
        }
        debug!(
            bodies = sub.bodies.len(),
            markers = sub.markers.len(),
            joints = sub.joints.len(),
            straps = sub.straps.len(),
            "skeleton subset"
        );
        Ok(sub)
    }
}

/// Wrap an angle into `(-π, π]`.
#[must_use]
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::JointKind;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    /// Two unit-length links along +Z joined by a hinge about world X.
    fn two_links() -> Skeleton {
        let mut s = Skeleton::new();
        s.add_body(Body::new("upper", Pose::from_position(Point3::new(0.0, 0.0, 0.5))))
            .unwrap();
        s.add_body(Body::new("lower", Pose::from_position(Point3::new(0.0, 0.0, 1.5))))
            .unwrap();
        s.add_marker(Marker::on_body(
            "hinge_upper",
            "upper",
            Pose::from_position(Point3::new(0.0, 0.0, 0.5)),
        ))
        .unwrap();
        s.add_marker(Marker::on_body(
            "hinge_lower",
            "lower",
            Pose::from_position(Point3::new(0.0, 0.0, -0.5)),
        ))
        .unwrap();
        s.add_marker(Marker::on_body(
            "origin",
            "upper",
            Pose::from_position(Point3::new(0.0, 0.1, 0.0)),
        ))
        .unwrap();
        s.add_marker(Marker::on_body(
            "tip",
            "lower",
            Pose::from_position(Point3::new(0.0, 0.0, 0.5)),
        ))
        .unwrap();
        s.add_joint(Joint::hinge("elbow", "hinge_upper", "hinge_lower"))
            .unwrap();
        s.add_strap(Strap::new("flexor", "origin", "tip").with_via_point("hinge_upper"))
            .unwrap();
        s
    }

    #[test]
    fn test_add_validates_references() {
        let mut s = two_links();
        assert!(matches!(
            s.add_body(Body::new("upper", Pose::identity())),
            Err(SimError::DuplicateName { .. })
        ));
        assert!(s
            .add_marker(Marker::on_body("m", "pelvis", Pose::identity()))
            .unwrap_err()
            .is_reference_error());
        assert!(s
            .add_joint(Joint::new("hip", JointKind::Ball, "m1", "m2"))
            .is_err());
        assert!(s.add_strap(Strap::new("s", "origin", "nowhere")).is_err());

        let joint = s.joint("elbow").unwrap();
        assert_eq!(joint.body1(), Some("upper"));
        assert_eq!(joint.body2(), Some("lower"));
    }

    #[test]
    fn test_hinge_angle_convention() {
        let mut s = two_links();
        assert_relative_eq!(s.hinge_angle("elbow").unwrap(), 0.0, epsilon = 1e-12);

        let anchor = s.joint_anchor("elbow").unwrap();
        let axis = nalgebra::Unit::new_normalize(s.joint_axis("elbow").unwrap());
        let rotation = UnitQuaternion::from_axis_angle(&axis, 0.3);
        s.rotate_bodies(&["lower"], &anchor, &rotation).unwrap();

        assert_relative_eq!(s.hinge_angle("elbow").unwrap(), -0.3, epsilon = 1e-12);
        // Anchor markers stay coincident.
        let m2 = s.marker_world_position("hinge_lower").unwrap();
        assert_relative_eq!((m2 - anchor).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_strap_length() {
        let mut s = two_links();
        // origin (0, 0.1, 0.5) -> via (0, 0, 1) -> tip (0, 0, 2)
        let expected = (0.1_f64.powi(2) + 0.5_f64.powi(2)).sqrt() + 1.0;
        assert_relative_eq!(s.strap_length("flexor").unwrap(), expected, epsilon = 1e-12);

        let anchor = s.joint_anchor("elbow").unwrap();
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2);
        s.rotate_bodies(&["lower"], &anchor, &rotation).unwrap();
        // Rotating about the via point leaves the last segment length unchanged.
        assert_relative_eq!(s.strap_length("flexor").unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_set_marker_world_position() {
        let mut s = two_links();
        let target = Point3::new(0.2, 0.0, 2.0);
        s.set_marker_world_position("tip", &target).unwrap();
        let world = s.marker_world_position("tip").unwrap();
        assert_relative_eq!(world.x, 0.2, epsilon = 1e-12);
        assert_relative_eq!(s.marker("tip").unwrap().local().position.x, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_subset_is_independent() {
        let s = two_links();
        let mut sub = s.subset(&["upper", "lower"]).unwrap();
        assert!(sub.joint("elbow").is_some());
        assert!(sub.strap("flexor").is_some());

        sub.set_body_pose("lower", Pose::identity()).unwrap();
        assert_relative_eq!(s.body_pose("lower").unwrap().position.z, 1.5);

        let upper_only = s.subset(&["upper"]).unwrap();
        assert!(upper_only.joint("elbow").is_none());
        assert!(upper_only.strap("flexor").is_none());
        assert!(s.subset(&["pelvis"]).is_err());
    }

    #[test]
    fn test_reset_to_construction() {
        let mut s = two_links();
        s.set_body_pose("lower", Pose::identity()).unwrap();
        s.reset_to_construction();
        assert_relative_eq!(s.body_pose("lower").unwrap().position.z, 1.5);
    }

    #[test]
    fn test_euler_angles_of_hinge() {
        let mut s = two_links();
        let anchor = s.joint_anchor("elbow").unwrap();
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.4);
        s.rotate_bodies(&["lower"], &anchor, &rotation).unwrap();

        let euler = s.joint_euler_angles("elbow", false).unwrap();
        assert_relative_eq!(euler.x, -0.4, epsilon = 1e-12);
        assert_relative_eq!(euler.y, 0.0, epsilon = 1e-12);
        let reversed = s.joint_euler_angles("elbow", true).unwrap();
        assert_relative_eq!(reversed.x, 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_wrap_angle() {
        assert_relative_eq!(wrap_angle(2.5 * PI), 0.5 * PI, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(-PI), PI, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(0.5), 0.5, epsilon = 1e-15);
        assert_relative_eq!(wrap_angle(-0.5 - TAU), -0.5, epsilon = 1e-12);
    }
}
