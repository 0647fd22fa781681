//! Frames of the skeleton.
//!
//! A body carries its frame in world coordinates; a marker carries its
//! frame relative to the body it sits on, or to the world when it has no
//! body. Chaining the two with [`Pose::compose`] gives a marker's world
//! frame.

use nalgebra::{Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Origin and orientation of a body or marker frame.
///
/// # Example
///
/// ```
/// use sim_types::Pose;
/// use nalgebra::Point3;
///
/// // a hip marker half a unit below the pelvis origin
/// let pelvis = Pose::from_position(Point3::new(0.0, 0.0, 1.0));
/// let hip = Pose::from_position(Point3::new(0.0, 0.0, -0.5));
/// assert_eq!(pelvis.compose(&hip).position, Point3::new(0.0, 0.0, 0.5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Frame origin in the parent frame.
    pub position: Point3<f64>,
    /// Frame axes in the parent frame.
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// A frame coinciding with its parent.
    #[must_use]
    pub fn identity() -> Self {
        Self::from_position(Point3::origin())
    }

    /// A frame offset from its parent with parallel axes.
    #[must_use]
    pub fn from_position(position: Point3<f64>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
        }
    }

    /// A frame offset and turned relative to its parent.
    #[must_use]
    pub const fn from_position_rotation(
        position: Point3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> Self {
        Self { position, rotation }
    }

    /// Where a point given in this frame lies in the parent frame, e.g. a
    /// marker offset mapped through its body.
    #[must_use]
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.rotation * local.coords
    }

    /// Transform a vector from local to parent coordinates (rotation only).
    #[must_use]
    pub fn transform_vector(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local
    }

    /// Transform a point from parent to local coordinates.
    #[must_use]
    pub fn inverse_transform_point(&self, world: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.inverse() * (world - self.position))
    }

    /// Transform a vector from parent to local coordinates.
    #[must_use]
    pub fn inverse_transform_vector(&self, world: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * world
    }

    /// Compose two poses: `self * child`.
    ///
    /// If `child` is expressed in this frame, the result is expressed in the
    /// parent frame of `self`.
    #[must_use]
    pub fn compose(&self, child: &Self) -> Self {
        Self {
            position: self.transform_point(&child.position),
            rotation: self.rotation * child.rotation,
        }
    }

    /// The inverse transform.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            position: Point3::from(rotation * -self.position.coords),
            rotation,
        }
    }

    /// Express `other` (a parent-frame pose) in this frame.
    #[must_use]
    pub fn relative(&self, other: &Self) -> Self {
        self.inverse().compose(other)
    }

    /// Rotate this pose about a pivot point given in the parent frame.
    #[must_use]
    pub fn rotated_about(&self, pivot: &Point3<f64>, rotation: &UnitQuaternion<f64>) -> Self {
        Self {
            position: pivot + rotation * (self.position - pivot),
            rotation: rotation * self.rotation,
        }
    }

    /// Unit vector of one of the local axes, in parent coordinates.
    #[must_use]
    pub fn axis(&self, axis: Axis) -> Vector3<f64> {
        self.rotation * axis.unit()
    }
}

/// One of the three Cartesian axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Axis {
    /// The X axis.
    X,
    /// The Y axis.
    Y,
    /// The Z axis.
    Z,
}

impl Axis {
    /// Unit vector along this axis.
    #[must_use]
    pub fn unit(self) -> Vector3<f64> {
        match self {
            Self::X => Vector3::x(),
            Self::Y => Vector3::y(),
            Self::Z => Vector3::z(),
        }
    }

    /// Component index (0, 1 or 2).
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    /// Parse `"X"`, `"Y"` or `"Z"` (case insensitive).
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "X" | "x" => Some(Self::X),
            "Y" | "y" => Some(Self::Y),
            "Z" | "z" => Some(Self::Z),
            _ => None,
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X => write!(f, "X"),
            Self::Y => write!(f, "Y"),
            Self::Z => write!(f, "Z"),
        }
    }
}
