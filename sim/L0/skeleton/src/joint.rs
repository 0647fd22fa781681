//! Joints between two bodies.
//!
//! A joint is defined by two markers, one on each body, which coincide when
//! the joint is assembled. The first marker fixes the joint frame:
//!
//! - **Hinge**: rotation about the X axis of marker 1
//! - **Universal**: X axis of marker 1, then Y axis of marker 2
//! - **Ball**: unconstrained rotation about the anchor
//!
//! # Angle Convention
//!
//! Hinge angles are measured as the rotation of body 1 relative to body 2,
//! so rotating body 2 by `+θ` about the hinge axis reads as an angle of `-θ`.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Kind of joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointKind {
    /// One rotational degree of freedom.
    Hinge,
    /// Two rotational degrees of freedom on perpendicular axes.
    Universal,
    /// Three rotational degrees of freedom.
    Ball,
}

impl JointKind {
    /// Parse a joint kind tag.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "Hinge" => Some(Self::Hinge),
            "Universal" => Some(Self::Universal),
            "Ball" => Some(Self::Ball),
            _ => None,
        }
    }

    /// Number of rotational degrees of freedom.
    #[must_use]
    pub const fn dof(self) -> usize {
        match self {
            Self::Hinge => 1,
            Self::Universal => 2,
            Self::Ball => 3,
        }
    }
}

impl fmt::Display for JointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hinge => write!(f, "Hinge"),
            Self::Universal => write!(f, "Universal"),
            Self::Ball => write!(f, "Ball"),
        }
    }
}

/// A joint connecting the bodies of its two markers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Joint {
    name: String,
    kind: JointKind,
    marker1: String,
    marker2: String,
    /// Resolved when the joint is added to a skeleton.
    pub(crate) body1: Option<String>,
    pub(crate) body2: Option<String>,
}

impl Joint {
    /// Create a joint between two markers.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: JointKind,
        marker1: impl Into<String>,
        marker2: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            marker1: marker1.into(),
            marker2: marker2.into(),
            body1: None,
            body2: None,
        }
    }

    /// Create a hinge joint.
    #[must_use]
    pub fn hinge(
        name: impl Into<String>,
        marker1: impl Into<String>,
        marker2: impl Into<String>,
    ) -> Self {
        Self::new(name, JointKind::Hinge, marker1, marker2)
    }

    /// Joint name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Joint kind.
    #[must_use]
    pub fn kind(&self) -> JointKind {
        self.kind
    }

    /// Marker on body 1, defining the joint frame.
    #[must_use]
    pub fn marker1(&self) -> &str {
        &self.marker1
    }

    /// Marker on body 2.
    #[must_use]
    pub fn marker2(&self) -> &str {
        &self.marker2
    }

    /// Body 1 (`None` for the world or before the joint is added).
    #[must_use]
    pub fn body1(&self) -> Option<&str> {
        self.body1.as_deref()
    }

    /// Body 2 (`None` for the world or before the joint is added).
    #[must_use]
    pub fn body2(&self) -> Option<&str> {
        self.body2.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_kind_parse() {
        assert_eq!(JointKind::parse("Hinge"), Some(JointKind::Hinge));
        assert_eq!(JointKind::parse("Ball"), Some(JointKind::Ball));
        assert_eq!(JointKind::parse("Slider"), None);
        assert_eq!(JointKind::Universal.dof(), 2);
        assert_eq!(JointKind::Universal.to_string(), "Universal");
    }
}
