//! Rigid bodies.

use sim_types::Pose;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A rigid body with a current world pose.
///
/// The construction pose is the pose the model was built in. Kinematic
/// solvers work from it because no joint is rotated there.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Body {
    name: String,
    pose: Pose,
    construction_pose: Pose,
}

impl Body {
    /// Create a body whose construction pose equals its current pose.
    #[must_use]
    pub fn new(name: impl Into<String>, pose: Pose) -> Self {
        Self {
            name: name.into(),
            pose,
            construction_pose: pose,
        }
    }

    /// Set a construction pose different from the current pose.
    #[must_use]
    pub fn with_construction_pose(mut self, pose: Pose) -> Self {
        self.construction_pose = pose;
        self
    }

    /// Body name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current world pose.
    #[must_use]
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Pose at model construction.
    #[must_use]
    pub fn construction_pose(&self) -> &Pose {
        &self.construction_pose
    }

    pub(crate) fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }
}
