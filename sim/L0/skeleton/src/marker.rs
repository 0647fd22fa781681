//! Markers: named frames fixed to a body or to the world.

use sim_types::Pose;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A frame attached to a body.
///
/// Markers are the only way drivers refer to points and directions on the
/// model. Joint anchors and axes, strap attachment points and oscillator
/// targets are all markers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Marker {
    name: String,
    /// Parent body, or `None` for a marker fixed in the world.
    body: Option<String>,
    /// Pose relative to the parent body.
    local: Pose,
}

impl Marker {
    /// Create a marker on a body.
    #[must_use]
    pub fn on_body(name: impl Into<String>, body: impl Into<String>, local: Pose) -> Self {
        Self {
            name: name.into(),
            body: Some(body.into()),
            local,
        }
    }

    /// Create a marker fixed in the world frame.
    #[must_use]
    pub fn in_world(name: impl Into<String>, pose: Pose) -> Self {
        Self {
            name: name.into(),
            body: None,
            local: pose,
        }
    }

    /// Marker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent body name, if any.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Pose relative to the parent body (or world).
    #[must_use]
    pub fn local(&self) -> &Pose {
        &self.local
    }

    pub(crate) fn set_local(&mut self, local: Pose) {
        self.local = local;
    }
}
