//! Actuator paths.
//!
//! A strap is the line of action of a muscle. It runs from an origin marker
//! through zero or more via point markers to an insertion marker, and its
//! length is the sum of the straight segments between consecutive points:
//!
//! ```text
//! L = Σᵢ ||pᵢ₊₁ - pᵢ||
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A piecewise straight actuator path through markers.
///
/// # Example
///
/// ```
/// use sim_skeleton::Strap;
///
/// let strap = Strap::new("biceps", "biceps_origin", "biceps_insertion")
///     .with_via_point("elbow_via");
///
/// assert_eq!(strap.points().count(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Strap {
    name: String,
    origin: String,
    via_points: Vec<String>,
    insertion: String,
}

impl Strap {
    /// Create a two point strap.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        origin: impl Into<String>,
        insertion: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            origin: origin.into(),
            via_points: Vec::new(),
            insertion: insertion.into(),
        }
    }

    /// Add a via point between the origin and the insertion.
    #[must_use]
    pub fn with_via_point(mut self, marker: impl Into<String>) -> Self {
        self.via_points.push(marker.into());
        self
    }

    /// Strap name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Origin marker.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Insertion marker.
    #[must_use]
    pub fn insertion(&self) -> &str {
        &self.insertion
    }

    /// Via point markers.
    #[must_use]
    pub fn via_points(&self) -> &[String] {
        &self.via_points
    }

    /// All path markers from origin to insertion.
    pub fn points(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.origin.as_str())
            .chain(self.via_points.iter().map(String::as_str))
            .chain(std::iter::once(self.insertion.as_str()))
    }
}
