//! Error types for configuration and model lookups.

use thiserror::Error;

/// Errors raised while configuring drivers, data targets and skeleton elements.
///
/// Every variant carries the ID of the object being configured so that the
/// message can be shown to the user unchanged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// A required attribute was not present.
    #[error("{object}: missing required attribute {attribute}")]
    MissingAttribute {
        /// ID of the object being configured.
        object: String,
        /// The missing attribute name.
        attribute: String,
    },

    /// An attribute was present but could not be interpreted.
    #[error("{object}: invalid value \"{value}\" for {attribute}: {reason}")]
    InvalidAttribute {
        /// ID of the object being configured.
        object: String,
        /// The attribute with the invalid value.
        attribute: String,
        /// The raw attribute text.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Two parallel lists that must have equal length did not.
    #[error("{object}: {left} has {left_len} entries but {right} has {right_len}")]
    LengthMismatch {
        /// ID of the object being configured.
        object: String,
        /// Name of the first list.
        left: String,
        /// Length of the first list.
        left_len: usize,
        /// Name of the second list.
        right: String,
        /// Length of the second list.
        right_len: usize,
    },

    /// A referenced element does not exist.
    #[error("{object}: {kind} \"{name}\" not found")]
    UnknownReference {
        /// ID of the object holding the reference.
        object: String,
        /// What kind of element was referenced (body, marker, driver, ...).
        kind: &'static str,
        /// The name that failed to resolve.
        name: String,
    },

    /// An element with the same name already exists.
    #[error("{kind} \"{name}\" already exists")]
    DuplicateName {
        /// What kind of element was being added.
        kind: &'static str,
        /// The duplicated name.
        name: String,
    },

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Invalid configuration that does not fit any of the other variants.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

impl SimError {
    /// Create a missing attribute error.
    #[must_use]
    pub fn missing(object: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::MissingAttribute {
            object: object.into(),
            attribute: attribute.into(),
        }
    }

    /// Create an invalid attribute error.
    #[must_use]
    pub fn invalid(
        object: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidAttribute {
            object: object.into(),
            attribute: attribute.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an unknown reference error.
    #[must_use]
    pub fn unknown(object: impl Into<String>, kind: &'static str, name: impl Into<String>) -> Self {
        Self::UnknownReference {
            object: object.into(),
            kind,
            name: name.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Check if this error came from a missing or malformed attribute.
    #[must_use]
    pub fn is_attribute_error(&self) -> bool {
        matches!(
            self,
            Self::MissingAttribute { .. } | Self::InvalidAttribute { .. }
        )
    }

    /// Check if this error came from a reference that did not resolve.
    #[must_use]
    pub fn is_reference_error(&self) -> bool {
        matches!(self, Self::UnknownReference { .. })
    }
}
