//! Error types for driver evaluation.

use sim_types::SimError;
use thiserror::Error;

/// Errors raised while configuring or stepping drivers.
///
/// Errors fall into three classes:
///
/// - **Configuration**: missing or malformed attributes, bad references,
///   non-monotonic solve domains ([`is_config_error`](Self::is_config_error))
/// - **Sequencing**: a driver updated out of step order or a set stepped
///   before it was finalized ([`is_sequence_error`](Self::is_sequence_error))
/// - **Recoverable**: a kinematic target that is out of reach this step
///   ([`is_recoverable`](Self::is_recoverable))
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Configuration or model lookup error.
    #[error(transparent)]
    Config(#[from] SimError),

    /// A driver was updated for a step other than the one after its last.
    #[error("{driver}: update for step {actual} but expected step {expected}")]
    Sequence {
        /// Driver name.
        driver: String,
        /// The step the driver expected.
        expected: u64,
        /// The step it was asked to evaluate.
        actual: u64,
    },

    /// Used before configuration was completed.
    #[error("{object}: used before configuration was completed")]
    NotConfigured {
        /// Name of the object.
        object: String,
    },

    /// A kinematic target length cannot be reached by the chain.
    #[error("{driver}: desired length {desired} outside reachable range [{low}, {high}]")]
    Unreachable {
        /// Driver name.
        driver: String,
        /// Requested length.
        desired: f64,
        /// Shortest reachable length.
        low: f64,
        /// Longest reachable length.
        high: f64,
    },

    /// The chain length does not change monotonically over its range.
    #[error("{driver}: chain length is not monotonic over the configured joint ranges")]
    NonMonotonic {
        /// Driver name.
        driver: String,
    },

    /// The bracketing interval does not contain a sign change.
    #[error("no sign change on [{a}, {b}]: f(a) = {fa}, f(b) = {fb}")]
    NoBracket {
        /// Lower end.
        a: f64,
        /// Upper end.
        b: f64,
        /// Function value at `a`.
        fa: f64,
        /// Function value at `b`.
        fb: f64,
    },

    /// The root finder exhausted its iteration budget.
    #[error("root finder did not converge after {iterations} iterations")]
    NotConverged {
        /// Iterations performed.
        iterations: usize,
    },

    /// Drivers reference each other in a cycle.
    #[error("driver dependency cycle involving {driver}")]
    DependencyCycle {
        /// A driver on the cycle.
        driver: String,
    },

    /// A sample index outside a data table.
    #[error("{object}: index {index} out of range for {len} samples")]
    IndexOutOfRange {
        /// Name of the table owner.
        object: String,
        /// Requested index.
        index: usize,
        /// Table length.
        len: usize,
    },
}

impl ControlError {
    /// Create a sequencing error.
    #[must_use]
    pub fn sequence(driver: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::Sequence {
            driver: driver.into(),
            expected,
            actual,
        }
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::NonMonotonic { .. } | Self::DependencyCycle { .. }
        )
    }

    /// Check if this error indicates a caller bug in step sequencing.
    #[must_use]
    pub fn is_sequence_error(&self) -> bool {
        matches!(self, Self::Sequence { .. } | Self::NotConfigured { .. })
    }

    /// Check if the step loop can continue after this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}
