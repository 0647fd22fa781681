//! Core types for the driver layer.
//!
//! This crate provides the small set of types shared by the skeleton and the
//! drivers:
//!
//! - [`SimError`] - Configuration and lookup errors
//! - [`Pose`] / [`Axis`] - Rigid transforms for bodies and markers
//! - [`StepClock`] - Fixed-step counter and simulation time
//! - [`Attributes`] - Flat string key/value configuration sets
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They carry no physics and no control
//! logic; they are the common language between the kinematics provider and
//! the drivers that read from it.
//!
//! # Coordinate System
//!
//! - X: right
//! - Y: forward
//! - Z: up
//! - Right-handed

#![doc(html_root_url = "https://docs.rs/sim-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
)]

pub mod attributes;
mod clock;
mod error;
mod pose;

pub use attributes::Attributes;
pub use clock::StepClock;
pub use error::SimError;
pub use pose::{Axis, Pose};

// Re-export math types for convenience
pub use nalgebra::{Point3, UnitQuaternion, Vector3};

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, SimError>;
