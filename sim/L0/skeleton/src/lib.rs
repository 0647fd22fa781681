//! Kinematic model queried and posed by the driver layer.
//!
//! The physics backend owns the dynamics; this crate owns the geometry that
//! drivers read from and write to between integration steps:
//!
//! - [`Body`] - A rigid body with a world pose and a construction pose
//! - [`Marker`] - A named frame on a body (or in the world)
//! - [`Joint`] - Hinge, universal or ball joint defined by two markers
//! - [`Strap`] - An actuator path through markers, with a length
//! - [`Skeleton`] - The arena holding all of the above, addressed by name
//!
//! # Mutation
//!
//! Geometry only changes through explicit calls (`set_body_pose`,
//! `rotate_bodies`, `set_marker_world_position`, ...). Queries never
//! mutate, so a driver can evaluate the model as often as it likes within a
//! step.
//!
//! # Scratch Copies
//!
//! [`Skeleton::subset`] produces an independent copy of part of the model.
//! Kinematic solvers pose this copy freely while searching for a solution;
//! nothing they do to it is visible in the live skeleton.
//!
//! # Example
//!
//! ```
//! use sim_skeleton::{Body, Joint, Marker, Skeleton};
//! use sim_types::Pose;
//! use nalgebra::{Point3, UnitQuaternion, Vector3};
//!
//! let mut skeleton = Skeleton::new();
//! skeleton.add_body(Body::new("thigh", Pose::identity()))?;
//! skeleton.add_body(Body::new("shank", Pose::from_position(Point3::new(0.0, 0.0, -1.0))))?;
//! skeleton.add_marker(Marker::on_body("knee_thigh", "thigh", Pose::from_position(Point3::new(0.0, 0.0, -0.5))))?;
//! skeleton.add_marker(Marker::on_body("knee_shank", "shank", Pose::from_position(Point3::new(0.0, 0.0, 0.5))))?;
//! skeleton.add_joint(Joint::hinge("knee", "knee_thigh", "knee_shank"))?;
//!
//! let anchor = skeleton.joint_anchor("knee")?;
//! let flex = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -0.2);
//! skeleton.rotate_bodies(&["shank"], &anchor, &flex)?;
//!
//! assert!((skeleton.hinge_angle("knee")? - 0.2).abs() < 1e-12);
//! # Ok::<(), sim_types::SimError>(())
//! ```

#![doc(html_root_url = "https://docs.rs/sim-skeleton/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
)]

mod body;
mod joint;
mod marker;
mod skeleton;
mod strap;

pub use body::Body;
pub use joint::{Joint, JointKind};
pub use marker::Marker;
pub use skeleton::{wrap_angle, Skeleton};
pub use strap::Strap;
