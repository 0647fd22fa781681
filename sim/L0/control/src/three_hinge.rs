//! Three-hinge chains: a proximal joint, an intermediate hinge and a
//! distal hinge sharing one fraction.
//!
//! Each distal hinge shapes the common fraction with its own gamma, so a
//! knee can lead while the ankle follows late in the range.
//!
//! | Attribute | Meaning |
//! |-----------|---------|
//! | `IntermediateJointID`, `IntermediateJointRange` | Middle hinge and its angle range |
//! | `IntermediateJointAngleGamma` | Fraction exponent (default 1) |
//! | `DistalJointID`, `DistalJointRange` | Last hinge and its angle range |
//! | `DistalJointAngleGamma` | Fraction exponent (default 1) |

use sim_types::Attributes;

use crate::chain::ChainJoint;
use crate::hinge::{ChainKind, HingeJointDriver};
use crate::Result;

/// Chain shape with an intermediate and a distal hinge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreeHinge;

fn read_link(attrs: &Attributes, prefix: &str) -> Result<ChainJoint> {
    let [low, high] = attrs.required_f64_array::<2>(&format!("{prefix}JointRange"))?;
    let gamma = attrs
        .optional_f64(&format!("{prefix}JointAngleGamma"))?
        .unwrap_or(1.0);
    Ok(ChainJoint::new(attrs.required(&format!("{prefix}JointID"))?, low, high).with_gamma(gamma))
}

fn write_link(link: &ChainJoint, prefix: &str, attrs: &mut Attributes) {
    attrs.set(format!("{prefix}JointID"), link.joint.as_str());
    attrs.set_f64_list(format!("{prefix}JointRange"), &[link.low, link.high]);
    attrs.set_f64(format!("{prefix}JointAngleGamma"), link.gamma);
}

impl ChainKind for ThreeHinge {
    const TYPE_NAME: &'static str = "ThreeHingeJoint";

    fn read_links(attrs: &Attributes) -> Result<Vec<ChainJoint>> {
        Ok(vec![
            read_link(attrs, "Intermediate")?,
            read_link(attrs, "Distal")?,
        ])
    }

    fn write_links(links: &[ChainJoint], attrs: &mut Attributes) {
        if let [intermediate, distal] = links {
            write_link(intermediate, "Intermediate", attrs);
            write_link(distal, "Distal", attrs);
        }
    }
}

/// Solves a proximal joint and two hinges for a target length.
pub type ThreeHingeJointDriver = HingeJointDriver<ThreeHinge>;
