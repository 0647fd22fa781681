//! Two-hinge chains: a proximal joint followed by one distal hinge.
//!
//! The classic use is a leg reaching for a foot target: the hip aims the
//! limb while the knee sets the hip to ankle distance.
//!
//! | Attribute | Meaning |
//! |-----------|---------|
//! | `DistalJointID`, `DistalJointRange` | The distal hinge and its angle range |

use sim_types::Attributes;

use crate::chain::ChainJoint;
use crate::hinge::{ChainKind, HingeJointDriver};
use crate::Result;

/// Chain shape with a single distal hinge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwoHinge;

impl ChainKind for TwoHinge {
    const TYPE_NAME: &'static str = "TwoHingeJoint";

    fn read_links(attrs: &Attributes) -> Result<Vec<ChainJoint>> {
        let [low, high] = attrs.required_f64_array::<2>("DistalJointRange")?;
        Ok(vec![ChainJoint::new(attrs.required("DistalJointID")?, low, high)])
    }

    fn write_links(links: &[ChainJoint], attrs: &mut Attributes) {
        if let Some(distal) = links.last() {
            attrs.set("DistalJointID", distal.joint.as_str());
            attrs.set_f64_list("DistalJointRange", &[distal.low, distal.high]);
        }
    }
}

/// Solves a proximal joint and one hinge for a target length.
pub type TwoHingeJointDriver = HingeJointDriver<TwoHinge>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::chain::tests::leg;
    use crate::chain::EXTENSION_CURVE_SAMPLES;
    use crate::drivable::Recorder;
    use crate::driver::{Driver, StepContext};
    use crate::kind::ModelContext;
    use crate::SharedDrivable;
    use approx::assert_relative_eq;
    use sim_skeleton::Skeleton;
    use std::collections::BTreeMap;

    fn attrs() -> Attributes {
        Attributes::new()
            .with("ID", "knee_drv")
            .with("TargetIDList", "vastus_ctl fraction")
            .with("StrapIDList", "vastus -")
            .with("TargetMarkerID", "target")
            .with("DistalBodyMarkerID", "ankle")
            .with("ProximalJointID", "hip")
            .with("ProximalJointRange", "-1.5707963267948966 1.5707963267948966")
            .with("DistalJointID", "knee")
            .with("DistalJointRange", "0 2")
    }

    fn drivables() -> BTreeMap<String, SharedDrivable> {
        let mut map: BTreeMap<String, SharedDrivable> = BTreeMap::new();
        map.insert("vastus_ctl".into(), Recorder::shared("vastus_ctl"));
        map.insert("fraction".into(), Recorder::shared("fraction"));
        map
    }

    fn build(a: &Attributes, s: &Skeleton, drivables: &BTreeMap<String, SharedDrivable>) -> Result<TwoHingeJointDriver> {
        let targets = BTreeMap::new();
        let model = ModelContext {
            skeleton: s,
            drivables,
            data_targets: &targets,
            timestep: 0.001,
        };
        TwoHingeJointDriver::from_attributes(a, &model)
    }

    fn step(d: &mut TwoHingeJointDriver, s: &mut Skeleton, n: u64, values: &BTreeMap<String, f64>) -> Result<()> {
        let mut ctx = StepContext {
            step_count: n,
            time: 0.001 * n as f64,
            timestep: 0.001,
            skeleton: s,
            driver_values: values,
        };
        d.update(&mut ctx)
    }

    #[test]
    fn test_reaches_target_marker() {
        let mut s = leg();
        let vastus = Recorder::shared("vastus_ctl");
        let fraction = Recorder::shared("fraction");
        let mut targets: BTreeMap<String, SharedDrivable> = BTreeMap::new();
        targets.insert("vastus_ctl".into(), vastus.clone());
        targets.insert("fraction".into(), fraction.clone());
        let mut d = build(&attrs(), &s, &targets).unwrap();
        step(&mut d, &mut s, 1, &BTreeMap::new()).unwrap();

        // 2 + 2·cos(knee) = 1.5²
        let knee = 0.125_f64.acos();
        assert_relative_eq!(d.value(), knee / 2.0, epsilon = 1e-9);
        assert_relative_eq!(d.solution().length, 1.5, epsilon = 1e-9);
        assert_relative_eq!(
            s.marker_world_position("ankle").unwrap(),
            s.marker_world_position("target").unwrap(),
            epsilon = 1e-9
        );
        assert_relative_eq!(s.hinge_angle("knee").unwrap(), knee, epsilon = 1e-9);
        assert_eq!(d.joint_angles().len(), 2);

        d.send_data(1);
        let strap = d.chain().strap_length("vastus").unwrap();
        assert_eq!(vastus.borrow().last_value(), Some(strap));
        assert_eq!(fraction.borrow().last_value(), Some(d.value()));
    }

    #[test]
    fn test_desired_length_driver() {
        let mut s = leg();
        let mut d = build(&attrs().with("DesiredLengthDriverID", "len"), &s, &drivables()).unwrap();
        assert_eq!(d.upstream_drivers(), vec!["len"]);

        let err = step(&mut d, &mut s, 1, &BTreeMap::new()).unwrap_err();
        assert!(err.is_config_error());

        let values = BTreeMap::from([("len".to_string(), 1.2)]);
        step(&mut d, &mut s, 2, &values).unwrap();
        assert_eq!(d.solution().desired_length, 1.2);
        assert_relative_eq!(d.solution().length, 1.2, epsilon = 1e-9);
    }

    #[test]
    fn test_unreachable_holds_value() {
        let mut s = leg();
        let mut d = build(&attrs(), &s, &drivables()).unwrap();
        step(&mut d, &mut s, 1, &BTreeMap::new()).unwrap();
        let before = d.value();

        d.set_desired_length(Some(3.0));
        let err = step(&mut d, &mut s, 2, &BTreeMap::new()).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(d.value(), before);

        d.set_desired_length(Some(2.0));
        step(&mut d, &mut s, 3, &BTreeMap::new()).unwrap();
        assert_relative_eq!(d.value(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_apply_to_model_off() {
        let mut s = leg();
        let a = attrs().with("ApplyToModel", "false");
        let mut d = build(&a, &s, &drivables()).unwrap();
        assert!(d.markers_written().is_empty());
        let thigh = s.body_pose("thigh").unwrap();
        step(&mut d, &mut s, 1, &BTreeMap::new()).unwrap();
        assert_eq!(s.body_pose("thigh").unwrap(), thigh);
        assert!(d.value() > 0.0);
    }

    #[test]
    fn test_attribute_round_trip() {
        let s = leg();
        let targets = drivables();
        let d = build(&attrs().with("Tolerance", "1e-8"), &s, &targets).unwrap();
        let mut exported = Attributes::new();
        d.append_to_attributes(&mut exported);
        assert_eq!(exported.get("Type"), Some("TwoHingeJoint"));
        assert_eq!(exported.get("StrapIDList"), Some("- vastus"));

        let mut again = build(&exported, &s, &targets).unwrap();
        assert_eq!(again.chain().layout(), d.chain().layout());
        assert_eq!(again.chain().tolerance(), 1e-8);

        let (mut s1, mut s2) = (leg(), leg());
        let mut d = d;
        step(&mut d, &mut s1, 1, &BTreeMap::new()).unwrap();
        step(&mut again, &mut s2, 1, &BTreeMap::new()).unwrap();
        assert_eq!(again.value(), d.value());
    }

    #[test]
    fn test_configuration_errors() {
        let s = leg();
        let targets = drivables();
        assert!(build(&attrs().with("StrapIDList", "vastus"), &s, &targets).is_err());
        assert!(build(&attrs().with("StrapIDList", "missing -"), &s, &targets).is_err());
        assert!(build(&attrs().with("DistalJointRange", "0"), &s, &targets).is_err());
        assert!(build(&attrs().with("DistalJointRange", "-1 1"), &s, &targets).is_err());
        assert!(build(&attrs().with("Tolerance", "-1"), &s, &targets).is_err());
    }

    #[test]
    fn test_dump() {
        let mut s = leg();
        let mut d = build(&attrs().with("DumpExtensionCurve", "1"), &s, &drivables()).unwrap();
        step(&mut d, &mut s, 1, &BTreeMap::new()).unwrap();
        let header = d.dump_header();
        assert_eq!(header.len(), d.dump_row(0.001).len());
        assert!(header.contains(&"kneeAngle".to_string()));

        let preamble = d.dump_preamble().unwrap();
        assert_eq!(preamble.lines().count(), EXTENSION_CURVE_SAMPLES + 1);
        assert!(preamble.starts_with("AngleFraction\tLength\n"));
    }
}
