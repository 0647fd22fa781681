//! Behavioural properties of the drivers, checked through the public API.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]

use std::collections::BTreeMap;

use approx::assert_relative_eq;
use nalgebra::Point3;
use sim_control::{
    AnyDriver, Boxcar, ChainJoint, ChainLayout, ChangeSchedule, CyclicDriver, DataTarget,
    DriverBase, HingeChain, Measurement, ModelContext, Quantity, StackedBoxcarDriver, TimeDriver,
};
use sim_skeleton::{Body, Joint, Marker, Skeleton};
use sim_types::{Attributes, Axis, Pose};

fn at(z: f64) -> Pose {
    Pose::from_position(Point3::new(0.0, 0.0, z))
}

/// Pelvis with a hip at the origin, a unit thigh and a unit shank.
fn leg() -> Skeleton {
    let mut s = Skeleton::new();
    s.add_body(Body::new("pelvis", at(0.5))).unwrap();
    s.add_body(Body::new("thigh", at(-0.5))).unwrap();
    s.add_body(Body::new("shank", at(-1.5))).unwrap();
    for (name, body, z) in [
        ("hip_p", "pelvis", -0.5),
        ("target", "pelvis", -2.0),
        ("hip_t", "thigh", 0.5),
        ("knee_t", "thigh", -0.5),
        ("knee_s", "shank", 0.5),
        ("ankle", "shank", -0.5),
    ] {
        s.add_marker(Marker::on_body(name, body, at(z))).unwrap();
    }
    s.add_joint(Joint::hinge("hip", "hip_p", "hip_t")).unwrap();
    s.add_joint(Joint::hinge("knee", "knee_t", "knee_s")).unwrap();
    s
}

fn cyclic(phase_delay: f64, interp: bool) -> CyclicDriver {
    let schedule = ChangeSchedule::new("c", vec![0.5, 1.5], vec![3.0, -1.0]).unwrap();
    CyclicDriver::new(DriverBase::new("c").with_interp(interp), schedule, phase_delay).unwrap()
}

#[test]
fn cyclic_output_repeats_every_period() {
    for phase_delay in [0.0, 0.25, -0.25, 0.5, -0.75, 1.25] {
        for interp in [false, true] {
            let mut d = cyclic(phase_delay, interp);
            let mut shifted = cyclic(phase_delay, interp);
            // dyadic times keep the wrap exact
            for k in -64..64 {
                let t = f64::from(k) / 16.0;
                for periods in [1.0, 3.0] {
                    assert_eq!(
                        d.value_at(t),
                        shifted.value_at(t + 2.0 * periods),
                        "delay {phase_delay} interp {interp} t {t}"
                    );
                }
            }
        }
    }
}

#[test]
fn cyclic_two_level_square_wave() {
    let schedule = ChangeSchedule::new("sq", vec![1.0, 1.0], vec![0.0, 1.0]).unwrap();
    let mut d = CyclicDriver::new(DriverBase::new("sq"), schedule, 0.0).unwrap();
    for k in 0..80 {
        let t = f64::from(k) * 0.1;
        let expected = if t.rem_euclid(2.0) < 1.0 { 0.0 } else { 1.0 };
        assert_eq!(d.value_at(t), expected, "t = {t}");
    }
    assert_eq!(d.value_at(1.0), 1.0);
    assert_eq!(d.value_at(2.0), 0.0);
    assert_eq!(d.value_at(3.999), 1.0);
}

#[test]
fn boxcar_matches_brute_force_sum() {
    let pulses = vec![
        Boxcar::new(0.125, 0.25, 1.0),
        Boxcar::new(0.75, 0.5, 2.0),
        Boxcar::new(0.0, 0.0625, -0.5),
        Boxcar::new(0.5, 0.9375, 4.0),
    ];
    let cycle_time = 4.0;
    let mut d = StackedBoxcarDriver::new(DriverBase::new("b"), cycle_time, pulses.clone()).unwrap();

    let reference = |time: f64| -> f64 {
        let n = (time / cycle_time).rem_euclid(1.0);
        pulses
            .iter()
            .filter(|p| (n - p.delay).rem_euclid(1.0) < p.width)
            .map(|p| p.height)
            .sum()
    };
    for k in -512..1024 {
        let t = f64::from(k) / 64.0;
        assert_eq!(d.value_at(t), reference(t), "t = {t}");
    }
}

#[test]
fn boxcar_single_pulse_window() {
    let mut d = StackedBoxcarDriver::new(
        DriverBase::new("b"),
        4.0,
        vec![Boxcar::new(0.25, 0.5, 2.0)],
    )
    .unwrap();
    for k in 0..160 {
        let t = f64::from(k) * 0.1;
        let m = t.rem_euclid(4.0);
        let expected = if (1.0..3.0).contains(&m) { 2.0 } else { 0.0 };
        assert_eq!(d.value_at(t), expected, "t = {t}");
    }
}

#[test]
fn value_at_is_idempotent() {
    let mut c = cyclic(0.3, true);
    let mut b =
        StackedBoxcarDriver::new(DriverBase::new("b"), 1.7, vec![Boxcar::new(0.3, 0.4, 1.5)]).unwrap();
    for k in 0..50 {
        let t = f64::from(k) * 0.137;
        let first = c.value_at(t);
        assert_eq!(first.to_bits(), c.value_at(t).to_bits());
        let first = b.value_at(t);
        assert_eq!(first.to_bits(), b.value_at(t).to_bits());
    }
}

#[test]
fn attribute_round_trip_reproduces_output() {
    let s = leg();
    let (drivables, targets) = (BTreeMap::new(), BTreeMap::new());
    let model = ModelContext {
        skeleton: &s,
        drivables: &drivables,
        data_targets: &targets,
        timestep: 0.01,
    };
    let configs = [
        Attributes::new()
            .with("ID", "step")
            .with("Type", "Step")
            .with("Durations", "0.3 0.2 0.7")
            .with("Values", "1 -2 0.5")
            .with("LinearInterpolation", "true"),
        Attributes::new()
            .with("ID", "cyc")
            .with("Type", "Cyclic")
            .with("Durations", "0.25 0.5 0.1")
            .with("Values", "0.1 0.9 0.4")
            .with("PhaseDelay", "0.35")
            .with("DriverRange", "0.2 0.8"),
        Attributes::new()
            .with("ID", "box")
            .with("Type", "StackedBoxcar")
            .with("StackSize", "2")
            .with("CycleTime", "1.3")
            .with("Delays", "0.1 0.8")
            .with("Widths", "0.3 0.4")
            .with("Heights", "1 0.25"),
    ];
    for attrs in &configs {
        let mut original = AnyDriver::from_attributes(attrs, &model).unwrap();
        let mut exported = Attributes::new();
        original.as_driver().append_to_attributes(&mut exported);
        let mut rebuilt = AnyDriver::from_attributes(&exported, &model).unwrap();

        let a = original.as_time_driver_mut().unwrap();
        let mut outputs = Vec::new();
        for k in 0..200 {
            outputs.push(a.value_at(f64::from(k) * 0.0173));
        }
        let b = rebuilt.as_time_driver_mut().unwrap();
        for (k, expected) in outputs.iter().enumerate() {
            assert_eq!(b.value_at(k as f64 * 0.0173), *expected, "{}", attrs.name());
        }
    }
}

#[test]
fn monotonic_chain_solves_within_tolerance() {
    let s = leg();
    let layout = ChainLayout {
        proximal: ChainJoint::new("hip", -1.0, 1.0),
        links: vec![ChainJoint::new("knee", 0.0, 2.0)],
        target_marker: "target".to_string(),
        distal_marker: "ankle".to_string(),
    };
    let mut chain = HingeChain::new("leg", &s, layout).unwrap();
    let (low, high) = chain.reach();
    assert_relative_eq!(low, 2.0 * 1.0_f64.cos(), epsilon = 1e-12);
    assert_relative_eq!(high, 2.0, epsilon = 1e-12);

    let interior = (1..20).map(|k| low + (high - low) * f64::from(k) / 20.0);
    for desired in interior.chain([low, high]) {
        let solution = chain.solve(desired).unwrap();
        assert!((solution.length - desired).abs() < chain.tolerance(), "desired {desired}");
        assert!((0.0..=1.0).contains(&solution.fraction));
        let again = chain.calculate_length(solution.fraction).unwrap();
        assert!((again - desired).abs() < chain.tolerance());
    }
    assert!(chain.solve(high + 0.1).unwrap_err().is_recoverable());
}

#[test]
fn data_target_holds_at_the_ends() {
    let mut s = Skeleton::new();
    s.add_body(Body::new("trunk", Pose::identity())).unwrap();
    let measurement = Measurement::scalar("gait", &s, "trunk", Quantity::Position(Axis::X)).unwrap();
    let target = DataTarget::new("gait", vec![0.0, 1.0, 2.0], vec![0.0, 10.0, 0.0], measurement)
        .unwrap();
    assert_eq!(target.reference_at_time(0.5), 5.0);
    assert_eq!(target.reference_at_time(3.0), 0.0);
    assert_eq!(target.reference_at_time(-1.0), 0.0);
    assert_eq!(target.reference_at_time(1.0), 10.0);
    assert_relative_eq!(target.calculate_error_at_time(&s, 0.5).unwrap(), -5.0);
}
