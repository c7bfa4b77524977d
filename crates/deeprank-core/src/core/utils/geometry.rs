use crate::core::models::atom::Atom;
use nalgebra::{Rotation3, Unit, Vector3};
use rand::Rng;
use std::f64::consts::PI;

/// Builds the rotation about `axis` (through the origin) by `angle` radians.
///
/// Returns `None` for a zero-length axis.
pub fn rotation_from_axis_angle(axis: &Vector3<f64>, angle: f64) -> Option<Rotation3<f64>> {
    Unit::try_new(*axis, f64::EPSILON).map(|unit| Rotation3::from_axis_angle(&unit, angle))
}

/// Rigidly rotates atoms about an axis through the coordinate origin.
///
/// Only positions change; the input slice is left untouched. A zero-length
/// axis yields an unrotated copy.
pub fn rotate(atoms: &[Atom], axis: &Vector3<f64>, angle: f64) -> Vec<Atom> {
    match rotation_from_axis_angle(axis, angle) {
        Some(rotation) => atoms
            .iter()
            .map(|atom| atom.with_position(rotation * atom.position))
            .collect(),
        None => atoms.to_vec(),
    }
}

/// Draws a unit vector uniformly on the sphere by spherical point picking.
pub fn random_axis(rng: &mut impl Rng) -> Vector3<f64> {
    let u1: f64 = rng.gen_range(0.0..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    let theta = (2.0 * u1 - 1.0).acos();
    let phi = 2.0 * PI * u2;
    Vector3::new(
        theta.sin() * phi.cos(),
        theta.sin() * phi.sin(),
        theta.cos(),
    )
}

/// Draws a rotation angle uniformly in the open interval `(-pi, pi)`.
pub fn random_angle(rng: &mut impl Rng) -> f64 {
    loop {
        let angle = rng.gen_range(-PI..PI);
        if angle > -PI {
            return angle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::rngs::mock::StepRng;

    fn atoms() -> Vec<Atom> {
        vec![
            Atom::new(1, "N", "ALA", 'A', 1, Point3::new(1.0, 2.0, 3.0)),
            Atom::new(2, "CA", "ALA", 'A', 1, Point3::new(-4.0, 0.5, 2.0)),
            Atom::new(3, "C", "ALA", 'B', 2, Point3::new(0.0, -3.0, 7.5)),
        ]
    }

    #[test]
    fn rotation_preserves_pairwise_distances() {
        let original = atoms();
        let rotated = rotate(&original, &Vector3::new(0.3, -1.0, 0.7), 1.234);
        for i in 0..original.len() {
            for j in 0..original.len() {
                let before = (original[i].position - original[j].position).norm();
                let after = (rotated[i].position - rotated[j].position).norm();
                assert!((before - after).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn rotation_leaves_input_untouched() {
        let original = atoms();
        let snapshot = original.clone();
        let rotated = rotate(&original, &Vector3::z(), PI / 2.0);
        assert_eq!(original, snapshot);
        assert!((rotated[0].position - Point3::new(-2.0, 1.0, 3.0)).norm() < 1e-9);
        assert_eq!(rotated[0].name, "N");
    }

    #[test]
    fn zero_axis_is_identity() {
        let original = atoms();
        assert_eq!(rotate(&original, &Vector3::zeros(), 1.0), original);
    }

    #[test]
    fn random_axis_is_unit_and_reproducible() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..32 {
            let axis = random_axis(&mut a);
            assert!((axis.norm() - 1.0).abs() < 1e-12);
            assert_eq!(axis, random_axis(&mut b));
            let angle = random_angle(&mut a);
            assert!((-PI..PI).contains(&angle));
            assert_eq!(angle, random_angle(&mut b));
        }
    }

    #[test]
    fn angle_never_lands_on_the_lower_bound() {
        // an all-zero draw maps exactly onto -pi
        let mut rng = StepRng::new(0, 1 << 40);
        let angle = random_angle(&mut rng);
        assert!(angle > -PI && angle < PI);

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..10_000 {
            let angle = random_angle(&mut rng);
            assert!(angle > -PI && angle < PI);
        }
    }
}
