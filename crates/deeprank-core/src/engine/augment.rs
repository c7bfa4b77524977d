use crate::core::models::conformation::Augmentation;
use crate::core::models::structure::Structure;
use crate::core::utils::geometry::{random_angle, random_axis, rotate};
use nalgebra::Vector3;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Draws the rigid rotations of augmentation replicas.
///
/// With a seed, the sequence of rotations is reproducible.
pub struct Augmenter {
    rng: StdRng,
}

impl Augmenter {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Draws one rotation: a uniform axis on the sphere and an angle in `[-pi, pi)`.
    pub fn draw(&mut self) -> Augmentation {
        let axis = random_axis(&mut self.rng);
        let angle = random_angle(&mut self.rng);
        Augmentation {
            axis: [axis.x, axis.y, axis.z],
            angle,
        }
    }
}

/// Applies a stored rotation to a structure, returning the rotated copy.
pub fn apply(structure: &Structure, augmentation: &Augmentation) -> Structure {
    let [x, y, z] = augmentation.axis;
    Structure::new(rotate(
        structure.atoms(),
        &Vector3::new(x, y, z),
        augmentation.angle,
    ))
}
