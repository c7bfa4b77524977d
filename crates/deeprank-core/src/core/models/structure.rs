use super::atom::Atom;
use nalgebra::{Point3, Vector3};

/// An ordered sequence of atoms forming one conformation.
///
/// The atom order is the coordinate basis of every per-atom feature array
/// attached to the conformation, so it is never reordered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Structure {
    atoms: Vec<Atom>,
}

impl Structure {
    pub fn new(atoms: Vec<Atom>) -> Self {
        Self { atoms }
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn into_atoms(self) -> Vec<Atom> {
        self.atoms
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Distinct chain identifiers in order of first appearance.
    pub fn chain_ids(&self) -> Vec<char> {
        let mut ids = Vec::new();
        for atom in &self.atoms {
            if !ids.contains(&atom.chain_id) {
                ids.push(atom.chain_id);
            }
        }
        ids
    }

    /// Number of distinct residues, keyed by chain, sequence number and insertion code.
    pub fn residue_count(&self) -> usize {
        let mut count = 0;
        let mut last = None;
        for atom in &self.atoms {
            let key = (atom.chain_id, atom.residue_number, atom.insertion_code);
            if last != Some(key) {
                count += 1;
                last = Some(key);
            }
        }
        count
    }

    /// Arithmetic mean of all atom positions, `None` for an empty structure.
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.atoms.is_empty() {
            return None;
        }
        let sum = self
            .atoms
            .iter()
            .fold(Vector3::zeros(), |acc, atom| acc + atom.position.coords);
        Some(Point3::from(sum / self.atoms.len() as f64))
    }

    /// Mean position of the atoms that lie within `cutoff` of an atom on a different chain.
    ///
    /// Returns `None` when no inter-chain contact exists.
    pub fn contact_center(&self, cutoff: f64) -> Option<Point3<f64>> {
        let cutoff_sq = cutoff * cutoff;
        let mut sum = Vector3::zeros();
        let mut count = 0usize;
        for (i, atom) in self.atoms.iter().enumerate() {
            let in_contact = self.atoms.iter().enumerate().any(|(j, other)| {
                i != j
                    && other.chain_id != atom.chain_id
                    && (other.position - atom.position).norm_squared() < cutoff_sq
            });
            if in_contact {
                sum += atom.position.coords;
                count += 1;
            }
        }
        (count > 0).then(|| Point3::from(sum / count as f64))
    }
}

impl From<Vec<Atom>> for Structure {
    fn from(atoms: Vec<Atom>) -> Self {
        Self::new(atoms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(serial: u32, chain: char, res: i32, pos: [f64; 3]) -> Atom {
        Atom::new(serial, "CA", "ALA", chain, res, Point3::new(pos[0], pos[1], pos[2]))
    }

    #[test]
    fn centroid_is_mean_position() {
        let s = Structure::new(vec![
            atom(1, 'A', 1, [0.0, 0.0, 0.0]),
            atom(2, 'A', 2, [2.0, 4.0, 6.0]),
        ]);
        assert_eq!(s.centroid(), Some(Point3::new(1.0, 2.0, 3.0)));
        assert_eq!(Structure::default().centroid(), None);
    }

    #[test]
    fn chain_ids_keep_first_appearance_order() {
        let s = Structure::new(vec![
            atom(1, 'B', 1, [0.0; 3]),
            atom(2, 'A', 1, [0.0; 3]),
            atom(3, 'B', 2, [0.0; 3]),
        ]);
        assert_eq!(s.chain_ids(), vec!['B', 'A']);
    }

    #[test]
    fn residue_count_groups_consecutive_atoms() {
        let s = Structure::new(vec![
            atom(1, 'A', 1, [0.0; 3]),
            atom(2, 'A', 1, [0.0; 3]),
            atom(3, 'A', 2, [0.0; 3]),
            atom(4, 'B', 2, [0.0; 3]),
        ]);
        assert_eq!(s.residue_count(), 3);
    }

    #[test]
    fn contact_center_uses_interchain_atoms_only() {
        let s = Structure::new(vec![
            atom(1, 'A', 1, [0.0, 0.0, 0.0]),
            atom(2, 'A', 2, [100.0, 0.0, 0.0]),
            atom(3, 'B', 1, [2.0, 0.0, 0.0]),
        ]);
        assert_eq!(s.contact_center(8.5), Some(Point3::new(1.0, 0.0, 0.0)));
        assert_eq!(s.contact_center(1.0), None);
    }
}
