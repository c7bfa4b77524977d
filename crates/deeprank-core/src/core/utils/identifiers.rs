use phf::{Map, phf_map};

/// Default kernel radii (Angstrom) of the atomic density channels.
pub static DEFAULT_DENSITY_RADII: Map<&'static str, f64> = phf_map! {
    "C" => 1.7,
    "N" => 1.55,
    "O" => 1.52,
    "S" => 1.8,
};

const REPLICA_MARKER: &str = "_r";
const REPLICA_DIGITS: usize = 3;

/// Returns the default radius for a density atom type, if one is known.
pub fn default_density_radius(atom_type: &str) -> Option<f64> {
    DEFAULT_DENSITY_RADII.get(atom_type.trim()).copied()
}

/// The molecule identifier of a structure stem: the text before the first `_`.
pub fn bare_name(stem: &str) -> &str {
    stem.split('_').next().unwrap_or(stem)
}

/// A stem without any `_` suffix names a native (reference) structure.
pub fn is_native_name(stem: &str) -> bool {
    !stem.contains('_')
}

/// Name of augmentation replica `k` of `origin`, e.g. `1AK4_7w_r002`.
pub fn replica_name(origin: &str, k: u32) -> String {
    format!("{origin}{REPLICA_MARKER}{k:0width$}", width = REPLICA_DIGITS)
}

/// Splits a replica name into its origin and replica index.
///
/// Returns `None` when `name` does not end in `_r` followed by at least three digits.
pub fn split_replica(name: &str) -> Option<(&str, u32)> {
    let pos = name.rfind(REPLICA_MARKER)?;
    let digits = &name[pos + REPLICA_MARKER.len()..];
    if pos == 0 || digits.len() < REPLICA_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(|k| (&name[..pos], k))
}

pub fn is_replica_name(name: &str) -> bool {
    split_replica(name).is_some()
}
