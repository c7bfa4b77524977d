use nalgebra::Point3;
use std::str::FromStr;

/// The record tag an atom was read from.
///
/// Only `ATOM` records are kept by default; `HETATM` records are accepted when
/// the reader is configured to include hetero atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordKind {
    #[default]
    Atom,
    Hetatm,
}

impl RecordKind {
    /// The six-column tag written at the start of the record.
    pub fn tag(self) -> &'static str {
        match self {
            RecordKind::Atom => "ATOM  ",
            RecordKind::Hetatm => "HETATM",
        }
    }
}

impl FromStr for RecordKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ATOM" => Ok(RecordKind::Atom),
            "HETATM" => Ok(RecordKind::Hetatm),
            _ => Err(()),
        }
    }
}

/// A single atom as described by one fixed-column structure record.
///
/// Atoms are immutable once parsed, except under rigid-body rotation which
/// replaces [`Atom::position`] only. The raw name field and the text trailing
/// the temperature factor column are retained so that a parsed record can be
/// re-emitted byte for byte.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// Record tag (`ATOM` or `HETATM`).
    pub record: RecordKind,
    /// Atom serial number (columns 7-11).
    pub serial: u32,
    /// Trimmed atom name (columns 13-16), e.g. `"CA"`.
    pub name: String,
    /// Alternate location indicator (column 17), `' '` when blank.
    pub alt_loc: char,
    /// Residue name (columns 18-20).
    pub residue_name: String,
    /// Chain identifier (column 22).
    pub chain_id: char,
    /// Residue sequence number (columns 23-26).
    pub residue_number: i32,
    /// Residue insertion code (column 27), `' '` when blank.
    pub insertion_code: char,
    /// Cartesian coordinates in Angstroms (columns 31-54).
    pub position: Point3<f64>,
    /// Occupancy (columns 55-60).
    pub occupancy: f64,
    /// Temperature factor (columns 61-66).
    pub temperature_factor: f64,
    /// Exact four-character name field as read, used to preserve column alignment.
    pub(crate) name_field: Option<String>,
    /// Everything after column 66 (segment id, element, charge), emitted verbatim.
    pub(crate) trailer: String,
}

impl Atom {
    /// Creates an `ATOM` record with default occupancy and temperature factor.
    pub fn new(
        serial: u32,
        name: &str,
        residue_name: &str,
        chain_id: char,
        residue_number: i32,
        position: Point3<f64>,
    ) -> Self {
        Self {
            record: RecordKind::Atom,
            serial,
            name: name.to_string(),
            alt_loc: ' ',
            residue_name: residue_name.to_string(),
            chain_id,
            residue_number,
            insertion_code: ' ',
            position,
            occupancy: 1.0,
            temperature_factor: 0.0,
            name_field: None,
            trailer: String::new(),
        }
    }

    /// Element symbol, from the element columns (77-78) when present and
    /// otherwise inferred from the leading letters of the atom name.
    pub fn element(&self) -> String {
        let from_columns = self
            .trailer
            .get(10..12)
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(symbol) = from_columns {
            return symbol.to_ascii_uppercase();
        }
        self.name
            .trim_start_matches(|c: char| c.is_ascii_digit())
            .chars()
            .take(1)
            .collect::<String>()
            .to_ascii_uppercase()
    }

    /// Returns a copy of this atom at a new position. All other columns are kept.
    pub fn with_position(&self, position: Point3<f64>) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_atom_has_expected_default_columns() {
        let atom = Atom::new(7, "CA", "ALA", 'A', 12, Point3::new(1.0, 2.0, 3.0));

        assert_eq!(atom.record, RecordKind::Atom);
        assert_eq!(atom.serial, 7);
        assert_eq!(atom.alt_loc, ' ');
        assert_eq!(atom.insertion_code, ' ');
        assert_eq!(atom.occupancy, 1.0);
        assert_eq!(atom.temperature_factor, 0.0);
        assert!(atom.name_field.is_none());
        assert!(atom.trailer.is_empty());
    }

    #[test]
    fn element_prefers_element_columns() {
        let mut atom = Atom::new(1, "CA", "CA", 'A', 1, Point3::origin());
        atom.trailer = "          CA".to_string();
        assert_eq!(atom.element(), "CA");
    }

    #[test]
    fn element_falls_back_to_name_prefix() {
        let atom = Atom::new(1, "1HB", "ALA", 'A', 1, Point3::origin());
        assert_eq!(atom.element(), "H");
        let atom = Atom::new(2, "OXT", "ALA", 'A', 1, Point3::origin());
        assert_eq!(atom.element(), "O");
    }

    #[test]
    fn with_position_only_replaces_coordinates() {
        let atom = Atom::new(3, "N", "GLY", 'B', 4, Point3::new(0.0, 0.0, 0.0));
        let moved = atom.with_position(Point3::new(1.0, 1.0, 1.0));
        assert_eq!(moved.position, Point3::new(1.0, 1.0, 1.0));
        assert_eq!(moved.name, atom.name);
        assert_eq!(moved.chain_id, atom.chain_id);
        assert_eq!(moved.serial, atom.serial);
    }

    #[test]
    fn record_kind_parses_tags() {
        assert_eq!("ATOM".parse(), Ok(RecordKind::Atom));
        assert_eq!("HETATM".parse(), Ok(RecordKind::Hetatm));
        assert_eq!("REMARK".parse::<RecordKind>(), Err(()));
        assert_eq!(RecordKind::Atom.tag().len(), 6);
    }
}
