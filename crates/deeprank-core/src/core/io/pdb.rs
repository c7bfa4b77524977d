use crate::core::io::traits::StructureFile;
use crate::core::models::atom::{Atom, RecordKind};
use crate::core::models::structure::Structure;
use nalgebra::Point3;
use std::io::{self, BufRead, Write};
use std::path::Path;
use thiserror::Error;

const MIN_RECORD_LENGTH: usize = 54;
const TRAILER_START: usize = 66;

#[derive(Debug, Error)]
pub enum PdbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: PdbParseErrorKind },
    #[error("Missing required record: {0}")]
    MissingRecord(String),
}

#[derive(Debug, Error)]
pub enum PdbParseErrorKind {
    #[error("Invalid integer format in columns {columns} (value: '{value}')")]
    InvalidInt { columns: &'static str, value: String },
    #[error("Invalid float format in columns {columns} (value: '{value}')")]
    InvalidFloat { columns: &'static str, value: String },
    #[error("Line is too short for an atom record (must be at least {MIN_RECORD_LENGTH} chars)")]
    LineTooShort,
}

/// Options controlling which records the reader keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Keep `HETATM` records in addition to `ATOM` records.
    pub include_hetatm: bool,
}

fn column(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end.min(line.len())).unwrap_or("")
}

fn column_char(line: &str, index: usize) -> char {
    line.get(index..index + 1)
        .and_then(|s| s.chars().next())
        .unwrap_or(' ')
}

fn parse_float(
    line: &str,
    line_num: usize,
    start: usize,
    end: usize,
    columns: &'static str,
    default: Option<f64>,
) -> Result<f64, PdbError> {
    let raw = column(line, start, end).trim();
    if raw.is_empty() {
        if let Some(value) = default {
            return Ok(value);
        }
    }
    raw.parse().map_err(|_| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidFloat {
            columns,
            value: raw.into(),
        },
    })
}

fn parse_int<T: std::str::FromStr>(
    line: &str,
    line_num: usize,
    start: usize,
    end: usize,
    columns: &'static str,
) -> Result<T, PdbError> {
    let raw = column(line, start, end).trim();
    raw.parse().map_err(|_| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidInt {
            columns,
            value: raw.into(),
        },
    })
}

/// Parses one atom record. `line_num` is 1-based and only used for error reporting.
pub fn parse_atom_record(line: &str, line_num: usize) -> Result<Atom, PdbError> {
    if line.len() < MIN_RECORD_LENGTH {
        return Err(PdbError::Parse {
            line: line_num,
            kind: PdbParseErrorKind::LineTooShort,
        });
    }
    let record = column(line, 0, 6)
        .parse::<RecordKind>()
        .unwrap_or_default();
    let serial = parse_int(line, line_num, 6, 11, "7-11")?;
    let name_field = column(line, 12, 16);
    let residue_number = parse_int(line, line_num, 22, 26, "23-26")?;
    let x = parse_float(line, line_num, 30, 38, "31-38", None)?;
    let y = parse_float(line, line_num, 38, 46, "39-46", None)?;
    let z = parse_float(line, line_num, 46, 54, "47-54", None)?;
    let occupancy = parse_float(line, line_num, 54, 60, "55-60", Some(1.0))?;
    let temperature_factor = parse_float(line, line_num, 60, 66, "61-66", Some(0.0))?;

    Ok(Atom {
        record,
        serial,
        name: name_field.trim().to_string(),
        alt_loc: column_char(line, 16),
        residue_name: column(line, 17, 20).trim().to_string(),
        chain_id: column_char(line, 21),
        residue_number,
        insertion_code: column_char(line, 26),
        position: Point3::new(x, y, z),
        occupancy,
        temperature_factor,
        name_field: (name_field.len() == 4).then(|| name_field.to_string()),
        trailer: line.get(TRAILER_START..).unwrap_or("").to_string(),
    })
}

/// Parses atom records out of arbitrary text lines, ignoring every other record type.
pub fn parse_records<I, S>(lines: I, options: &ReadOptions) -> Result<Structure, PdbError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut atoms = Vec::new();
    for (idx, line) in lines.into_iter().enumerate() {
        let line = line.as_ref();
        let keep = match column(line, 0, 6).parse::<RecordKind>() {
            Ok(RecordKind::Atom) => true,
            Ok(RecordKind::Hetatm) => options.include_hetatm,
            Err(()) => false,
        };
        if keep {
            atoms.push(parse_atom_record(line, idx + 1)?);
        }
    }
    if atoms.is_empty() {
        return Err(PdbError::MissingRecord("ATOM records".into()));
    }
    Ok(Structure::new(atoms))
}

/// Formats one atom as a fixed-column record.
pub fn format_record(atom: &Atom) -> String {
    let name = match &atom.name_field {
        Some(raw) if raw.trim() == atom.name => raw.clone(),
        _ => format!("{:^4.4}", atom.name),
    };
    format!(
        "{}{:>5} {}{}{:>3} {}{:>4}{}   {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}{}",
        atom.record.tag(),
        atom.serial,
        name,
        atom.alt_loc,
        atom.residue_name,
        atom.chain_id,
        atom.residue_number,
        atom.insertion_code,
        atom.position.x,
        atom.position.y,
        atom.position.z,
        atom.occupancy,
        atom.temperature_factor,
        atom.trailer,
    )
}

/// Re-emits atoms as fixed-column records, one string per atom.
pub fn serialize(atoms: &[Atom]) -> Vec<String> {
    atoms.iter().map(format_record).collect()
}

/// Loads the atom records of a structure file.
pub fn load<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<Structure, PdbError> {
    let content = std::fs::read_to_string(path)?;
    parse_records(content.lines(), options)
}

pub struct PdbFile;

impl StructureFile for PdbFile {
    type Error = PdbError;

    fn read_from(reader: &mut impl BufRead) -> Result<Structure, Self::Error> {
        let lines = reader.lines().collect::<Result<Vec<_>, _>>()?;
        parse_records(&lines, &ReadOptions::default())
    }

    fn write_to(structure: &Structure, writer: &mut impl Write) -> Result<(), Self::Error> {
        for atom in structure.atoms() {
            writeln!(writer, "{}", format_record(atom))?;
        }
        Ok(())
    }
}
