use crate::core::elements;
use crate::core::io::traits::StructureFile;
use crate::core::models::cell::BoxVectors;
use crate::core::models::system::{MolecularSystem, MolecularSystemBuilder, TopologyError};
use crate::core::units::ANGSTROM_PER_NM;
use nalgebra::Vector3;
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdbMetadata {
    /// Text of the REMARK records, without the record name.
    pub remarks: Vec<String>,
}

#[derive(Debug, Error)]
pub enum PdbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse {
        line: usize,
        kind: PdbParseErrorKind,
    },
    #[error("Invalid topology: {0}")]
    Topology(#[from] TopologyError),
    #[error("Missing required record: {0}")]
    MissingRecord(String),
    #[error("Atom count mismatch: structure has {expected} atoms, got {actual} positions")]
    PositionCountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum PdbParseErrorKind {
    #[error("Invalid integer format in columns {columns} (value: '{value}')")]
    InvalidInt { columns: String, value: String },
    #[error("Invalid float format in columns {columns} (value: '{value}')")]
    InvalidFloat { columns: String, value: String },
    #[error("Required field in columns {columns} is empty")]
    MissingRequiredField { columns: String },
    #[error("Only rectangular cells are supported (angles {alpha}, {beta}, {gamma})")]
    TriclinicCell { alpha: f64, beta: f64, gamma: f64 },
}

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    line.get(start..end).unwrap_or("").trim()
}

fn parse_float(line: &str, line_num: usize, start: usize, end: usize) -> Result<f64, PdbError> {
    let value = slice_and_trim(line, start, end);
    value.parse().map_err(|_| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidFloat {
            columns: format!("{}-{}", start + 1, end),
            value: value.into(),
        },
    })
}

fn parse_int<T: std::str::FromStr>(
    line: &str,
    line_num: usize,
    start: usize,
    end: usize,
) -> Result<T, PdbError> {
    let value = slice_and_trim(line, start, end);
    if value.is_empty() {
        return Err(PdbError::Parse {
            line: line_num,
            kind: PdbParseErrorKind::MissingRequiredField {
                columns: format!("{}-{}", start + 1, end),
            },
        });
    }
    value.parse().map_err(|_| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidInt {
            columns: format!("{}-{}", start + 1, end),
            value: value.into(),
        },
    })
}

fn parse_cryst1(line: &str, line_num: usize) -> Result<BoxVectors, PdbError> {
    let a = parse_float(line, line_num, 6, 15)?;
    let b = parse_float(line, line_num, 15, 24)?;
    let c = parse_float(line, line_num, 24, 33)?;
    let angle = |start, end| -> Result<f64, PdbError> {
        if slice_and_trim(line, start, end).is_empty() {
            Ok(90.0)
        } else {
            parse_float(line, line_num, start, end)
        }
    };
    let (alpha, beta, gamma) = (angle(33, 40)?, angle(40, 47)?, angle(47, 54)?);
    if [alpha, beta, gamma].iter().any(|x| (x - 90.0).abs() > 1e-3) {
        return Err(PdbError::Parse {
            line: line_num,
            kind: PdbParseErrorKind::TriclinicCell { alpha, beta, gamma },
        });
    }
    Ok(BoxVectors::new(
        a / ANGSTROM_PER_NM,
        b / ANGSTROM_PER_NM,
        c / ANGSTROM_PER_NM,
    ))
}

/// Protein Data Bank format, restricted to what a liquid simulation needs:
/// a rectangular `CRYST1` cell, `ATOM`/`HETATM` coordinates and `CONECT` bonds.
pub struct PdbFile;

impl StructureFile for PdbFile {
    type Metadata = PdbMetadata;
    type Error = PdbError;

    fn read_from(
        reader: &mut impl BufRead,
    ) -> Result<(MolecularSystem, Self::Metadata), Self::Error> {
        let mut builder = MolecularSystemBuilder::new();
        let mut metadata = PdbMetadata::default();
        let mut atom_count = 0usize;

        let mut current_chain: Option<char> = None;
        let mut current_residue: Option<(isize, String)> = None;

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;
            let record_type = slice_and_trim(&line, 0, 6);

            match record_type {
                "ATOM" | "HETATM" => {
                    let serial: usize = parse_int(&line, line_num, 6, 11)?;
                    let name = slice_and_trim(&line, 12, 16);
                    if name.is_empty() {
                        return Err(PdbError::Parse {
                            line: line_num,
                            kind: PdbParseErrorKind::MissingRequiredField {
                                columns: "13-16".into(),
                            },
                        });
                    }
                    let res_name = slice_and_trim(&line, 17, 21);
                    let chain_id = slice_and_trim(&line, 21, 22).chars().next().unwrap_or('A');
                    let res_seq: isize = parse_int(&line, line_num, 22, 26)?;
                    let x = parse_float(&line, line_num, 30, 38)?;
                    let y = parse_float(&line, line_num, 38, 46)?;
                    let z = parse_float(&line, line_num, 46, 54)?;

                    let element_field = slice_and_trim(&line, 76, 78);
                    let element = if elements::is_known(element_field) {
                        elements::normalize_symbol(element_field)
                    } else {
                        elements::guess_from_atom_name(name).unwrap_or_default()
                    };

                    if current_chain != Some(chain_id) {
                        builder.start_chain(chain_id);
                        current_chain = Some(chain_id);
                        current_residue = None;
                    }
                    let residue_key = (res_seq, res_name.to_string());
                    if current_residue.as_ref() != Some(&residue_key) {
                        builder.start_residue(res_seq, res_name, record_type == "HETATM")?;
                        current_residue = Some(residue_key);
                    }
                    builder.add_atom(
                        serial,
                        name,
                        &element,
                        Vector3::new(x, y, z) / ANGSTROM_PER_NM,
                    )?;
                    atom_count += 1;
                }
                "CONECT" => {
                    let from: usize = parse_int(&line, line_num, 6, 11)?;
                    let mut start = 11;
                    while start < 31 {
                        let field = slice_and_trim(&line, start, start + 5);
                        if field.is_empty() {
                            break;
                        }
                        let to: usize = parse_int(&line, line_num, start, start + 5)?;
                        if to != from {
                            builder.add_bond(from, to);
                        }
                        start += 5;
                    }
                }
                "CRYST1" => {
                    builder.box_vectors(parse_cryst1(&line, line_num)?);
                }
                "REMARK" => {
                    metadata
                        .remarks
                        .push(line.get(6..).unwrap_or("").trim_end().to_string());
                }
                "TER" => {
                    current_residue = None;
                    current_chain = None;
                }
                "ENDMDL" | "END" => break,
                _ => {}
            }
        }

        if atom_count == 0 {
            return Err(PdbError::MissingRecord("ATOM/HETATM records".into()));
        }
        Ok((builder.build()?, metadata))
    }

    fn write_to(
        system: &MolecularSystem,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        Self::write_header(system.box_vectors(), &metadata.remarks, writer)?;
        let serials = Self::write_atoms(system, &system.positions(), writer)?;
        Self::write_footer(system, &serials, writer)
    }

    fn write_system_to(
        system: &MolecularSystem,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        let metadata = PdbMetadata {
            remarks: vec![format!(
                "   1 CREATED WITH MDEQ {}, {}",
                env!("CARGO_PKG_VERSION"),
                chrono::Local::now().format("%Y-%m-%d")
            )],
        };
        Self::write_to(system, &metadata, writer)
    }
}

impl PdbFile {
    /// Writes the REMARK records and, for periodic structures, the CRYST1 record.
    pub fn write_header(
        box_vectors: Option<&BoxVectors>,
        remarks: &[String],
        writer: &mut impl Write,
    ) -> Result<(), PdbError> {
        for remark in remarks {
            writeln!(writer, "REMARK{}", remark)?;
        }
        if let Some(cell) = box_vectors {
            let l = cell.lengths * ANGSTROM_PER_NM;
            writeln!(
                writer,
                "CRYST1{:9.3}{:9.3}{:9.3}{:7.2}{:7.2}{:7.2} P 1           1 ",
                l.x, l.y, l.z, 90.0, 90.0, 90.0
            )?;
        }
        Ok(())
    }

    /// Writes one `MODEL`/`ENDMDL` frame of a multi-model file and returns
    /// the atom serials like [`Self::write_atoms`].
    pub fn write_model(
        system: &MolecularSystem,
        positions: &[Vector3<f64>],
        model_number: usize,
        writer: &mut impl Write,
    ) -> Result<Vec<usize>, PdbError> {
        writeln!(writer, "MODEL     {:>4}", model_number)?;
        let serials = Self::write_atoms(system, positions, writer)?;
        writeln!(writer, "ENDMDL")?;
        Ok(serials)
    }

    /// Writes ATOM/HETATM records with a TER record after each chain.
    ///
    /// Returns the serial number written for every atom, indexed by atom index,
    /// for use by [`Self::write_footer`].
    pub fn write_atoms(
        system: &MolecularSystem,
        positions: &[Vector3<f64>],
        writer: &mut impl Write,
    ) -> Result<Vec<usize>, PdbError> {
        if positions.len() != system.atom_count() {
            return Err(PdbError::PositionCountMismatch {
                expected: system.atom_count(),
                actual: positions.len(),
            });
        }
        let mut serials = vec![0; system.atom_count()];
        let mut serial = 1usize;
        for (_, chain) in system.chains() {
            let mut last = None;
            for &residue_id in chain.residues() {
                let Some(residue) = system.residue(residue_id) else {
                    continue;
                };
                let record = if residue.hetero { "HETATM" } else { "ATOM" };
                let res_name: String = format!("{:>3}", residue.name).chars().take(4).collect();
                for &atom_index in residue.atoms() {
                    let Some(atom) = system.atom(atom_index) else {
                        continue;
                    };
                    let name = if atom.name.len() < 4 {
                        format!(" {}", atom.name)
                    } else {
                        atom.name.chars().take(4).collect()
                    };
                    let p = positions[atom_index] * ANGSTROM_PER_NM;
                    writeln!(
                        writer,
                        "{:<6}{:>5} {:<4} {:<4}{}{:>4}    {:>8.3}{:>8.3}{:>8.3}  1.00  0.00          {:>2}  ",
                        record,
                        serial % 100_000,
                        name,
                        res_name,
                        chain.id,
                        residue.number % 10_000,
                        p.x,
                        p.y,
                        p.z,
                        atom.element
                    )?;
                    serials[atom_index] = serial;
                    serial += 1;
                }
                last = Some((res_name, residue.number));
            }
            if let Some((res_name, number)) = last {
                writeln!(
                    writer,
                    "TER   {:>5}      {:<4}{}{:>4}",
                    serial % 100_000,
                    res_name,
                    chain.id,
                    number % 10_000
                )?;
                serial += 1;
            }
        }
        Ok(serials)
    }

    /// Writes one CONECT record per bonded atom (at most four partners per
    /// line) followed by END.
    pub fn write_footer(
        system: &MolecularSystem,
        serials: &[usize],
        writer: &mut impl Write,
    ) -> Result<(), PdbError> {
        let mut connections: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for bond in system.bonds() {
            let (s1, s2) = (serials[bond.atom1], serials[bond.atom2]);
            connections.entry(s1).or_default().push(s2);
            connections.entry(s2).or_default().push(s1);
        }
        for (serial, mut partners) in connections {
            partners.sort_unstable();
            for chunk in partners.chunks(4) {
                write!(writer, "CONECT{:>5}", serial)?;
                for partner in chunk {
                    write!(writer, "{:>5}", partner)?;
                }
                writeln!(writer)?;
            }
        }
        writeln!(writer, "END")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TWO_MOLECULES: &str = "\
REMARK   test structure
CRYST1   30.000   30.000   30.000  90.00  90.00  90.00 P 1           1
HETATM    1  C1  MOL A   1       1.000   2.000   3.000  1.00  0.00           C
HETATM    2  C2  MOL A   1       2.500   2.000   3.000  1.00  0.00           C
HETATM    3  O1  MOL A   1       3.500   2.000   3.000  1.00  0.00           O
HETATM    4  H1  MOL A   1       4.445   2.000   3.000  1.00  0.00           H
HETATM    5  C1  MOL A   2      11.000   2.000   3.000  1.00  0.00           C
HETATM    6  C2  MOL A   2      12.500   2.000   3.000  1.00  0.00           C
HETATM    7  O1  MOL A   2      13.500   2.000   3.000  1.00  0.00           O
HETATM    8  H1  MOL A   2      14.445   2.000   3.000  1.00  0.00
CONECT    1    2
CONECT    2    1    3
CONECT    3    2    4
CONECT    5    6
CONECT    6    7
CONECT    7    8
END
";

    fn read(text: &str) -> Result<(MolecularSystem, PdbMetadata), PdbError> {
        PdbFile::read_from(&mut Cursor::new(text))
    }

    #[test]
    fn reads_atoms_residues_bonds_and_cell() {
        let (system, metadata) = read(TWO_MOLECULES).unwrap();
        assert_eq!(system.atom_count(), 8);
        assert_eq!(system.residue_count(), 2);
        assert_eq!(system.bond_count(), 6);
        assert_eq!(system.box_vectors(), Some(&BoxVectors::new(3.0, 3.0, 3.0)));
        assert_eq!(metadata.remarks, vec!["   test structure".to_string()]);
        let first = system.atom(0).unwrap();
        assert!((first.position - Vector3::new(0.1, 0.2, 0.3)).norm() < 1e-12);
        assert_eq!(first.element, "C");
    }

    #[test]
    fn missing_element_column_falls_back_to_atom_name() {
        let (system, _) = read(TWO_MOLECULES).unwrap();
        assert_eq!(system.atom(7).unwrap().element, "H");
    }

    #[test]
    fn triclinic_cell_is_rejected() {
        let text = "CRYST1   30.000   30.000   30.000  90.00 120.00  90.00 P 1           1\n";
        let err = read(text).unwrap_err();
        assert!(matches!(
            err,
            PdbError::Parse {
                line: 1,
                kind: PdbParseErrorKind::TriclinicCell { .. }
            }
        ));
    }

    #[test]
    fn bad_coordinate_reports_line_number() {
        let text = "\
HETATM    1  C1  MOL A   1       1.000   2.000   3.000  1.00  0.00           C
HETATM    2  C2  MOL A   1       x.xxx   2.000   3.000  1.00  0.00           C
";
        let err = read(text).unwrap_err();
        assert!(matches!(err, PdbError::Parse { line: 2, .. }));
    }

    #[test]
    fn empty_file_is_missing_atoms() {
        assert!(matches!(read("END\n"), Err(PdbError::MissingRecord(_))));
    }

    #[test]
    fn conect_to_unknown_atom_is_an_error() {
        let text = "\
HETATM    1  C1  MOL A   1       1.000   2.000   3.000  1.00  0.00           C
CONECT    1    9
";
        assert!(matches!(
            read(text),
            Err(PdbError::Topology(TopologyError::UnknownSerial(9)))
        ));
    }

    #[test]
    fn written_structure_reads_back_identically() {
        let (system, metadata) = read(TWO_MOLECULES).unwrap();
        let mut out = Vec::new();
        PdbFile::write_to(&system, &metadata, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains(
            "CRYST1   30.000   30.000   30.000  90.00  90.00  90.00 P 1           1"
        ));
        assert!(text.contains("TER"));
        assert!(text.trim_end().ends_with("END"));

        let (reread, _) = read(&text).unwrap();
        assert_eq!(reread.atom_count(), system.atom_count());
        assert_eq!(reread.bond_count(), system.bond_count());
        assert_eq!(reread.residue_count(), system.residue_count());
        for (a, b) in reread.atoms().iter().zip(system.atoms()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.element, b.element);
            assert!((a.position - b.position).norm() < 1e-4);
        }
    }

    #[test]
    fn atom_lines_use_fixed_columns() {
        let (system, _) = read(TWO_MOLECULES).unwrap();
        let mut out = Vec::new();
        PdbFile::write_atoms(&system, &system.positions(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let first = text.lines().next().unwrap();
        assert_eq!(&first[0..6], "HETATM");
        assert_eq!(&first[12..16], " C1 ");
        assert_eq!(&first[17..20], "MOL");
        assert_eq!(&first[30..38], "   1.000");
        assert_eq!(first[76..78].trim(), "C");
    }

    #[test]
    fn model_frames_are_wrapped_in_model_records() {
        let (system, _) = read(TWO_MOLECULES).unwrap();
        let mut out = Vec::new();
        PdbFile::write_model(&system, &system.positions(), 3, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("MODEL        3"));
        assert!(text.trim_end().ends_with("ENDMDL"));
    }
}
