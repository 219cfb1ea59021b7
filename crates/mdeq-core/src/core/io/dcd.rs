//! CHARMM/NAMD-style DCD trajectories.
//!
//! All values are little-endian. The header records the number of frames and
//! the step of the last frame; both are patched in place each time a frame is
//! appended, so a trajectory is readable even if the run stops early.

use crate::core::models::cell::BoxVectors;
use crate::core::units::{AKMA_TIME_PS, ANGSTROM_PER_NM};
use nalgebra::Vector3;
use std::io::{self, Read, Seek, SeekFrom, Write};
use thiserror::Error;

const HEADER_RECORD: i32 = 84;
const TITLE_RECORD: i32 = 164;
const CHARMM_VERSION: i32 = 24;
const CELL_RECORD: i32 = 48;
const NFRAMES_OFFSET: u64 = 8;
const LAST_STEP_OFFSET: u64 = 20;

#[derive(Debug, Error)]
pub enum DcdError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Frame has {actual} atoms, trajectory has {expected}")]
    AtomCountMismatch { expected: usize, actual: usize },
    #[error("Periodic trajectory frame is missing box vectors")]
    MissingBox,
    #[error("Malformed DCD file: {0}")]
    Malformed(String),
}

fn write_i32(writer: &mut impl Write, value: i32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn write_f32(writer: &mut impl Write, value: f32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn write_f64(writer: &mut impl Write, value: f64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn title(text: &str) -> [u8; 80] {
    let mut buf = [b' '; 80];
    for (dst, src) in buf.iter_mut().zip(text.bytes()) {
        *dst = src;
    }
    buf
}

/// Appends frames to a DCD trajectory.
pub struct DcdWriter<W: Write + Seek> {
    writer: W,
    atom_count: usize,
    first_step: i32,
    interval: i32,
    periodic: bool,
    frames: usize,
}

impl<W: Write + Seek> DcdWriter<W> {
    /// Writes the DCD header and returns a writer positioned for the first frame.
    ///
    /// # Arguments
    ///
    /// * `writer` - Destination, usually a freshly created file.
    /// * `atom_count` - Number of atoms in every frame.
    /// * `first_step` - Step number of the first frame.
    /// * `interval` - Steps between frames.
    /// * `step_size_ps` - Integration time step, stored in AKMA units.
    /// * `periodic` - Whether frames carry a unit-cell record.
    pub fn new(
        mut writer: W,
        atom_count: usize,
        first_step: u64,
        interval: u64,
        step_size_ps: f64,
        periodic: bool,
    ) -> Result<Self, DcdError> {
        let first_step = i32::try_from(first_step)
            .map_err(|_| DcdError::Malformed(format!("first step {} out of range", first_step)))?;
        let interval = i32::try_from(interval)
            .map_err(|_| DcdError::Malformed(format!("interval {} out of range", interval)))?;
        let natoms = i32::try_from(atom_count)
            .map_err(|_| DcdError::Malformed(format!("atom count {} out of range", atom_count)))?;

        write_i32(&mut writer, HEADER_RECORD)?;
        writer.write_all(b"CORD")?;
        for value in [0, first_step, interval, 0, 0, 0, 0, 0, 0] {
            write_i32(&mut writer, value)?;
        }
        write_f32(&mut writer, (step_size_ps / AKMA_TIME_PS) as f32)?;
        let box_flag = i32::from(periodic);
        for value in [box_flag, 0, 0, 0, 0, 0, 0, 0, 0, CHARMM_VERSION] {
            write_i32(&mut writer, value)?;
        }
        write_i32(&mut writer, HEADER_RECORD)?;

        write_i32(&mut writer, TITLE_RECORD)?;
        write_i32(&mut writer, 2)?;
        writer.write_all(&title(&format!("Created by mdeq {}", env!("CARGO_PKG_VERSION"))))?;
        writer.write_all(&title(&format!(
            "Created {}",
            chrono::Local::now().format("%a %b %e %H:%M:%S %Y")
        )))?;
        write_i32(&mut writer, TITLE_RECORD)?;

        write_i32(&mut writer, 4)?;
        write_i32(&mut writer, natoms)?;
        write_i32(&mut writer, 4)?;
        writer.flush()?;

        Ok(Self {
            writer,
            atom_count,
            first_step,
            interval,
            periodic,
            frames: 0,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    /// Appends one frame (positions in nm) and updates the header counters.
    pub fn write_frame(
        &mut self,
        positions: &[Vector3<f64>],
        box_vectors: Option<&BoxVectors>,
    ) -> Result<(), DcdError> {
        if positions.len() != self.atom_count {
            return Err(DcdError::AtomCountMismatch {
                expected: self.atom_count,
                actual: positions.len(),
            });
        }
        self.frames += 1;
        let frames = self.frames as i32;
        self.writer.seek(SeekFrom::Start(NFRAMES_OFFSET))?;
        write_i32(&mut self.writer, frames)?;
        self.writer.seek(SeekFrom::Start(LAST_STEP_OFFSET))?;
        write_i32(
            &mut self.writer,
            self.first_step + (frames - 1) * self.interval,
        )?;
        self.writer.seek(SeekFrom::End(0))?;

        if self.periodic {
            let cell = box_vectors.ok_or(DcdError::MissingBox)?;
            let l = cell.lengths * ANGSTROM_PER_NM;
            write_i32(&mut self.writer, CELL_RECORD)?;
            for value in [l.x, 90.0, l.y, 90.0, 90.0, l.z] {
                write_f64(&mut self.writer, value)?;
            }
            write_i32(&mut self.writer, CELL_RECORD)?;
        }

        let block = (4 * self.atom_count) as i32;
        for axis in 0..3 {
            write_i32(&mut self.writer, block)?;
            for p in positions {
                write_f32(&mut self.writer, (p[axis] * ANGSTROM_PER_NM) as f32)?;
            }
            write_i32(&mut self.writer, block)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DcdFrame {
    /// Positions in nm.
    pub positions: Vec<Vector3<f64>>,
    pub box_vectors: Option<BoxVectors>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DcdTrajectory {
    pub atom_count: usize,
    pub first_step: i32,
    pub interval: i32,
    pub last_step: i32,
    pub step_size_ps: f64,
    pub frames: Vec<DcdFrame>,
}

/// Reads trajectories written by [`DcdWriter`].
pub struct DcdReader;

impl DcdReader {
    pub fn read(reader: &mut impl Read) -> Result<DcdTrajectory, DcdError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let mut cursor = ByteCursor {
            bytes: &bytes,
            offset: 0,
        };

        cursor.expect_i32(HEADER_RECORD, "header record length")?;
        if cursor.take(4)? != b"CORD" {
            return Err(DcdError::Malformed("missing CORD signature".into()));
        }
        let mut ints = [0i32; 9];
        for value in ints.iter_mut() {
            *value = cursor.i32()?;
        }
        let step_size_ps = f64::from(cursor.f32()?) * AKMA_TIME_PS;
        let box_flag = cursor.i32()?;
        cursor.take(4 * 9)?;
        cursor.expect_i32(HEADER_RECORD, "header record terminator")?;

        let title_len = cursor.i32()?;
        cursor.take(usize::try_from(title_len).map_err(|_| bad("title length"))?)?;
        cursor.expect_i32(title_len, "title record terminator")?;

        cursor.expect_i32(4, "atom count record")?;
        let atom_count = usize::try_from(cursor.i32()?).map_err(|_| bad("atom count"))?;
        cursor.expect_i32(4, "atom count record terminator")?;

        let frame_count = usize::try_from(ints[0]).map_err(|_| bad("frame count"))?;
        let mut frames = Vec::with_capacity(frame_count);
        for _ in 0..frame_count {
            let box_vectors = if box_flag != 0 {
                cursor.expect_i32(CELL_RECORD, "unit cell record")?;
                let mut cell = [0f64; 6];
                for value in cell.iter_mut() {
                    *value = cursor.f64()?;
                }
                cursor.expect_i32(CELL_RECORD, "unit cell record terminator")?;
                Some(BoxVectors::new(
                    cell[0] / ANGSTROM_PER_NM,
                    cell[2] / ANGSTROM_PER_NM,
                    cell[5] / ANGSTROM_PER_NM,
                ))
            } else {
                None
            };
            let mut positions = vec![Vector3::zeros(); atom_count];
            for axis in 0..3 {
                cursor.expect_i32((4 * atom_count) as i32, "coordinate block")?;
                for p in positions.iter_mut() {
                    p[axis] = f64::from(cursor.f32()?) / ANGSTROM_PER_NM;
                }
                cursor.expect_i32((4 * atom_count) as i32, "coordinate block terminator")?;
            }
            frames.push(DcdFrame {
                positions,
                box_vectors,
            });
        }

        Ok(DcdTrajectory {
            atom_count,
            first_step: ints[1],
            interval: ints[2],
            last_step: ints[3],
            step_size_ps,
            frames,
        })
    }
}

fn bad(what: &str) -> DcdError {
    DcdError::Malformed(format!("invalid {}", what))
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DcdError> {
        let end = self.offset + n;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or_else(|| DcdError::Malformed("unexpected end of file".into()))?;
        self.offset = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DcdError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn i32(&mut self) -> Result<i32, DcdError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32, DcdError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64, DcdError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn expect_i32(&mut self, expected: i32, what: &str) -> Result<(), DcdError> {
        let found = self.i32()?;
        if found != expected {
            return Err(DcdError::Malformed(format!(
                "{}: expected {}, found {}",
                what, expected, found
            )));
        }
        Ok(())
    }
}
