use super::error::EngineError;
use super::serialization::StateFile;
use super::state::{State, StateRequest};
use crate::core::forcefield::model::InteractionModel;
use crate::core::io::dcd::DcdWriter;
use crate::core::io::pdb::PdbFile;
use crate::core::models::system::MolecularSystem;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::debug;

/// Read-only view of a simulation handed to reporters.
pub struct ReportView<'a> {
    pub structure: &'a MolecularSystem,
    pub model: &'a InteractionModel,
    pub degrees_of_freedom: usize,
    /// Integration step size in ps.
    pub step_size: f64,
}

/// Periodic output attached to a [`Simulation`](super::simulation::Simulation).
pub trait Reporter: Send {
    /// Steps between reports.
    fn interval(&self) -> u64;

    /// The state fields this reporter reads.
    fn needs(&self) -> StateRequest;

    fn report(&mut self, view: &ReportView<'_>, state: &State) -> Result<(), EngineError>;

    /// Called once after the last step; flushes and closes outputs.
    fn finish(&mut self, _view: &ReportView<'_>) -> Result<(), EngineError> {
        Ok(())
    }
}

/// A clonable handle to a writer shared between the log and reporters.
#[derive(Clone)]
pub struct SharedWriter(Arc<Mutex<Box<dyn Write + Send>>>);

impl SharedWriter {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self(Arc::new(Mutex::new(Box::new(writer))))
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

fn poisoned<T>(_: PoisonError<T>) -> io::Error {
    io::Error::other("writer lock poisoned")
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().map_err(poisoned)?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().map_err(poisoned)?.flush()
    }
}

/// An in-memory writer whose contents can be read back from any clone.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        match self.0.lock() {
            Ok(buffer) => String::from_utf8_lossy(&buffer).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().map_err(poisoned)?.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> EngineError + '_ {
    move |source| EngineError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn create(path: &Path) -> Result<BufWriter<File>, EngineError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(io_error(path))
}

/// Formats like Python's `str(float)`: shortest round-trip digits, always
/// with a decimal point.
pub(crate) fn python_float(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}

/// Formats `value` with `digits` significant digits like C's `%g`.
fn significant(value: f64, digits: usize) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{value}");
    }
    let exponent = value.abs().log10().floor() as i32;
    let digits = digits.max(1) as i32;
    if exponent < -4 || exponent >= digits {
        let text = format!("{:.*e}", (digits - 1) as usize, value);
        let (mantissa, exp) = text.split_once('e').unwrap_or((text.as_str(), "0"));
        let exp: i32 = exp.parse().unwrap_or(0);
        let mantissa = trim_zeros(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    } else {
        let decimals = (digits - 1 - exponent).max(0) as usize;
        trim_zeros(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// Writes a tab-separated table of step, energies, temperature, density and
/// simulation speed.
pub struct StateDataReporter {
    out: SharedWriter,
    interval: u64,
    wrote_header: bool,
    last: Option<(Instant, u64)>,
}

impl StateDataReporter {
    pub const HEADER: &'static str = "#\"Step\"\t\"Potential Energy (kJ/mole)\"\t\"Total Energy (kJ/mole)\"\t\"Temperature (K)\"\t\"Density (g/mL)\"\t\"Speed (ns/day)\"";

    pub fn new(out: SharedWriter, interval: u64) -> Self {
        Self {
            out,
            interval,
            wrote_header: false,
            last: None,
        }
    }

    fn speed(&mut self, step: u64, step_size: f64) -> String {
        let now = Instant::now();
        let speed = match self.last {
            Some((then, last_step)) if step > last_step => {
                let elapsed_days = now.duration_since(then).as_secs_f64() / 86_400.0;
                let simulated_ns = (step - last_step) as f64 * step_size / 1000.0;
                if elapsed_days > 0.0 {
                    significant(simulated_ns / elapsed_days, 3)
                } else {
                    "--".to_string()
                }
            }
            _ => "--".to_string(),
        };
        self.last = Some((now, step));
        speed
    }
}

impl Reporter for StateDataReporter {
    fn interval(&self) -> u64 {
        self.interval
    }

    fn needs(&self) -> StateRequest {
        StateRequest::new().with_energy()
    }

    fn report(&mut self, view: &ReportView<'_>, state: &State) -> Result<(), EngineError> {
        let stdout_error = |source| EngineError::Io {
            path: "<report>".to_string(),
            source,
        };
        if !self.wrote_header {
            writeln!(self.out, "{}", Self::HEADER).map_err(stdout_error)?;
            self.wrote_header = true;
        }
        let missing = || EngineError::MissingStateData("energies");
        let potential = state.potential_energy.ok_or_else(missing)?;
        let total = state.total_energy().ok_or_else(missing)?;
        let temperature = state
            .temperature(view.degrees_of_freedom)
            .map(python_float)
            .unwrap_or_else(|| "--".to_string());
        let density = state
            .density(view.model.total_mass())
            .map(python_float)
            .unwrap_or_else(|| "--".to_string());
        let speed = self.speed(state.step_count, view.step_size);
        writeln!(
            self.out,
            "{}\t{}\t{}\t{}\t{}\t{}",
            state.step_count,
            python_float(potential),
            python_float(total),
            temperature,
            density,
            speed
        )
        .map_err(stdout_error)?;
        self.out.flush().map_err(stdout_error)
    }
}

/// Appends frames to a DCD file, created at the first report.
pub struct DcdReporter {
    path: PathBuf,
    interval: u64,
    writer: Option<DcdWriter<BufWriter<File>>>,
}

impl DcdReporter {
    pub fn new(path: impl Into<PathBuf>, interval: u64) -> Self {
        Self {
            path: path.into(),
            interval,
            writer: None,
        }
    }
}

impl Reporter for DcdReporter {
    fn interval(&self) -> u64 {
        self.interval
    }

    fn needs(&self) -> StateRequest {
        StateRequest::new().with_positions()
    }

    fn report(&mut self, view: &ReportView<'_>, state: &State) -> Result<(), EngineError> {
        let positions = state
            .positions
            .as_deref()
            .ok_or(EngineError::MissingStateData("positions"))?;
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => {
                let file = create(&self.path)?;
                debug!(path = %self.path.display(), "Opened DCD trajectory");
                DcdWriter::new(
                    file,
                    positions.len(),
                    state.step_count,
                    self.interval,
                    view.step_size,
                    state.box_vectors.is_some(),
                )?
            }
        };
        let writer = self.writer.insert(writer);
        writer.write_frame(positions, state.box_vectors.as_ref())?;
        Ok(())
    }

    fn finish(&mut self, _view: &ReportView<'_>) -> Result<(), EngineError> {
        if let Some(writer) = self.writer.take() {
            writer.into_inner().flush().map_err(io_error(&self.path))?;
        }
        Ok(())
    }
}

/// Writes successive `MODEL` frames to a PDB file.
pub struct PdbReporter {
    path: PathBuf,
    interval: u64,
    out: Option<BufWriter<File>>,
    models: usize,
    serials: Vec<usize>,
}

impl PdbReporter {
    pub fn new(path: impl Into<PathBuf>, interval: u64) -> Self {
        Self {
            path: path.into(),
            interval,
            out: None,
            models: 0,
            serials: Vec::new(),
        }
    }
}

impl Reporter for PdbReporter {
    fn interval(&self) -> u64 {
        self.interval
    }

    fn needs(&self) -> StateRequest {
        StateRequest::new().with_positions()
    }

    fn report(&mut self, view: &ReportView<'_>, state: &State) -> Result<(), EngineError> {
        let positions = state
            .positions
            .as_deref()
            .ok_or(EngineError::MissingStateData("positions"))?;
        let out = match self.out.take() {
            Some(out) => out,
            None => {
                let mut out = create(&self.path)?;
                PdbFile::write_header(state.box_vectors.as_ref(), &[], &mut out)?;
                out
            }
        };
        let out = self.out.insert(out);
        self.models += 1;
        self.serials = PdbFile::write_model(view.structure, positions, self.models, &mut *out)?;
        out.flush().map_err(io_error(&self.path))
    }

    fn finish(&mut self, view: &ReportView<'_>) -> Result<(), EngineError> {
        if let Some(mut out) = self.out.take() {
            PdbFile::write_footer(view.structure, &self.serials, &mut out)?;
            out.flush().map_err(io_error(&self.path))?;
        }
        Ok(())
    }
}

/// Overwrites a state file with the full simulation state at every report.
pub struct CheckpointReporter {
    path: PathBuf,
    interval: u64,
}

impl CheckpointReporter {
    pub fn new(path: impl Into<PathBuf>, interval: u64) -> Self {
        Self {
            path: path.into(),
            interval,
        }
    }
}

impl Reporter for CheckpointReporter {
    fn interval(&self) -> u64 {
        self.interval
    }

    fn needs(&self) -> StateRequest {
        StateRequest::everything()
    }

    fn report(&mut self, _view: &ReportView<'_>, state: &State) -> Result<(), EngineError> {
        StateFile::write(state, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::dcd::DcdReader;
    use crate::core::models::cell::BoxVectors;
    use crate::core::models::system::MolecularSystemBuilder;
    use nalgebra::Vector3;

    fn structure() -> MolecularSystem {
        let mut builder = MolecularSystemBuilder::new();
        builder.start_chain('A');
        builder.start_residue(1, "MOL", true).unwrap();
        builder
            .add_atom(1, "C1", "C", Vector3::new(0.1, 0.2, 0.3))
            .unwrap();
        builder
            .add_atom(2, "O1", "O", Vector3::new(0.2, 0.2, 0.3))
            .unwrap();
        builder.add_bond(1, 2);
        builder.box_vectors(BoxVectors::new(2.0, 2.0, 2.0));
        builder.build().unwrap()
    }

    fn state(step: u64) -> State {
        State {
            time: step as f64 * 0.001,
            step_count: step,
            positions: Some(vec![Vector3::new(0.1, 0.2, 0.3), Vector3::new(0.2, 0.2, 0.3)]),
            velocities: Some(vec![Vector3::zeros(); 2]),
            box_vectors: Some(BoxVectors::new(2.0, 2.0, 2.0)),
            potential_energy: Some(-12.5),
            kinetic_energy: Some(3.0),
            ..Default::default()
        }
    }

    fn with_view<T>(f: impl FnOnce(&ReportView<'_>) -> T) -> T {
        let structure = structure();
        let model = InteractionModel::new(vec![12.0, 16.0]);
        let view = ReportView {
            structure: &structure,
            model: &model,
            degrees_of_freedom: 3,
            step_size: 0.001,
        };
        f(&view)
    }

    #[test]
    fn significant_digits_follow_percent_g() {
        assert_eq!(significant(123.456, 3), "123");
        assert_eq!(significant(12.0, 3), "12");
        assert_eq!(significant(0.012345, 3), "0.0123");
        assert_eq!(significant(1234.5, 3), "1.23e+03");
        assert_eq!(significant(0.00001234, 3), "1.23e-05");
    }

    #[test]
    fn python_floats_keep_a_decimal_point() {
        assert_eq!(python_float(42.0), "42.0");
        assert_eq!(python_float(-1.25), "-1.25");
    }

    #[test]
    fn state_data_reporter_writes_header_once_and_dashes_first_speed() {
        let buffer = SharedBuffer::new();
        let mut reporter = StateDataReporter::new(SharedWriter::new(buffer.clone()), 10);
        with_view(|view| {
            reporter.report(view, &state(10)).unwrap();
            reporter.report(view, &state(20)).unwrap();
        });
        let text = buffer.contents();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], StateDataReporter::HEADER);
        let first: Vec<&str> = lines[1].split('\t').collect();
        assert_eq!(first[0], "10");
        assert_eq!(first[1], "-12.5");
        assert_eq!(first[2], "-9.5");
        assert_eq!(first[5], "--");
        assert_eq!(lines[2].split('\t').count(), 6);
    }

    #[test]
    fn dcd_reporter_records_first_step_and_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traj.dcd");
        let mut reporter = DcdReporter::new(&path, 5);
        with_view(|view| {
            reporter.report(view, &state(5)).unwrap();
            reporter.report(view, &state(10)).unwrap();
        });
        drop(reporter);
        let trajectory = DcdReader::read(&mut File::open(&path).unwrap()).unwrap();
        assert_eq!(trajectory.frames.len(), 2);
        assert_eq!(trajectory.first_step, 5);
        assert_eq!(trajectory.interval, 5);
    }

    #[test]
    fn pdb_reporter_writes_models_and_footer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traj.pdb");
        let mut reporter = PdbReporter::new(&path, 1);
        with_view(|view| {
            reporter.report(view, &state(1)).unwrap();
            reporter.report(view, &state(2)).unwrap();
            reporter.finish(view).unwrap();
        });
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("CRYST1").count(), 1);
        assert!(text.contains("MODEL        1"));
        assert!(text.contains("MODEL        2"));
        assert_eq!(text.matches("ENDMDL").count(), 2);
        assert!(text.contains("CONECT"));
        assert!(text.trim_end().ends_with("END"));
    }

    #[test]
    fn checkpoint_reporter_overwrites_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restart.xml");
        let mut reporter = CheckpointReporter::new(&path, 100);
        with_view(|view| {
            reporter.report(view, &state(100)).unwrap();
            reporter.report(view, &state(200)).unwrap();
        });
        let saved = StateFile::read(&path).unwrap();
        assert_eq!(saved.step_count, 200);
        assert_eq!(saved.positions, state(200).positions);
    }
}
