use super::state::State;
use crate::core::models::cell::BoxVectors;
use nalgebra::Vector3;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

const FORMAT_VERSION: &str = "1";

#[derive(Debug, Error)]
pub enum StateFileError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("XML parsing error in '{path}': {message}")]
    Xml { path: String, message: String },
    #[error("State file '{path}' has no <{element}> element")]
    MissingElement { path: String, element: &'static str },
    #[error("<{element}> in '{path}' is missing attribute '{attribute}'")]
    MissingAttribute {
        path: String,
        element: String,
        attribute: String,
    },
    #[error("<{element}> in '{path}' has invalid {attribute}='{value}'")]
    InvalidValue {
        path: String,
        element: String,
        attribute: String,
        value: String,
    },
}

/// Reads and writes [`State`] snapshots as XML.
///
/// The document mirrors the serialized state of common MD packages: a root
/// `<State>` with time and step count, followed by the box vectors, the
/// context parameters, energies, positions and velocities. Values are written
/// with the shortest representation that round-trips exactly.
pub struct StateFile;

impl StateFile {
    pub fn write(state: &State, path: &Path) -> Result<(), StateFileError> {
        let origin = path.to_string_lossy().to_string();
        let io_error = |source| StateFileError::Io {
            path: origin.clone(),
            source,
        };
        let file = File::create(path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(state, &mut writer).map_err(io_error)?;
        writer.flush().map_err(io_error)?;
        debug!(path = %origin, "State written");
        Ok(())
    }

    pub fn to_xml_string(state: &State) -> String {
        let mut buffer = Vec::new();
        // Writing into memory cannot fail.
        let _ = Self::write_to(state, &mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    pub fn write_to<W: Write>(state: &State, out: W) -> std::io::Result<()> {
        let mut writer = Writer::new_with_indent(out, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)))?;

        let mut root = BytesStart::new("State");
        root.push_attribute(("version", FORMAT_VERSION));
        root.push_attribute(("time", state.time.to_string().as_str()));
        root.push_attribute(("stepCount", state.step_count.to_string().as_str()));
        writer.write_event(Event::Start(root))?;

        if let Some(cell) = &state.box_vectors {
            writer.write_event(Event::Start(BytesStart::new("PeriodicBoxVectors")))?;
            for (name, v) in ["A", "B", "C"].into_iter().zip(cell.vectors()) {
                writer.write_event(Event::Empty(vector_element(name, &v)))?;
            }
            writer.write_event(Event::End(BytesEnd::new("PeriodicBoxVectors")))?;
        }

        let mut parameters = BytesStart::new("Parameters");
        for (name, value) in &state.parameters {
            parameters.push_attribute((name.as_str(), value.to_string().as_str()));
        }
        writer.write_event(Event::Empty(parameters))?;

        if state.potential_energy.is_some() || state.kinetic_energy.is_some() {
            let mut energies = BytesStart::new("Energies");
            if let Some(e) = state.potential_energy {
                energies.push_attribute(("PotentialEnergy", e.to_string().as_str()));
            }
            if let Some(e) = state.kinetic_energy {
                energies.push_attribute(("KineticEnergy", e.to_string().as_str()));
            }
            writer.write_event(Event::Empty(energies))?;
        }

        for (list, item, values) in [
            ("Positions", "Position", &state.positions),
            ("Velocities", "Velocity", &state.velocities),
        ] {
            let Some(values) = values else { continue };
            writer.write_event(Event::Start(BytesStart::new(list)))?;
            for v in values {
                writer.write_event(Event::Empty(vector_element(item, v)))?;
            }
            writer.write_event(Event::End(BytesEnd::new(list)))?;
        }

        writer.write_event(Event::End(BytesEnd::new("State")))?;
        writer.get_mut().write_all(b"\n")
    }

    pub fn read(path: &Path) -> Result<State, StateFileError> {
        let origin = path.to_string_lossy().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| StateFileError::Io {
            path: origin.clone(),
            source: e,
        })?;
        Self::parse(&content, &origin)
    }

    pub fn from_xml_str(xml: &str) -> Result<State, StateFileError> {
        Self::parse(xml, "<string>")
    }

    fn parse(xml: &str, origin: &str) -> Result<State, StateFileError> {
        let mut parser = StateParser {
            origin,
            state: State::default(),
            saw_root: false,
            box_rows: [None; 3],
        };
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => parser.open(&e)?,
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(StateFileError::Xml {
                        path: origin.to_string(),
                        message: format!("{} at byte {}", e, reader.error_position()),
                    });
                }
                _ => {}
            }
            buf.clear();
        }

        parser.finish()
    }
}

fn vector_element<'a>(name: &'a str, v: &Vector3<f64>) -> BytesStart<'a> {
    let mut element = BytesStart::new(name);
    element.push_attribute(("x", v.x.to_string().as_str()));
    element.push_attribute(("y", v.y.to_string().as_str()));
    element.push_attribute(("z", v.z.to_string().as_str()));
    element
}

struct StateParser<'a> {
    origin: &'a str,
    state: State,
    saw_root: bool,
    box_rows: [Option<Vector3<f64>>; 3],
}

type Attributes = Vec<(String, String)>;

impl StateParser<'_> {
    fn attributes(&self, e: &BytesStart) -> Result<Attributes, StateFileError> {
        e.attributes()
            .map(|attr| {
                let attr = attr.map_err(|err| StateFileError::Xml {
                    path: self.origin.to_string(),
                    message: err.to_string(),
                })?;
                Ok((
                    String::from_utf8_lossy(attr.key.as_ref()).to_string(),
                    String::from_utf8_lossy(&attr.value).to_string(),
                ))
            })
            .collect()
    }

    fn parse_value<T: std::str::FromStr>(
        &self,
        element: &str,
        attribute: &str,
        value: &str,
    ) -> Result<T, StateFileError> {
        value.trim().parse().map_err(|_| StateFileError::InvalidValue {
            path: self.origin.to_string(),
            element: element.to_string(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        })
    }

    fn required<T: std::str::FromStr>(
        &self,
        attrs: &Attributes,
        element: &str,
        attribute: &str,
    ) -> Result<T, StateFileError> {
        let value = attrs
            .iter()
            .find(|(k, _)| k == attribute)
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| StateFileError::MissingAttribute {
                path: self.origin.to_string(),
                element: element.to_string(),
                attribute: attribute.to_string(),
            })?;
        self.parse_value(element, attribute, value)
    }

    fn vector(&self, attrs: &Attributes, element: &str) -> Result<Vector3<f64>, StateFileError> {
        Ok(Vector3::new(
            self.required(attrs, element, "x")?,
            self.required(attrs, element, "y")?,
            self.required(attrs, element, "z")?,
        ))
    }

    fn open(&mut self, e: &BytesStart) -> Result<(), StateFileError> {
        let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
        let attrs = self.attributes(e)?;
        match tag.as_str() {
            "State" => {
                self.saw_root = true;
                self.state.time = self.required(&attrs, &tag, "time")?;
                self.state.step_count = self.required(&attrs, &tag, "stepCount")?;
            }
            "A" | "B" | "C" => {
                let row = match tag.as_str() {
                    "A" => 0,
                    "B" => 1,
                    _ => 2,
                };
                self.box_rows[row] = Some(self.vector(&attrs, &tag)?);
            }
            "Parameters" => {
                for (name, value) in &attrs {
                    let value = self.parse_value(&tag, name, value)?;
                    self.state.parameters.insert(name.clone(), value);
                }
            }
            "Energies" => {
                for (name, value) in &attrs {
                    match name.as_str() {
                        "PotentialEnergy" => {
                            self.state.potential_energy = Some(self.parse_value(&tag, name, value)?)
                        }
                        "KineticEnergy" => {
                            self.state.kinetic_energy = Some(self.parse_value(&tag, name, value)?)
                        }
                        _ => {}
                    }
                }
            }
            "Positions" => self.state.positions = Some(Vec::new()),
            "Velocities" => self.state.velocities = Some(Vec::new()),
            "Position" => {
                let v = self.vector(&attrs, &tag)?;
                self.state.positions.get_or_insert_with(Vec::new).push(v);
            }
            "Velocity" => {
                let v = self.vector(&attrs, &tag)?;
                self.state.velocities.get_or_insert_with(Vec::new).push(v);
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(mut self) -> Result<State, StateFileError> {
        if !self.saw_root {
            return Err(StateFileError::MissingElement {
                path: self.origin.to_string(),
                element: "State",
            });
        }
        match self.box_rows {
            [None, None, None] => {}
            [Some(a), Some(b), Some(c)] => {
                let off_diagonal = [a.y, a.z, b.x, b.z, c.x, c.y].iter().any(|&v| v != 0.0);
                if off_diagonal {
                    return Err(StateFileError::InvalidValue {
                        path: self.origin.to_string(),
                        element: "PeriodicBoxVectors".to_string(),
                        attribute: "shape".to_string(),
                        value: "triclinic".to_string(),
                    });
                }
                self.state.box_vectors = Some(BoxVectors::new(a.x, b.y, c.z));
            }
            _ => {
                return Err(StateFileError::MissingElement {
                    path: self.origin.to_string(),
                    element: "PeriodicBoxVectors",
                });
            }
        }
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_state() -> State {
        State {
            time: 12.345,
            step_count: 12345,
            positions: Some(vec![
                Vector3::new(0.1, 0.2, 0.3),
                Vector3::new(1.0 / 3.0, -2.5e-7, 2.9999999999),
            ]),
            velocities: Some(vec![Vector3::new(-0.5, 0.25, 0.0), Vector3::new(1e-3, 2.0, -3.0)]),
            box_vectors: Some(BoxVectors::new(3.1, 3.2, 2.9)),
            potential_energy: Some(-1234.5678),
            kinetic_energy: Some(42.0),
            group_energies: None,
            parameters: BTreeMap::from([
                ("MonteCarloPressureX".to_string(), 1.0),
                ("MonteCarloTemperature".to_string(), 323.0),
            ]),
        }
    }

    #[test]
    fn written_document_has_expected_layout() {
        let xml = StateFile::to_xml_string(&sample_state());
        assert!(xml.starts_with("<?xml version=\"1.0\"?>"));
        assert!(xml.contains("<State version=\"1\" time=\"12.345\" stepCount=\"12345\">"));
        assert!(xml.contains("<A x=\"3.1\" y=\"0\" z=\"0\"/>"));
        assert!(xml.contains("MonteCarloPressureX=\"1\""));
        assert!(xml.contains("<Energies PotentialEnergy=\"-1234.5678\" KineticEnergy=\"42\"/>"));
        assert_eq!(xml.matches("<Position ").count(), 2);
        assert_eq!(xml.matches("<Velocity ").count(), 2);
    }

    #[test]
    fn file_round_trip_preserves_every_value_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.xml");
        let state = sample_state();
        StateFile::write(&state, &path).unwrap();
        assert_eq!(StateFile::read(&path).unwrap(), state);
    }

    #[test]
    fn state_without_box_or_velocities_is_accepted() {
        let state = StateFile::from_xml_str(
            r#"<State version="1" time="0" stepCount="0"><Positions><Position x="1" y="2" z="3"/></Positions></State>"#,
        )
        .unwrap();
        assert_eq!(state.box_vectors, None);
        assert_eq!(state.velocities, None);
        assert_eq!(state.positions, Some(vec![Vector3::new(1.0, 2.0, 3.0)]));
    }

    #[test]
    fn triclinic_boxes_are_rejected() {
        let err = StateFile::from_xml_str(
            r#"<State time="0" stepCount="0"><PeriodicBoxVectors><A x="3" y="0" z="0"/><B x="1" y="3" z="0"/><C x="0" y="0" z="3"/></PeriodicBoxVectors></State>"#,
        )
        .unwrap_err();
        assert!(matches!(err, StateFileError::InvalidValue { .. }));
    }

    #[test]
    fn malformed_documents_are_reported() {
        assert!(matches!(
            StateFile::from_xml_str("<Other/>"),
            Err(StateFileError::MissingElement {
                element: "State",
                ..
            })
        ));
        assert!(matches!(
            StateFile::from_xml_str(r#"<State time="x" stepCount="0"/>"#),
            Err(StateFileError::InvalidValue { .. })
        ));
        assert!(matches!(
            StateFile::from_xml_str(r#"<State time="0"/>"#),
            Err(StateFileError::MissingAttribute { .. })
        ));
        assert!(matches!(
            StateFile::from_xml_str(r#"<State time="0" stepCount="0"><Positions></State>"#),
            Err(StateFileError::Xml { .. })
        ));
    }

    #[test]
    fn read_reports_missing_file_with_path() {
        let err = StateFile::read(Path::new("/nonexistent/state.xml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/state.xml"));
    }
}
