use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ForceFieldError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("XML parsing error in '{path}': {message}")]
    Xml { path: String, message: String },
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
    #[error("Residue template '{residue}' in '{path}' refers to unknown atom type '{type_name}'")]
    UnknownAtomType {
        path: String,
        residue: String,
        type_name: String,
    },
    #[error("Residue template '{residue}' in '{path}' has a bond to unknown atom '{atom}'")]
    UnknownTemplateAtom {
        path: String,
        residue: String,
        atom: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtomTypeDef {
    pub name: String,
    pub class: String,
    pub element: Option<String>,
    pub mass: f64,
}

/// Selects atoms in a parameter entry, either by atom type or by atom class.
/// An empty class is a wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtomMatcher {
    Type(String),
    Class(String),
    Any,
}

impl AtomMatcher {
    pub fn matches(&self, atom_type: &AtomTypeDef) -> bool {
        match self {
            AtomMatcher::Type(name) => *name == atom_type.name,
            AtomMatcher::Class(class) => *class == atom_type.class,
            AtomMatcher::Any => true,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, AtomMatcher::Any)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateAtom {
    pub name: String,
    pub type_name: String,
    pub charge: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResidueTemplate {
    pub name: String,
    pub atoms: Vec<TemplateAtom>,
    /// Pairs of indices into `atoms`.
    pub bonds: Vec<(usize, usize)>,
}

impl ResidueTemplate {
    pub fn atom_index(&self, name: &str) -> Option<usize> {
        self.atoms.iter().position(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BondDef {
    pub atoms: [AtomMatcher; 2],
    pub length: f64,
    pub k: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AngleDef {
    pub atoms: [AtomMatcher; 3],
    pub angle: f64,
    pub k: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RbTorsionDef {
    pub atoms: [AtomMatcher; 4],
    pub c: [f64; 6],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicTerm {
    pub periodicity: u32,
    pub phase: f64,
    pub k: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicTorsionDef {
    pub atoms: [AtomMatcher; 4],
    pub terms: Vec<PeriodicTerm>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NonbondedAtomDef {
    pub atom: AtomMatcher,
    pub charge: Option<f64>,
    pub sigma: f64,
    pub epsilon: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NonbondedDef {
    pub coulomb14scale: f64,
    pub lj14scale: f64,
    /// Charges come from the residue templates instead of the `<Atom>` entries.
    pub charge_from_residue: bool,
    pub atoms: Vec<NonbondedAtomDef>,
}

/// One force section of the file, kept in file order.
#[derive(Debug, Clone, PartialEq)]
pub enum ForceDef {
    HarmonicBond(Vec<BondDef>),
    HarmonicAngle(Vec<AngleDef>),
    RbTorsion(Vec<RbTorsionDef>),
    PeriodicTorsion {
        propers: Vec<PeriodicTorsionDef>,
        impropers: Vec<PeriodicTorsionDef>,
    },
    Nonbonded(NonbondedDef),
}

/// A force field in the OpenMM XML format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForceFieldDefinition {
    pub atom_types: HashMap<String, AtomTypeDef>,
    pub residues: Vec<ResidueTemplate>,
    pub forces: Vec<ForceDef>,
}

impl ForceFieldDefinition {
    pub fn load(path: &Path) -> Result<Self, ForceFieldError> {
        let origin = path.to_string_lossy().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| ForceFieldError::Io {
            path: origin.clone(),
            source: e,
        })?;
        Self::parse(&content, &origin)
    }

    pub fn from_xml_str(xml: &str) -> Result<Self, ForceFieldError> {
        Self::parse(xml, "<string>")
    }

    pub fn atom_type(&self, name: &str) -> Option<&AtomTypeDef> {
        self.atom_types.get(name)
    }

    fn parse(xml: &str, origin: &str) -> Result<Self, ForceFieldError> {
        let mut parser = Parser {
            origin,
            definition: ForceFieldDefinition::default(),
            section: Section::None,
            residue: None,
            ignored: None,
        };
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut saw_root = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    saw_root = true;
                    parser.open(&e, false)?;
                }
                Ok(Event::Empty(e)) => {
                    saw_root = true;
                    parser.open(&e, true)?;
                }
                Ok(Event::End(e)) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    parser.close(&tag);
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(ForceFieldError::Xml {
                        path: origin.to_string(),
                        message: format!("{} at byte {}", e, reader.error_position()),
                    });
                }
                _ => {}
            }
            buf.clear();
        }

        if !saw_root {
            return Err(ForceFieldError::Xml {
                path: origin.to_string(),
                message: "document has no root element".into(),
            });
        }
        parser.definition.validate(origin)?;
        debug!(
            atom_types = parser.definition.atom_types.len(),
            residues = parser.definition.residues.len(),
            forces = parser.definition.forces.len(),
            "Parsed force field '{}'",
            origin
        );
        Ok(parser.definition)
    }

    fn validate(&self, origin: &str) -> Result<(), ForceFieldError> {
        for residue in &self.residues {
            for atom in &residue.atoms {
                if !self.atom_types.contains_key(&atom.type_name) {
                    return Err(ForceFieldError::UnknownAtomType {
                        path: origin.to_string(),
                        residue: residue.name.clone(),
                        type_name: atom.type_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    AtomTypes,
    Residues,
    HarmonicBond,
    HarmonicAngle,
    RbTorsion,
    PeriodicTorsion,
    Nonbonded,
    Ignored,
}

struct Parser<'a> {
    origin: &'a str,
    definition: ForceFieldDefinition,
    section: Section,
    residue: Option<ResidueTemplate>,
    ignored: Option<String>,
}

type Attributes = HashMap<String, String>;

impl<'a> Parser<'a> {
    fn attributes(&self, e: &BytesStart) -> Result<Attributes, ForceFieldError> {
        let mut map = HashMap::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| ForceFieldError::Xml {
                path: self.origin.to_string(),
                message: err.to_string(),
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = String::from_utf8_lossy(&attr.value).to_string();
            map.insert(key, value);
        }
        Ok(map)
    }

    fn required<'m>(
        &self,
        attrs: &'m Attributes,
        element: &str,
        attribute: &str,
    ) -> Result<&'m str, ForceFieldError> {
        attrs
            .get(attribute)
            .map(String::as_str)
            .ok_or_else(|| ForceFieldError::MissingAttribute {
                path: self.origin.to_string(),
                element: element.to_string(),
                attribute: attribute.to_string(),
            })
    }

    fn number<T: std::str::FromStr>(
        &self,
        attrs: &Attributes,
        element: &str,
        attribute: &str,
    ) -> Result<T, ForceFieldError> {
        let value = self.required(attrs, element, attribute)?;
        value.trim().parse().map_err(|_| ForceFieldError::InvalidValue {
            path: self.origin.to_string(),
            element: element.to_string(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        })
    }

    fn optional_number(
        &self,
        attrs: &Attributes,
        element: &str,
        attribute: &str,
    ) -> Result<Option<f64>, ForceFieldError> {
        if attrs.contains_key(attribute) {
            self.number(attrs, element, attribute).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Reads `type{n}`/`class{n}` selectors for `N` atoms.
    fn matchers<const N: usize>(
        &self,
        attrs: &Attributes,
        element: &str,
    ) -> Result<[AtomMatcher; N], ForceFieldError> {
        let mut out: [AtomMatcher; N] = std::array::from_fn(|_| AtomMatcher::Any);
        for (i, slot) in out.iter_mut().enumerate() {
            let n = i + 1;
            *slot = if let Some(t) = attrs.get(&format!("type{}", n)) {
                if t.is_empty() {
                    AtomMatcher::Any
                } else {
                    AtomMatcher::Type(t.clone())
                }
            } else if let Some(c) = attrs.get(&format!("class{}", n)) {
                if c.is_empty() {
                    AtomMatcher::Any
                } else {
                    AtomMatcher::Class(c.clone())
                }
            } else {
                return Err(ForceFieldError::MissingAttribute {
                    path: self.origin.to_string(),
                    element: element.to_string(),
                    attribute: format!("class{}", n),
                });
            };
        }
        Ok(out)
    }

    fn open(&mut self, e: &BytesStart, empty: bool) -> Result<(), ForceFieldError> {
        let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
        let attrs = self.attributes(e)?;

        match (self.section, tag.as_str()) {
            (_, "ForceField") => {}
            (Section::None, "AtomTypes") => self.section = Section::AtomTypes,
            (Section::None, "Residues") => self.section = Section::Residues,
            (Section::None, "HarmonicBondForce") => {
                self.definition
                    .forces
                    .push(ForceDef::HarmonicBond(Vec::new()));
                self.section = Section::HarmonicBond;
            }
            (Section::None, "HarmonicAngleForce") => {
                self.definition
                    .forces
                    .push(ForceDef::HarmonicAngle(Vec::new()));
                self.section = Section::HarmonicAngle;
            }
            (Section::None, "RBTorsionForce") => {
                self.definition.forces.push(ForceDef::RbTorsion(Vec::new()));
                self.section = Section::RbTorsion;
            }
            (Section::None, "PeriodicTorsionForce") => {
                self.definition.forces.push(ForceDef::PeriodicTorsion {
                    propers: Vec::new(),
                    impropers: Vec::new(),
                });
                self.section = Section::PeriodicTorsion;
            }
            (Section::None, "NonbondedForce") => {
                let def = NonbondedDef {
                    coulomb14scale: self
                        .optional_number(&attrs, &tag, "coulomb14scale")?
                        .unwrap_or(0.833333),
                    lj14scale: self
                        .optional_number(&attrs, &tag, "lj14scale")?
                        .unwrap_or(0.5),
                    charge_from_residue: false,
                    atoms: Vec::new(),
                };
                self.definition.forces.push(ForceDef::Nonbonded(def));
                self.section = Section::Nonbonded;
            }
            (Section::None, other) => {
                warn!("Ignoring unsupported force-field section <{}>", other);
                self.section = Section::Ignored;
                self.ignored = Some(other.to_string());
            }
            (Section::AtomTypes, "Type") => {
                let name = self.required(&attrs, &tag, "name")?.to_string();
                let def = AtomTypeDef {
                    class: attrs.get("class").cloned().unwrap_or_else(|| name.clone()),
                    element: attrs.get("element").cloned(),
                    mass: self.number(&attrs, &tag, "mass")?,
                    name: name.clone(),
                };
                self.definition.atom_types.insert(name, def);
            }
            (Section::Residues, "Residue") => {
                let template = ResidueTemplate {
                    name: self.required(&attrs, &tag, "name")?.to_string(),
                    atoms: Vec::new(),
                    bonds: Vec::new(),
                };
                if empty {
                    self.definition.residues.push(template);
                } else {
                    self.residue = Some(template);
                }
            }
            (Section::Residues, "Atom") => {
                let atom = TemplateAtom {
                    name: self.required(&attrs, &tag, "name")?.to_string(),
                    type_name: self.required(&attrs, &tag, "type")?.to_string(),
                    charge: self.optional_number(&attrs, &tag, "charge")?,
                };
                if let Some(residue) = self.residue.as_mut() {
                    residue.atoms.push(atom);
                }
            }
            (Section::Residues, "Bond") => {
                let bond = self.template_bond(&attrs, &tag)?;
                if let Some(residue) = self.residue.as_mut() {
                    residue.bonds.push(bond);
                }
            }
            (Section::Residues, _) => {}
            (Section::HarmonicBond, "Bond") => {
                let def = BondDef {
                    atoms: self.matchers(&attrs, &tag)?,
                    length: self.number(&attrs, &tag, "length")?,
                    k: self.number(&attrs, &tag, "k")?,
                };
                if let Some(ForceDef::HarmonicBond(list)) = self.definition.forces.last_mut() {
                    list.push(def);
                }
            }
            (Section::HarmonicAngle, "Angle") => {
                let def = AngleDef {
                    atoms: self.matchers(&attrs, &tag)?,
                    angle: self.number(&attrs, &tag, "angle")?,
                    k: self.number(&attrs, &tag, "k")?,
                };
                if let Some(ForceDef::HarmonicAngle(list)) = self.definition.forces.last_mut() {
                    list.push(def);
                }
            }
            (Section::RbTorsion, "Proper") => {
                let mut c = [0.0; 6];
                for (i, slot) in c.iter_mut().enumerate() {
                    *slot = self
                        .optional_number(&attrs, &tag, &format!("c{}", i))?
                        .unwrap_or(0.0);
                }
                let def = RbTorsionDef {
                    atoms: self.matchers(&attrs, &tag)?,
                    c,
                };
                if let Some(ForceDef::RbTorsion(list)) = self.definition.forces.last_mut() {
                    list.push(def);
                }
            }
            (Section::PeriodicTorsion, "Proper" | "Improper") => {
                let mut terms = Vec::new();
                for n in 1.. {
                    let key = format!("periodicity{}", n);
                    if !attrs.contains_key(&key) {
                        break;
                    }
                    terms.push(PeriodicTerm {
                        periodicity: self.number(&attrs, &tag, &key)?,
                        phase: self.number(&attrs, &tag, &format!("phase{}", n))?,
                        k: self.number(&attrs, &tag, &format!("k{}", n))?,
                    });
                }
                let def = PeriodicTorsionDef {
                    atoms: self.matchers(&attrs, &tag)?,
                    terms,
                };
                if let Some(ForceDef::PeriodicTorsion { propers, impropers }) =
                    self.definition.forces.last_mut()
                {
                    if tag == "Proper" {
                        propers.push(def);
                    } else {
                        impropers.push(def);
                    }
                }
            }
            (Section::Nonbonded, "UseAttributeFromResidue") => {
                if attrs.get("name").map(String::as_str) == Some("charge") {
                    if let Some(ForceDef::Nonbonded(def)) = self.definition.forces.last_mut() {
                        def.charge_from_residue = true;
                    }
                }
            }
            (Section::Nonbonded, "Atom") => {
                let [atom] = self.matchers_single(&attrs, &tag)?;
                let def = NonbondedAtomDef {
                    atom,
                    charge: self.optional_number(&attrs, &tag, "charge")?,
                    sigma: self.number(&attrs, &tag, "sigma")?,
                    epsilon: self.number(&attrs, &tag, "epsilon")?,
                };
                if let Some(ForceDef::Nonbonded(nb)) = self.definition.forces.last_mut() {
                    nb.atoms.push(def);
                }
            }
            (Section::Ignored, _) => {}
            (section, other) => {
                debug!("Skipping <{}> inside {:?}", other, section);
            }
        }

        if empty {
            self.close(&tag);
        }
        Ok(())
    }

    /// `<Atom type=".."/>` or `<Atom class=".."/>` inside a nonbonded section.
    fn matchers_single(
        &self,
        attrs: &Attributes,
        element: &str,
    ) -> Result<[AtomMatcher; 1], ForceFieldError> {
        if let Some(t) = attrs.get("type") {
            Ok([AtomMatcher::Type(t.clone())])
        } else if let Some(c) = attrs.get("class") {
            Ok([AtomMatcher::Class(c.clone())])
        } else {
            Err(ForceFieldError::MissingAttribute {
                path: self.origin.to_string(),
                element: element.to_string(),
                attribute: "type".into(),
            })
        }
    }

    fn template_bond(
        &self,
        attrs: &Attributes,
        element: &str,
    ) -> Result<(usize, usize), ForceFieldError> {
        let Some(residue) = self.residue.as_ref() else {
            return Err(ForceFieldError::MissingAttribute {
                path: self.origin.to_string(),
                element: element.to_string(),
                attribute: "enclosing Residue".into(),
            });
        };
        if attrs.contains_key("from") {
            let from: usize = self.number(attrs, element, "from")?;
            let to: usize = self.number(attrs, element, "to")?;
            return Ok((from, to));
        }
        let lookup = |key: &str| -> Result<usize, ForceFieldError> {
            let name = self.required(attrs, element, key)?;
            residue
                .atom_index(name)
                .ok_or_else(|| ForceFieldError::UnknownTemplateAtom {
                    path: self.origin.to_string(),
                    residue: residue.name.clone(),
                    atom: name.to_string(),
                })
        };
        Ok((lookup("atomName1")?, lookup("atomName2")?))
    }

    fn close(&mut self, tag: &str) {
        match (self.section, tag) {
            (Section::Residues, "Residue") => {
                if let Some(template) = self.residue.take() {
                    self.definition.residues.push(template);
                }
            }
            (Section::Residues, "Residues")
            | (Section::AtomTypes, "AtomTypes")
            | (Section::HarmonicBond, "HarmonicBondForce")
            | (Section::HarmonicAngle, "HarmonicAngleForce")
            | (Section::RbTorsion, "RBTorsionForce")
            | (Section::PeriodicTorsion, "PeriodicTorsionForce")
            | (Section::Nonbonded, "NonbondedForce") => self.section = Section::None,
            (Section::Ignored, _) if self.ignored.as_deref() == Some(tag) => {
                self.section = Section::None;
                self.ignored = None;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    pub(crate) const MOL_XML: &str = r#"<ForceField>
 <AtomTypes>
  <Type name="MOL-C1" class="CT" element="C" mass="12.011"/>
  <Type name="MOL-C2" class="CT" element="C" mass="12.011"/>
  <Type name="MOL-O1" class="OH" element="O" mass="15.999"/>
  <Type name="MOL-H1" class="HO" element="H" mass="1.008"/>
 </AtomTypes>
 <Residues>
  <Residue name="MOL">
   <Atom name="C1" type="MOL-C1" charge="0.1"/>
   <Atom name="C2" type="MOL-C2" charge="0.2"/>
   <Atom name="O1" type="MOL-O1" charge="-0.7"/>
   <Atom name="H1" type="MOL-H1" charge="0.4"/>
   <Bond atomName1="C1" atomName2="C2"/>
   <Bond atomName1="C2" atomName2="O1"/>
   <Bond atomName1="O1" atomName2="H1"/>
  </Residue>
 </Residues>
 <HarmonicBondForce>
  <Bond class1="CT" class2="CT" length="0.1529" k="224262.4"/>
  <Bond class1="CT" class2="OH" length="0.141" k="267776.0"/>
  <Bond class1="OH" class2="HO" length="0.0945" k="462750.4"/>
 </HarmonicBondForce>
 <HarmonicAngleForce>
  <Angle class1="CT" class2="CT" class3="OH" angle="1.911135" k="418.4"/>
  <Angle class1="CT" class2="OH" class3="HO" angle="1.893682" k="460.24"/>
 </HarmonicAngleForce>
 <RBTorsionForce>
  <Proper class1="CT" class2="CT" class3="OH" class4="HO" c0="-0.4435" c1="3.83255" c2="0.72801" c3="-4.11705" c4="0.0" c5="0.0"/>
 </RBTorsionForce>
 <NonbondedForce coulomb14scale="0.5" lj14scale="0.5">
  <UseAttributeFromResidue name="charge"/>
  <Atom type="MOL-C1" sigma="0.35" epsilon="0.276144"/>
  <Atom type="MOL-C2" sigma="0.35" epsilon="0.276144"/>
  <Atom type="MOL-O1" sigma="0.312" epsilon="0.71128"/>
  <Atom type="MOL-H1" sigma="0.0" epsilon="0.0"/>
 </NonbondedForce>
</ForceField>
"#;

    #[test]
    fn parses_atom_types_residues_and_forces_in_order() {
        let ff = ForceFieldDefinition::from_xml_str(MOL_XML).unwrap();
        assert_eq!(ff.atom_types.len(), 4);
        assert_eq!(ff.atom_type("MOL-O1").unwrap().class, "OH");
        assert_eq!(ff.residues.len(), 1);
        let mol = &ff.residues[0];
        assert_eq!(mol.atoms.len(), 4);
        assert_eq!(mol.bonds, vec![(0, 1), (1, 2), (2, 3)]);
        assert_eq!(mol.atoms[2].charge, Some(-0.7));

        assert_eq!(ff.forces.len(), 4);
        assert!(matches!(&ff.forces[0], ForceDef::HarmonicBond(b) if b.len() == 3));
        assert!(matches!(&ff.forces[1], ForceDef::HarmonicAngle(a) if a.len() == 2));
        assert!(matches!(&ff.forces[2], ForceDef::RbTorsion(t) if t.len() == 1));
        match &ff.forces[3] {
            ForceDef::Nonbonded(nb) => {
                assert!(nb.charge_from_residue);
                assert_eq!(nb.coulomb14scale, 0.5);
                assert_eq!(nb.atoms.len(), 4);
            }
            other => panic!("expected nonbonded, got {:?}", other),
        }
    }

    #[test]
    fn periodic_torsions_collect_all_terms_and_wildcards() {
        let xml = r#"<ForceField>
 <PeriodicTorsionForce>
  <Proper class1="" class2="CT" class3="CT" class4="" periodicity1="3" phase1="0.0" k1="0.6" periodicity2="1" phase2="3.14159" k2="0.2"/>
  <Improper class1="C" class2="" class3="" class4="O" periodicity1="2" phase1="3.14159" k1="43.9"/>
 </PeriodicTorsionForce>
</ForceField>"#;
        let ff = ForceFieldDefinition::from_xml_str(xml).unwrap();
        let ForceDef::PeriodicTorsion { propers, impropers } = &ff.forces[0] else {
            panic!("expected periodic torsion");
        };
        assert_eq!(propers[0].terms.len(), 2);
        assert_eq!(propers[0].terms[1].periodicity, 1);
        assert!(propers[0].atoms[0].is_wildcard());
        assert_eq!(propers[0].atoms[1], AtomMatcher::Class("CT".into()));
        assert_eq!(impropers.len(), 1);
    }

    #[test]
    fn unsupported_sections_are_skipped() {
        let xml = r#"<ForceField>
 <CustomNonbondedForce energy="0"><Atom type="X" a="1"/></CustomNonbondedForce>
 <HarmonicBondForce><Bond type1="A" type2="B" length="0.1" k="1"/></HarmonicBondForce>
</ForceField>"#;
        let ff = ForceFieldDefinition::from_xml_str(xml).unwrap();
        assert_eq!(ff.forces.len(), 1);
        let ForceDef::HarmonicBond(bonds) = &ff.forces[0] else {
            panic!("expected bonds");
        };
        assert_eq!(bonds[0].atoms[0], AtomMatcher::Type("A".into()));
    }

    #[test]
    fn missing_attribute_is_reported() {
        let xml =
            r#"<ForceField><AtomTypes><Type name="X" class="X"/></AtomTypes></ForceField>"#;
        let err = ForceFieldDefinition::from_xml_str(xml).unwrap_err();
        assert!(matches!(
            err,
            ForceFieldError::MissingAttribute { ref attribute, .. } if attribute == "mass"
        ));
    }

    #[test]
    fn invalid_number_is_reported() {
        let xml =
            r#"<ForceField><AtomTypes><Type name="X" class="X" mass="heavy"/></AtomTypes></ForceField>"#;
        assert!(matches!(
            ForceFieldDefinition::from_xml_str(xml),
            Err(ForceFieldError::InvalidValue { .. })
        ));
    }

    #[test]
    fn template_with_unknown_type_is_rejected() {
        let xml = r#"<ForceField><Residues><Residue name="R"><Atom name="A" type="nope"/></Residue></Residues></ForceField>"#;
        assert!(matches!(
            ForceFieldDefinition::from_xml_str(xml),
            Err(ForceFieldError::UnknownAtomType { .. })
        ));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        let result = ForceFieldDefinition::from_xml_str("<ForceField><AtomTypes></ForceField>");
        assert!(matches!(result, Err(ForceFieldError::Xml { .. })));
    }

    #[test]
    fn load_reports_missing_file_with_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("field.xml");
        let err = ForceFieldDefinition::load(&path).unwrap_err();
        assert!(matches!(err, ForceFieldError::Io { ref path, .. } if path.ends_with("field.xml")));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("field.xml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(MOL_XML.as_bytes())
            .unwrap();
        let ff = ForceFieldDefinition::load(&path).unwrap();
        assert_eq!(ff.residues[0].name, "MOL");
    }
}
