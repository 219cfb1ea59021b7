use super::error::EngineError;
use std::fmt;
use std::str::FromStr;

const AVAILABLE_PLATFORMS: [&str; 2] = ["Reference", "CPU"];

const PRECISION: &str = "Precision";
const THREADS: &str = "Threads";
const DEVICE_INDEX: &str = "DeviceIndex";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformKind {
    /// Serial evaluation.
    Reference,
    /// Nonbonded and reciprocal-space sums run on a rayon thread pool.
    Cpu,
}

/// Requested floating-point precision.
///
/// All arithmetic is carried out in `f64`; the value is validated and reported
/// so that configurations written for GPU platforms remain valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Precision {
    Single,
    Mixed,
    #[default]
    Double,
}

impl FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(Precision::Single),
            "mixed" => Ok(Precision::Mixed),
            "double" => Ok(Precision::Double),
            _ => Err("expected one of single, mixed, double".to_string()),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Precision::Single => "single",
            Precision::Mixed => "mixed",
            Precision::Double => "double",
        })
    }
}

/// A compute platform with its resolved properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Platform {
    kind: PlatformKind,
    precision: Precision,
    threads: usize,
    device_index: usize,
}

impl Platform {
    /// Looks up a platform by its exact name.
    pub fn by_name(name: &str) -> Result<Self, EngineError> {
        let kind = match name {
            "Reference" => PlatformKind::Reference,
            "CPU" => PlatformKind::Cpu,
            _ => {
                return Err(EngineError::PlatformUnavailable {
                    name: name.to_string(),
                    available: AVAILABLE_PLATFORMS.iter().map(|s| s.to_string()).collect(),
                });
            }
        };
        let threads = match kind {
            PlatformKind::Reference => 1,
            PlatformKind::Cpu => rayon::current_num_threads().max(1),
        };
        Ok(Self {
            kind,
            precision: Precision::default(),
            threads,
            device_index: 0,
        })
    }

    /// Names of the platforms built into this engine.
    pub fn available() -> &'static [&'static str] {
        &AVAILABLE_PLATFORMS
    }

    pub fn kind(&self) -> PlatformKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            PlatformKind::Reference => "Reference",
            PlatformKind::Cpu => "CPU",
        }
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn is_parallel(&self) -> bool {
        self.kind == PlatformKind::Cpu
    }

    /// Property names this platform accepts, in reporting order.
    pub fn property_names(&self) -> &'static [&'static str] {
        match self.kind {
            PlatformKind::Reference => &[PRECISION],
            PlatformKind::Cpu => &[DEVICE_INDEX, PRECISION, THREADS],
        }
    }

    pub fn property_value(&self, name: &str) -> Option<String> {
        if !self.property_names().contains(&name) {
            return None;
        }
        match name {
            PRECISION => Some(self.precision.to_string()),
            THREADS => Some(self.threads.to_string()),
            DEVICE_INDEX => Some(self.device_index.to_string()),
            _ => None,
        }
    }

    pub fn set_property(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        if !self.property_names().contains(&name) {
            return Err(EngineError::UnknownProperty {
                platform: self.name().to_string(),
                name: name.to_string(),
            });
        }
        let invalid = |reason: String| EngineError::InvalidPropertyValue {
            name: name.to_string(),
            value: value.to_string(),
            reason,
        };
        match name {
            PRECISION => self.precision = value.parse().map_err(invalid)?,
            THREADS => {
                let threads: usize = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid("expected a positive integer".to_string()))?;
                if threads == 0 {
                    return Err(invalid("expected a positive integer".to_string()));
                }
                self.threads = threads;
            }
            DEVICE_INDEX => {
                let index: usize = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid("expected a device number".to_string()))?;
                if index != 0 {
                    return Err(invalid("the CPU platform has only device 0".to_string()));
                }
                self.device_index = index;
            }
            _ => {}
        }
        Ok(())
    }

    /// Applies `properties` in order, failing on the first invalid entry.
    pub fn with_properties<'p, I>(mut self, properties: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = (&'p str, &'p str)>,
    {
        for (name, value) in properties {
            self.set_property(name, value)?;
        }
        Ok(self)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
