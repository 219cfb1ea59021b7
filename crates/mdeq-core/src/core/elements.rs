use phf::{Map, phf_map};

/// Standard atomic masses (amu) keyed by capitalized element symbol.
static ATOMIC_MASSES: Map<&'static str, f64> = phf_map! {
    "H" => 1.008,
    "D" => 2.014,
    "He" => 4.003,
    "Li" => 6.94,
    "Be" => 9.012,
    "B" => 10.81,
    "C" => 12.011,
    "N" => 14.007,
    "O" => 15.999,
    "F" => 18.998,
    "Ne" => 20.180,
    "Na" => 22.990,
    "Mg" => 24.305,
    "Al" => 26.982,
    "Si" => 28.085,
    "P" => 30.974,
    "S" => 32.06,
    "Cl" => 35.45,
    "Ar" => 39.948,
    "K" => 39.098,
    "Ca" => 40.078,
    "Fe" => 55.845,
    "Cu" => 63.546,
    "Zn" => 65.38,
    "Br" => 79.904,
    "Kr" => 83.798,
    "Rb" => 85.468,
    "I" => 126.904,
    "Xe" => 131.293,
    "Cs" => 132.905,
};

/// Normalizes an element symbol to its canonical capitalization ("CL" -> "Cl").
pub fn normalize_symbol(symbol: &str) -> String {
    let trimmed = symbol.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => {
            let mut out = first.to_ascii_uppercase().to_string();
            out.extend(chars.map(|c| c.to_ascii_lowercase()));
            out
        }
        None => String::new(),
    }
}

/// Returns the standard atomic mass for an element symbol.
pub fn atomic_mass(symbol: &str) -> Option<f64> {
    ATOMIC_MASSES
        .get(normalize_symbol(symbol).as_str())
        .copied()
}

pub fn is_known(symbol: &str) -> bool {
    atomic_mass(symbol).is_some()
}

pub fn is_hydrogen(symbol: &str) -> bool {
    matches!(normalize_symbol(symbol).as_str(), "H" | "D")
}

/// Guesses an element from an atom name such as "C12", "OW" or "Cl1".
///
/// Two-letter symbols are tried first only when the name's second character is
/// lowercase, so "CL1" resolves to carbon while "Cl1" resolves to chlorine.
pub fn guess_from_atom_name(name: &str) -> Option<String> {
    let letters: String = name
        .trim()
        .chars()
        .skip_while(|c| c.is_ascii_digit())
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    let mut chars = letters.chars();
    let first = chars.next()?;
    if let Some(second) = chars.next() {
        if second.is_ascii_lowercase() {
            let two = normalize_symbol(&format!("{}{}", first, second));
            if is_known(&two) {
                return Some(two);
            }
        }
    }
    let one = normalize_symbol(&first.to_string());
    is_known(&one).then_some(one)
}
