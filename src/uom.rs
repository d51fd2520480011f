//! Unit-of-measure normalization.
//!
//! Maps raw unit tokens (English and German synonyms) to canonical codes
//! via a fixed table. Unknown tokens normalize to `None`, which consumers
//! treat as "unit unknown", never as an error. Compatibility is advisory:
//! a sanity gate before price and quantity arithmetic, not validation.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Canonical codes grouped loosely: `ST` pieces, `KAR` carton, `PAL`
/// pallet, `SET` set, plus the length/mass/volume families.
static SYNONYMS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    // Pieces
    for s in ["st", "stk", "stück", "stueck", "pc", "pcs", "piece", "pieces", "ea", "each"] {
        m.insert(s, "ST");
    }
    // Carton
    for s in ["kar", "karton", "carton", "ctn", "box"] {
        m.insert(s, "KAR");
    }
    // Pallet
    for s in ["pal", "palette", "pallet", "plt"] {
        m.insert(s, "PAL");
    }
    // Set
    for s in ["set", "sets", "satz"] {
        m.insert(s, "SET");
    }
    // Length
    for s in ["m", "meter", "metre", "meters", "lfm"] {
        m.insert(s, "M");
    }
    for s in ["cm", "centimeter", "zentimeter"] {
        m.insert(s, "CM");
    }
    for s in ["mm", "millimeter"] {
        m.insert(s, "MM");
    }
    // Mass
    for s in ["kg", "kilo", "kilogram", "kilogramm"] {
        m.insert(s, "KG");
    }
    for s in ["g", "gram", "gramm"] {
        m.insert(s, "G");
    }
    // Volume
    for s in ["l", "liter", "litre", "ltr"] {
        m.insert(s, "L");
    }
    for s in ["ml", "milliliter"] {
        m.insert(s, "ML");
    }

    m
});

/// Unit families for compatibility checks. Codes outside any family
/// (ST, KAR, PAL, SET) are only compatible with themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Length,
    Mass,
    Volume,
}

fn family(code: &str) -> Option<Family> {
    match code {
        "M" | "CM" | "MM" => Some(Family::Length),
        "KG" | "G" => Some(Family::Mass),
        "L" | "ML" => Some(Family::Volume),
        _ => None,
    }
}

/// Normalizes a raw unit token to its canonical code.
///
/// Case-insensitive, whitespace-trimmed exact lookup. Unknown tokens
/// return `None`.
pub fn normalize(raw: &str) -> Option<&'static str> {
    let token = raw.trim().to_lowercase();
    if token.is_empty() {
        return None;
    }
    SYNONYMS.get(token.as_str()).copied()
}

/// Advisory compatibility between two raw unit tokens.
///
/// True if either side is unknown (permissive default), if both normalize
/// to the same code, or if both codes belong to the same unit family.
pub fn compatible(a: &str, b: &str) -> bool {
    let (ca, cb) = match (normalize(a), normalize(b)) {
        (Some(ca), Some(cb)) => (ca, cb),
        // Unknown units never block downstream arithmetic.
        _ => return true,
    };

    if ca == cb {
        return true;
    }

    match (family(ca), family(cb)) {
        (Some(fa), Some(fb)) => fa == fb,
        _ => false,
    }
}
