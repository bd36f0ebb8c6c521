//! Classification of untyped string input.
//!
//! Only case-insensitive `true`/`false` count as booleans. Integers must
//! render back to the exact input (`"007"` and `"+5"` stay text), and
//! decimals must follow plain decimal/exponent notation without redundant
//! leading zeros and stay finite.

/// What an untyped string looks like.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classified {
    /// `true` or `false`, any case.
    Boolean(bool),
    /// Canonical 64-bit integer.
    Long(i64),
    /// Finite decimal number.
    Double(f64),
    /// Anything else.
    Text,
}

/// Classifies `input`.
pub fn classify(input: &str) -> Classified {
    if input.eq_ignore_ascii_case("true") {
        return Classified::Boolean(true);
    }
    if input.eq_ignore_ascii_case("false") {
        return Classified::Boolean(false);
    }
    if let Ok(n) = input.parse::<i64>() {
        if n.to_string() == input {
            return Classified::Long(n);
        }
    }
    if looks_decimal(input) {
        if let Ok(f) = input.parse::<f64>() {
            if f.is_finite() {
                return Classified::Double(f);
            }
        }
    }
    Classified::Text
}

fn looks_decimal(input: &str) -> bool {
    let unsigned = input.strip_prefix('-').unwrap_or(input);
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(pos) => (&unsigned[..pos], Some(&unsigned[pos + 1..])),
        None => (unsigned, None),
    };
    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (mantissa, None),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if int_part.len() > 1 && int_part.starts_with('0') {
        return false;
    }
    if let Some(frac) = frac_part {
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
    }
    match exponent {
        Some(exp) => {
            let digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
        None => true,
    }
}
