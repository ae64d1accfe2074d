//! Volume and concentration units.
//!
//! Volumes are stored in liters. Displays and robot files use microliters,
//! and transfer keys use integer nanoliters so that values reached through
//! different floating point paths compare equal.
//!
//! # Input Unit Convention
//! Transfer constructors accept a bare number: values `<= 1` are read as
//! liters, larger values as microliters. No real transfer moves a whole
//! liter, so the two ranges never overlap.

/// Microliters per liter.
pub const VOLUME_CONVERSION_FACTOR: f64 = 1e6;
/// Nanomolar per molar.
pub const CONCENTRATION_CONVERSION_FACTOR: f64 = 1e9;

/// Comparison tolerance in microliters.
const VOLUME_TOLERANCE_UL: f64 = 0.01;

/// Interprets a raw volume by the input unit convention and returns liters.
pub fn volume_in_liters(volume: f64) -> f64 {
    if volume <= 1.0 {
        volume
    } else {
        volume / VOLUME_CONVERSION_FACTOR
    }
}

/// Interprets a raw volume by the input unit convention and returns microliters.
pub fn volume_in_ul(volume: f64) -> f64 {
    if volume > 1.0 {
        volume
    } else {
        volume * VOLUME_CONVERSION_FACTOR
    }
}

/// Converts liters to microliters.
#[inline]
pub fn liters_to_ul(liters: f64) -> f64 {
    liters * VOLUME_CONVERSION_FACTOR
}

/// Converts microliters to liters.
#[inline]
pub fn ul_to_liters(ul: f64) -> f64 {
    ul / VOLUME_CONVERSION_FACTOR
}

/// Canonical integer nanoliters for a volume in liters.
pub fn canonical_nl(liters: f64) -> u64 {
    (liters * 1e9).round().max(0.0) as u64
}

/// Molar to nanomolar, rounded to one decimal.
pub fn molar_to_nm(molar: f64) -> f64 {
    (molar * CONCENTRATION_CONVERSION_FACTOR * 10.0).round() / 10.0
}

/// `a < b` beyond the comparison tolerance (both in µl).
pub fn is_smaller_than(a: f64, b: f64) -> bool {
    b - a > VOLUME_TOLERANCE_UL
}

/// `a > b` beyond the comparison tolerance (both in µl).
pub fn is_larger_than(a: f64, b: f64) -> bool {
    a - b > VOLUME_TOLERANCE_UL
}

/// Formats a microliter value with one decimal, as written to robot files.
pub fn format_ul(ul: f64) -> String {
    format!("{ul:.1}")
}

/// Formats a microliter value without trailing zeros (`5`, `2.5`).
pub fn trimmed_ul(ul: f64) -> String {
    let s = format!("{ul:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}
