//! Plate role markers and label construction.

/// Marker of the final (aliquot) plate.
pub const ROLE_FINAL: &str = "a";
/// Prefix of ISO preparation plate markers.
pub const ROLE_PREPARATION_ISO: &str = "p";
/// Prefix of job preparation plate markers.
pub const ROLE_PREPARATION_JOB: &str = "jp";
/// Prefix of stock rack markers.
pub const ROLE_STOCK: &str = "s";

const SEPARATOR: &str = "_";
const TARGET_SEPARATOR: &str = "to";

/// Creates a worklist label.
///
/// `{ticket}_{nn}_{target}` without a source marker,
/// `{ticket}_{nn}_{source}_to_{target}` with one. The worklist number is
/// zero-padded to two digits.
pub fn create_worklist_label(
    ticket_number: u32,
    worklist_number: u32,
    target_marker: &str,
    source_marker: Option<&str>,
) -> String {
    let head = format!("{ticket_number}{SEPARATOR}{worklist_number:02}");
    match source_marker {
        Some(source) => format!(
            "{head}{SEPARATOR}{source}{SEPARATOR}{TARGET_SEPARATOR}{SEPARATOR}{target_marker}"
        ),
        None => format!("{head}{SEPARATOR}{target_marker}"),
    }
}

/// Creates a plate or rack marker from a role prefix and a number (`s1`).
pub fn create_rack_marker(role: &str, number: u32) -> String {
    format!("{role}{number}")
}

/// Creates a rack label (`{ticket}_{marker}`).
pub fn create_rack_label(ticket_number: u32, rack_marker: &str) -> String {
    format!("{ticket_number}{SEPARATOR}{rack_marker}")
}
