//! Shared utilities.

pub mod glob;
pub mod mime;
pub mod path;

/// Format a count with a singular/plural noun, e.g. `1 file`, `3 files`.
pub fn plural_count(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}
