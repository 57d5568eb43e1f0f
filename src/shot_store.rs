//! The operator's next-shot counter.
//!
//! A single-line file written by a companion process, holding the next
//! expected shot number as the first comma-separated field.

use std::fs;
use std::path::Path;

/// Read the next expected shot number.
///
/// A missing, empty or garbled file reads as `None`.
pub fn read_next_shot(path: &Path) -> Option<u32> {
    let contents = fs::read_to_string(path).ok()?;
    let line = contents.lines().next()?;
    let field = line.split(',').next()?;
    field.trim().trim_matches('"').parse().ok()
}
