//! Log line decoding.
//!
//! The machine appends one line per state transition, shaped like
//!
//! ```text
//! 2024-03-07 09:12:44 shot=44123&mode=1&state=6&
//! ```
//!
//! Only the `shot` and `state` fields matter here. Decoding never fails:
//! a missing or garbled shot yields `None`, a missing or unknown state
//! yields [`MachineState::Undefined`].

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::model::MachineState;

/// How much of the file end is read to find the last line.
const TAIL_BYTES: u64 = 4096;

/// The fields decoded from one log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    pub shot: Option<u32>,
    pub state: MachineState,
}

impl Decoded {
    pub const UNKNOWN: Self = Self {
        shot: None,
        state: MachineState::Undefined,
    };
}

/// Decode the shot number and machine state from one log line.
pub fn decode(line: &str) -> Decoded {
    let mut decoded = Decoded::UNKNOWN;
    for field in line.split('&') {
        let Some((key, value)) = field.split_once('=') else {
            continue;
        };
        // The first field may carry a timestamp prefix before the key.
        let key = key.split_whitespace().last().unwrap_or_default();
        let value = value.trim();
        match key {
            "shot" => decoded.shot = value.parse().ok(),
            "state" => {
                decoded.state = value
                    .parse()
                    .map_or(MachineState::Undefined, MachineState::from_code);
            }
            _ => {}
        }
    }
    decoded
}

/// Read the last non-empty line of the file at `path`.
///
/// Only the tail of the file is read. Returns `Ok(None)` for an empty file.
pub fn read_last_line(path: &Path) -> io::Result<Option<String>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let start = len.saturating_sub(TAIL_BYTES);
    file.seek(SeekFrom::Start(start))?;

    let mut tail = Vec::new();
    file.read_to_end(&mut tail)?;
    let text = String::from_utf8_lossy(&tail);

    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let last = lines.next_back();
    // A line that started before the tail window is cut; only trust it if it is the whole file.
    if start > 0 && lines.next().is_none() && !text.starts_with('\n') {
        return Ok(None);
    }
    Ok(last.map(str::to_string))
}
