//! Shot record: where the machine stands right now.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::MachineState;

/// The most recently observed shot number and machine state.
///
/// Owned by the tracker and updated once per detected log modification.
/// `shot` is `None` until a log line with a readable shot number has been seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotRecord {
    pub shot: Option<u32>,
    pub state: MachineState,
    pub state_entered_at: Timestamp,
}
