//! Shot time estimation.
//!
//! Each state with a known lead time pins the shot at
//! `entered_at + lead`. The later a state fires in the countdown, the
//! smaller its lead, so each new state tightens the prediction. States
//! without an entry carry the previous prediction forward unchanged.

use jiff::{SignedDuration, Timestamp};

use crate::model::MachineState;

/// Seconds from entering a state until the shot, measured on the plant.
///
/// Abort is negative: the prediction lands in the past and no recording
/// window opens for the aborted shot.
const LEAD_TIMES: &[(MachineState, i64)] = &[
    (MachineState::Ready, 110),
    (MachineState::PreShot, 105),
    (MachineState::Trigger, 15),
    (MachineState::Abort, -30),
];

/// The expected time from entering `state` until the shot, if known.
pub fn lead_time(state: MachineState) -> Option<SignedDuration> {
    LEAD_TIMES
        .iter()
        .find(|(s, _)| *s == state)
        .map(|(_, secs)| SignedDuration::from_secs(*secs))
}

/// A prediction and the lead time that produced it.
///
/// `lead` is `None` when the prediction was carried forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    pub predicted_shot: Option<Timestamp>,
    pub lead: Option<SignedDuration>,
}

/// Predict the shot time after entering `state` at `entered_at`.
pub fn estimate(
    state: MachineState,
    entered_at: Timestamp,
    previous: Option<Timestamp>,
) -> Estimate {
    match lead_time(state) {
        Some(lead) => Estimate {
            predicted_shot: Some(entered_at + lead),
            lead: Some(lead),
        },
        None => Estimate {
            predicted_shot: previous,
            lead: None,
        },
    }
}
