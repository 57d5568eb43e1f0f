//! Timing estimate: the predicted shot time and every deadline derived from it.

use jiff::{SignedDuration, Timestamp};

use crate::config::TimingConfig;

/// A predicted shot time together with its dependent deadlines.
///
/// Only constructible through [`TimingEstimate::derive`], so the deadlines
/// always belong to the prediction they sit next to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingEstimate {
    predicted_shot: Timestamp,
    recording_start: Timestamp,
    recording_finish: Timestamp,
    rearm: Timestamp,
}

impl TimingEstimate {
    /// Derive all deadlines from a predicted shot time.
    ///
    /// - recording start = shot − pre-shot margin
    /// - recording finish = shot + recording duration − pre-shot margin
    /// - re-arm = shot + re-arm settle time
    pub fn derive(predicted_shot: Timestamp, timing: &TimingConfig) -> Self {
        let margin = timing.pre_shot_margin();
        Self {
            predicted_shot,
            recording_start: predicted_shot - margin,
            recording_finish: predicted_shot + timing.record_duration() - margin,
            rearm: predicted_shot + timing.rearm_settle(),
        }
    }

    pub fn predicted_shot(&self) -> Timestamp {
        self.predicted_shot
    }

    pub fn recording_start(&self) -> Timestamp {
        self.recording_start
    }

    pub fn recording_finish(&self) -> Timestamp {
        self.recording_finish
    }

    pub fn rearm(&self) -> Timestamp {
        self.rearm
    }

    /// Time remaining until the predicted shot. Negative once it has passed.
    pub fn until_shot(&self, now: Timestamp) -> SignedDuration {
        self.predicted_shot.duration_since(now)
    }

    /// Whether `now` falls inside the pre-shot recording window:
    /// at or after the recording start and not yet past the predicted shot.
    pub fn in_recording_window(&self, now: Timestamp) -> bool {
        now >= self.recording_start && now <= self.predicted_shot
    }

    /// The earliest deadline still ahead of `now`, if any.
    pub fn next_deadline(&self, now: Timestamp) -> Option<Timestamp> {
        [
            self.recording_start,
            self.predicted_shot,
            self.recording_finish,
            self.rearm,
        ]
        .into_iter()
        .filter(|t| *t > now)
        .min()
    }
}
