//! Shot state tracking.
//!
//! The tracker owns the [`ShotRecord`] and the current [`TimingEstimate`].
//! Each poll checks the log's modification time first and only re-reads
//! the last line when the file has changed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use jiff::{SignedDuration, Timestamp};
use tracing::{debug, info, warn};

use crate::config::TimingConfig;
use crate::decode::{self, Decoded};
use crate::estimate;
use crate::model::{MachineState, ShotRecord, TimingEstimate};

/// Errors that can occur while opening the log.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("log source not found: {0}")]
    LogMissing(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A shot number that does not follow the last handled one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissedShot {
    pub expected: u32,
    pub observed: u32,
}

/// What one poll of the log found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poll {
    pub shot: Option<u32>,
    pub state: MachineState,
    pub shot_changed: bool,
    pub state_changed: bool,
    pub missed: Option<MissedShot>,
}

/// Identity of one version of the log file.
type Fingerprint = (SystemTime, u64);

pub struct ShotStateTracker {
    log_path: PathBuf,
    timing: TimingConfig,
    record: ShotRecord,
    estimate: Option<TimingEstimate>,
    lead: Option<SignedDuration>,
    fingerprint: Option<Fingerprint>,
    log_present: bool,
    shot_changed_at: Option<Timestamp>,
    last_handled: Option<u32>,
}

impl ShotStateTracker {
    /// Open the log and seed the record from its last line.
    ///
    /// The log must exist: without it there is nothing to track.
    pub fn open(
        log_path: impl Into<PathBuf>,
        timing: TimingConfig,
        now: Timestamp,
    ) -> Result<Self, TrackerError> {
        let log_path = log_path.into();
        let metadata = match fs::metadata(&log_path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TrackerError::LogMissing(log_path));
            }
            Err(e) => return Err(e.into()),
        };
        let modified = metadata.modified()?;
        let decoded = decode::read_last_line(&log_path)?
            .map_or(Decoded::UNKNOWN, |line| decode::decode(&line));
        let entered_at = entered_at(modified, now);

        let est = estimate::estimate(decoded.state, entered_at, None);
        let estimate = est
            .predicted_shot
            .map(|p| TimingEstimate::derive(p, &timing));

        info!(
            log = %log_path.display(),
            shot = ?decoded.shot,
            state = %decoded.state,
            predicted = ?estimate.map(|e| e.predicted_shot()),
            "tracking log"
        );

        Ok(Self {
            log_path,
            timing,
            record: ShotRecord {
                shot: decoded.shot,
                state: decoded.state,
                state_entered_at: entered_at,
            },
            estimate,
            lead: est.lead,
            fingerprint: Some((modified, metadata.len())),
            log_present: true,
            shot_changed_at: None,
            last_handled: decoded.shot,
        })
    }

    /// Check the log and update the record if it changed.
    ///
    /// A missing or empty log reads as [`MachineState::Undefined`] with both
    /// change flags false; the record keeps its last known values.
    pub fn poll(&mut self, now: Timestamp) -> Poll {
        let metadata = match fs::metadata(&self.log_path).and_then(|m| Ok((m.modified()?, m.len())))
        {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                if self.log_present {
                    warn!(log = %self.log_path.display(), error = %e, "log source unavailable");
                }
                self.log_present = false;
                self.fingerprint = None;
                return self.unchanged(MachineState::Undefined);
            }
        };
        if !self.log_present {
            info!(log = %self.log_path.display(), "log source is back");
            self.log_present = true;
        }
        if self.fingerprint == Some(metadata) {
            return self.unchanged(self.record.state);
        }
        self.fingerprint = Some(metadata);

        let line = match decode::read_last_line(&self.log_path) {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(log = %self.log_path.display(), "log is empty");
                self.fingerprint = None;
                return self.unchanged(MachineState::Undefined);
            }
            Err(e) => {
                warn!(log = %self.log_path.display(), error = %e, "failed to read log");
                self.fingerprint = None;
                return self.unchanged(MachineState::Undefined);
            }
        };
        let decoded = decode::decode(&line);
        let entered_at = entered_at(metadata.0, now);
        self.apply(decoded, entered_at)
    }

    fn apply(&mut self, decoded: Decoded, entered_at: Timestamp) -> Poll {
        let mut missed = None;
        let shot_changed = decoded.shot.is_some() && decoded.shot != self.record.shot;
        if let Some(shot) = decoded.shot
            && shot_changed
        {
            self.record.shot = Some(shot);
            self.shot_changed_at = Some(entered_at);
            missed = self.check_sequence(shot);
        }

        let state_changed = decoded.state != self.record.state;
        if state_changed {
            self.record.state = decoded.state;
            self.record.state_entered_at = entered_at;

            let previous = self.estimate.map(|e| e.predicted_shot());
            let est = estimate::estimate(decoded.state, entered_at, previous);
            self.estimate = est
                .predicted_shot
                .map(|p| TimingEstimate::derive(p, &self.timing));
            self.lead = est.lead;
        }

        if shot_changed || state_changed {
            info!(
                shot = ?self.record.shot,
                state = %self.record.state,
                lead_secs = ?self.lead.map(|l| l.as_secs()),
                predicted = ?self.estimate.map(|e| e.predicted_shot()),
                "machine state changed"
            );
        }

        Poll {
            shot: self.record.shot,
            state: self.record.state,
            shot_changed,
            state_changed,
            missed,
        }
    }

    fn check_sequence(&mut self, shot: u32) -> Option<MissedShot> {
        let base = self.last_handled?;
        let expected = base.saturating_add(1);
        if shot == expected {
            return None;
        }
        warn!(expected, observed = shot, "missed shot");
        // Report each gap once; from here on the observed shot is current.
        self.last_handled = shot.checked_sub(1);
        Some(MissedShot {
            expected,
            observed: shot,
        })
    }

    fn unchanged(&self, state: MachineState) -> Poll {
        Poll {
            shot: self.record.shot,
            state,
            shot_changed: false,
            state_changed: false,
            missed: None,
        }
    }

    /// Record that the cycle for `shot` is finished.
    pub fn mark_handled(&mut self, shot: u32) {
        if self.last_handled.is_none_or(|last| shot > last) {
            self.last_handled = Some(shot);
        }
    }

    /// Reset the missed-shot baseline after an operator renumbering.
    pub fn rebase(&mut self, last_handled: Option<u32>) {
        info!(last_handled = ?last_handled, "shot baseline reset");
        self.last_handled = last_handled;
    }

    /// Follow a log that has moved, e.g. to the next day's file.
    pub fn set_log_path(&mut self, log_path: impl Into<PathBuf>) {
        let log_path = log_path.into();
        if log_path != self.log_path {
            info!(log = %log_path.display(), "switching log source");
            self.log_path = log_path;
            self.fingerprint = None;
        }
    }

    pub fn record(&self) -> &ShotRecord {
        &self.record
    }

    pub fn estimate(&self) -> Option<TimingEstimate> {
        self.estimate
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// When the shot number last changed, if seen since startup.
    pub fn shot_changed_at(&self) -> Option<Timestamp> {
        self.shot_changed_at
    }

    pub fn last_handled(&self) -> Option<u32> {
        self.last_handled
    }
}

/// The state-entered time: the log's modification time, never later than `now`.
fn entered_at(modified: SystemTime, now: Timestamp) -> Timestamp {
    Timestamp::try_from(modified).map_or(now, |t| t.min(now))
}
