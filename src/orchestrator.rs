//! The orchestration loop.
//!
//! One tick:
//!
//! 1. every `day-check-every` ticks, look at the date and prepare day folders
//! 2. poll the tracker for the machine's shot and state
//! 3. cross-check the operator's next-shot counter
//! 4. on a fresh abort, disarm everything; otherwise, inside operating
//!    hours, step each camera session against the timing estimate
//! 5. pick the next sleep from the state and the nearest deadline
//!
//! Sessions move `Unarmed → Armed → Recording → ExportPending → Unarmed`.
//! A failing camera is logged and left for the next tick; it never stops
//! the loop or the other cameras.

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use jiff::civil::Date;
use jiff::tz::TimeZone;
use jiff::{SignedDuration, Timestamp, Zoned};
use tracing::{debug, error, info, warn};

use crate::archive;
use crate::camera::{self, Camera, CameraError, CommandCamera};
use crate::config::{CameraConfig, Config, ConfigError, TimingConfig};
use crate::helper::HelperProcess;
use crate::journal::{Journal, JournalEntry};
use crate::model::{CameraSession, MachineState, SessionPhase, TimingEstimate};
use crate::reconcile::{self, Freshness, Outcome, ReconcileError};
use crate::schedule::{self, DayTicker};
use crate::shot_store;
use crate::tracker::{ShotStateTracker, TrackerError};

/// Errors that stop the orchestrator from starting.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("no active cameras configured")]
    NoActiveCameras,

    #[error("camera {0} is not an active camera in the config")]
    UnknownCamera(String),
}

/// Errors from one camera's step. Logged, never fatal.
#[derive(Debug, thiserror::Error)]
enum SessionError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

pub struct Orchestrator {
    config: Config,
    tz: TimeZone,
    tracker: ShotStateTracker,
    slots: Vec<Slot>,
    journal: Option<Journal>,
    ticker: DayTicker,
    operating: Option<bool>,
    next_shot: Option<u32>,
    /// The last value read from the next-shot store, kept across unreadable ticks.
    store_seen: Option<u32>,
}

/// A camera session with its device and config.
struct Slot {
    config: CameraConfig,
    session: CameraSession,
    camera: Box<dyn Camera>,
    arm_failures: u32,
    arm_blocked_until: Option<Timestamp>,
    last_file_count: Option<usize>,
}

/// What every session sees during one tick.
struct Tick<'a> {
    now: Timestamp,
    shot: Option<u32>,
    state: MachineState,
    estimate: Option<TimingEstimate>,
    timing: &'a TimingConfig,
    freshness: Freshness,
    next_shot: Option<u32>,
    arm_retry: SignedDuration,
    journal: Option<&'a Journal>,
}

impl Orchestrator {
    /// Build the orchestrator for `config`, driving each active camera
    /// through its configured commands.
    pub fn open(config: &Config, now: Timestamp) -> Result<Self, OrchestratorError> {
        let tz = config.time_zone()?;
        let log_path = config.log_path_at(&now.to_zoned(tz))?;
        let tracker = ShotStateTracker::open(log_path, config.timing.clone(), now)?;
        let cameras = config
            .active_cameras()
            .map(|c| Box::new(CommandCamera::new(c)) as Box<dyn Camera>)
            .collect();
        let journal = config.journal_path().map(Journal::new);
        Self::new(config.clone(), tracker, cameras, journal)
    }

    /// Build the orchestrator around already constructed cameras.
    /// Each camera's id must name an active `[[camera]]` in `config`.
    pub fn new(
        config: Config,
        tracker: ShotStateTracker,
        cameras: Vec<Box<dyn Camera>>,
        journal: Option<Journal>,
    ) -> Result<Self, OrchestratorError> {
        let tz = config.time_zone()?;
        let mut slots = Vec::with_capacity(cameras.len());
        for camera in cameras {
            let camera_config = config
                .camera(camera.id())
                .filter(|c| c.active)
                .cloned()
                .ok_or_else(|| OrchestratorError::UnknownCamera(camera.id().to_string()))?;
            slots.push(Slot {
                session: CameraSession::new(
                    &camera_config.id,
                    camera_config.role,
                    &camera_config.export_dir,
                ),
                config: camera_config,
                camera,
                arm_failures: 0,
                arm_blocked_until: None,
                last_file_count: None,
            });
        }
        if slots.is_empty() {
            return Err(OrchestratorError::NoActiveCameras);
        }
        let ticker = DayTicker::new(config.cadence.day_check_every);
        Ok(Self {
            config,
            tz,
            tracker,
            slots,
            journal,
            ticker,
            operating: None,
            next_shot: None,
            store_seen: None,
        })
    }

    /// Run until `shutdown` is set.
    pub fn run(&mut self, shutdown: &AtomicBool, mut helper: Option<&mut HelperProcess>) {
        let cameras: Vec<_> = self.slots.iter().map(|s| s.session.id.as_str()).collect();
        let helper_pid = helper.as_deref().map(HelperProcess::id);
        info!(?cameras, ?helper_pid, "orchestrator started");
        loop {
            if let Some(helper) = helper.as_deref_mut() {
                helper.check();
            }
            let sleep = self.tick(Timestamp::now());
            debug!(sleep_secs = sleep.as_secs(), "sleeping");
            if schedule::sleep_unless(shutdown, sleep) {
                break;
            }
        }
        let armed: Vec<_> = self
            .sessions()
            .filter(|s| s.is_armed())
            .map(|s| s.id.as_str())
            .collect();
        info!(?armed, "orchestrator stopped");
    }

    /// Run one loop iteration at `now`. Returns how long to sleep.
    pub fn tick(&mut self, now: Timestamp) -> Duration {
        let zoned = now.to_zoned(self.tz.clone());
        if let Some(date) = self.ticker.tick(zoned.date()) {
            self.roll_day(date, &zoned, now);
        }
        let operating = schedule::is_operating(&self.config.hours, &zoned);
        self.note_operating(operating);

        let poll = self.tracker.poll(now);
        if let Some(missed) = poll.missed {
            note(
                self.journal.as_ref(),
                &JournalEntry::MissedShot {
                    at: now,
                    expected: missed.expected,
                    observed: missed.observed,
                },
            );
        }
        self.check_shot_store(now);

        if poll.state == MachineState::Abort && poll.state_changed {
            self.abort(poll.shot, now);
        } else if operating {
            self.step_sessions(poll.shot, poll.state, now);
        }

        schedule::poll_interval(
            poll.state,
            operating,
            self.tracker.estimate(),
            now,
            &self.config.cadence,
        )
    }

    pub fn sessions(&self) -> impl Iterator<Item = &CameraSession> {
        self.slots.iter().map(|s| &s.session)
    }

    #[cfg(test)]
    pub fn session(&self, id: &str) -> Option<&CameraSession> {
        self.sessions().find(|s| s.id == id)
    }

    #[cfg(test)]
    pub fn tracker(&self) -> &ShotStateTracker {
        &self.tracker
    }

    // ── Day boundary ──

    fn roll_day(&mut self, date: Date, zoned: &Zoned, now: Timestamp) {
        info!(%date, "new day");
        match self.config.log_path_at(zoned) {
            Ok(path) => self.tracker.set_log_path(path),
            Err(e) => warn!(error = %e, "failed to expand log path"),
        }
        for slot in &mut self.slots {
            match archive::prepare_day(&slot.config, date) {
                Ok(prepared) => {
                    note(
                        self.journal.as_ref(),
                        &JournalEntry::DayRolled {
                            at: now,
                            camera: slot.session.id.clone(),
                            date,
                            archived: prepared.archived,
                            remote: prepared.folders.remote.is_some(),
                        },
                    );
                    if prepared.archived > 0 {
                        slot.last_file_count = None;
                    }
                    slot.session.destinations = Some(prepared.folders);
                }
                Err(e) => {
                    error!(
                        camera = %slot.session.id,
                        %date,
                        error = %e,
                        "failed to prepare day folders"
                    );
                    slot.session.destinations = None;
                }
            }
        }
    }

    fn note_operating(&mut self, operating: bool) {
        if self.operating == Some(operating) {
            return;
        }
        match (self.operating, operating) {
            (_, true) => info!("good morning: inside operating hours"),
            (Some(true), false) => info!("goodnight: outside operating hours"),
            (_, false) => info!("outside operating hours"),
        }
        self.operating = Some(operating);
    }

    // ── Shot numbering ──

    /// A counter that moves backwards is an operator renumbering. Only the
    /// change itself rebases; a counter that sits still is left alone.
    fn check_shot_store(&mut self, now: Timestamp) {
        let Some(path) = &self.config.shot_number_path else {
            return;
        };
        self.next_shot = shot_store::read_next_shot(path);
        let Some(next) = self.next_shot else {
            return;
        };
        let Some(previous) = self.store_seen.replace(next) else {
            return;
        };
        if next >= previous {
            return;
        }
        if let Some(last) = self.tracker.last_handled()
            && next <= last
        {
            warn!(
                next_shot = next,
                previous,
                last_handled = last,
                "shot counter went backwards, treating as operator reset"
            );
            self.tracker.rebase(next.checked_sub(1));
            note(
                self.journal.as_ref(),
                &JournalEntry::ShotStoreReset {
                    at: now,
                    next_shot: next,
                    last_handled: last,
                },
            );
        }
    }

    // ── Sessions ──

    fn abort(&mut self, shot: Option<u32>, now: Timestamp) {
        let mut disarmed = Vec::new();
        for slot in &mut self.slots {
            if slot.session.phase != SessionPhase::Unarmed {
                slot.session.phase = SessionPhase::Unarmed;
                disarmed.push(slot.session.id.clone());
            }
        }
        warn!(?shot, cameras = ?disarmed, "shot aborted, cameras disarmed without export");
        note(
            self.journal.as_ref(),
            &JournalEntry::Aborted {
                at: now,
                shot,
                cameras: disarmed,
            },
        );
        if let Some(shot) = shot {
            self.tracker.mark_handled(shot);
        }
    }

    fn step_sessions(&mut self, shot: Option<u32>, state: MachineState, now: Timestamp) {
        let estimate = self.tracker.estimate();
        let tick = Tick {
            now,
            shot,
            state,
            estimate,
            timing: &self.config.timing,
            freshness: Freshness {
                shot_changed_at: self.tracker.shot_changed_at(),
                max_age: self.config.timing.min_intershot(),
            },
            next_shot: self.next_shot,
            arm_retry: SignedDuration::from_secs(
                i64::try_from(self.config.cadence.ops_secs).unwrap_or(i64::MAX),
            ),
            journal: self.journal.as_ref(),
        };

        let mut finished = false;
        for slot in &mut self.slots {
            match slot.step(&tick) {
                Ok(done) => finished |= done,
                Err(e) => error!(
                    camera = %slot.session.id,
                    phase = ?slot.session.phase,
                    shot = ?tick.shot,
                    state = %tick.state,
                    predicted = ?estimate.map(|est| est.predicted_shot()),
                    recording_start = ?estimate.map(|est| est.recording_start()),
                    recording_finish = ?estimate.map(|est| est.recording_finish()),
                    error = %e,
                    "camera step failed"
                ),
            }
        }
        if finished && let Some(shot) = shot {
            self.tracker.mark_handled(shot);
        }
    }
}

impl Tick<'_> {
    /// Arming is allowed unless a shot is in progress: between the
    /// predicted shot and the re-arm deadline the camera is busy.
    fn may_arm(&self) -> bool {
        self.estimate
            .is_none_or(|e| self.now <= e.predicted_shot() || self.now >= e.rearm())
    }
}

/// Whether a camera that is armed should now be recording.
///
/// Past the predicted shot but before the recording finish still counts:
/// the shot may have passed between two ticks.
fn capture_open(estimate: TimingEstimate, now: Timestamp) -> bool {
    estimate.in_recording_window(now)
        || (now >= estimate.recording_start() && now < estimate.recording_finish())
}

impl Slot {
    /// Advance this session. Returns whether a recording cycle finished.
    fn step(&mut self, tick: &Tick<'_>) -> Result<bool, SessionError> {
        if self.session.phase == SessionPhase::Unarmed {
            if !tick.may_arm() || self.arm_blocked_until.is_some_and(|t| tick.now < t) {
                return Ok(false);
            }
            self.arm(tick)?;
        }
        let Some(estimate) = tick.estimate else {
            return Ok(false);
        };

        if self.session.phase == SessionPhase::Armed && capture_open(estimate, tick.now) {
            self.start_recording()?;
        }
        if self.session.phase == SessionPhase::Recording
            && tick.now >= estimate.recording_finish() + tick.timing.export_settle()
        {
            self.session.phase = SessionPhase::ExportPending;
        }
        if self.session.phase == SessionPhase::ExportPending {
            let result = self.export_and_reconcile(tick);
            self.session.phase = SessionPhase::Unarmed;
            result?;
            return Ok(true);
        }
        Ok(false)
    }

    fn arm(&mut self, tick: &Tick<'_>) -> Result<(), SessionError> {
        let outcome = camera::arm_with_retry(self.camera.as_mut())?;
        if outcome.is_armed() {
            info!(camera = %self.session.id, ?outcome, "armed");
            self.session.phase = SessionPhase::Armed;
            self.arm_failures = 0;
            self.arm_blocked_until = None;
            return Ok(());
        }
        // Given up for this cycle: next try at the re-arm deadline.
        let retry_at = tick
            .estimate
            .map(|e| e.rearm())
            .filter(|t| *t > tick.now)
            .unwrap_or(tick.now + tick.arm_retry);
        self.arm_blocked_until = Some(retry_at);
        self.arm_failures += 1;
        warn!(
            camera = %self.session.id,
            shot = ?tick.shot,
            attempts = self.arm_failures,
            %retry_at,
            "camera did not arm, will retry"
        );
        if self.arm_failures == 1 {
            note(
                tick.journal,
                &JournalEntry::ArmFailed {
                    at: tick.now,
                    camera: self.session.id.clone(),
                    shot: tick.shot,
                },
            );
        }
        Ok(())
    }

    fn start_recording(&mut self) -> Result<(), SessionError> {
        if self.session.role.needs_trigger() {
            self.camera.start_recording()?;
            info!(camera = %self.session.id, "recording started");
        } else {
            debug!(camera = %self.session.id, "armed for hardware trigger");
        }
        self.session.phase = SessionPhase::Recording;
        Ok(())
    }

    fn export_and_reconcile(&mut self, tick: &Tick<'_>) -> Result<(), SessionError> {
        let id = &self.session.id;
        let Some(shot) = tick.shot else {
            warn!(camera = %id, "no shot number known, skipping reconciliation");
            return Ok(());
        };
        if let Err(e) = self.camera.export(shot) {
            warn!(camera = %id, shot, error = %e, "export action failed");
        }
        if let Some(next) = tick.next_shot
            && next != shot
            && Some(next) != shot.checked_add(1)
        {
            warn!(camera = %id, shot, next_shot = next, "shot counter disagrees with log");
        }

        let reconciliation = reconcile::reconcile(
            &self.session.export_dir,
            shot,
            &self.config.filename_pattern,
            tick.freshness,
            tick.now,
        )?;
        let outcome = reconciliation.outcome;
        let mut file = reconciliation.file.clone();
        match outcome {
            Outcome::Renamed | Outcome::AlreadyCorrect => {
                info!(camera = %id, shot, ?outcome, file = ?file, "movie reconciled");
            }
            Outcome::Missing => warn!(camera = %id, shot, "no movie found after shot"),
            Outcome::Stale | Outcome::Ambiguous => {
                warn!(camera = %id, shot, ?outcome, file = ?file, "movie needs checking by hand");
            }
        }

        if outcome.is_success() {
            self.session.files_exported += 1;
            if let (Some(path), Some(folders)) = (&reconciliation.file, &self.session.destinations)
            {
                match archive::relocate(path, folders) {
                    Ok(relocation) => {
                        info!(
                            camera = %id,
                            shot,
                            local = %relocation.local.display(),
                            remote = ?relocation.remote,
                            "movie archived"
                        );
                        file = Some(relocation.local);
                    }
                    Err(e) => error!(camera = %id, shot, error = %e, "failed to archive movie"),
                }
            }
        }

        if self.last_file_count == Some(reconciliation.files_seen) {
            warn!(camera = %id, shot, files = reconciliation.files_seen, "no new file after shot");
        }
        self.last_file_count = Some(reconciliation.files_seen);

        note(
            tick.journal,
            &JournalEntry::Reconciled {
                at: tick.now,
                camera: id.clone(),
                shot,
                outcome,
                file,
            },
        );
        Ok(())
    }
}

/// Append to the journal, if there is one. Failures are logged.
fn note(journal: Option<&Journal>, entry: &JournalEntry) {
    if let Some(journal) = journal
        && let Err(e) = journal.append(entry)
    {
        warn!(journal = %journal.path().display(), error = %e, "failed to write journal");
    }
}
