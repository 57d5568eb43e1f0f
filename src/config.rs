//! shotcam configuration.
//!
//! Loaded from `~/.shotcam/config.toml` unless `--config` points elsewhere.
//! One `Config` is built at startup and handed to each component; nothing
//! reads it globally.
//!
//! ```toml
//! log-path = "/data/logs/prx%y%m%d"
//! shot-number-path = "/data/next_shot.csv"
//!
//! [hours]
//! start = "07:50"
//! stop = "20:10"
//!
//! [[camera]]
//! id = "ircam"
//! role = "scientific"
//! export-dir = "C:/IRCAM/auto_export"
//! filename-pattern = "{shot}.RAW"
//! archive-root = "D:/movies"
//! remote-root = "//freia/ircam"
//! ```

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use jiff::civil::{self, Time};
use jiff::fmt::strtime;
use jiff::tz::TimeZone;
use jiff::{SignedDuration, Timestamp, Zoned};
use serde::Deserialize;

use crate::model::{CameraRole, FilenamePattern};

/// Errors that can occur while loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config file found at {0}")]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("time error: {0}")]
    Time(#[from] jiff::Error),

    #[error("{0}")]
    Invalid(String),
}

pub type Result<T> = core::result::Result<T, ConfigError>;

/// shotcam configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Path of the machine's state log. May contain strftime directives,
    /// e.g. `prx%y%m%d` for a log file named per day.
    pub log_path: String,

    /// Single-line file holding the next expected shot number.
    pub shot_number_path: Option<PathBuf>,

    /// Operator journal. Defaults to `~/.shotcam/journal.jsonl`.
    pub journal_path: Option<PathBuf>,

    /// IANA time zone name for operating hours and day folders.
    /// Defaults to the system time zone.
    pub time_zone: Option<String>,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub cadence: CadenceConfig,

    #[serde(default)]
    pub hours: HoursConfig,

    pub helper: Option<HelperConfig>,

    #[serde(rename = "camera", default)]
    pub cameras: Vec<CameraConfig>,
}

impl Config {
    /// Load and validate the config at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a config from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// The config file path: `~/.shotcam/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".shotcam").join("config.toml"))
    }

    /// The journal path, falling back to `~/.shotcam/journal.jsonl`.
    pub fn journal_path(&self) -> Option<PathBuf> {
        self.journal_path
            .clone()
            .or_else(|| dirs::home_dir().map(|h| h.join(".shotcam").join("journal.jsonl")))
    }

    /// The configured time zone, or the system one.
    pub fn time_zone(&self) -> Result<TimeZone> {
        match self.time_zone.as_deref() {
            Some(name) if name.eq_ignore_ascii_case("utc") => Ok(TimeZone::UTC),
            Some(name) => Ok(TimeZone::get(name)?),
            None => Ok(TimeZone::system()),
        }
    }

    /// The log path with its strftime directives expanded for `now`.
    pub fn log_path_at(&self, now: &Zoned) -> Result<PathBuf> {
        Ok(PathBuf::from(strtime::format(&self.log_path, now)?))
    }

    /// Cameras with `active = true`.
    pub fn active_cameras(&self) -> impl Iterator<Item = &CameraConfig> {
        self.cameras.iter().filter(|c| c.active)
    }

    pub fn camera(&self, id: &str) -> Option<&CameraConfig> {
        self.cameras.iter().find(|c| c.id == id)
    }

    fn validate(&self) -> Result<()> {
        if self.log_path.trim().is_empty() {
            return Err(invalid("log-path is empty"));
        }
        let probe = Timestamp::UNIX_EPOCH.to_zoned(TimeZone::UTC);
        strtime::format(&self.log_path, &probe).map_err(|e| {
            invalid(format!(
                "log-path '{}' is not a valid template: {e}",
                self.log_path
            ))
        })?;
        self.time_zone()?;

        if self.active_cameras().next().is_none() {
            return Err(invalid("no active cameras configured"));
        }
        let mut seen = HashSet::new();
        for camera in &self.cameras {
            if camera.id.trim().is_empty() {
                return Err(invalid("camera id is empty"));
            }
            if !seen.insert(camera.id.as_str()) {
                return Err(invalid(format!("duplicate camera id '{}'", camera.id)));
            }
            camera.commands.validate(&camera.id)?;
        }

        self.cadence.validate()?;
        self.hours.validate()?;
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

// ── Timing ──

/// Fixed offsets around the predicted shot time, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TimingConfig {
    /// How long a protection camera records.
    pub record_duration_secs: u64,

    /// How far ahead of the predicted shot recording starts.
    pub pre_shot_margin_secs: u64,

    /// How long after the shot before cameras are re-armed.
    pub rearm_settle_secs: u64,

    /// How long after the recording finish before export is attempted.
    pub export_settle_secs: u64,

    /// The shortest plausible gap between two shots.
    pub min_intershot_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            record_duration_secs: 15,
            pre_shot_margin_secs: 6,
            rearm_settle_secs: 120,
            export_settle_secs: 5,
            min_intershot_secs: 180,
        }
    }
}

impl TimingConfig {
    pub fn record_duration(&self) -> SignedDuration {
        secs(self.record_duration_secs)
    }

    pub fn pre_shot_margin(&self) -> SignedDuration {
        secs(self.pre_shot_margin_secs)
    }

    pub fn rearm_settle(&self) -> SignedDuration {
        secs(self.rearm_settle_secs)
    }

    pub fn export_settle(&self) -> SignedDuration {
        secs(self.export_settle_secs)
    }

    pub fn min_intershot(&self) -> SignedDuration {
        secs(self.min_intershot_secs)
    }
}

fn secs(value: u64) -> SignedDuration {
    SignedDuration::from_secs(i64::try_from(value).unwrap_or(i64::MAX))
}

// ── Cadence ──

/// Poll intervals for the orchestration loop, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CadenceConfig {
    /// While a shot is imminent or a deadline is close.
    pub preshot_secs: u64,

    /// Quiet periods inside operating hours.
    pub ops_secs: u64,

    /// Outside operating hours.
    pub non_ops_secs: u64,

    /// The date is checked every this many loop ticks.
    pub day_check_every: u32,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            preshot_secs: 1,
            ops_secs: 25,
            non_ops_secs: 600,
            day_check_every: 8,
        }
    }
}

impl CadenceConfig {
    fn validate(&self) -> Result<()> {
        if self.preshot_secs == 0 || self.ops_secs == 0 || self.non_ops_secs == 0 {
            return Err(invalid("cadence intervals must be positive"));
        }
        if self.day_check_every == 0 {
            return Err(invalid("cadence day-check-every must be positive"));
        }
        Ok(())
    }
}

// ── Operating hours ──

/// When the plant runs: a daily window on the listed ISO weekdays (Monday = 1).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct HoursConfig {
    pub start: Time,
    pub stop: Time,
    pub days: Vec<i8>,
}

impl Default for HoursConfig {
    fn default() -> Self {
        Self {
            start: civil::time(7, 50, 0, 0),
            stop: civil::time(20, 10, 0, 0),
            days: vec![1, 2, 3, 4, 5, 6],
        }
    }
}

impl HoursConfig {
    fn validate(&self) -> Result<()> {
        if self.start >= self.stop {
            return Err(invalid(format!(
                "hours start {} must be before stop {}",
                self.start, self.stop
            )));
        }
        if let Some(day) = self.days.iter().find(|d| !(1..=7).contains(*d)) {
            return Err(invalid(format!("hours day {day} is not an ISO weekday (1-7)")));
        }
        Ok(())
    }
}

// ── Helper process ──

/// The log-source helper spawned at startup and killed on exit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HelperConfig {
    /// Program and arguments.
    pub command: Vec<String>,

    #[serde(default = "default_startup_wait")]
    pub startup_wait_secs: u64,
}

fn default_startup_wait() -> u64 {
    5
}

// ── Cameras ──

/// One `[[camera]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CameraConfig {
    pub id: String,
    pub role: CameraRole,

    #[serde(default = "default_active")]
    pub active: bool,

    /// Where the camera application writes its movies.
    pub export_dir: PathBuf,

    /// Movie filename, e.g. `{shot}.ats`.
    pub filename_pattern: FilenamePattern,

    /// Day folders are created under here.
    pub archive_root: PathBuf,

    /// Long-term store mirrored alongside the local archive.
    pub remote_root: Option<PathBuf>,

    /// Where a stale export directory is emptied into.
    /// Defaults to `<export-dir>/../auto_export_backup`.
    pub backup_dir: Option<PathBuf>,

    #[serde(default)]
    pub commands: CameraCommands,
}

fn default_active() -> bool {
    true
}

impl CameraConfig {
    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir.clone().unwrap_or_else(|| {
            self.export_dir
                .parent()
                .unwrap_or(&self.export_dir)
                .join("auto_export_backup")
        })
    }
}

/// External commands that drive a camera application.
///
/// Each is a program followed by its arguments. `{shot}` in an argument is
/// replaced by the shot number where one is known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CameraCommands {
    pub arm: Option<Vec<String>>,
    pub arm_alternate: Option<Vec<String>>,
    pub record: Option<Vec<String>>,
    pub export: Option<Vec<String>>,

    /// Exit status 0 means armed.
    pub armed_status: Option<Vec<String>>,

    /// Armed while a matching file exists. Used when `armed-status` is unset.
    pub armed_marker: Option<ArmedMarker>,
}

impl CameraCommands {
    fn validate(&self, camera: &str) -> Result<()> {
        let named = [
            ("arm", &self.arm),
            ("arm-alternate", &self.arm_alternate),
            ("record", &self.record),
            ("export", &self.export),
            ("armed-status", &self.armed_status),
        ];
        for (name, command) in named {
            if let Some(argv) = command
                && argv.first().is_none_or(|p| p.trim().is_empty())
            {
                return Err(invalid(format!(
                    "camera '{camera}': {name} command has no program"
                )));
            }
        }
        Ok(())
    }
}

/// A file whose presence means the camera is armed
/// (e.g. the `.space` file some acquisition software writes while waiting).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ArmedMarker {
    pub dir: PathBuf,

    /// Matched against the end of each file name, e.g. `.space`.
    pub suffix: String,
}
