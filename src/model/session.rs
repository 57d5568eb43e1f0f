//! Camera sessions: per-device recording state held by the orchestrator.

use std::path::PathBuf;

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

/// How a camera takes part in a shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CameraRole {
    /// Must be told to start recording just before the shot.
    Protection,

    /// Armed ahead of time and captures on the machine's hardware trigger.
    Scientific,
}

impl CameraRole {
    /// Whether the orchestrator has to start recording itself.
    pub fn needs_trigger(self) -> bool {
        matches!(self, Self::Protection)
    }
}

/// Where a session is in its recording cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Unarmed,
    Armed,
    /// Inside the capture window for the current shot.
    Recording,
    /// The capture window has closed; the exported file still has to be reconciled.
    ExportPending,
}

/// Today's destination folders for one camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayFolders {
    pub date: Date,

    /// `<archive-root>/<YYYY-MM-DD>/`
    pub local: PathBuf,

    /// `<remote-root>/<YYYY-MM-DD>/`, when configured and reachable.
    pub remote: Option<PathBuf>,
}

/// One configured, active camera and its recording state.
#[derive(Debug, Clone)]
pub struct CameraSession {
    pub id: String,
    pub role: CameraRole,
    pub phase: SessionPhase,
    pub files_exported: usize,
    pub export_dir: PathBuf,
    pub destinations: Option<DayFolders>,
}

impl CameraSession {
    pub fn new(id: impl Into<String>, role: CameraRole, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            role,
            phase: SessionPhase::Unarmed,
            files_exported: 0,
            export_dir: export_dir.into(),
            destinations: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.phase, SessionPhase::Armed | SessionPhase::Recording)
    }
}
