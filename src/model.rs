//! Core data model for shotcam.
//!
//! The plant side (machine state, the current shot record, the timing
//! estimate derived from it) and the camera side (sessions, exported files).

mod exported_file;
mod machine_state;
mod session;
mod shot;
mod timing;

pub use exported_file::{ExportedFile, FilenamePattern};
pub use machine_state::MachineState;
pub use session::{CameraRole, CameraSession, DayFolders, SessionPhase};
pub use shot::ShotRecord;
pub use timing::TimingEstimate;
