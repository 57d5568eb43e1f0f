//! Machine state: the symbolic plant state carried by each log line.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A machine state decoded from the numeric `state=` code of a log line.
///
/// Codes the decoder does not know map to [`MachineState::Undefined`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MachineState {
    Stop,
    Exit,
    Idle,
    Run,
    Ready,
    /// Comes roughly two minutes before the shot.
    PreShot,
    Trigger,
    PostShot,
    Reset,
    Abort,
    DataFile,
    Init,
    WaitArm,
    WaitEnd,
    Fault,
    Connect,
    Set,
    Arm,
    Undefined,
}

impl MachineState {
    /// Map a numeric state code to its state.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Stop,
            2 => Self::Exit,
            3 => Self::Idle,
            4 => Self::Run,
            5 => Self::Ready,
            6 => Self::PreShot,
            8 => Self::Trigger,
            9 => Self::PostShot,
            10 => Self::Reset,
            11 => Self::Abort,
            12 => Self::DataFile,
            14 => Self::Init,
            19 => Self::WaitArm,
            20 => Self::WaitEnd,
            29 => Self::Fault,
            30 => Self::Connect,
            34 => Self::Set,
            35 => Self::Arm,
            _ => Self::Undefined,
        }
    }

    /// Whether the shot is close enough that the loop should poll at its fastest rate.
    pub fn is_imminent(self) -> bool {
        matches!(self, Self::PreShot | Self::Trigger)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "Stop",
            Self::Exit => "Exit",
            Self::Idle => "Idle",
            Self::Run => "Run",
            Self::Ready => "Ready",
            Self::PreShot => "PreShot",
            Self::Trigger => "Trigger",
            Self::PostShot => "PostShot",
            Self::Reset => "Reset",
            Self::Abort => "Abort",
            Self::DataFile => "DataFile",
            Self::Init => "Init",
            Self::WaitArm => "WaitArm",
            Self::WaitEnd => "WaitEnd",
            Self::Fault => "Fault",
            Self::Connect => "Connect",
            Self::Set => "Set",
            Self::Arm => "Arm",
            Self::Undefined => "Undefined",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_states() {
        assert_eq!(MachineState::from_code(5), MachineState::Ready);
        assert_eq!(MachineState::from_code(6), MachineState::PreShot);
        assert_eq!(MachineState::from_code(8), MachineState::Trigger);
        assert_eq!(MachineState::from_code(11), MachineState::Abort);
    }

    #[test]
    fn unknown_codes_are_undefined() {
        // 7 is a gap in the code table.
        assert_eq!(MachineState::from_code(7), MachineState::Undefined);
        assert_eq!(MachineState::from_code(0), MachineState::Undefined);
        assert_eq!(MachineState::from_code(9999), MachineState::Undefined);
    }

    #[test]
    fn only_preshot_and_trigger_are_imminent() {
        assert!(MachineState::PreShot.is_imminent());
        assert!(MachineState::Trigger.is_imminent());
        assert!(!MachineState::Ready.is_imminent());
        assert!(!MachineState::Abort.is_imminent());
    }
}
