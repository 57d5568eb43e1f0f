//! Camera capability interface.
//!
//! The orchestrator drives every device through [`Camera`]. How a device
//! is actually armed or triggered (synthetic input, a vendor CLI, a
//! network call) lives behind the trait.

pub mod command;

use std::io;

use tracing::warn;

pub use command::CommandCamera;

/// Errors raised by a camera action.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("{action} failed on camera {camera}: {detail}")]
    ActionFailed {
        camera: String,
        action: &'static str,
        detail: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Actions the orchestrator can ask of a device.
pub trait Camera {
    fn id(&self) -> &str;

    /// Put the device into armed mode. Returns whether the action reported success.
    fn arm(&mut self) -> Result<bool, CameraError>;

    /// A second way of arming, tried when [`Camera::arm`] did not take.
    fn arm_alternate(&mut self) -> Result<bool, CameraError>;

    /// Start recording now.
    fn start_recording(&mut self) -> Result<(), CameraError>;

    /// The device's own view of whether it is armed.
    fn is_armed(&mut self) -> Result<bool, CameraError>;

    /// Write the movie for `shot` to the export directory, for devices
    /// that do not export on their own.
    fn export(&mut self, shot: u32) -> Result<(), CameraError> {
        let _ = shot;
        Ok(())
    }
}

/// How an arm attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    Armed,
    /// The first attempt did not take; the alternate action did.
    ArmedOnRetry,
    NotArmed,
}

impl ArmOutcome {
    pub fn is_armed(self) -> bool {
        !matches!(self, Self::NotArmed)
    }
}

/// Arm `camera` and confirm it with the device, retrying once with the
/// alternate action.
pub fn arm_with_retry(camera: &mut dyn Camera) -> Result<ArmOutcome, CameraError> {
    if camera.arm()? && camera.is_armed()? {
        return Ok(ArmOutcome::Armed);
    }
    warn!(camera = %camera.id(), "arm did not take, trying alternate action");
    if camera.arm_alternate()? && camera.is_armed()? {
        return Ok(ArmOutcome::ArmedOnRetry);
    }
    Ok(ArmOutcome::NotArmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Arms on the n-th attempt (1-based); never when `None`.
    struct Stubborn {
        attempts: u32,
        arms_on: Option<u32>,
        armed: bool,
    }

    impl Stubborn {
        fn new(arms_on: Option<u32>) -> Self {
            Self {
                attempts: 0,
                arms_on,
                armed: false,
            }
        }

        fn attempt(&mut self) -> bool {
            self.attempts += 1;
            self.armed = self.arms_on == Some(self.attempts);
            true
        }
    }

    impl Camera for Stubborn {
        fn id(&self) -> &str {
            "stub"
        }

        fn arm(&mut self) -> Result<bool, CameraError> {
            Ok(self.attempt())
        }

        fn arm_alternate(&mut self) -> Result<bool, CameraError> {
            Ok(self.attempt())
        }

        fn start_recording(&mut self) -> Result<(), CameraError> {
            Ok(())
        }

        fn is_armed(&mut self) -> Result<bool, CameraError> {
            Ok(self.armed)
        }
    }

    #[test]
    fn arms_first_time() {
        let mut camera = Stubborn::new(Some(1));

        assert_eq!(arm_with_retry(&mut camera).unwrap(), ArmOutcome::Armed);
        assert_eq!(camera.attempts, 1);
    }

    #[test]
    fn retries_once_with_alternate() {
        let mut camera = Stubborn::new(Some(2));

        assert_eq!(arm_with_retry(&mut camera).unwrap(), ArmOutcome::ArmedOnRetry);
        assert_eq!(camera.attempts, 2);
    }

    #[test]
    fn gives_up_after_one_retry() {
        let mut camera = Stubborn::new(None);

        let outcome = arm_with_retry(&mut camera).unwrap();

        assert_eq!(outcome, ArmOutcome::NotArmed);
        assert!(!outcome.is_armed());
        assert_eq!(camera.attempts, 2);
    }

    #[test]
    fn default_export_is_a_no_op() {
        let mut camera = Stubborn::new(None);
        assert!(camera.export(44123).is_ok());
    }
}
