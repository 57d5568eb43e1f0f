//! A camera driven by operator-configured external commands.
//!
//! Each action runs a program (typically a GUI automation script for the
//! vendor application). Unset actions succeed without doing anything.

use std::fs;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use super::{Camera, CameraError};
use crate::config::{ArmedMarker, CameraCommands, CameraConfig};

pub struct CommandCamera {
    id: String,
    commands: CameraCommands,
    /// Result of the last arm action, used when the device offers no status check.
    last_arm: bool,
}

impl CommandCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            id: config.id.clone(),
            commands: config.commands.clone(),
            last_arm: false,
        }
    }

    /// Run `argv` with `{shot}` substituted. Returns whether it exited successfully.
    fn run(
        &self,
        action: &'static str,
        argv: &[String],
        shot: Option<u32>,
    ) -> Result<bool, CameraError> {
        let Some((program, args)) = argv.split_first() else {
            return Ok(true);
        };
        let args: Vec<String> = args
            .iter()
            .map(|a| match shot {
                Some(shot) => a.replace("{shot}", &shot.to_string()),
                None => a.clone(),
            })
            .collect();

        debug!(camera = %self.id, action, program, ?args, "running camera command");
        let output = Command::new(program)
            .args(&args)
            .output()
            .map_err(|source| CameraError::Spawn {
                command: program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(
                camera = %self.id,
                action,
                status = %output.status,
                stderr = %stderr.trim(),
                "camera command failed"
            );
        }
        Ok(output.status.success())
    }

    /// Run an action that must succeed.
    fn require(
        &self,
        action: &'static str,
        argv: Option<&Vec<String>>,
        shot: Option<u32>,
    ) -> Result<(), CameraError> {
        let Some(argv) = argv else {
            return Ok(());
        };
        if self.run(action, argv, shot)? {
            Ok(())
        } else {
            Err(CameraError::ActionFailed {
                camera: self.id.clone(),
                action,
                detail: format!("{} exited unsuccessfully", argv.join(" ")),
            })
        }
    }
}

impl Camera for CommandCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn arm(&mut self) -> Result<bool, CameraError> {
        let armed = match &self.commands.arm {
            Some(argv) => self.run("arm", argv, None)?,
            None => true,
        };
        self.last_arm = armed;
        Ok(armed)
    }

    fn arm_alternate(&mut self) -> Result<bool, CameraError> {
        let armed = match &self.commands.arm_alternate {
            Some(argv) => self.run("arm-alternate", argv, None)?,
            None => false,
        };
        self.last_arm = armed;
        Ok(armed)
    }

    fn start_recording(&mut self) -> Result<(), CameraError> {
        self.require("record", self.commands.record.as_ref(), None)
    }

    fn is_armed(&mut self) -> Result<bool, CameraError> {
        if let Some(argv) = &self.commands.armed_status {
            return self.run("armed-status", argv, None);
        }
        if let Some(marker) = &self.commands.armed_marker {
            return Ok(marker_present(marker)?);
        }
        Ok(self.last_arm)
    }

    fn export(&mut self, shot: u32) -> Result<(), CameraError> {
        self.require("export", self.commands.export.as_ref(), Some(shot))
    }
}

fn marker_present(marker: &ArmedMarker) -> std::io::Result<bool> {
    let dir: &Path = &marker.dir;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().ends_with(&marker.suffix) {
            return Ok(true);
        }
    }
    Ok(false)
}
