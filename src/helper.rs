//! The log-source helper process.
//!
//! Some stations need a helper running for the machine's state log to be
//! kept up to date. [`HelperProcess`] owns the child and kills it when
//! dropped, so it never outlives shotcam, whether the loop ends normally,
//! with an error, or by unwinding.

use std::io;
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::{info, warn};

use crate::config::HelperConfig;

#[derive(Debug, thiserror::Error)]
pub enum HelperError {
    #[error("helper command is empty")]
    EmptyCommand,

    #[error("failed to start helper {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// A running helper. Killed and reaped on drop.
#[derive(Debug)]
pub struct HelperProcess {
    program: String,
    child: Child,
    exited: bool,
}

impl HelperProcess {
    pub fn spawn(config: &HelperConfig) -> Result<Self, HelperError> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or(HelperError::EmptyCommand)?;
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| HelperError::Spawn {
                program: program.clone(),
                source,
            })?;
        info!(program, pid = child.id(), "started helper");
        Ok(Self {
            program: program.clone(),
            child,
            exited: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// The exit status, if the helper has stopped on its own. Logged once.
    pub fn check(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                if !self.exited {
                    warn!(program = %self.program, %status, "helper exited");
                    self.exited = true;
                }
                Some(status)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(program = %self.program, error = %e, "failed to check helper");
                None
            }
        }
    }
}

impl Drop for HelperProcess {
    fn drop(&mut self) {
        if self.exited {
            return;
        }
        if let Err(e) = self.child.kill() {
            // Already gone; still reap it below.
            warn!(program = %self.program, error = %e, "failed to kill helper");
        }
        match self.child.wait() {
            Ok(status) => info!(program = %self.program, %status, "stopped helper"),
            Err(e) => warn!(program = %self.program, error = %e, "failed to reap helper"),
        }
    }
}
