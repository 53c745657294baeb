//! Remote control of the live schedule.
//!
//! A client opens a TCP connection, writes one [`Command`] as a line of
//! JSON and closes its side.  The server executes it against the
//! [`Scheduler`] and closes the connection without replying.
//!
//! ```text
//! {"kind":"START","resource":{"number":7,"name":"Roof cam",...}}
//! {"kind":"STOP","resource":{"number":7,...}}
//! ```

mod client;
mod server;

pub use client::send_command;
pub use server::{ControlEndpoint, MAX_COMMAND_BYTES};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resource::Resource;
use crate::scheduler::{Scheduler, SchedulerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandKind {
    Start,
    Stop,
}

/// One control message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub resource: Resource,
}

/// Failure to receive a command on one connection.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed command: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("timed out waiting for a command")]
    Timeout,

    #[error("command exceeds {} bytes", MAX_COMMAND_BYTES)]
    TooLarge,

    #[error("connection closed before a command was sent")]
    Empty,
}

impl Command {
    pub fn start(resource: Resource) -> Self {
        Self {
            kind: CommandKind::Start,
            resource,
        }
    }

    pub fn stop(resource: Resource) -> Self {
        Self {
            kind: CommandKind::Stop,
            resource,
        }
    }

    /// Wire form: JSON followed by a newline.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ControlError> {
        let line = bytes.trim_ascii();
        if line.is_empty() {
            return Err(ControlError::Empty);
        }
        Ok(serde_json::from_slice(line)?)
    }

    /// Apply the command to `scheduler`.
    pub fn execute(self, scheduler: &Scheduler) -> Result<(), SchedulerError> {
        match self.kind {
            CommandKind::Start => scheduler.start_or_update(self.resource).map(|_| ()),
            CommandKind::Stop => {
                scheduler.stop(self.resource.number);
                Ok(())
            }
        }
    }
}
