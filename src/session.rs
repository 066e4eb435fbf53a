// src/session.rs

//! Routes ready sources to the forwarder and the pacer.

use log::{debug, error, info, warn};
use std::io::{self, Write};
use thiserror::Error;

use crate::forwarder::{InputForwarder, Keystroke};
use crate::io::{EventHandler, EventSource, SourceError};
use crate::pacer::Pacer;

/// Payload of each source the session registers. Each role carries the
/// state its callback needs; the shared pacer lives in the [`Session`].
#[derive(Debug)]
pub enum SourceRole {
    /// Raw keyboard input.
    Keyboard(InputForwarder),
    /// Output of the child, read from the PTY master.
    PtyOutput,
    /// The pacing timer.
    FrameTick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    /// The user typed the escape character.
    Shutdown,
}

#[derive(Error, Debug)]
pub enum SessionError {
    /// Writing to the display failed, so the simulated line is gone.
    #[error("display write failed: {0}")]
    Display(#[source] io::Error),
}

/// The event handler for one paced shell session.
///
/// `P` receives keystrokes (the PTY master); `D` is the display.
pub struct Session<P: Write, D: Write> {
    pacer: Pacer,
    pty: P,
    display: D,
    status: SessionStatus,
    fatal: Option<io::Error>,
}

impl<P: Write, D: Write> Session<P, D> {
    pub fn new(pacer: Pacer, pty: P, display: D) -> Self {
        Self {
            pacer,
            pty,
            display,
            status: SessionStatus::Running,
            fatal: None,
        }
    }

    /// Checked by the event loop after each dispatch.
    pub fn poll_status(&mut self) -> Result<SessionStatus, SessionError> {
        match self.fatal.take() {
            Some(e) => Err(SessionError::Display(e)),
            None => Ok(self.status),
        }
    }

    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    pub fn pty(&self) -> &P {
        &self.pty
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    fn is_stopping(&self) -> bool {
        self.status == SessionStatus::Shutdown || self.fatal.is_some()
    }
}

impl<P: Write, D: Write> EventHandler<SourceRole> for Session<P, D> {
    fn on_ready(&mut self, source: &mut EventSource<SourceRole>) -> Result<(), SourceError> {
        // Later events in the batch that ended the session are dropped.
        if self.is_stopping() {
            return Ok(());
        }

        let (reader, role) = source.split_mut();
        match (role, reader) {
            (SourceRole::Keyboard(forwarder), Some(mut input)) => {
                if let Some(Keystroke::Escape) =
                    forwarder.on_stdin_readable(&mut input, &mut self.pty)?
                {
                    info!("Escape character received, shutting down.");
                    self.status = SessionStatus::Shutdown;
                }
            }
            (SourceRole::PtyOutput, Some(mut output)) => {
                self.pacer.on_pty_readable(&mut output)?;
            }
            (SourceRole::FrameTick, _) => {
                if let Err(e) = self.pacer.on_timer_tick(&mut self.display) {
                    error!("Display write failed: {}", e);
                    self.fatal = Some(e);
                }
            }
            (role, None) => {
                warn!("{:?} source has no descriptor to read", role);
            }
        }
        Ok(())
    }
}

impl<P: Write, D: Write> Drop for Session<P, D> {
    fn drop(&mut self) {
        if !self.pacer.is_drained() {
            debug!(
                "Session ended with {} bytes of output never displayed",
                self.pacer.pending()
            );
        }
    }
}
