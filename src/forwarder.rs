// src/forwarder.rs

//! Keyboard handling: forwards keystrokes to the child unpaced and watches
//! for the escape character at the start of a line.

use log::{trace, warn};
use std::io::{self, Read, Write};

use crate::io::SourceError;

pub const DEFAULT_ESCAPE: u8 = b'~';

/// What to do with one byte of keyboard input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keystroke {
    /// Send the byte to the child as-is.
    Forward(u8),
    /// The escape character was typed first on a line; end the session.
    Escape,
}

#[derive(Debug, Clone)]
pub struct InputForwarder {
    escape: u8,
    line_column: usize,
}

impl Default for InputForwarder {
    fn default() -> Self {
        Self::new(DEFAULT_ESCAPE)
    }
}

impl InputForwarder {
    pub fn new(escape: u8) -> Self {
        Self {
            escape,
            line_column: 0,
        }
    }

    /// Number of bytes typed since the last line break.
    pub fn line_column(&self) -> usize {
        self.line_column
    }

    /// Classifies one byte and advances the column counter.
    ///
    /// The escape byte only counts at column 0; anywhere else it is data.
    pub fn accept(&mut self, byte: u8) -> Keystroke {
        if byte == self.escape && self.line_column == 0 {
            return Keystroke::Escape;
        }
        match byte {
            b'\n' | b'\r' => self.line_column = 0,
            _ => self.line_column = self.line_column.saturating_add(1),
        }
        Keystroke::Forward(byte)
    }

    /// Reads exactly one byte from `input` and forwards it to `pty` unless it
    /// is the escape.
    ///
    /// End of input or a read error fails the keyboard source. A failed write
    /// to the child is logged and dropped so the escape keeps working.
    /// Returns `None` when the read was interrupted before any byte arrived.
    pub fn on_stdin_readable<R, W>(
        &mut self,
        input: &mut R,
        pty: &mut W,
    ) -> Result<Option<Keystroke>, SourceError>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let mut byte = [0u8; 1];
        match input.read(&mut byte) {
            Ok(0) => return Err(SourceError::Eof),
            Ok(_) => {}
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) =>
            {
                return Ok(None)
            }
            Err(e) => return Err(SourceError::Io(e)),
        }

        let keystroke = self.accept(byte[0]);
        if let Keystroke::Forward(b) = keystroke {
            trace!("Forwarding byte {:#04x} (column {})", b, self.line_column);
            if let Err(e) = pty.write_all(&[b]) {
                warn!("Failed to forward keystroke to the child: {}", e);
            }
        }
        Ok(Some(keystroke))
    }
}
