// src/io/tty.rs

//! The user's controlling terminal: raw mode and window size.

use anyhow::{Context, Result};
use libc::{winsize, TIOCGWINSZ};
use log::{debug, warn};
use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use termios::{cfmakeraw, tcsetattr, Termios, TCSANOW, VMIN, VTIME};

/// Puts a terminal into raw mode for as long as the guard lives.
///
/// Reads then return one byte at a time with no line buffering, no local
/// echo and no signal generation, so every keystroke reaches the child.
pub struct RawModeGuard {
    fd: RawFd,
    original: Termios,
}

impl RawModeGuard {
    pub fn enable(fd: RawFd) -> Result<Self> {
        let original = Termios::from_fd(fd)
            .with_context(|| format!("Failed to read terminal attributes of fd {}", fd))?;

        let mut raw = original;
        cfmakeraw(&mut raw);
        // Block until at least one byte is available.
        raw.c_cc[VMIN] = 1;
        raw.c_cc[VTIME] = 0;
        tcsetattr(fd, TCSANOW, &raw)
            .with_context(|| format!("Failed to set raw terminal attributes on fd {}", fd))?;
        debug!("Terminal fd {} set to raw mode.", fd);

        Ok(Self { fd, original })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = tcsetattr(self.fd, TCSANOW, &self.original) {
            warn!(
                "Failed to restore terminal attributes on fd {}: {}",
                self.fd, e
            );
        } else {
            debug!("Terminal fd {} restored.", self.fd);
        }
    }
}

/// Returns the terminal size as (columns, rows).
pub fn terminal_size(fd: RawFd) -> io::Result<(u16, u16)> {
    // SAFETY: winsize is plain old data and TIOCGWINSZ only writes into it.
    let mut ws: winsize = unsafe { mem::zeroed() };
    if unsafe { libc::ioctl(fd, TIOCGWINSZ, &mut ws) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok((ws.ws_col, ws.ws_row))
}
