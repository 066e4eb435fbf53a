// src/pacer.rs

//! Paces child output to the speed of a simulated serial line.
//!
//! Output read from the PTY is appended to an unbounded buffer as fast as the
//! child produces it. A repeating timer drains at most a fixed number of
//! bytes per tick to the display. [`RateSchedule`] decides both numbers from
//! the requested bit rate:
//!
//! * at high rates the tick interval is pinned to the reference frame period
//!   and the per-tick budget grows;
//! * at low rates, where a single byte takes longer than a frame, the budget
//!   is one byte and the tick interval stretches to the byte time instead.

use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;
use thiserror::Error;

use crate::config::LineConfig;
use crate::io::SourceError;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateError {
    #[error("Minimum baudrate is {min} and maximum is {max}.")]
    OutOfRange { requested: u32, min: u32, max: u32 },

    #[error("line framing needs a non-zero {field}")]
    ZeroFraming { field: &'static str },
}

/// Timer interval and per-tick byte budget for one bit rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSchedule {
    bits_per_second: u32,
    tick_interval_ms: u64,
    emission_budget: usize,
}

impl RateSchedule {
    /// Schedule for `bits_per_second` on the default 10-bit, 60 Hz line.
    pub fn from_bits_per_second(bits_per_second: u32) -> Result<Self, RateError> {
        Self::new(bits_per_second, &LineConfig::default())
    }

    pub fn new(bits_per_second: u32, line: &LineConfig) -> Result<Self, RateError> {
        if line.bits_per_byte == 0 {
            return Err(RateError::ZeroFraming {
                field: "bits_per_byte",
            });
        }
        if line.reference_fps == 0 {
            return Err(RateError::ZeroFraming {
                field: "reference_fps",
            });
        }
        if !(line.min_baud..=line.max_baud).contains(&bits_per_second) {
            return Err(RateError::OutOfRange {
                requested: bits_per_second,
                min: line.min_baud,
                max: line.max_baud,
            });
        }

        let baud = u64::from(bits_per_second);
        let bits = u64::from(line.bits_per_byte);
        let fps = u64::from(line.reference_fps);

        // ms_per_byte = 1000 * bits / baud and frame_ms = 1000 / fps, both
        // rounded up so a tick is never shorter than the time it stands for.
        let ms_per_byte = (1000 * bits).div_ceil(baud);
        let frame_ms = 1000u64.div_ceil(fps);
        let tick_interval_ms = ms_per_byte.max(frame_ms).max(1);

        // floor(frame_ms / ms_per_byte) = floor(baud / (fps * bits)).
        let emission_budget = ((baud / (fps * bits)) as usize).max(1);

        Ok(Self {
            bits_per_second,
            tick_interval_ms,
            emission_budget,
        })
    }

    pub fn bits_per_second(&self) -> u32 {
        self.bits_per_second
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Most bytes released per tick. Always at least 1.
    pub fn emission_budget(&self) -> usize {
        self.emission_budget
    }

    /// Bytes per second the schedule actually delivers while output is
    /// pending.
    pub fn delivered_bytes_per_second(&self) -> f64 {
        self.emission_budget as f64 * 1000.0 / self.tick_interval_ms as f64
    }
}

impl fmt::Display for RateSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Writing {} characters every {} ms.",
            self.emission_budget, self.tick_interval_ms
        )
    }
}

/// Holds output that has been read from the child but not yet displayed.
///
/// `buffer.len()` is the allocated capacity; the undisplayed bytes are
/// `buffer[read_cursor..write_length]`.
#[derive(Debug)]
pub struct Pacer {
    schedule: RateSchedule,
    buffer: Vec<u8>,
    read_cursor: usize,
    write_length: usize,
    initial_capacity: usize,
    chunk: Vec<u8>,
}

pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;
pub const DEFAULT_INITIAL_CAPACITY: usize = 4096;

impl Pacer {
    pub fn new(schedule: RateSchedule) -> Self {
        Self::with_sizes(schedule, DEFAULT_INITIAL_CAPACITY, DEFAULT_READ_CHUNK_SIZE)
    }

    /// Storage is allocated lazily, on the first append.
    pub fn with_sizes(schedule: RateSchedule, initial_capacity: usize, read_chunk_size: usize) -> Self {
        Self {
            schedule,
            buffer: Vec::new(),
            read_cursor: 0,
            write_length: 0,
            initial_capacity: initial_capacity.max(1),
            chunk: vec![0; read_chunk_size.max(1)],
        }
    }

    pub fn schedule(&self) -> &RateSchedule {
        &self.schedule
    }

    /// Reads one chunk of child output and queues it.
    ///
    /// End of file or a read error fails the source. A read that would block
    /// or was interrupted queues nothing and is not a failure.
    pub fn on_pty_readable<R: Read + ?Sized>(&mut self, pty: &mut R) -> Result<usize, SourceError> {
        let n = match pty.read(&mut self.chunk) {
            Ok(0) => return Err(SourceError::Eof),
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) =>
            {
                log::trace!("PTY read returned {:?}, nothing queued", e.kind());
                return Ok(0);
            }
            Err(e) => return Err(SourceError::Io(e)),
        };

        let end = self.write_length + n;
        self.reserve(end);
        self.buffer[self.write_length..end].copy_from_slice(&self.chunk[..n]);
        self.write_length = end;
        log::trace!("Queued {} bytes, {} pending", n, self.pending());
        Ok(n)
    }

    /// Appends `bytes` to the pending output.
    pub fn enqueue(&mut self, bytes: &[u8]) {
        let end = self.write_length + bytes.len();
        self.reserve(end);
        self.buffer[self.write_length..end].copy_from_slice(bytes);
        self.write_length = end;
    }

    /// Doubles the storage until `required` bytes fit. Existing content is
    /// kept in place.
    fn reserve(&mut self, required: usize) {
        let mut capacity = self.buffer.len();
        if required <= capacity {
            return;
        }
        while capacity < required {
            capacity = if capacity == 0 {
                self.initial_capacity
            } else {
                capacity * 2
            };
        }
        log::debug!(
            "Growing pending-output buffer from {} to {} bytes",
            self.buffer.len(),
            capacity
        );
        self.buffer.resize(capacity, 0);
    }

    /// Releases up to one budget of pending bytes to `display` and flushes it.
    ///
    /// Returns the number of bytes written. When everything pending has been
    /// written both cursors return to zero.
    pub fn on_timer_tick<W: Write + ?Sized>(&mut self, display: &mut W) -> io::Result<usize> {
        let end = (self.read_cursor + self.schedule.emission_budget).min(self.write_length);
        let emitted = end - self.read_cursor;
        if emitted > 0 {
            display.write_all(&self.buffer[self.read_cursor..end])?;
            self.read_cursor = end;
        }
        display.flush()?;

        if self.read_cursor == self.write_length {
            self.read_cursor = 0;
            self.write_length = 0;
        }
        Ok(emitted)
    }

    /// Bytes read from the child and not yet displayed.
    pub fn pending(&self) -> usize {
        self.write_length - self.read_cursor
    }

    pub fn pending_bytes(&self) -> &[u8] {
        &self.buffer[self.read_cursor..self.write_length]
    }

    pub fn is_drained(&self) -> bool {
        self.pending() == 0
    }

    /// Allocated storage. Never shrinks.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn read_cursor(&self) -> usize {
        self.read_cursor
    }

    pub fn write_length(&self) -> usize {
        self.write_length
    }
}

#[cfg(test)]
mod tests;
