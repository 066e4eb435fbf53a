// src/io/source.rs

//! Readiness interests and the event sources that carry them.
//!
//! An [`EventSource`] pairs one [`Interest`] (a readable descriptor, a
//! writable descriptor, or a repeating timer) with a typed payload. The
//! payload replaces an untyped user-data pointer: the dispatcher hands it
//! back to the event handler unchanged, and never inspects it.

use std::fmt;
use std::io::{self, Read};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::time::Duration;

/// Identifies a registration inside a [`Poller`](crate::io::event::Poller).
pub type Token = usize;

/// The readiness condition a source waits for, together with its operand.
#[derive(Debug)]
pub enum Interest {
    /// The descriptor became readable. Level triggered.
    Readable(OwnedFd),
    /// The descriptor became writable. One-shot: after firing, it stays
    /// disabled until rearmed.
    Writable(OwnedFd),
    /// Fires every interval, starting one interval after registration.
    Timer(Duration),
}

/// The kind of an [`Interest`], without its operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    ReadFd,
    WriteFd,
    Timer,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::ReadFd => "read-fd",
            SourceKind::WriteFd => "write-fd",
            SourceKind::Timer => "timer",
        };
        f.write_str(name)
    }
}

impl Interest {
    pub fn kind(&self) -> SourceKind {
        match self {
            Interest::Readable(_) => SourceKind::ReadFd,
            Interest::Writable(_) => SourceKind::WriteFd,
            Interest::Timer(_) => SourceKind::Timer,
        }
    }

    /// The descriptor operand, if this is a descriptor interest.
    pub fn fd(&self) -> Option<BorrowedFd<'_>> {
        match self {
            Interest::Readable(fd) | Interest::Writable(fd) => Some(fd.as_fd()),
            Interest::Timer(_) => None,
        }
    }

}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interest::Readable(fd) | Interest::Writable(fd) => {
                write!(f, "{} {}", self.kind(), fd.as_raw_fd())
            }
            Interest::Timer(interval) => write!(f, "timer {}ms", interval.as_millis()),
        }
    }
}

/// One readiness interest plus the state its callback needs.
///
/// Registration consumes the source, so a source can only ever be
/// registered once, with one dispatcher.
#[derive(Debug)]
pub struct EventSource<T> {
    interest: Interest,
    payload: T,
}

impl<T> EventSource<T> {
    pub fn new(interest: Interest, payload: T) -> Self {
        Self { interest, payload }
    }

    pub fn read_fd(fd: OwnedFd, payload: T) -> Self {
        Self::new(Interest::Readable(fd), payload)
    }

    pub fn write_fd(fd: OwnedFd, payload: T) -> Self {
        Self::new(Interest::Writable(fd), payload)
    }

    pub fn timer(interval: Duration, payload: T) -> Self {
        Self::new(Interest::Timer(interval), payload)
    }

    pub fn kind(&self) -> SourceKind {
        self.interest.kind()
    }

    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Read access to the source's descriptor. `None` for timers.
    pub fn reader(&self) -> Option<SourceReader<'_>> {
        self.interest.fd().map(|fd| SourceReader { fd })
    }

    /// Splits the source into descriptor read access and the payload, so a
    /// callback can read input while updating its own state.
    pub fn split_mut(&mut self) -> (Option<SourceReader<'_>>, &mut T) {
        let reader = self.interest.fd().map(|fd| SourceReader { fd });
        (reader, &mut self.payload)
    }
}

/// Borrowed `Read` over a source's descriptor.
#[derive(Debug)]
pub struct SourceReader<'a> {
    fd: BorrowedFd<'a>,
}

impl Read for SourceReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        nix::unistd::read(self.fd, buf).map_err(io::Error::from)
    }
}
