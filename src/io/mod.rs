// src/io/mod.rs
//
// I/O module - readiness dispatching, the child's PTY, and the controlling tty.

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod pty;
pub mod source;
pub mod tty;


// Platform-specific event monitoring implementations
#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub mod kqueue;

#[cfg(target_os = "linux")]
pub mod epoll;

pub use dispatcher::{Dispatcher, EventHandler, SourceId};
pub use error::{EventError, SourceError};
pub use event::{EventMonitor, Poller};
pub use source::{EventSource, Interest, SourceKind, SourceReader, Token};
