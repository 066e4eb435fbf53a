// src/io/event.rs
//! Event monitoring abstraction (kqueue/epoll wrapper).

use std::io;

use crate::io::source::{Interest, Token};

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub use crate::io::kqueue::EventMonitor;

#[cfg(target_os = "linux")]
pub use crate::io::epoll::EventMonitor;

/// Upper bound on the notifications collected by one wait.
pub const MAX_EVENTS: usize = 64;

/// The capability a readiness facility has to offer the dispatcher.
///
/// Implementations translate an [`Interest`] into an OS subscription tagged
/// with `token`, and report the tokens of ready subscriptions from `wait`.
pub trait Poller {
    /// Subscribes `interest`. Write interests are one-shot.
    fn register(&mut self, interest: &Interest, token: Token) -> io::Result<()>;

    /// Re-enables a one-shot write interest after it fired.
    fn rearm(&mut self, interest: &Interest, token: Token) -> io::Result<()>;

    /// Withdraws a subscription. Must be called before the descriptor closes.
    fn deregister(&mut self, interest: &Interest, token: Token) -> io::Result<()>;

    /// Blocks until at least one subscription is ready, then replaces the
    /// contents of `ready` with up to [`MAX_EVENTS`] tokens in the order the
    /// OS reported them. An interrupted wait leaves `ready` empty.
    fn wait(&mut self, ready: &mut Vec<Token>) -> io::Result<()>;
}
