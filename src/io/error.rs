// src/io/error.rs

//! Error types for the event dispatcher and its sources.

use std::io;
use thiserror::Error;

use crate::io::dispatcher::SourceId;
use crate::io::source::SourceKind;

/// Failures of the dispatcher itself. All of these are fatal to the event loop.
#[derive(Error, Debug)]
pub enum EventError {
    /// The OS refused to create a multiplexing context.
    #[error("failed to create event monitor: {0}")]
    SystemResource(#[source] io::Error),

    /// A source could not be subscribed.
    #[error("failed to register {kind} source: {source}")]
    Registration {
        kind: SourceKind,
        #[source]
        source: io::Error,
    },

    /// The blocking wait failed.
    #[error("event wait failed: {0}")]
    Dispatch(#[source] io::Error),

    /// The id does not name a live registration.
    #[error("no active source with id {0}")]
    UnknownSource(SourceId),

    /// Only write sources are one-shot.
    #[error("source {id} is a {kind} source and cannot be rearmed")]
    NotRearmable { id: SourceId, kind: SourceKind },

    /// Re-enabling a one-shot source failed.
    #[error("failed to rearm source {id}: {source}")]
    Rearm {
        id: SourceId,
        #[source]
        source: io::Error,
    },
}

/// A failed read or write inside a source callback.
///
/// The dispatcher recovers from these locally; they never end the loop.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("end of input")]
    Eof,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<nix::Error> for SourceError {
    fn from(err: nix::Error) -> Self {
        SourceError::Io(io::Error::from(err))
    }
}
