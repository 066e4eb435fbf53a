// src/io/dispatcher.rs

//! Single-threaded readiness dispatcher.
//!
//! The [`Dispatcher`] owns one [`Poller`] and a table of registered
//! [`EventSource`]s. Each call to [`Dispatcher::dispatch_once`] blocks until
//! the poller reports a batch of ready tokens, resolves every token back to
//! its source, and hands the source to an [`EventHandler`].
//!
//! A failed callback on a read source is the one case the dispatcher cleans
//! up after: the source is withdrawn from the poller and its descriptor is
//! closed. Every other callback failure is logged and otherwise ignored.

use log::{debug, trace, warn};
use std::fmt;
use std::time::Duration;

use crate::io::error::{EventError, SourceError};
use crate::io::event::{EventMonitor, Poller, MAX_EVENTS};
use crate::io::source::{EventSource, Interest, SourceKind, Token};

/// Shortest interval a timer source may ask for.
pub const MIN_TIMER_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a registration, returned by [`Dispatcher::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(Token);

impl SourceId {
    pub fn token(self) -> Token {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Receives ready sources from [`Dispatcher::dispatch_once`].
pub trait EventHandler<T> {
    /// Called once per ready notification. Returning an error on a read
    /// source makes the dispatcher close that source's descriptor.
    fn on_ready(&mut self, source: &mut EventSource<T>) -> Result<(), SourceError>;
}

pub struct Dispatcher<T, P: Poller = EventMonitor> {
    poller: P,
    // Indexed by token. `None` marks a retired source; tokens are never reused.
    slots: Vec<Option<EventSource<T>>>,
    ready: Vec<Token>,
}

impl<T> Dispatcher<T> {
    /// Creates a dispatcher over the platform's native poller.
    pub fn new() -> Result<Self, EventError> {
        let poller = EventMonitor::new().map_err(EventError::SystemResource)?;
        Ok(Self::with_poller(poller))
    }
}

impl<T, P: Poller> Dispatcher<T, P> {
    pub fn with_poller(poller: P) -> Self {
        Self {
            poller,
            slots: Vec::new(),
            ready: Vec::with_capacity(MAX_EVENTS),
        }
    }

    /// Subscribes `source` and takes ownership of it.
    ///
    /// A source whose subscription fails is dropped, closing its descriptor.
    pub fn register(&mut self, source: EventSource<T>) -> Result<SourceId, EventError> {
        let kind = source.kind();
        if let Interest::Timer(interval) = source.interest() {
            if *interval < MIN_TIMER_INTERVAL {
                return Err(EventError::Registration {
                    kind,
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("timer interval {:?} is below 1ms", interval),
                    ),
                });
            }
        }

        let token = self.slots.len();
        self.poller
            .register(source.interest(), token)
            .map_err(|err| EventError::Registration { kind, source: err })?;
        debug!("Registered {} as source #{}", source.interest(), token);
        self.slots.push(Some(source));
        Ok(SourceId(token))
    }

    /// Re-enables a write source after its one-shot notification fired.
    pub fn rearm(&mut self, id: SourceId) -> Result<(), EventError> {
        let source = self
            .slots
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(EventError::UnknownSource(id))?;
        if source.kind() != SourceKind::WriteFd {
            return Err(EventError::NotRearmable {
                id,
                kind: source.kind(),
            });
        }
        self.poller
            .rearm(source.interest(), id.0)
            .map_err(|err| EventError::Rearm { id, source: err })?;
        trace!("Rearmed write source {}", id);
        Ok(())
    }

    /// Waits for one batch of readiness notifications and runs the handler
    /// for each, in the order the poller reported them.
    ///
    /// Returns the number of callbacks invoked. Only a failed wait is an
    /// error; callback failures are absorbed here.
    pub fn dispatch_once<H>(&mut self, handler: &mut H) -> Result<usize, EventError>
    where
        H: EventHandler<T> + ?Sized,
    {
        self.poller
            .wait(&mut self.ready)
            .map_err(EventError::Dispatch)?;

        let mut delivered = 0;
        for index in 0..self.ready.len() {
            let token = self.ready[index];
            let Some(source) = self.slots.get_mut(token).and_then(Option::as_mut) else {
                trace!("Ignoring readiness for retired source #{}", token);
                continue;
            };
            delivered += 1;
            if let Err(err) = handler.on_ready(source) {
                self.handle_source_failure(token, err);
            }
        }
        Ok(delivered)
    }

    fn handle_source_failure(&mut self, token: Token, err: SourceError) {
        let Some(kind) = self.slots[token].as_ref().map(EventSource::kind) else {
            return;
        };
        if kind != SourceKind::ReadFd {
            debug!("Callback for {} source #{} failed: {}", kind, token, err);
            return;
        }

        let Some(source) = self.slots[token].take() else {
            return;
        };
        warn!(
            "Closing {} after callback failure: {}",
            source.interest(),
            err
        );
        // The poller must forget the descriptor before it closes, or a
        // duplicate of it could keep reporting readiness for this token.
        if let Err(e) = self.poller.deregister(source.interest(), token) {
            warn!("Failed to withdraw source #{} from poller: {}", token, e);
        }
        drop(source);
    }

    /// Whether `id` still names a live registration.
    pub fn is_active(&self, id: SourceId) -> bool {
        matches!(self.slots.get(id.0), Some(Some(_)))
    }

    pub fn source(&self, id: SourceId) -> Option<&EventSource<T>> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn poller(&self) -> &P {
        &self.poller
    }
}

impl<T, P: Poller + fmt::Debug> fmt::Debug for Dispatcher<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("poller", &self.poller)
            .field("live_sources", &self.len())
            .finish()
    }
}
