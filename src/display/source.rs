//! calloop integration
//!
//! [`WaylandSource`] adapts an [`EventQueue`] into a [`calloop`] event source, so the
//! engine can be driven by the same loop as timers and other file descriptors. The
//! source takes care of the read/dispatch protocol of the queue:
//!
//! - before the loop goes to sleep, outgoing requests are flushed and a read intent
//!   is registered on the connection,
//! - when the socket becomes readable the events are read and dispatched,
//! - if another thread or queue already read the events, the read intent is abandoned
//!   and already-queued events are dispatched instead.
//!
//! The source is generic over the dispatch state so secondary queues (for helper
//! threads) can use it as well.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

use calloop::generic::{FdWrapper, Generic};
use calloop::{
    EventIterator, EventSource, Interest, Mode, Poll, PostAction, Readiness, RegistrationToken,
    Token, TokenFactory,
};
use tracing::error;
use wayland_backend::client::{ReadEventsGuard, WaylandError};
use wayland_client::{Connection, DispatchError, EventQueue};

/// An adapter embedding an [`EventQueue`] into a calloop event loop
pub struct WaylandSource<D> {
    queue: EventQueue<D>,
    conn: Connection,
    fd: Generic<FdWrapper<RawFd>>,
    read_guard: Option<ReadEventsGuard>,
    /// Token used to wake the loop when events are already queued at sleep time.
    wake_token: Option<Token>,
}

impl<D> std::fmt::Debug for WaylandSource<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaylandSource")
            .field("read_guard", &self.read_guard.is_some())
            .finish_non_exhaustive()
    }
}

impl<D> WaylandSource<D> {
    /// Wrap an event queue into a calloop source
    pub fn new(conn: Connection, queue: EventQueue<D>) -> WaylandSource<D> {
        let raw = conn.backend().poll_fd().as_raw_fd();
        // The connection outlives the source, which keeps a clone of it.
        let fd = Generic::new(
            unsafe { FdWrapper::new(raw) },
            Interest::READ,
            Mode::Level,
        );
        WaylandSource {
            queue,
            conn,
            fd,
            read_guard: None,
            wake_token: None,
        }
    }

    /// Access the wrapped queue
    pub fn queue(&mut self) -> &mut EventQueue<D> {
        &mut self.queue
    }

    /// Insert this source into the given event loop, dispatching to the loop's state
    pub fn insert(
        self,
        handle: calloop::LoopHandle<'_, D>,
    ) -> Result<RegistrationToken, calloop::InsertError<WaylandSource<D>>>
    where
        D: 'static,
    {
        handle.insert_source(self, |_, queue, data| queue.dispatch_pending(data))
    }
}

impl<D> EventSource for WaylandSource<D> {
    type Event = ();
    /// The wrapped queue, so the callback can dispatch with its own state
    type Metadata = EventQueue<D>;
    type Ret = Result<usize, DispatchError>;
    type Error = calloop::Error;

    const NEEDS_EXTRA_LIFECYCLE_EVENTS: bool = true;

    fn process_events<F>(
        &mut self,
        readiness: Readiness,
        token: Token,
        mut callback: F,
    ) -> Result<PostAction, Self::Error>
    where
        F: FnMut(Self::Event, &mut Self::Metadata) -> Self::Ret,
    {
        let queue = &mut self.queue;
        let read_guard = &mut self.read_guard;

        let action = self.fd.process_events(readiness, token, |_, _| {
            // Read events from the socket if a read intent is pending. Another queue
            // on the connection may have read for us, in which case the guard simply
            // reports WouldBlock.
            if let Some(guard) = read_guard.take() {
                match guard.read() {
                    Ok(_) => {}
                    Err(WaylandError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {}
                    Err(WaylandError::Io(err)) => return Err(err),
                    Err(WaylandError::Protocol(err)) => {
                        error!(error = %err, "protocol error on wayland connection");
                        return Err(io::Error::new(io::ErrorKind::Other, err));
                    }
                }
            }
            match callback((), queue) {
                Ok(_) => Ok(PostAction::Continue),
                Err(DispatchError::Backend(WaylandError::Io(err)))
                    if err.kind() == io::ErrorKind::WouldBlock =>
                {
                    Ok(PostAction::Continue)
                }
                Err(err) => Err(io::Error::new(io::ErrorKind::Other, err)),
            }
        })?;

        Ok(action)
    }

    fn register(&mut self, poll: &mut Poll, token_factory: &mut TokenFactory) -> calloop::Result<()> {
        self.wake_token = Some(token_factory.token());
        self.fd.register(poll, token_factory)
    }

    fn reregister(
        &mut self,
        poll: &mut Poll,
        token_factory: &mut TokenFactory,
    ) -> calloop::Result<()> {
        self.wake_token = Some(token_factory.token());
        self.fd.reregister(poll, token_factory)
    }

    fn unregister(&mut self, poll: &mut Poll) -> calloop::Result<()> {
        self.read_guard = None;
        self.fd.unregister(poll)
    }

    fn before_sleep(&mut self) -> calloop::Result<Option<(Readiness, Token)>> {
        // Flush requests queued during this loop iteration. A full socket is not
        // fatal here, the next iteration retries.
        match self.conn.flush() {
            Ok(()) => {}
            Err(WaylandError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => {
                error!(error = %err, "failed to flush wayland connection");
                return Err(calloop::Error::OtherError(Box::new(err)));
            }
        }

        debug_assert!(self.read_guard.is_none());
        self.read_guard = self.queue.prepare_read();
        match self.read_guard {
            Some(_) => Ok(None),
            // Events are already sitting in the queue: wake the loop immediately so
            // process_events dispatches them instead of sleeping on the socket.
            None => Ok(self
                .wake_token
                .map(|token| (Readiness::EMPTY, token))),
        }
    }

    fn before_handle_events(&mut self, events: EventIterator<'_>) {
        // If the loop woke up for unrelated sources, cancel the read intent so other
        // threads are not starved waiting on us.
        if events.count() == 0 {
            self.read_guard = None;
        }
    }
}
