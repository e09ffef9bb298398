//! Display connection and event dispatch
//!
//! [`Display`] owns the connection to the compositor, the default event queue and the
//! protocol state ([`ClientState`]). It provides the three dispatch primitives the rest
//! of the engine is built on:
//!
//! - [`Display::round_trip`], a synchronous barrier tagged against a specific
//!   `wl_callback` so it cannot be fooled by unrelated callbacks completing first,
//! - [`Display::flush_pending`], a non-blocking pump meant for the embedding loop's
//!   "about to idle" and "just woke up" hooks,
//! - [`Display::blocking_dispatch`], which blocks until at least one event has been
//!   processed and is the building block for every intentional stall (initial screen
//!   geometry, buffer-pool backpressure, frame synchronization).
//!
//! ## Error policy
//!
//! A broken connection leaves the client with no display to talk to; there is no
//! partial-failure recovery in the protocol. All dispatch paths therefore log the
//! diagnostic and terminate the process on connection-level errors. Everything
//! recoverable is an ordinary [`Result`].

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, trace};
use wayland_backend::client::WaylandError;
use wayland_client::protocol::wl_callback;
use wayland_client::{
    ConnectError, Connection, Dispatch, DispatchError, EventQueue, QueueHandle,
};

use crate::client::ClientState;
use crate::shell::{ResizeEdge, ShellError, WindowState};
use crate::utils::{Point, Rectangle, Serial, SerialCounter, Size};
use crate::window::{WindowAttributes, WindowEvent, WindowId};

/// Registry tracking with global listener replay
pub mod registry;
/// [`calloop`] event source adapter
pub mod source;

use registry::RegistryState;

/// Errors reported by the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// The compositor socket could not be opened
    #[error("failed to connect to the compositor: {0}")]
    Connect(#[from] ConnectError),
    /// Dispatching events failed
    #[error("wayland dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
    /// The connection broke at the wire level
    #[error("wayland connection error: {0}")]
    Wire(#[from] WaylandError),
    /// Shell role negotiation failed
    #[error(transparent)]
    Shell(#[from] ShellError),
    /// Shared memory allocation failed
    #[error("shared memory allocation failed: {0}")]
    ShmAllocation(#[from] io::Error),
    /// The compositor does not advertise `wl_shm`
    #[error("the compositor does not advertise wl_shm")]
    NoShm,
    /// The compositor does not advertise `wl_compositor`
    #[error("the compositor does not advertise wl_compositor")]
    NoCompositor,
    /// The referenced window does not exist (anymore)
    #[error("unknown window id")]
    UnknownWindow,
}

/// User data carried by every `wl_callback` the engine creates
#[derive(Debug, Clone, Copy)]
pub(crate) enum CallbackKind {
    /// A round-trip sync marker with its local tag
    Sync(Serial),
    /// A frame callback belonging to a window
    Frame(WindowId),
}

/// The client-side display engine
///
/// Owns the [`Connection`], the default [`EventQueue`] and the protocol state. See the
/// [module documentation](self) for the dispatch primitives.
pub struct Display {
    conn: Connection,
    queue: EventQueue<ClientState>,
    state: ClientState,
    sync_tags: SerialCounter,
}

impl std::fmt::Debug for Display {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Display")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Display {
    /// Connect to the compositor named by the environment
    ///
    /// Terminates the process if the socket cannot be opened: the client has no UI
    /// without a display, so there is nothing useful to recover to. Use
    /// [`Display::try_connect`] to handle the failure yourself.
    pub fn connect() -> Display {
        match Display::try_connect() {
            Ok(display) => display,
            Err(err) => fatal(&err),
        }
    }

    /// Connect to the compositor named by the environment, reporting failures
    ///
    /// Performs the initial global enumeration: one round-trip to collect the
    /// registry, a second one so the bound globals (seat capabilities, shm formats,
    /// output geometry) have answered, then blocks until every advertised output has
    /// sent its initial geometry.
    pub fn try_connect() -> Result<Display, EngineError> {
        let conn = Connection::connect_to_env()?;
        let queue = conn.new_event_queue();
        let qh = queue.handle();
        let registry = conn.display().get_registry(&qh, ());
        let state = ClientState::new(qh, RegistryState::new(registry));
        let mut display = Display {
            conn,
            queue,
            state,
            sync_tags: SerialCounter::new(),
        };

        display.round_trip()?;
        display.round_trip()?;
        // Wait for the initial geometry of every advertised screen; window placement
        // and fullscreen requests are meaningless before that.
        while display.state.screens.iter().any(|s| !s.received_done()) {
            display.blocking_dispatch()?;
        }
        let globals = display.state.registry.globals().len();
        let screens = display.state.screens.len();
        debug!(globals, screens, "connected to compositor");
        Ok(display)
    }

    /// The underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Handle of the default event queue
    pub fn queue_handle(&self) -> QueueHandle<ClientState> {
        self.state.qh.clone()
    }

    /// The connection's poll file descriptor, for external event loops
    pub fn connection_fd(&self) -> RawFd {
        self.conn.backend().poll_fd().as_raw_fd()
    }

    /// Create an additional, independent event queue on this connection
    ///
    /// Secondary queues decouple "the socket became readable" from "process protocol
    /// events on the right thread": a helper I/O thread can read the socket while
    /// objects assigned to another queue are only ever dispatched from their own
    /// thread.
    pub fn new_queue<D>(&self) -> EventQueue<D>
    where
        D: 'static,
    {
        self.conn.new_event_queue()
    }

    /// Access the protocol state
    pub fn state(&mut self) -> &mut ClientState {
        &mut self.state
    }

    /// Drain the window events produced since the last call
    pub fn drain_events(&mut self) -> Vec<WindowEvent> {
        self.state.events.drain(..).collect()
    }

    /// Synchronous barrier: block until the compositor has processed everything sent
    /// so far
    ///
    /// Sends a tagged sync marker and block-dispatches until the callback for *that*
    /// marker fires. Unrelated callbacks (frame callbacks, other in-flight syncs)
    /// completing in the meantime are dispatched but do not end the wait.
    pub fn round_trip(&mut self) -> Result<(), EngineError> {
        let tag = self.sync_tags.next_serial();
        self.conn
            .display()
            .sync(&self.state.qh, CallbackKind::Sync(tag));
        self.flush()?;
        trace!(tag = u32::from(tag), "round trip");
        while !self.state.take_sync(tag.into()) {
            self.dispatch_blocking()?;
        }
        Ok(())
    }

    /// Deliver already-queued events and flush outgoing requests, without blocking
    ///
    /// This is the pump to call from "about to idle" / "woke up" hooks of an
    /// embedding event loop. A full socket (`WouldBlock`) is not an error; the
    /// remaining data is flushed on the next pump.
    pub fn flush_pending(&mut self) {
        if let Err(err) = self.queue.dispatch_pending(&mut self.state) {
            fatal(&EngineError::from(err));
        }
        if let Err(err) = self.flush() {
            fatal(&err);
        }
    }

    /// Block until at least one event has been processed
    ///
    /// Used when the caller must wait for a specific state change: initial output
    /// geometry, a buffer release when the pool is exhausted, a frame callback.
    pub fn blocking_dispatch(&mut self) -> Result<usize, EngineError> {
        self.dispatch_blocking()
    }

    /// Block until the outstanding frame callback of `window` has fired
    ///
    /// No-op if the window has no frame callback outstanding. This gates the next
    /// repaint on the compositor having processed the previous one.
    pub fn wait_for_frame_sync(&mut self, window: WindowId) -> Result<(), EngineError> {
        self.flush()?;
        while self
            .state
            .window(window)
            .is_some_and(|w| w.frame_pending())
        {
            self.dispatch_blocking()?;
        }
        Ok(())
    }

    /// Create a new window
    ///
    /// The window negotiates a shell role with the preferred available shell
    /// protocol. If negotiation fails the window exists but never becomes exposed;
    /// see [`crate::window`] for the recovery path.
    pub fn create_window(&mut self, attrs: WindowAttributes) -> Result<WindowId, EngineError> {
        let id = crate::window::create_window(&mut self.state, attrs)?;
        self.flush()?;
        Ok(id)
    }

    /// Acquire a free backing-store buffer for `window`, of the given size
    ///
    /// If the window's pool has a free buffer of matching size it is reused (with its
    /// previous content carried forward, so damage-only repaints stay valid). Below
    /// capacity a new shared-memory buffer is allocated. At capacity this *blocks*,
    /// pumping the event queue until the compositor releases one: stalling is the
    /// deliberate backpressure against a slow compositor, growing the pool unbounded
    /// is not an option.
    pub fn acquire_buffer(
        &mut self,
        window: WindowId,
        size: Size<i32>,
    ) -> Result<usize, EngineError> {
        let shm = self.state.shm.clone().ok_or(EngineError::NoShm)?;
        loop {
            let qh = self.state.qh.clone();
            let win = self
                .state
                .window_mut(window)
                .ok_or(EngineError::UnknownWindow)?;
            if let Some(idx) = win.backing_mut().try_acquire(&shm, &qh, size)? {
                return Ok(idx);
            }
            trace!(?window, "buffer pool exhausted, waiting for a release");
            self.dispatch_blocking()?;
        }
    }

    /// Attach the pool buffer `buffer` of `window` with the given damage and commit
    ///
    /// Damage is translated by the window's content margin. On a window that has no
    /// shell role (negotiation failed, or it is hidden) this is a silent no-op.
    pub fn present(
        &mut self,
        window: WindowId,
        buffer: usize,
        damage: &[Rectangle<i32>],
    ) -> Result<(), EngineError> {
        let qh = self.state.qh.clone();
        let win = self
            .state
            .window_mut(window)
            .ok_or(EngineError::UnknownWindow)?;
        win.present(buffer, damage, &qh);
        self.flush()
    }

    /// Request a repaint of `region` (the whole window when `None`)
    ///
    /// Requests made while a frame callback is outstanding coalesce into a single
    /// deferred region, surfaced as one `RedrawRequested` when the callback fires.
    pub fn request_repaint(&mut self, window: WindowId, region: Option<Rectangle<i32>>) {
        crate::window::request_repaint(&mut self.state, window, region);
    }

    /// Ask the compositor for a window-state change (maximize, fullscreen, ...)
    ///
    /// Diffed against the previously requested state; asking for the state the
    /// window is already in sends nothing.
    pub fn set_window_state(&mut self, window: WindowId, target: WindowState) {
        crate::window::set_window_state(&mut self.state, window, target);
    }

    /// Start a compositor-driven interactive move, anchored to the last input event
    pub fn start_interactive_move(&mut self, window: WindowId) {
        crate::window::start_interactive_move(&mut self.state, window);
    }

    /// Start a compositor-driven interactive resize from `edge`
    pub fn start_interactive_resize(&mut self, window: WindowId, edge: ResizeEdge) {
        crate::window::start_interactive_resize(&mut self.state, window, edge);
    }

    /// Pop up the compositor's window menu at a surface-local position
    pub fn show_window_menu(&mut self, window: WindowId, position: Point<i32>) {
        crate::window::show_window_menu(&mut self.state, window, position);
    }

    /// Map a hidden window again, creating fresh shell role objects
    pub fn show_window(&mut self, window: WindowId) {
        crate::window::show(&mut self.state, window);
    }

    /// Unmap a window; surface and backing store survive for a later show
    pub fn hide_window(&mut self, window: WindowId) {
        crate::window::hide(&mut self.state, window);
    }

    /// Destroy a window, its role, surface and buffers, and clear any focus on it
    pub fn destroy_window(&mut self, window: WindowId) {
        crate::window::destroy_window(&mut self.state, window);
    }

    /// Redirect all pointer events to `window` (or release the redirect with `None`)
    ///
    /// While grabbed, events physically outside the grab window are delivered to it
    /// with the out-of-window position `(-1, -1)`.
    pub fn set_pointer_grab(&mut self, window: Option<WindowId>) {
        self.state.set_pointer_grab(window);
    }

    /// The deadline of the next synthetic key-repeat event, if a key is repeating
    pub fn next_repeat_deadline(&self) -> Option<Instant> {
        self.state
            .seats
            .iter()
            .filter_map(|seat| seat.keyboard().and_then(|kbd| kbd.repeat_deadline()))
            .min()
    }

    /// Emit the synthetic key events whose deadline has passed
    ///
    /// The embedding loop arms a timer from [`Display::next_repeat_deadline`] and
    /// calls this when it fires.
    pub fn dispatch_key_repeats(&mut self, now: Instant) {
        crate::input::keyboard::dispatch_repeats(&mut self.state, now);
    }

    fn dispatch_blocking(&mut self) -> Result<usize, EngineError> {
        match self.queue.blocking_dispatch(&mut self.state) {
            Ok(n) => Ok(n),
            Err(err) => fatal(&EngineError::from(err)),
        }
    }

    fn flush(&mut self) -> Result<(), EngineError> {
        match self.conn.flush() {
            Ok(()) => Ok(()),
            Err(WaylandError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(err) => fatal(&EngineError::from(err)),
        }
    }
}

/// Log a connection-level failure and terminate
///
/// The protocol offers no partial-failure recovery for a broken display connection,
/// and a client without a display has nothing left to do.
pub(crate) fn fatal(err: &EngineError) -> ! {
    error!("fatal display error: {}", err);
    std::process::exit(1);
}

impl Dispatch<wl_callback::WlCallback, CallbackKind> for ClientState {
    fn event(
        state: &mut Self,
        callback: &wl_callback::WlCallback,
        event: wl_callback::Event,
        data: &CallbackKind,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { .. } = event {
            match *data {
                CallbackKind::Sync(tag) => {
                    trace!(tag = u32::from(tag), "sync callback done");
                    state.completed_syncs.push(tag.into());
                }
                CallbackKind::Frame(window) => {
                    crate::window::frame_done(state, window, callback);
                }
            }
        }
    }
}
