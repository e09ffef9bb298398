#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! # Bellows: a Wayland client windowing engine
//!
//! This crate is the protocol-facing half of a Wayland client: it owns the
//! compositor connection, negotiates globals, manages shell-surface roles, shared
//! memory backing stores and input devices, and reports everything that happens
//! as a stream of [`window::WindowEvent`]s. The widget, painting and application
//! logic on top of it is somebody else's job; bellows stops at pixels-in-a-buffer
//! and events-out-of-a-queue.
//!
//! ## Structure of the crate
//!
//! - [`display`] owns the [`Connection`](wayland_client::Connection), the default
//!   event queue and the dispatch primitives (tagged round trips, non-blocking
//!   pumps, blocking waits). [`display::Display`] is the entry point and the
//!   facade every embedder drives.
//! - [`display::registry`] tracks globals and replays announcements to listeners
//!   registered late.
//! - [`window`] ties surfaces, shell roles and backing stores into [`window::Window`]s
//!   addressed by arena ids, and defines the upward event stream.
//! - [`shell`] hides the three supported shell protocols (`wl_shell`, xdg-shell
//!   unstable v5 and v6) behind one role interface with a diffed, idempotent
//!   window-state machine.
//! - [`shm`] allocates shared-memory buffers and bounds them per window, with
//!   blocking backpressure when the compositor falls behind.
//! - [`input`] multiplexes seats into keyboards (with client-side key repeat),
//!   pointers (with grab routing) and touch (with frame batching).
//! - [`output`] mirrors advertised screens and their done-latched property model.
//!
//! ## The event loop
//!
//! The engine does not own a loop. It exposes its poll fd, non-blocking pumps and
//! timer deadlines so it can be embedded in any reactor; [`display::source::WaylandSource`]
//! adapts it to [`calloop`] for embedders that use one.
//!
//! ## Logging
//!
//! All diagnostics go through [`tracing`]. Connection-level failures are logged
//! and terminate the process; there is no recovery from a broken display socket.

/// Shared connection state carrying globals, windows and the event queue
pub mod client;
/// Connection setup, dispatch driving and the [`Display`](display::Display) facade
pub mod display;
/// Seats and their keyboard, pointer and touch devices
pub mod input;
/// Output tracking and screen change notification
pub mod output;
mod protocols;
/// Re-exports of the wayland crates used in the public API
pub mod reexports;
/// Shell protocol roles and the configure state machine
pub mod shell;
/// Shared-memory buffer pool
pub mod shm;
/// `wl_surface` wrapper with frame callback throttling
pub mod surface;
/// Geometry and serial primitives
pub mod utils;
/// Windows, their lifecycle and the upward event stream
pub mod window;
