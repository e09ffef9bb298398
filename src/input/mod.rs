//! Seat input multiplexing
//!
//! A `wl_seat` is a bundle of at most one keyboard, one pointer and one touch
//! device, advertised through a capabilities bitmask that can change at any time
//! (hotplug, compositor policy). [`InputSeat`] owns the per-device state and
//! diffs capability updates into device creation and teardown; tearing down a
//! device that currently holds focus synthesizes the leave the compositor will
//! never send.
//!
//! Focus is tracked as [`WindowId`]s resolved through the window arena, so a
//! window destroyed mid-gesture degrades into dropped events rather than a
//! dangling reference.

use tracing::{debug, trace};
use wayland_client::protocol::wl_seat;
use wayland_client::{Connection, Dispatch, QueueHandle, WEnum};

use crate::client::ClientState;
use crate::window::{WindowEvent, WindowId};

/// Keyboard device, xkb state and key repeat
pub mod keyboard;
/// Pointer device and grab routing
pub mod pointer;
/// Touch device and frame batching
pub mod touch;

pub use keyboard::{Keyboard, ModifiersState};
pub use pointer::{AxisFrame, AxisSource, Pointer};
pub use touch::{Touch, TouchPhase, TouchPoint};

/// Identifies a seat by its registry global name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeatId(pub(crate) u32);

/// The device class an input event originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// A `wl_keyboard`
    Keyboard,
    /// A `wl_pointer`
    Pointer,
    /// A `wl_touch`
    Touch,
}

/// The seat, serial, device and target window of the most recent input event
///
/// Interactive move/resize and popup grabs must quote the serial of the user
/// action that triggered them; this is where that serial comes from.
#[derive(Debug, Clone, Copy)]
pub struct LastInput {
    /// Seat the event arrived on
    pub seat: SeatId,
    /// Protocol serial of the event
    pub serial: u32,
    /// Device class that produced the event
    pub kind: DeviceKind,
    /// Window the event was delivered to
    pub window: WindowId,
}

/// One `wl_seat` and the devices its capabilities currently grant
#[derive(Debug)]
pub struct InputSeat {
    global_name: u32,
    seat: wl_seat::WlSeat,
    version: u32,
    name: String,
    pub(crate) keyboard: Option<Keyboard>,
    pub(crate) pointer: Option<Pointer>,
    pub(crate) touch: Option<Touch>,
}

impl InputSeat {
    pub(crate) fn new(global_name: u32, seat: wl_seat::WlSeat, version: u32) -> InputSeat {
        InputSeat {
            global_name,
            seat,
            version,
            name: String::new(),
            keyboard: None,
            pointer: None,
            touch: None,
        }
    }

    /// Stable handle for this seat
    pub fn id(&self) -> SeatId {
        SeatId(self.global_name)
    }

    pub(crate) fn global_name(&self) -> u32 {
        self.global_name
    }

    /// The underlying seat object
    pub fn wl_seat(&self) -> &wl_seat::WlSeat {
        &self.seat
    }

    /// Compositor-assigned seat name, empty until the name event arrives
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keyboard device, if the seat currently has the capability
    pub fn keyboard(&self) -> Option<&Keyboard> {
        self.keyboard.as_ref()
    }

    /// Pointer device, if the seat currently has the capability
    pub fn pointer(&self) -> Option<&Pointer> {
        self.pointer.as_ref()
    }

    /// Touch device, if the seat currently has the capability
    pub fn touch(&self) -> Option<&Touch> {
        self.touch.as_ref()
    }
}

impl Dispatch<wl_seat::WlSeat, SeatId> for ClientState {
    fn event(
        state: &mut Self,
        _seat: &wl_seat::WlSeat,
        event: wl_seat::Event,
        data: &SeatId,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_seat::Event::Capabilities {
                capabilities: WEnum::Value(caps),
            } => {
                apply_capabilities(state, *data, caps, qh);
            }
            wl_seat::Event::Name { name } => {
                if let Some(seat) = state.seat_mut(*data) {
                    seat.name = name;
                }
            }
            _ => {}
        }
    }
}

fn apply_capabilities(
    state: &mut ClientState,
    id: SeatId,
    caps: wl_seat::Capability,
    qh: &QueueHandle<ClientState>,
) {
    let Some(seat) = state.seat_mut(id) else {
        return;
    };
    debug!(seat = id.0, ?caps, "seat capabilities changed");

    let want_kbd = caps.contains(wl_seat::Capability::Keyboard);
    if want_kbd && seat.keyboard.is_none() {
        let wl = seat.seat.get_keyboard(qh, id);
        seat.keyboard = Some(Keyboard::new(wl, seat.version));
    }
    let lost_kbd = if want_kbd { None } else { seat.keyboard.take() };

    let want_ptr = caps.contains(wl_seat::Capability::Pointer);
    if want_ptr && seat.pointer.is_none() {
        let wl = seat.seat.get_pointer(qh, id);
        seat.pointer = Some(Pointer::new(wl, seat.version));
    }
    let lost_ptr = if want_ptr { None } else { seat.pointer.take() };

    let want_touch = caps.contains(wl_seat::Capability::Touch);
    if want_touch && seat.touch.is_none() {
        let wl = seat.seat.get_touch(qh, id);
        seat.touch = Some(Touch::new(wl, seat.version));
    }
    let lost_touch = if want_touch { None } else { seat.touch.take() };

    if let Some(kbd) = lost_kbd {
        retire_keyboard(state, kbd);
    }
    if let Some(ptr) = lost_ptr {
        retire_pointer(state, ptr);
    }
    if let Some(touch) = lost_touch {
        retire_touch(state, touch);
    }
}

fn retire_keyboard(state: &mut ClientState, kbd: Keyboard) {
    if let Some(window) = kbd.focus() {
        trace!(?window, "keyboard removed while focused, synthesizing leave");
        state.push_event(WindowEvent::KeyboardFocus {
            window,
            focused: false,
        });
    }
    kbd.release();
}

fn retire_pointer(state: &mut ClientState, ptr: Pointer) {
    if let Some(window) = ptr.focus() {
        trace!(?window, "pointer removed while focused, synthesizing leave");
        state.push_event(WindowEvent::PointerLeft { window });
    }
    ptr.release();
}

fn retire_touch(state: &mut ClientState, touch: Touch) {
    for window in touch.active_windows() {
        state.push_event(WindowEvent::TouchCancelled { window });
    }
    touch.release();
}

/// Tear down a whole seat after its global was removed
pub(crate) fn retire_seat(state: &mut ClientState, mut seat: InputSeat) {
    if let Some(kbd) = seat.keyboard.take() {
        retire_keyboard(state, kbd);
    }
    if let Some(ptr) = seat.pointer.take() {
        retire_pointer(state, ptr);
    }
    if let Some(touch) = seat.touch.take() {
        retire_touch(state, touch);
    }
    if state.last_input.map(|l| l.seat) == Some(seat.id()) {
        state.last_input = None;
    }
    if seat.version >= 5 {
        seat.seat.release();
    }
}

/// Forget any focus a destroyed window held across all seats
pub(crate) fn clear_window_focus(state: &mut ClientState, window: crate::window::WindowId) {
    for seat in &mut state.seats {
        if let Some(kbd) = seat.keyboard.as_mut() {
            kbd.clear_focus_on(window);
        }
        if let Some(ptr) = seat.pointer.as_mut() {
            ptr.clear_focus_on(window);
        }
        if let Some(touch) = seat.touch.as_mut() {
            touch.clear_focus_on(window);
        }
    }
    if state.pointer_grab == Some(window) {
        state.pointer_grab = None;
    }
    // A serial quoted against a destroyed window must not trigger grabs
    if state.last_input.map(|l| l.window) == Some(window) {
        state.last_input = None;
    }
}
