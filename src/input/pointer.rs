//! Pointer input, focus and grab routing
//!
//! Focus follows the compositor's enter/leave, but delivery can be redirected by
//! a client-side grab: while a grab window is set, every motion, button and axis
//! event lands on it regardless of which surface the pointer is physically over.
//! Events that occur outside the grab window carry the synthetic out-of-window
//! position `(-1, -1)` so the grab holder can tell "released over me" from
//! "released somewhere else". Menus and drag handles depend on that distinction.

use tracing::trace;
use wayland_client::protocol::{wl_pointer, wl_surface};
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle, WEnum};

use crate::client::ClientState;
use crate::input::{DeviceKind, LastInput, SeatId};
use crate::utils::Point;
use crate::window::{WindowEvent, WindowId};

/// Synthetic position reported to a grab window while the pointer is elsewhere
fn out_of_window() -> Point<f64> {
    Point::new(-1.0, -1.0)
}

/// Decide which window an event goes to and at what position
///
/// Grab beats focus; a grabbed event away from the grab window gets the
/// out-of-window position. With neither grab nor focus the event is dropped.
fn route(
    grab: Option<WindowId>,
    focus: Option<WindowId>,
    position: Point<f64>,
) -> Option<(WindowId, Point<f64>)> {
    match (grab, focus) {
        (Some(g), Some(f)) if g == f => Some((g, position)),
        (Some(g), _) => Some((g, out_of_window())),
        (None, Some(f)) => Some((f, position)),
        (None, None) => None,
    }
}

/// Source of a scroll frame, as reported by seats of version 5 and up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSource {
    /// A physical wheel with detents
    Wheel,
    /// Finger motion on a touchpad
    Finger,
    /// Continuous device, e.g. button-initiated scrolling
    Continuous,
    /// Tilting the wheel sideways
    WheelTilt,
}

/// One coherent scroll frame
///
/// Pointers of version 5 group their axis events between `frame` markers; older
/// pointers deliver one frame per event. Either way the embedder sees a single
/// consistent description of the scroll step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisFrame {
    /// Source of the frame, if the seat reports one
    pub source: Option<AxisSource>,
    /// Time of the latest event folded into the frame
    pub time: u32,
    /// Raw scroll value per axis, in surface-local units
    pub axis: (f64, f64),
    /// Wheel detent steps per axis, when the source has detents
    pub discrete: (i32, i32),
    /// Whether the axis stopped moving, per axis
    ///
    /// Only meaningful for [`AxisSource::Finger`] frames, where it marks the end
    /// of kinetic scrolling.
    pub stop: (bool, bool),
}

impl AxisFrame {
    fn new(time: u32) -> AxisFrame {
        AxisFrame {
            source: None,
            time,
            axis: (0.0, 0.0),
            discrete: (0, 0),
            stop: (false, false),
        }
    }
}

/// One seat's pointer device
#[derive(Debug)]
pub struct Pointer {
    wl: wl_pointer::WlPointer,
    version: u32,
    focus: Option<WindowId>,
    position: Point<f64>,
    /// Bitmask of held buttons, bit N for button code 0x110 + N
    buttons: u32,
    enter_serial: u32,
    last_press_serial: Option<u32>,
    /// Scroll events accumulated since the last frame marker
    pending_axis: Option<AxisFrame>,
}

impl Pointer {
    pub(crate) fn new(wl: wl_pointer::WlPointer, version: u32) -> Pointer {
        Pointer {
            wl,
            version,
            focus: None,
            position: Point::new(0.0, 0.0),
            buttons: 0,
            enter_serial: 0,
            last_press_serial: None,
            pending_axis: None,
        }
    }

    /// The window the pointer is physically over, if any
    pub fn focus(&self) -> Option<WindowId> {
        self.focus
    }

    /// Last surface-local position
    pub fn position(&self) -> Point<f64> {
        self.position
    }

    /// Whether any button is held
    pub fn any_button_held(&self) -> bool {
        self.buttons != 0
    }

    /// Serial of the most recent button press, for grab-style requests
    pub fn last_press_serial(&self) -> Option<u32> {
        self.last_press_serial
    }

    /// Serial of the most recent enter, quoted by set_cursor
    pub fn enter_serial(&self) -> u32 {
        self.enter_serial
    }

    /// Set the cursor image shown while this pointer is over the client, or hide
    /// it with `None`
    ///
    /// The surface content becomes the cursor with its origin at `hotspot`. The
    /// request quotes the latest enter serial, so it is only meaningful while the
    /// pointer is over one of our windows.
    pub fn set_cursor(&self, surface: Option<&wl_surface::WlSurface>, hotspot: Point<i32>) {
        self.wl
            .set_cursor(self.enter_serial, surface, hotspot.x, hotspot.y);
    }

    pub(crate) fn clear_focus_on(&mut self, window: WindowId) {
        if self.focus == Some(window) {
            self.focus = None;
        }
    }

    pub(crate) fn release(self) {
        if self.version >= 3 {
            self.wl.release();
        }
    }

    fn note_button(&mut self, button: u32, pressed: bool) {
        self.buttons = apply_button_mask(self.buttons, button, pressed);
    }

    /// Fold an axis-family event into the pending frame
    fn accumulate(&mut self, time: u32, f: impl FnOnce(&mut AxisFrame)) -> &mut AxisFrame {
        let frame = self.pending_axis.get_or_insert_with(|| AxisFrame::new(time));
        if time != 0 {
            frame.time = time;
        }
        f(frame);
        frame
    }

    /// Whether axis events complete immediately instead of waiting for `frame`
    fn unframed(&self) -> bool {
        self.version < 5
    }
}

/// Fold a button edge into the held-buttons mask (codes below BTN_LEFT and
/// above the 32 tracked ones are ignored)
fn apply_button_mask(mask: u32, button: u32, pressed: bool) -> u32 {
    match button.checked_sub(0x110).filter(|b| *b < 32) {
        Some(bit) if pressed => mask | (1 << bit),
        Some(bit) => mask & !(1 << bit),
        None => mask,
    }
}

fn pointer_mut(state: &mut ClientState, id: SeatId) -> Option<&mut Pointer> {
    state.seat_mut(id).and_then(|s| s.pointer.as_mut())
}

/// Deliver the pending scroll frame, if any, through grab routing
fn flush_axis_frame(state: &mut ClientState, id: SeatId) {
    let grab = state.pointer_grab;
    let (frame, focus) = match pointer_mut(state, id) {
        Some(ptr) => match ptr.pending_axis.take() {
            Some(frame) => (frame, ptr.focus),
            None => return,
        },
        None => return,
    };
    if let Some((window, _)) = route(grab, focus, Point::new(0.0, 0.0)) {
        state.push_event(WindowEvent::PointerAxis { window, frame });
    }
}

impl Dispatch<wl_pointer::WlPointer, SeatId> for ClientState {
    fn event(
        state: &mut Self,
        _pointer: &wl_pointer::WlPointer,
        event: wl_pointer::Event,
        data: &SeatId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_pointer::Event::Enter {
                serial,
                surface,
                surface_x,
                surface_y,
            } => {
                let Some(window) = surface.data::<WindowId>().copied() else {
                    return;
                };
                let position = Point::new(surface_x, surface_y);
                if let Some(ptr) = pointer_mut(state, *data) {
                    ptr.focus = Some(window);
                    ptr.position = position;
                    ptr.enter_serial = serial;
                }
                state.push_event(WindowEvent::PointerEntered { window, position });
            }
            wl_pointer::Event::Leave { surface, .. } => {
                let window = surface.data::<WindowId>().copied();
                if let Some(ptr) = pointer_mut(state, *data) {
                    ptr.focus = None;
                }
                if let Some(window) = window {
                    state.push_event(WindowEvent::PointerLeft { window });
                }
            }
            wl_pointer::Event::Motion {
                time,
                surface_x,
                surface_y,
            } => {
                let position = Point::new(surface_x, surface_y);
                let grab = state.pointer_grab;
                let focus = match pointer_mut(state, *data) {
                    Some(ptr) => {
                        ptr.position = position;
                        ptr.focus
                    }
                    None => return,
                };
                if let Some((window, position)) = route(grab, focus, position) {
                    state.push_event(WindowEvent::PointerMotion {
                        window,
                        position,
                        time,
                    });
                }
            }
            wl_pointer::Event::Button {
                serial,
                time,
                button,
                state: button_state,
            } => {
                let pressed =
                    matches!(button_state, WEnum::Value(wl_pointer::ButtonState::Pressed));
                let grab = state.pointer_grab;
                let (focus, position) = match pointer_mut(state, *data) {
                    Some(ptr) => {
                        ptr.note_button(button, pressed);
                        if pressed {
                            ptr.last_press_serial = Some(serial);
                        }
                        (ptr.focus, ptr.position)
                    }
                    None => return,
                };
                if let Some((window, position)) = route(grab, focus, position) {
                    if pressed {
                        state.last_input = Some(LastInput {
                            seat: *data,
                            serial,
                            kind: DeviceKind::Pointer,
                            window,
                        });
                    }
                    state.push_event(WindowEvent::PointerButton {
                        window,
                        button,
                        pressed,
                        position,
                        serial,
                        time,
                    });
                } else {
                    trace!(button, "button event with no focus and no grab dropped");
                }
            }
            wl_pointer::Event::Axis { time, axis, value } => {
                if let Some(ptr) = pointer_mut(state, *data) {
                    ptr.accumulate(time, |frame| match axis {
                        WEnum::Value(wl_pointer::Axis::HorizontalScroll) => frame.axis.0 += value,
                        WEnum::Value(wl_pointer::Axis::VerticalScroll) => frame.axis.1 += value,
                        _ => {}
                    });
                    if ptr.unframed() {
                        flush_axis_frame(state, *data);
                    }
                }
            }
            wl_pointer::Event::AxisSource { axis_source } => {
                let source = match axis_source {
                    WEnum::Value(wl_pointer::AxisSource::Wheel) => AxisSource::Wheel,
                    WEnum::Value(wl_pointer::AxisSource::Finger) => AxisSource::Finger,
                    WEnum::Value(wl_pointer::AxisSource::Continuous) => AxisSource::Continuous,
                    WEnum::Value(wl_pointer::AxisSource::WheelTilt) => AxisSource::WheelTilt,
                    _ => return,
                };
                if let Some(ptr) = pointer_mut(state, *data) {
                    ptr.accumulate(0, |frame| frame.source = Some(source));
                }
            }
            wl_pointer::Event::AxisStop { time, axis } => {
                if let Some(ptr) = pointer_mut(state, *data) {
                    ptr.accumulate(time, |frame| match axis {
                        WEnum::Value(wl_pointer::Axis::HorizontalScroll) => frame.stop.0 = true,
                        WEnum::Value(wl_pointer::Axis::VerticalScroll) => frame.stop.1 = true,
                        _ => {}
                    });
                    if ptr.unframed() {
                        flush_axis_frame(state, *data);
                    }
                }
            }
            wl_pointer::Event::AxisDiscrete { axis, discrete } => {
                if let Some(ptr) = pointer_mut(state, *data) {
                    ptr.accumulate(0, |frame| match axis {
                        WEnum::Value(wl_pointer::Axis::HorizontalScroll) => {
                            frame.discrete.0 += discrete
                        }
                        WEnum::Value(wl_pointer::Axis::VerticalScroll) => {
                            frame.discrete.1 += discrete
                        }
                        _ => {}
                    });
                }
            }
            wl_pointer::Event::Frame => {
                flush_axis_frame(state, *data);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W1: WindowId = WindowId(1);
    const W2: WindowId = WindowId(2);

    #[test]
    fn no_grab_routes_to_focus() {
        let pos = Point::new(10.0, 20.0);
        assert_eq!(route(None, Some(W1), pos), Some((W1, pos)));
    }

    #[test]
    fn no_grab_no_focus_drops() {
        assert_eq!(route(None, None, Point::new(1.0, 1.0)), None);
    }

    #[test]
    fn grab_over_own_window_keeps_real_position() {
        let pos = Point::new(5.0, 5.0);
        assert_eq!(route(Some(W1), Some(W1), pos), Some((W1, pos)));
    }

    #[test]
    fn grab_away_from_window_synthesizes_position() {
        let pos = Point::new(5.0, 5.0);
        assert_eq!(route(Some(W1), Some(W2), pos), Some((W1, out_of_window())));
        assert_eq!(route(Some(W1), None, pos), Some((W1, out_of_window())));
    }

    #[test]
    fn button_mask_tracks_held_buttons() {
        let mut mask = 0u32;
        mask = apply_button_mask(mask, 0x110, true);
        mask = apply_button_mask(mask, 0x111, true);
        mask = apply_button_mask(mask, 0x110, false);
        assert_eq!(mask, 0b10);
        // releasing an untracked code leaves the mask alone
        assert_eq!(apply_button_mask(mask, 0x10, false), 0b10);
    }
}
