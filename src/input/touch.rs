//! Touch input batching
//!
//! Raw touch events arrive point by point; only the `frame` event marks a set of
//! updates as one coherent multi-point snapshot. [`FrameAssembler`] buffers the
//! raw updates and flushes them per window on `frame`, carrying points the
//! compositor did not mention forward as `Stationary` so every frame describes
//! the full contact set.
//!
//! Some widget layers expect one final empty frame after the last contact lifts
//! to close the gesture; that shim is on by default and can be turned off where
//! the embedder handles gesture end itself.

use tracing::trace;
use wayland_client::protocol::wl_touch;
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle};

use crate::client::ClientState;
use crate::input::{DeviceKind, LastInput, SeatId};
use crate::utils::Point;
use crate::window::{WindowEvent, WindowId};

/// Lifecycle phase of one touch point within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    /// The point just made contact
    Down,
    /// The point moved since the previous frame
    Motion,
    /// Present but unchanged since the previous frame
    Stationary,
    /// The point lifted off
    Up,
}

/// One contact as delivered in a flushed frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    /// Compositor-assigned contact id, stable for the sequence
    pub id: i32,
    /// Position in surface coordinates
    pub position: Point<f64>,
    /// Phase within this frame
    pub phase: TouchPhase,
}

#[derive(Debug, Clone, Copy)]
struct ActivePoint {
    id: i32,
    window: WindowId,
    position: Point<f64>,
    phase: TouchPhase,
    /// Whether this frame updated the point
    fresh: bool,
}

/// Pure frame batching, independent of the wire objects
#[derive(Debug, Default)]
pub(crate) struct FrameAssembler {
    points: Vec<ActivePoint>,
    /// Append an empty frame once the last contact lifts
    synthesize_final_frame: bool,
}

impl FrameAssembler {
    fn new(synthesize_final_frame: bool) -> FrameAssembler {
        FrameAssembler {
            points: Vec::new(),
            synthesize_final_frame,
        }
    }

    fn down(&mut self, id: i32, window: WindowId, position: Point<f64>) {
        // a stale point with the same id is superseded, not duplicated
        self.points.retain(|p| p.id != id);
        self.points.push(ActivePoint {
            id,
            window,
            position,
            phase: TouchPhase::Down,
            fresh: true,
        });
    }

    fn motion(&mut self, id: i32, position: Point<f64>) {
        if let Some(point) = self.points.iter_mut().find(|p| p.id == id) {
            point.position = position;
            point.phase = TouchPhase::Motion;
            point.fresh = true;
        }
    }

    fn up(&mut self, id: i32) {
        if let Some(point) = self.points.iter_mut().find(|p| p.id == id) {
            point.phase = TouchPhase::Up;
            point.fresh = true;
        }
    }

    /// Whether every remaining contact lifted, ending the gesture
    fn all_lifted(&self) -> bool {
        !self.points.is_empty() && self.points.iter().all(|p| p.phase == TouchPhase::Up)
    }

    /// Flush one frame: per-window full contact snapshots, untouched points
    /// carried forward as stationary
    fn flush(&mut self, time: u32) -> Vec<(WindowId, Vec<TouchPoint>)> {
        if self.points.is_empty() {
            return Vec::new();
        }
        let mut frames: Vec<(WindowId, Vec<TouchPoint>)> = Vec::new();
        let mut lifted = false;
        for point in &mut self.points {
            if !point.fresh {
                point.phase = TouchPhase::Stationary;
            }
            if point.phase == TouchPhase::Up {
                lifted = true;
            }
            let sample = TouchPoint {
                id: point.id,
                position: point.position,
                phase: point.phase,
            };
            match frames.iter_mut().find(|(w, _)| *w == point.window) {
                Some((_, list)) => list.push(sample),
                None => frames.push((point.window, vec![sample])),
            }
        }
        let last_window = self.points.last().map(|p| p.window);
        self.points.retain(|p| p.phase != TouchPhase::Up);
        for point in &mut self.points {
            point.fresh = false;
        }
        if lifted && self.points.is_empty() && self.synthesize_final_frame {
            if let Some(window) = last_window {
                trace!(?window, time, "synthesizing gesture-end frame");
                frames.push((window, Vec::new()));
            }
        }
        frames
    }

    /// Drop all contacts, reporting which windows had any
    fn cancel(&mut self) -> Vec<WindowId> {
        let mut windows: Vec<WindowId> = Vec::new();
        for point in self.points.drain(..) {
            if !windows.contains(&point.window) {
                windows.push(point.window);
            }
        }
        windows
    }

    fn active_windows(&self) -> Vec<WindowId> {
        let mut windows: Vec<WindowId> = Vec::new();
        for point in &self.points {
            if !windows.contains(&point.window) {
                windows.push(point.window);
            }
        }
        windows
    }

    fn forget_window(&mut self, window: WindowId) {
        self.points.retain(|p| p.window != window);
    }
}

/// One seat's touch device
#[derive(Debug)]
pub struct Touch {
    wl: wl_touch::WlTouch,
    version: u32,
    assembler: FrameAssembler,
}

impl Touch {
    pub(crate) fn new(wl: wl_touch::WlTouch, version: u32) -> Touch {
        Touch {
            wl,
            version,
            assembler: FrameAssembler::new(true),
        }
    }

    /// Disable or re-enable the synthetic gesture-end frame
    pub fn set_synthesize_final_frame(&mut self, enabled: bool) {
        self.assembler.synthesize_final_frame = enabled;
    }

    /// Windows with at least one active contact
    pub(crate) fn active_windows(&self) -> Vec<WindowId> {
        self.assembler.active_windows()
    }

    pub(crate) fn clear_focus_on(&mut self, window: WindowId) {
        self.assembler.forget_window(window);
    }

    pub(crate) fn release(self) {
        if self.version >= 3 {
            self.wl.release();
        }
    }
}

fn touch_mut(state: &mut ClientState, id: SeatId) -> Option<&mut Touch> {
    state.seat_mut(id).and_then(|s| s.touch.as_mut())
}

impl Dispatch<wl_touch::WlTouch, SeatId> for ClientState {
    fn event(
        state: &mut Self,
        _touch: &wl_touch::WlTouch,
        event: wl_touch::Event,
        data: &SeatId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_touch::Event::Down {
                serial,
                surface,
                id,
                x,
                y,
                ..
            } => {
                let Some(window) = surface.data::<WindowId>().copied() else {
                    return;
                };
                if let Some(touch) = touch_mut(state, *data) {
                    touch.assembler.down(id, window, Point::new(x, y));
                }
                state.last_input = Some(LastInput {
                    seat: *data,
                    serial,
                    kind: DeviceKind::Touch,
                    window,
                });
            }
            wl_touch::Event::Up { id, .. } => {
                let frames = match touch_mut(state, *data) {
                    Some(touch) => {
                        touch.assembler.up(id);
                        // The protocol does not promise a frame after the last up;
                        // deliver the batch here so the gesture always closes. A
                        // frame that does arrive afterwards finds nothing left.
                        if touch.assembler.synthesize_final_frame
                            && touch.assembler.all_lifted()
                        {
                            touch.assembler.flush(0)
                        } else {
                            Vec::new()
                        }
                    }
                    None => return,
                };
                for (window, points) in frames {
                    state.push_event(WindowEvent::Touch { window, points });
                }
            }
            wl_touch::Event::Motion { id, x, y, .. } => {
                if let Some(touch) = touch_mut(state, *data) {
                    touch.assembler.motion(id, Point::new(x, y));
                }
            }
            wl_touch::Event::Frame => {
                let frames = match touch_mut(state, *data) {
                    Some(touch) => touch.assembler.flush(0),
                    None => return,
                };
                for (window, points) in frames {
                    state.push_event(WindowEvent::Touch { window, points });
                }
            }
            wl_touch::Event::Cancel => {
                let windows = match touch_mut(state, *data) {
                    Some(touch) => touch.assembler.cancel(),
                    None => return,
                };
                for window in windows {
                    state.push_event(WindowEvent::TouchCancelled { window });
                }
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

    fn pt(x: f64, y: f64) -> Point<f64> {
        Point::new(x, y)
    }

    #[test]
    fn frame_flushes_all_updates_at_once() {
        let mut asm = FrameAssembler::new(false);
        asm.down(0, W1, pt(10.0, 10.0));
        asm.down(1, W1, pt(20.0, 20.0));
        let frames = asm.flush(1);
        assert_eq!(frames.len(), 1);
        let (window, points) = &frames[0];
        assert_eq!(*window, W1);
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.phase == TouchPhase::Down));
    }

    #[test]
    fn unmentioned_points_carry_forward_as_stationary() {
        let mut asm = FrameAssembler::new(false);
        asm.down(0, W1, pt(10.0, 10.0));
        asm.down(1, W1, pt(20.0, 20.0));
        asm.flush(1);
        // second frame only moves point 1
        asm.motion(1, pt(25.0, 25.0));
        let frames = asm.flush(2);
        let (_, points) = &frames[0];
        let p0 = points.iter().find(|p| p.id == 0).unwrap();
        let p1 = points.iter().find(|p| p.id == 1).unwrap();
        assert_eq!(p0.phase, TouchPhase::Stationary);
        assert_eq!(p0.position, pt(10.0, 10.0));
        assert_eq!(p1.phase, TouchPhase::Motion);
        assert_eq!(p1.position, pt(25.0, 25.0));
    }

    #[test]
    fn lifted_points_leave_the_contact_set() {
        let mut asm = FrameAssembler::new(false);
        asm.down(0, W1, pt(10.0, 10.0));
        asm.down(1, W1, pt(20.0, 20.0));
        asm.flush(1);
        asm.up(0);
        let frames = asm.flush(2);
        let (_, points) = &frames[0];
        assert_eq!(points.iter().find(|p| p.id == 0).unwrap().phase, TouchPhase::Up);
        // frame 3: only point 1 remains
        let frames = asm.flush(3);
        let (_, points) = &frames[0];
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id, 1);
    }

    #[test]
    fn last_up_synthesizes_gesture_end_frame() {
        let mut asm = FrameAssembler::new(true);
        asm.down(0, W1, pt(10.0, 10.0));
        asm.flush(1);
        asm.up(0);
        let frames = asm.flush(2);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].1[0].phase, TouchPhase::Up);
        assert!(frames[1].1.is_empty());
    }

    #[test]
    fn last_up_closes_the_gesture_without_a_wire_frame() {
        let mut asm = FrameAssembler::new(true);
        asm.down(0, W1, pt(10.0, 10.0));
        asm.down(1, W1, pt(20.0, 20.0));
        asm.flush(1);
        asm.up(0);
        // one contact remains, the gesture is still open
        assert!(!asm.all_lifted());
        asm.flush(2);
        asm.up(1);
        assert!(asm.all_lifted());
        // the up handler flushes at this point rather than waiting for a frame
        // the compositor may never send
        let frames = asm.flush(3);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].1[0].phase, TouchPhase::Up);
        assert!(frames[1].1.is_empty());
        assert!(asm.active_windows().is_empty());
        // a late wire frame finds nothing left to deliver
        assert!(asm.flush(4).is_empty());
    }

    #[test]
    fn gesture_end_shim_can_be_disabled() {
        let mut asm = FrameAssembler::new(false);
        asm.down(0, W1, pt(10.0, 10.0));
        asm.flush(1);
        asm.up(0);
        let frames = asm.flush(2);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn frames_split_per_window() {
        let mut asm = FrameAssembler::new(false);
        asm.down(0, W1, pt(1.0, 1.0));
        asm.down(1, W2, pt(2.0, 2.0));
        let frames = asm.flush(1);
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn empty_frame_flushes_nothing() {
        let mut asm = FrameAssembler::new(true);
        assert!(asm.flush(1).is_empty());
    }

    #[test]
    fn cancel_reports_each_window_once() {
        let mut asm = FrameAssembler::new(true);
        asm.down(0, W1, Point::new(1.0, 1.0));
        asm.down(1, W1, Point::new(2.0, 2.0));
        asm.down(2, W2, Point::new(3.0, 3.0));
        assert_eq!(asm.cancel(), vec![W1, W2]);
        // everything is gone, a later frame has nothing to flush
        assert!(asm.flush(1).is_empty());
    }

    #[test]
    fn forgetting_a_window_keeps_other_contacts() {
        let mut asm = FrameAssembler::new(true);
        asm.down(0, W1, Point::new(1.0, 1.0));
        asm.down(1, W2, Point::new(2.0, 2.0));
        asm.forget_window(W1);
        assert_eq!(asm.active_windows(), vec![W2]);
        let frames = asm.flush(1);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, W2);
    }

    #[test]
    fn reused_contact_id_supersedes_the_stale_point() {
        let mut asm = FrameAssembler::new(true);
        asm.down(0, W1, Point::new(1.0, 1.0));
        asm.down(0, W1, Point::new(9.0, 9.0));
        let frames = asm.flush(1);
        assert_eq!(frames[0].1.len(), 1);
        assert_eq!(frames[0].1[0].position, Point::new(9.0, 9.0));
    }
}
