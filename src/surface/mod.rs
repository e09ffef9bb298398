//! Surface commit protocol
//!
//! [`Surface`] wraps a `wl_surface` and enforces the commit discipline the rest of
//! the crate relies on: content changes (attach, damage) are staged and become
//! visible atomically at `commit`, and at most one frame callback is outstanding
//! per surface at any time. The single-slot rule is what throttles repaints to the
//! compositor's pace; requesting a second callback while one is pending would let a
//! runaway painter queue unbounded work.

use tracing::trace;
use wayland_client::protocol::{wl_callback, wl_compositor, wl_output, wl_surface};
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle};

use crate::client::ClientState;
use crate::display::CallbackKind;
use crate::output::Screen;
use crate::shm::ShmBuffer;
use crate::utils::{Point, Rectangle};
use crate::window::{WindowEvent, WindowId};

/// A wrapped `wl_surface` with frame-callback throttling
#[derive(Debug)]
pub struct Surface {
    wl: wl_surface::WlSurface,
    /// The outstanding frame callback, if any. One slot only.
    frame_callback: Option<wl_callback::WlCallback>,
    /// Offset applied at the next attach, consumed by it
    attach_offset: Point<i32>,
    /// Outputs this surface currently overlaps
    entered: Vec<wl_output::WlOutput>,
    /// Buffer scale last applied to the surface
    scale: i32,
}

/// The buffer scale a surface should use given the screens it overlaps
///
/// The highest scale wins, so content never looks blurry on the sharpest screen
/// showing it. A surface on no screen yet stays at scale 1.
fn preferred_scale(scales: impl Iterator<Item = i32>) -> i32 {
    scales.max().unwrap_or(1).max(1)
}

impl Surface {
    pub(crate) fn new(
        compositor: &wl_compositor::WlCompositor,
        qh: &QueueHandle<ClientState>,
        window: WindowId,
    ) -> Surface {
        Surface {
            wl: compositor.create_surface(qh, window),
            frame_callback: None,
            attach_offset: Point::new(0, 0),
            entered: Vec::new(),
            scale: 1,
        }
    }

    /// Buffer scale currently applied to the surface
    pub fn scale(&self) -> i32 {
        self.scale
    }

    /// Recompute the buffer scale from the screens the surface overlaps
    ///
    /// Applies `set_buffer_scale` and returns the new scale when it changed.
    /// Surfaces below version 3 cannot scale and stay at 1.
    pub(crate) fn refresh_scale(&mut self, screens: &[Screen]) -> Option<i32> {
        if self.wl.version() < 3 {
            return None;
        }
        let scale = preferred_scale(
            screens
                .iter()
                .filter(|s| self.entered.iter().any(|o| o == s.wl_output()))
                .map(|s| s.scale()),
        );
        if scale == self.scale {
            return None;
        }
        self.wl.set_buffer_scale(scale);
        self.scale = scale;
        Some(scale)
    }

    /// The underlying wire object
    pub fn wl_surface(&self) -> &wl_surface::WlSurface {
        &self.wl
    }

    /// Whether a frame callback is outstanding
    pub fn frame_pending(&self) -> bool {
        self.frame_callback.is_some()
    }

    /// Add to the attach offset consumed by the next buffer commit
    ///
    /// Used by interactive resize from the left or top edges, where the surface
    /// content must appear to stay anchored while the window grows the other way.
    /// Deltas accumulate, so two configures landing between commits move the
    /// content by their combined amount.
    pub fn add_attach_offset(&mut self, offset: Point<i32>) {
        self.attach_offset += offset;
    }

    /// Attach `buffer`, damage the given regions and commit
    ///
    /// Requests a frame callback first if none is outstanding, so the commit that
    /// carries the content also carries the throttle.
    pub(crate) fn commit_buffer(
        &mut self,
        buffer: &ShmBuffer,
        damage: &[Rectangle<i32>],
        qh: &QueueHandle<ClientState>,
        window: WindowId,
    ) {
        if self.frame_callback.is_none() {
            self.frame_callback = Some(self.wl.frame(qh, CallbackKind::Frame(window)));
        }
        let offset = std::mem::replace(&mut self.attach_offset, Point::new(0, 0));
        self.wl.attach(Some(buffer.wl_buffer()), offset.x, offset.y);
        if damage.is_empty() {
            let size = buffer.size();
            self.wl.damage(0, 0, size.w, size.h);
        } else {
            for rect in damage {
                self.wl
                    .damage(rect.loc.x, rect.loc.y, rect.size.w, rect.size.h);
            }
        }
        self.wl.commit();
    }

    /// Commit without content changes, flushing pending role state
    pub(crate) fn commit(&self) {
        self.wl.commit();
    }

    /// Detach the current buffer, hiding the surface
    pub(crate) fn attach_none(&self) {
        self.wl.attach(None, 0, 0);
        self.wl.commit();
    }

    /// Consume a frame-callback completion
    ///
    /// Returns false for a stale callback (one belonging to an earlier show/hide
    /// cycle of this window); stale completions must not unblock the current frame.
    pub(crate) fn frame_done(&mut self, callback: &wl_callback::WlCallback) -> bool {
        match &self.frame_callback {
            Some(pending) if pending == callback => {
                self.frame_callback = None;
                true
            }
            _ => {
                trace!("stale frame callback ignored");
                false
            }
        }
    }

    pub(crate) fn destroy(&mut self) {
        self.frame_callback = None;
        self.wl.destroy();
    }
}

impl Dispatch<wl_surface::WlSurface, WindowId> for ClientState {
    fn event(
        state: &mut Self,
        _surface: &wl_surface::WlSurface,
        event: wl_surface::Event,
        data: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let ClientState {
            windows,
            screens,
            events,
            ..
        } = state;
        let Some(window) = windows.get_mut(data) else {
            return;
        };
        match event {
            wl_surface::Event::Enter { output } => {
                trace!(window = ?data, output = output.id().protocol_id(), "surface entered output");
                window.surface_mut().entered.push(output);
            }
            wl_surface::Event::Leave { output } => {
                window.surface_mut().entered.retain(|o| o != &output);
            }
            _ => return,
        }
        if let Some(scale) = window.surface_mut().refresh_scale(screens) {
            events.push_back(WindowEvent::ScaleChanged {
                window: *data,
                scale,
            });
        }
    }
}

impl Dispatch<wl_compositor::WlCompositor, ()> for ClientState {
    fn event(
        _state: &mut Self,
        _compositor: &wl_compositor::WlCompositor,
        _event: <wl_compositor::WlCompositor as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // wl_compositor has no events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_defaults_to_one_off_screen() {
        assert_eq!(preferred_scale(std::iter::empty()), 1);
    }

    #[test]
    fn highest_overlapped_scale_wins() {
        assert_eq!(preferred_scale([1, 3, 2].into_iter()), 3);
    }

    #[test]
    fn nonsense_scales_clamp_to_one() {
        assert_eq!(preferred_scale([0, -1].into_iter()), 1);
    }
}
