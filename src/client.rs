//! Central protocol state
//!
//! [`ClientState`] is the single dispatch target for the default event queue. All
//! protocol object mutation funnels through it, which is what makes the engine safe
//! without locking: wayland objects are not safe for concurrent mutation from multiple
//! threads, so everything belonging to one queue is mutated from that queue only.
//!
//! The embedding windowing layer drives the engine through [`crate::display::Display`]
//! and drains the resulting [`WindowEvent`]s with [`ClientState::drain_events`].

use std::collections::VecDeque;

use indexmap::IndexMap;
use wayland_client::protocol::{wl_compositor, wl_data_device_manager, wl_shm};
use wayland_client::QueueHandle;

use crate::display::registry::RegistryState;
use crate::input::{InputSeat, LastInput, SeatId};
use crate::output::Screen;
use crate::shell::ShellGlobals;
use crate::window::{Window, WindowEvent, WindowId};

/// Protocol-side state of the engine, owned by [`crate::display::Display`].
///
/// This is the `D` type of every `Dispatch` implementation in the crate.
pub struct ClientState {
    pub(crate) qh: QueueHandle<ClientState>,
    pub(crate) registry: RegistryState,
    pub(crate) compositor: Option<wl_compositor::WlCompositor>,
    pub(crate) shm: Option<wl_shm::WlShm>,
    pub(crate) shm_formats: Vec<wl_shm::Format>,
    pub(crate) shells: ShellGlobals,
    pub(crate) data_device_manager: Option<wl_data_device_manager::WlDataDeviceManager>,
    pub(crate) screens: Vec<Screen>,
    pub(crate) seats: Vec<InputSeat>,
    pub(crate) windows: IndexMap<WindowId, Window>,
    pub(crate) next_window_id: u32,
    pub(crate) last_input: Option<LastInput>,
    pub(crate) pointer_grab: Option<WindowId>,
    pub(crate) events: VecDeque<WindowEvent>,
    pub(crate) completed_syncs: Vec<u32>,
}

impl std::fmt::Debug for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientState")
            .field("globals", &self.registry.globals())
            .field("screens", &self.screens.len())
            .field("seats", &self.seats.len())
            .field("windows", &self.windows.len())
            .finish_non_exhaustive()
    }
}

impl ClientState {
    pub(crate) fn new(qh: QueueHandle<ClientState>, registry: RegistryState) -> ClientState {
        ClientState {
            qh,
            registry,
            compositor: None,
            shm: None,
            shm_formats: Vec::new(),
            shells: ShellGlobals::default(),
            data_device_manager: None,
            screens: Vec::new(),
            seats: Vec::new(),
            windows: IndexMap::new(),
            next_window_id: 1,
            last_input: None,
            pointer_grab: None,
            events: VecDeque::new(),
            completed_syncs: Vec::new(),
        }
    }

    /// Access the registry state (global list and listeners)
    pub fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry
    }

    /// The pixel formats advertised by the compositor's `wl_shm` global
    pub fn shm_formats(&self) -> &[wl_shm::Format] {
        &self.shm_formats
    }

    /// The screens currently known to the engine
    pub fn screens(&self) -> &[Screen] {
        &self.screens
    }

    /// The input seats currently advertised by the compositor
    pub fn seats(&self) -> &[InputSeat] {
        &self.seats
    }

    /// Look up a window by id
    ///
    /// Windows are addressed through ids rather than references: input focus and
    /// callbacks may outlive the window they point to, and a failed lookup is how
    /// those stale references are tolerated.
    pub fn window(&self, id: WindowId) -> Option<&Window> {
        self.windows.get(&id)
    }

    /// Look up a window by id, mutably
    pub fn window_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        self.windows.get_mut(&id)
    }

    /// Drain the events produced since the last call
    ///
    /// The embedding layer calls this after every dispatch to receive exposure,
    /// geometry, state, input and close notifications.
    pub fn drain_events(&mut self) -> impl Iterator<Item = WindowEvent> + '_ {
        self.events.drain(..)
    }

    /// The most recent input context `(device, serial, window)`
    ///
    /// Protocol requests that need a causally-preceding user event (interactive
    /// move/resize, popup grabs) use this when the caller does not have a more
    /// specific serial at hand.
    pub fn last_input(&self) -> Option<LastInput> {
        self.last_input
    }

    /// Route all pointer events to `window` until released
    ///
    /// While a grab is set, motion and button events are delivered to the grabbing
    /// window even when the pointer is physically over another surface; such events
    /// carry a synthetic out-of-window position.
    pub fn set_pointer_grab(&mut self, window: Option<WindowId>) {
        self.pointer_grab = window;
    }

    pub(crate) fn push_event(&mut self, event: WindowEvent) {
        self.events.push_back(event);
    }

    pub(crate) fn seat_mut(&mut self, id: SeatId) -> Option<&mut InputSeat> {
        self.seats.iter_mut().find(|s| s.id() == id)
    }

    pub(crate) fn take_sync(&mut self, tag: u32) -> bool {
        take_completed(&mut self.completed_syncs, tag)
    }

    pub(crate) fn alloc_window_id(&mut self) -> WindowId {
        let id = WindowId(self.next_window_id);
        self.next_window_id = self.next_window_id.wrapping_add(1).max(1);
        id
    }
}

/// Consume the completion of the sync carrying `tag`, if it arrived
///
/// Round trips are tagged so that one caller's completion cannot satisfy
/// another caller's wait; an unrelated tag leaves the list untouched.
fn take_completed(tags: &mut Vec<u32>, tag: u32) -> bool {
    if let Some(pos) = tags.iter().position(|&t| t == tag) {
        tags.swap_remove(pos);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrelated_sync_completion_does_not_satisfy_a_wait() {
        let mut tags = vec![7];
        assert!(!take_completed(&mut tags, 3));
        assert_eq!(tags, vec![7]);
    }

    #[test]
    fn each_completion_is_consumed_once() {
        let mut tags = vec![3, 7];
        assert!(take_completed(&mut tags, 3));
        assert!(!take_completed(&mut tags, 3));
        assert!(take_completed(&mut tags, 7));
        assert!(tags.is_empty());
    }
}
