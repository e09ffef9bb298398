//! Global discovery
//!
//! The compositor announces its global protocol objects (compositor, shm, seats,
//! shells, outputs, extensions) through the registry. [`RegistryState`] keeps an
//! insertion-ordered list of the announced globals, binds the interfaces the engine
//! recognizes, and replays announcements to listeners.
//!
//! Listener registration is order-independent: a listener added *after* globals have
//! been announced receives a synthetic announcement for each currently-live global,
//! exactly once, in original discovery order. This is how extension handling can
//! subscribe late without missing anything.

use indexmap::IndexMap;
use tracing::{debug, trace, warn};
use wayland_client::protocol::{
    wl_compositor, wl_data_device_manager, wl_output, wl_registry, wl_seat, wl_shm,
};
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle};

use crate::client::ClientState;
use crate::input::InputSeat;
use crate::output::Screen;
use crate::protocols::{xdg_v5, xdg_v6};
use crate::window::WindowEvent;

/// Versions the engine is willing to speak for the globals it binds.
const COMPOSITOR_VERSION: u32 = 4;
const SEAT_VERSION: u32 = 5;
const OUTPUT_VERSION: u32 = 3;
const DATA_DEVICE_MANAGER_VERSION: u32 = 3;

/// The unstable-protocol negotiation value for `xdg_shell` v5.
const XDG_V5_VERSION: i32 = 5;

/// A global advertised by the compositor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    /// Numeric name of the global, unique per registry
    pub name: u32,
    /// Interface implemented by the global
    pub interface: String,
    /// Highest version the compositor supports
    pub version: u32,
}

/// Whether a listener is being told about an announcement or a removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalEvent {
    /// The global is (or already was) live
    Announced,
    /// The global is going away
    Removed,
}

/// A registered global listener
///
/// Receives the registry proxy and queue handle so it can bind the global itself.
pub type GlobalListener =
    Box<dyn FnMut(&wl_registry::WlRegistry, &QueueHandle<ClientState>, &Global, GlobalEvent)>;

/// Insertion-ordered list of live globals
///
/// Kept separate from the wire plumbing so the replay invariant is a property of
/// plain data: replaying iterates in announcement order, once per global.
#[derive(Debug, Default)]
pub struct GlobalList {
    inner: IndexMap<u32, Global>,
}

impl GlobalList {
    pub(crate) fn insert(&mut self, global: Global) {
        self.inner.insert(global.name, global);
    }

    pub(crate) fn remove(&mut self, name: u32) -> Option<Global> {
        // shift_remove keeps announcement order for the survivors
        self.inner.shift_remove(&name)
    }

    /// Number of live globals
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no globals are known
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Look up a global by name
    pub fn get(&self, name: u32) -> Option<&Global> {
        self.inner.get(&name)
    }

    /// Iterate the globals in announcement order
    pub fn iter(&self) -> impl Iterator<Item = &Global> {
        self.inner.values()
    }

    /// Call `f` once for every live global, in announcement order
    pub fn replay(&self, mut f: impl FnMut(&Global)) {
        for global in self.inner.values() {
            f(global);
        }
    }
}

/// Registry bookkeeping: the live global list plus the registered listeners
pub struct RegistryState {
    registry: wl_registry::WlRegistry,
    globals: GlobalList,
    listeners: Vec<GlobalListener>,
}

impl std::fmt::Debug for RegistryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryState")
            .field("globals", &self.globals)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl RegistryState {
    pub(crate) fn new(registry: wl_registry::WlRegistry) -> RegistryState {
        RegistryState {
            registry,
            globals: GlobalList::default(),
            listeners: Vec::new(),
        }
    }

    /// The registry proxy itself
    pub fn wl_registry(&self) -> &wl_registry::WlRegistry {
        &self.registry
    }

    /// The live globals, in announcement order
    pub fn globals(&self) -> &GlobalList {
        &self.globals
    }

    /// Register a listener for global announcements and removals
    ///
    /// Every currently-live global is replayed to the listener immediately, in
    /// original announcement order, before any new events are delivered to it.
    pub fn add_listener(
        &mut self,
        qh: &QueueHandle<ClientState>,
        mut listener: impl FnMut(&wl_registry::WlRegistry, &QueueHandle<ClientState>, &Global, GlobalEvent)
            + 'static,
    ) {
        let registry = self.registry.clone();
        self.globals
            .replay(|global| listener(&registry, qh, global, GlobalEvent::Announced));
        self.listeners.push(Box::new(listener));
    }

    fn notify(&mut self, qh: &QueueHandle<ClientState>, global: &Global, event: GlobalEvent) {
        // Listeners must not observe a half-updated listener list, so take it out
        // while iterating.
        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in &mut listeners {
            listener(&self.registry, qh, global, event);
        }
        debug_assert!(self.listeners.is_empty());
        self.listeners = listeners;
    }
}

impl Dispatch<wl_registry::WlRegistry, ()> for ClientState {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => {
                let global = Global {
                    name,
                    interface,
                    version,
                };
                bind_known_global(state, registry, qh, &global);
                state.registry.globals.insert(global.clone());
                let qh = qh.clone();
                state.registry.notify(&qh, &global, GlobalEvent::Announced);
            }
            wl_registry::Event::GlobalRemove { name } => {
                let Some(global) = state.registry.globals.remove(name) else {
                    trace!(name, "removal of unknown global ignored");
                    return;
                };
                debug!(name, interface = %global.interface, "global removed");
                handle_global_removal(state, &global);
                let qh = qh.clone();
                state.registry.notify(&qh, &global, GlobalEvent::Removed);
            }
            _ => {}
        }
    }
}

fn bind_known_global(
    state: &mut ClientState,
    registry: &wl_registry::WlRegistry,
    qh: &QueueHandle<ClientState>,
    global: &Global,
) {
    let Global {
        name,
        ref interface,
        version,
    } = *global;
    trace!(name, interface = %interface.as_str(), version, "global announced");
    match interface.as_str() {
        "wl_compositor" => {
            let compositor = registry.bind::<wl_compositor::WlCompositor, _, _>(
                name,
                version.min(COMPOSITOR_VERSION),
                qh,
                (),
            );
            state.compositor = Some(compositor);
        }
        "wl_shm" => {
            let shm = registry.bind::<wl_shm::WlShm, _, _>(name, 1, qh, ());
            state.shm = Some(shm);
        }
        "wl_seat" => {
            let version = version.min(SEAT_VERSION);
            let seat = registry.bind::<wl_seat::WlSeat, _, _>(
                name,
                version,
                qh,
                crate::input::SeatId(name),
            );
            state.seats.push(InputSeat::new(name, seat, version));
        }
        "wl_output" => {
            let output = registry.bind::<wl_output::WlOutput, _, _>(
                name,
                version.min(OUTPUT_VERSION),
                qh,
                crate::output::OutputId(name),
            );
            state.screens.push(Screen::new(name, output));
        }
        "wl_shell" => {
            let shell = registry
                .bind::<wayland_client::protocol::wl_shell::WlShell, _, _>(name, 1, qh, ());
            state.shells.wl_shell = Some(shell);
        }
        "xdg_shell" => {
            let shell = registry.bind::<xdg_v5::xdg_shell::XdgShell, _, _>(name, 1, qh, ());
            // Mandatory handshake before any surface may be created over the
            // unstable protocol.
            shell.use_unstable_version(XDG_V5_VERSION);
            state.shells.xdg_v5 = Some(shell);
        }
        "zxdg_shell_v6" => {
            let shell = registry.bind::<xdg_v6::zxdg_shell_v6::ZxdgShellV6, _, _>(name, 1, qh, ());
            state.shells.xdg_v6 = Some(shell);
        }
        "wl_data_device_manager" => {
            // Bound for completeness; clipboard and drag-and-drop marshaling live in
            // an external collaborator.
            let ddm = registry.bind::<wl_data_device_manager::WlDataDeviceManager, _, _>(
                name,
                version.min(DATA_DEVICE_MANAGER_VERSION),
                qh,
                (),
            );
            state.data_device_manager = Some(ddm);
        }
        _ => {}
    }
}

fn handle_global_removal(state: &mut ClientState, global: &Global) {
    match global.interface.as_str() {
        "wl_output" => {
            if let Some(pos) = state.screens.iter().position(|s| s.global_name() == global.name) {
                let screen = state.screens.remove(pos);
                screen.release();
                state.push_event(WindowEvent::ScreenRemoved {
                    output: crate::output::OutputId(global.name),
                });
            }
        }
        "wl_seat" => {
            if let Some(pos) = state
                .seats
                .iter()
                .position(|s| s.global_name() == global.name)
            {
                let seat = state.seats.remove(pos);
                crate::input::retire_seat(state, seat);
            }
        }
        other => {
            if !matches!(
                other,
                "wl_compositor" | "wl_shm" | "wl_shell" | "xdg_shell" | "zxdg_shell_v6"
            ) {
                return;
            }
            warn!(interface = other, "core global removed by the compositor");
        }
    }
}

impl Dispatch<wl_data_device_manager::WlDataDeviceManager, ()> for ClientState {
    fn event(
        _state: &mut Self,
        _proxy: &wl_data_device_manager::WlDataDeviceManager,
        _event: <wl_data_device_manager::WlDataDeviceManager as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // wl_data_device_manager has no events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(name: u32, interface: &str) -> Global {
        Global {
            name,
            interface: interface.into(),
            version: 1,
        }
    }

    #[test]
    fn replay_preserves_announcement_order() {
        let mut list = GlobalList::default();
        list.insert(global(3, "wl_compositor"));
        list.insert(global(1, "wl_shm"));
        list.insert(global(7, "wl_seat"));

        let mut seen = Vec::new();
        list.replay(|g| seen.push(g.name));
        assert_eq!(seen, vec![3, 1, 7]);
    }

    #[test]
    fn replay_is_exactly_once_per_global() {
        let mut list = GlobalList::default();
        for name in [10, 20, 30] {
            list.insert(global(name, "wl_output"));
        }
        let mut counts = std::collections::HashMap::new();
        list.replay(|g| *counts.entry(g.name).or_insert(0u32) += 1);
        assert!(counts.values().all(|&c| c == 1));
        assert_eq!(counts.len(), 3);
    }

    #[test]
    fn removal_drops_global_and_keeps_order() {
        let mut list = GlobalList::default();
        list.insert(global(1, "wl_shm"));
        list.insert(global(2, "wl_seat"));
        list.insert(global(3, "wl_output"));

        let removed = list.remove(2).expect("global 2 is live");
        assert_eq!(removed.interface, "wl_seat");
        assert!(list.remove(2).is_none());

        let mut seen = Vec::new();
        list.replay(|g| seen.push(g.name));
        assert_eq!(seen, vec![1, 3]);
    }
}
