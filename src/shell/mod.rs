//! Shell-surface roles
//!
//! A bare `wl_surface` is invisible; a shell role is what turns it into a window
//! the compositor will map. Three shell protocols are supported and hidden behind
//! one interface: the stable-but-ancient `wl_shell`, and the two unstable
//! iterations of xdg-shell (v5, where `xdg_surface` is itself the toplevel role,
//! and v6, where `zxdg_surface_v6` is a base split into toplevel and popup roles
//! with configure latching). [`ShellRole`] is the tagged union; which variant a
//! window gets depends on what the compositor advertises, newest first.
//!
//! Window-state plumbing is deliberately split in two pure pieces so it can be
//! tested without a wire:
//!
//! * [`transition_requests`] diffs a requested [`WindowState`] against the last
//!   requested one and yields the minimal protocol requests. Idempotent requests
//!   produce nothing.
//! * [`ConfigureMachine`] folds incoming configures into applied size and state,
//!   remembering the floating size across maximize/fullscreen round trips and
//!   substituting it when the compositor sends the "you choose" zero size. Each
//!   serial-carrying configure is surfaced for acking exactly once.

use bitflags::bitflags;
use smallvec::SmallVec;
use thiserror::Error;
use tracing::debug;
use wayland_client::protocol::wl_output::WlOutput;
use wayland_client::protocol::wl_seat::WlSeat;
use wayland_client::protocol::wl_shell;
use wayland_client::protocol::wl_shell_surface::{self, WlShellSurface};
use wayland_client::protocol::wl_surface::WlSurface;
use wayland_client::QueueHandle;

use crate::client::ClientState;
use crate::protocols::xdg_v5 as xdg5;
use crate::protocols::xdg_v6 as xdg6;
use crate::utils::{Point, Rectangle, Size};
use crate::window::WindowId;

mod wl_shell_impl;
mod xdg_v5_impl;
mod xdg_v6_impl;

/// Failure to give a surface a shell role
#[derive(Debug, Error)]
pub enum ShellError {
    /// The compositor advertises no supported shell global
    #[error("no supported shell global is available")]
    ShellUnavailable,
    /// A popup was requested without a triggering input event to derive the
    /// grab serial from
    #[error("popup requested without a prior input event")]
    NoPopupTrigger,
}

bitflags! {
    /// Compositor-reported surface states, as carried by configure events
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StateFlags: u32 {
        const MAXIMIZED = 1 << 0;
        const FULLSCREEN = 1 << 1;
        const RESIZING = 1 << 2;
        const ACTIVATED = 1 << 3;
    }
}

/// Decode the `states` wire array of an xdg configure (native-endian u32 codes)
pub(crate) fn parse_states(raw: &[u8]) -> StateFlags {
    let mut flags = StateFlags::empty();
    for chunk in raw.chunks_exact(4) {
        let code = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        flags |= match code {
            1 => StateFlags::MAXIMIZED,
            2 => StateFlags::FULLSCREEN,
            3 => StateFlags::RESIZING,
            4 => StateFlags::ACTIVATED,
            _ => continue,
        };
    }
    flags
}

/// The logical window state visible to the embedder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowState {
    /// Floating, freely resizable
    #[default]
    Normal,
    /// Filling the work area, tiled by the compositor
    Maximized,
    /// Covering a whole output
    Fullscreen,
    /// Requested only; compositors never report it back and there is no
    /// protocol to leave it client-side
    Minimized,
}

/// Which edge or corner an interactive resize drags
///
/// The numeric values are shared by all three shell protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum ResizeEdge {
    None = 0,
    Top = 1,
    Bottom = 2,
    Left = 4,
    TopLeft = 5,
    BottomLeft = 6,
    Right = 8,
    TopRight = 9,
    BottomRight = 10,
}

impl ResizeEdge {
    /// Whether the drag includes the left edge (bit 4 across all protocols)
    pub fn includes_left(self) -> bool {
        self as u32 & 4 != 0
    }

    /// Whether the drag includes the top edge (bit 1 across all protocols)
    pub fn includes_top(self) -> bool {
        self as u32 & 1 != 0
    }

    /// Whether dragging this edge moves the surface origin (left or top side)
    pub fn anchors_far_corner(self) -> bool {
        self.includes_left() || self.includes_top()
    }
}

/// One protocol request toward a window-state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StateRequest {
    Maximize,
    Unmaximize,
    Fullscreen,
    ExitFullscreen,
    Minimize,
}

/// Diff `to` against the previously requested state into the minimal request
/// sequence
///
/// Fullscreen stacks over maximized rather than replacing it, matching the xdg
/// model where leaving fullscreen restores the prior maximization. Exit requests
/// are ordered before enter requests so intermediate configures stay coherent.
pub(crate) fn transition_requests(
    from: WindowState,
    to: WindowState,
) -> SmallVec<[StateRequest; 2]> {
    let mut out = SmallVec::new();
    if to == WindowState::Minimized {
        if from != WindowState::Minimized {
            out.push(StateRequest::Minimize);
        }
        return out;
    }
    let have_fs = from == WindowState::Fullscreen;
    let want_fs = to == WindowState::Fullscreen;
    let have_max = from == WindowState::Maximized;
    let want_max = to == WindowState::Maximized;
    if have_fs && !want_fs {
        out.push(StateRequest::ExitFullscreen);
    }
    if have_max && !want_max && !want_fs {
        out.push(StateRequest::Unmaximize);
    }
    if want_max && !have_max {
        out.push(StateRequest::Maximize);
    }
    if want_fs && !have_fs {
        out.push(StateRequest::Fullscreen);
    }
    out
}

/// A configure as normalized from any of the three protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Configure {
    /// Suggested size; zero on either axis means the client chooses
    pub size: Size<i32>,
    pub flags: StateFlags,
    /// Present on xdg protocols only; wl_shell configures are serial-less
    pub serial: Option<u32>,
}

/// Outcome of folding one configure into the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Applied {
    pub size: Size<i32>,
    pub size_changed: bool,
    pub state: WindowState,
    pub state_changed: bool,
    pub flags: StateFlags,
    pub flags_changed: bool,
    /// Serial to ack, surfaced at most once per configure
    pub ack: Option<u32>,
}

/// Pure fold of configure events into applied window geometry and state
#[derive(Debug)]
pub(crate) struct ConfigureMachine {
    state: WindowState,
    /// Last state the embedder asked for, the base for outgoing diffs
    requested: WindowState,
    size: Size<i32>,
    /// Floating size restored when returning to [`WindowState::Normal`]
    normal_size: Size<i32>,
    flags: StateFlags,
    last_acked: Option<u32>,
}

impl ConfigureMachine {
    pub(crate) fn new(initial_size: Size<i32>) -> ConfigureMachine {
        ConfigureMachine {
            state: WindowState::Normal,
            requested: WindowState::Normal,
            size: initial_size,
            normal_size: initial_size,
            flags: StateFlags::empty(),
            last_acked: None,
        }
    }

    pub(crate) fn state(&self) -> WindowState {
        self.state
    }

    pub(crate) fn size(&self) -> Size<i32> {
        self.size
    }

    pub(crate) fn flags(&self) -> StateFlags {
        self.flags
    }

    /// Record an explicit client-side resize (normal state only)
    pub(crate) fn note_resized(&mut self, size: Size<i32>) {
        self.size = size;
        if self.state == WindowState::Normal {
            self.normal_size = size;
        }
    }

    /// Plan the requests for a state change and advance the diff base
    pub(crate) fn request(&mut self, to: WindowState) -> SmallVec<[StateRequest; 2]> {
        let plan = transition_requests(self.requested, to);
        self.requested = to;
        plan
    }

    pub(crate) fn apply(&mut self, cfg: Configure) -> Applied {
        let next_state = if cfg.flags.contains(StateFlags::FULLSCREEN) {
            WindowState::Fullscreen
        } else if cfg.flags.contains(StateFlags::MAXIMIZED) {
            WindowState::Maximized
        } else {
            WindowState::Normal
        };
        if self.state == WindowState::Normal
            && next_state != WindowState::Normal
            && self.size.is_positive()
        {
            self.normal_size = self.size;
        }
        let mut size = cfg.size;
        if !size.is_positive() {
            size = self.normal_size;
        } else if next_state == WindowState::Normal {
            self.normal_size = size;
        }
        let size_changed = size != self.size;
        let state_changed = next_state != self.state;
        let flags_changed = cfg.flags != self.flags;
        self.size = size;
        self.state = next_state;
        self.flags = cfg.flags;
        let ack = match cfg.serial {
            Some(serial) if self.last_acked == Some(serial) => None,
            Some(serial) => {
                self.last_acked = Some(serial);
                Some(serial)
            }
            None => None,
        };
        Applied {
            size,
            size_changed,
            state: next_state,
            state_changed,
            flags: cfg.flags,
            flags_changed,
            ack,
        }
    }
}

/// The shell globals the registry has bound, newest protocol first
#[derive(Debug, Default)]
pub struct ShellGlobals {
    pub(crate) wl_shell: Option<wl_shell::WlShell>,
    pub(crate) xdg_v5: Option<xdg5::xdg_shell::XdgShell>,
    pub(crate) xdg_v6: Option<xdg6::zxdg_shell_v6::ZxdgShellV6>,
}

impl ShellGlobals {
    /// Whether any supported shell is available
    pub fn any(&self) -> bool {
        self.xdg_v6.is_some() || self.xdg_v5.is_some() || self.wl_shell.is_some()
    }
}

/// Popup creation parameters gathered from the triggering input event
#[derive(Debug)]
pub(crate) struct PopupParams<'a> {
    pub parent_surface: &'a WlSurface,
    pub parent_role: Option<&'a ShellRole>,
    /// Position relative to the parent surface
    pub position: Point<i32>,
    pub size: Size<i32>,
    pub seat: &'a WlSeat,
    pub serial: u32,
}

/// The role objects of one window, one protocol's worth
#[derive(Debug)]
pub(crate) enum ShellRole {
    WlShell(WlShellSurface),
    XdgV5Toplevel(xdg5::xdg_surface::XdgSurface),
    XdgV5Popup(xdg5::xdg_popup::XdgPopup),
    XdgV6Toplevel {
        surface: xdg6::zxdg_surface_v6::ZxdgSurfaceV6,
        toplevel: xdg6::zxdg_toplevel_v6::ZxdgToplevelV6,
    },
    XdgV6Popup {
        surface: xdg6::zxdg_surface_v6::ZxdgSurfaceV6,
        popup: xdg6::zxdg_popup_v6::ZxdgPopupV6,
    },
}

/// Give `surface` a toplevel role on the newest available shell
pub(crate) fn create_toplevel(
    shells: &ShellGlobals,
    qh: &QueueHandle<ClientState>,
    window: WindowId,
    surface: &WlSurface,
    parent: Option<&ShellRole>,
) -> Result<ShellRole, ShellError> {
    if let Some(shell) = &shells.xdg_v6 {
        let xdg = shell.get_xdg_surface(surface, qh, window);
        let toplevel = xdg.get_toplevel(qh, window);
        if let Some(ShellRole::XdgV6Toplevel {
            toplevel: parent_toplevel,
            ..
        }) = parent
        {
            toplevel.set_parent(Some(parent_toplevel));
        }
        debug!(?window, "created zxdg_toplevel_v6 role");
        return Ok(ShellRole::XdgV6Toplevel {
            surface: xdg,
            toplevel,
        });
    }
    if let Some(shell) = &shells.xdg_v5 {
        let xdg = shell.get_xdg_surface(surface, qh, window);
        if let Some(ShellRole::XdgV5Toplevel(parent_xdg)) = parent {
            xdg.set_parent(Some(parent_xdg));
        }
        debug!(?window, "created xdg_surface (v5) role");
        return Ok(ShellRole::XdgV5Toplevel(xdg));
    }
    if let Some(shell) = &shells.wl_shell {
        let shell_surface = shell.get_shell_surface(surface, qh, window);
        shell_surface.set_toplevel();
        debug!(?window, "created wl_shell_surface role");
        return Ok(ShellRole::WlShell(shell_surface));
    }
    Err(ShellError::ShellUnavailable)
}

/// Give `surface` a popup role, grabbed on the triggering seat and serial
pub(crate) fn create_popup(
    shells: &ShellGlobals,
    qh: &QueueHandle<ClientState>,
    window: WindowId,
    surface: &WlSurface,
    params: PopupParams<'_>,
) -> Result<ShellRole, ShellError> {
    if let Some(shell) = &shells.xdg_v6 {
        let parent = match params.parent_role {
            Some(ShellRole::XdgV6Toplevel { surface, .. })
            | Some(ShellRole::XdgV6Popup { surface, .. }) => surface,
            _ => return Err(ShellError::ShellUnavailable),
        };
        let positioner = shell.create_positioner(qh, ());
        positioner.set_size(params.size.w.max(1), params.size.h.max(1));
        positioner.set_anchor_rect(params.position.x, params.position.y, 1, 1);
        positioner.set_anchor(
            xdg6::zxdg_positioner_v6::Anchor::Top | xdg6::zxdg_positioner_v6::Anchor::Left,
        );
        positioner.set_gravity(
            xdg6::zxdg_positioner_v6::Gravity::Bottom | xdg6::zxdg_positioner_v6::Gravity::Right,
        );
        let xdg = shell.get_xdg_surface(surface, qh, window);
        let popup = xdg.get_popup(parent, &positioner, qh, window);
        popup.grab(params.seat, params.serial);
        positioner.destroy();
        debug!(?window, "created zxdg_popup_v6 role");
        return Ok(ShellRole::XdgV6Popup {
            surface: xdg,
            popup,
        });
    }
    if let Some(shell) = &shells.xdg_v5 {
        let popup = shell.get_xdg_popup(
            surface,
            params.parent_surface,
            params.seat,
            params.serial,
            params.position.x,
            params.position.y,
            qh,
            window,
        );
        debug!(?window, "created xdg_popup (v5) role");
        return Ok(ShellRole::XdgV5Popup(popup));
    }
    if let Some(shell) = &shells.wl_shell {
        let shell_surface = shell.get_shell_surface(surface, qh, window);
        shell_surface.set_popup(
            params.seat,
            params.serial,
            params.parent_surface,
            params.position.x,
            params.position.y,
            wl_shell_surface::Transient::empty(),
        );
        debug!(?window, "created wl_shell popup role");
        return Ok(ShellRole::WlShell(shell_surface));
    }
    Err(ShellError::ShellUnavailable)
}

impl ShellRole {
    /// Whether this role's protocol acks configures with serials
    pub(crate) fn has_serials(&self) -> bool {
        !matches!(self, ShellRole::WlShell(_))
    }

    pub(crate) fn is_popup(&self) -> bool {
        matches!(
            self,
            ShellRole::XdgV5Popup(_) | ShellRole::XdgV6Popup { .. }
        )
    }

    pub(crate) fn set_title(&self, title: &str) {
        match self {
            ShellRole::WlShell(s) => s.set_title(title.to_owned()),
            ShellRole::XdgV5Toplevel(s) => s.set_title(title.to_owned()),
            ShellRole::XdgV6Toplevel { toplevel, .. } => toplevel.set_title(title.to_owned()),
            _ => {}
        }
    }

    pub(crate) fn set_app_id(&self, app_id: &str) {
        match self {
            // wl_shell predates app ids; the class takes its place
            ShellRole::WlShell(s) => s.set_class(app_id.to_owned()),
            ShellRole::XdgV5Toplevel(s) => s.set_app_id(app_id.to_owned()),
            ShellRole::XdgV6Toplevel { toplevel, .. } => toplevel.set_app_id(app_id.to_owned()),
            _ => {}
        }
    }

    pub(crate) fn start_move(&self, seat: &WlSeat, serial: u32) {
        match self {
            ShellRole::WlShell(s) => s._move(seat, serial),
            ShellRole::XdgV5Toplevel(s) => s._move(seat, serial),
            ShellRole::XdgV6Toplevel { toplevel, .. } => toplevel._move(seat, serial),
            _ => {}
        }
    }

    pub(crate) fn start_resize(&self, seat: &WlSeat, serial: u32, edge: ResizeEdge) {
        match self {
            ShellRole::WlShell(s) => s.resize(
                seat,
                serial,
                wl_shell_surface::Resize::from_bits_truncate(edge as u32),
            ),
            ShellRole::XdgV5Toplevel(s) => s.resize(seat, serial, edge as u32),
            ShellRole::XdgV6Toplevel { toplevel, .. } => {
                toplevel.resize(seat, serial, edge as u32)
            }
            _ => {}
        }
    }

    pub(crate) fn show_window_menu(&self, seat: &WlSeat, serial: u32, pos: Point<i32>) {
        match self {
            ShellRole::XdgV5Toplevel(s) => s.show_window_menu(seat, serial, pos.x, pos.y),
            ShellRole::XdgV6Toplevel { toplevel, .. } => {
                toplevel.show_window_menu(seat, serial, pos.x, pos.y)
            }
            _ => {}
        }
    }

    pub(crate) fn set_window_geometry(&self, geometry: Rectangle<i32>) {
        match self {
            ShellRole::XdgV5Toplevel(s) => s.set_window_geometry(
                geometry.loc.x,
                geometry.loc.y,
                geometry.size.w,
                geometry.size.h,
            ),
            ShellRole::XdgV6Toplevel { surface, .. } | ShellRole::XdgV6Popup { surface, .. } => {
                surface.set_window_geometry(
                    geometry.loc.x,
                    geometry.loc.y,
                    geometry.size.w,
                    geometry.size.h,
                )
            }
            _ => {}
        }
    }

    pub(crate) fn send_state_request(&self, request: StateRequest, output: Option<&WlOutput>) {
        match self {
            ShellRole::WlShell(s) => match request {
                StateRequest::Maximize => s.set_maximized(output),
                StateRequest::Fullscreen => s.set_fullscreen(
                    wl_shell_surface::FullscreenMethod::Default,
                    0,
                    output,
                ),
                // set_toplevel is the only way back out of either state
                StateRequest::Unmaximize | StateRequest::ExitFullscreen => s.set_toplevel(),
                StateRequest::Minimize => {}
            },
            ShellRole::XdgV5Toplevel(s) => match request {
                StateRequest::Maximize => s.set_maximized(),
                StateRequest::Unmaximize => s.unset_maximized(),
                StateRequest::Fullscreen => s.set_fullscreen(output),
                StateRequest::ExitFullscreen => s.unset_fullscreen(),
                StateRequest::Minimize => s.set_minimized(),
            },
            ShellRole::XdgV6Toplevel { toplevel, .. } => match request {
                StateRequest::Maximize => toplevel.set_maximized(),
                StateRequest::Unmaximize => toplevel.unset_maximized(),
                StateRequest::Fullscreen => toplevel.set_fullscreen(output),
                StateRequest::ExitFullscreen => toplevel.unset_fullscreen(),
                StateRequest::Minimize => toplevel.set_minimized(),
            },
            _ => {}
        }
    }

    pub(crate) fn ack(&self, serial: u32) {
        match self {
            ShellRole::XdgV5Toplevel(s) => s.ack_configure(serial),
            ShellRole::XdgV6Toplevel { surface, .. } | ShellRole::XdgV6Popup { surface, .. } => {
                surface.ack_configure(serial)
            }
            _ => {}
        }
    }

    /// Destroy the role objects, base surface last
    pub(crate) fn destroy(self) {
        match self {
            // wl_shell_surface has no destructor request; dropping the proxy
            // suffices, the surface outlives it
            ShellRole::WlShell(_) => {}
            ShellRole::XdgV5Toplevel(s) => s.destroy(),
            ShellRole::XdgV5Popup(p) => p.destroy(),
            ShellRole::XdgV6Toplevel { surface, toplevel } => {
                toplevel.destroy();
                surface.destroy();
            }
            ShellRole::XdgV6Popup { surface, popup } => {
                popup.destroy();
                surface.destroy();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sz(w: i32, h: i32) -> Size<i32> {
        Size { w, h }
    }

    #[test]
    fn idempotent_state_request_sends_nothing() {
        assert!(transition_requests(WindowState::Normal, WindowState::Normal).is_empty());
        assert!(transition_requests(WindowState::Maximized, WindowState::Maximized).is_empty());
    }

    #[test]
    fn maximize_round_trip_diffs() {
        let up = transition_requests(WindowState::Normal, WindowState::Maximized);
        assert_eq!(up.as_slice(), [StateRequest::Maximize]);
        let down = transition_requests(WindowState::Maximized, WindowState::Normal);
        assert_eq!(down.as_slice(), [StateRequest::Unmaximize]);
    }

    #[test]
    fn fullscreen_over_maximized_keeps_maximization() {
        let up = transition_requests(WindowState::Maximized, WindowState::Fullscreen);
        assert_eq!(up.as_slice(), [StateRequest::Fullscreen]);
        let down = transition_requests(WindowState::Fullscreen, WindowState::Maximized);
        assert_eq!(down.as_slice(), [StateRequest::ExitFullscreen, StateRequest::Maximize]);
    }

    #[test]
    fn request_tracks_diff_base() {
        let mut machine = ConfigureMachine::new(sz(400, 300));
        assert_eq!(
            machine.request(WindowState::Fullscreen).as_slice(),
            [StateRequest::Fullscreen]
        );
        // asking twice must not repeat the request
        assert!(machine.request(WindowState::Fullscreen).is_empty());
    }

    #[test]
    fn zero_size_configure_substitutes_normal_size() {
        let mut machine = ConfigureMachine::new(sz(640, 480));
        let applied = machine.apply(Configure {
            size: sz(0, 0),
            flags: StateFlags::ACTIVATED,
            serial: Some(1),
        });
        assert_eq!(applied.size, sz(640, 480));
        assert!(!applied.size_changed);
    }

    #[test]
    fn normal_size_survives_maximize_round_trip() {
        let mut machine = ConfigureMachine::new(sz(640, 480));
        machine.apply(Configure {
            size: sz(1920, 1080),
            flags: StateFlags::MAXIMIZED,
            serial: Some(1),
        });
        assert_eq!(machine.size(), sz(1920, 1080));
        // compositor lets the client choose on the way back
        let applied = machine.apply(Configure {
            size: sz(0, 0),
            flags: StateFlags::empty(),
            serial: Some(2),
        });
        assert_eq!(applied.size, sz(640, 480));
        assert_eq!(applied.state, WindowState::Normal);
        assert!(applied.state_changed);
    }

    #[test]
    fn client_resize_updates_remembered_normal_size() {
        let mut machine = ConfigureMachine::new(sz(640, 480));
        machine.note_resized(sz(800, 600));
        machine.apply(Configure {
            size: sz(1920, 1080),
            flags: StateFlags::FULLSCREEN,
            serial: Some(1),
        });
        let applied = machine.apply(Configure {
            size: sz(0, 0),
            flags: StateFlags::empty(),
            serial: Some(2),
        });
        assert_eq!(applied.size, sz(800, 600));
    }

    #[test]
    fn each_serial_is_acked_exactly_once() {
        let mut machine = ConfigureMachine::new(sz(100, 100));
        let first = machine.apply(Configure {
            size: sz(200, 200),
            flags: StateFlags::empty(),
            serial: Some(7),
        });
        assert_eq!(first.ack, Some(7));
        // the same serial replayed (v6 latching can re-deliver) is not re-acked
        let replay = machine.apply(Configure {
            size: sz(200, 200),
            flags: StateFlags::empty(),
            serial: Some(7),
        });
        assert_eq!(replay.ack, None);
        let next = machine.apply(Configure {
            size: sz(300, 300),
            flags: StateFlags::empty(),
            serial: Some(8),
        });
        assert_eq!(next.ack, Some(8));
    }

    #[test]
    fn serial_less_configures_never_ack() {
        let mut machine = ConfigureMachine::new(sz(100, 100));
        let applied = machine.apply(Configure {
            size: sz(500, 400),
            flags: StateFlags::empty(),
            serial: None,
        });
        assert_eq!(applied.ack, None);
        assert!(applied.size_changed);
    }

    #[test]
    fn states_array_decodes_known_codes() {
        let mut raw = Vec::new();
        for code in [1u32, 4, 99] {
            raw.extend_from_slice(&code.to_ne_bytes());
        }
        let flags = parse_states(&raw);
        assert_eq!(flags, StateFlags::MAXIMIZED | StateFlags::ACTIVATED);
    }

    #[test]
    fn minimize_is_one_way() {
        let reqs = transition_requests(WindowState::Fullscreen, WindowState::Minimized);
        assert_eq!(reqs.as_slice(), [StateRequest::Minimize]);
        // no protocol exists to leave minimized client-side
        assert!(transition_requests(WindowState::Minimized, WindowState::Minimized).is_empty());
    }

    #[test]
    fn fullscreen_from_normal_skips_maximize_dance() {
        let up = transition_requests(WindowState::Normal, WindowState::Fullscreen);
        assert_eq!(up.as_slice(), [StateRequest::Fullscreen]);
        let down = transition_requests(WindowState::Fullscreen, WindowState::Normal);
        assert_eq!(down.as_slice(), [StateRequest::ExitFullscreen]);
    }

    #[test]
    fn resizing_flag_does_not_change_logical_state() {
        let mut machine = ConfigureMachine::new(sz(640, 480));
        let applied = machine.apply(Configure {
            size: sz(650, 480),
            flags: StateFlags::RESIZING | StateFlags::ACTIVATED,
            serial: Some(1),
        });
        assert_eq!(applied.state, WindowState::Normal);
        assert!(!applied.state_changed);
        assert!(applied.flags.contains(StateFlags::RESIZING));
    }

    #[test]
    fn truncated_states_array_ignores_trailing_bytes() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&2u32.to_ne_bytes());
        raw.extend_from_slice(&[4, 0]);
        assert_eq!(parse_states(&raw), StateFlags::FULLSCREEN);
    }

    #[test]
    fn resize_edges_anchor_correctly() {
        assert!(ResizeEdge::TopLeft.anchors_far_corner());
        assert!(ResizeEdge::Left.anchors_far_corner());
        assert!(!ResizeEdge::BottomRight.anchors_far_corner());
        assert!(!ResizeEdge::None.anchors_far_corner());
    }
}
