//! xdg-shell unstable v6 event handling
//!
//! v6 splits a configure sequence across objects: the role (toplevel or popup)
//! sends its state first, and nothing may be applied until the base
//! `zxdg_surface_v6.configure` closes the sequence with the serial. Role events
//! are therefore stashed on the window and latched in by the base configure,
//! which is also the ack point.

use tracing::trace;
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle};

use crate::client::ClientState;
use crate::protocols::xdg_v6::{
    zxdg_popup_v6, zxdg_positioner_v6, zxdg_shell_v6, zxdg_surface_v6, zxdg_toplevel_v6,
};
use crate::shell::{parse_states, Configure};
use crate::utils::Size;
use crate::window::WindowId;

impl Dispatch<zxdg_shell_v6::ZxdgShellV6, ()> for ClientState {
    fn event(
        _state: &mut Self,
        shell: &zxdg_shell_v6::ZxdgShellV6,
        event: zxdg_shell_v6::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // ping is the only event on the global
        let zxdg_shell_v6::Event::Ping { serial } = event;
        shell.pong(serial);
    }
}

impl Dispatch<zxdg_positioner_v6::ZxdgPositionerV6, ()> for ClientState {
    fn event(
        _state: &mut Self,
        _positioner: &zxdg_positioner_v6::ZxdgPositionerV6,
        _event: <zxdg_positioner_v6::ZxdgPositionerV6 as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // zxdg_positioner_v6 has no events
    }
}

impl Dispatch<zxdg_surface_v6::ZxdgSurfaceV6, WindowId> for ClientState {
    fn event(
        state: &mut Self,
        _surface: &zxdg_surface_v6::ZxdgSurfaceV6,
        event: zxdg_surface_v6::Event,
        data: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let zxdg_surface_v6::Event::Configure { serial } = event;
        let Some(window) = state.window_mut(*data) else {
            return;
        };
        // A bare sequence with no role event still must be acked; it latches
        // the current state unchanged.
        let stashed = window.take_stashed_configure().unwrap_or(Configure {
            size: Size { w: 0, h: 0 },
            flags: window.shell_flags(),
            serial: None,
        });
        crate::window::handle_configure(
            state,
            *data,
            Configure {
                serial: Some(serial),
                ..stashed
            },
        );
    }
}

impl Dispatch<zxdg_toplevel_v6::ZxdgToplevelV6, WindowId> for ClientState {
    fn event(
        state: &mut Self,
        _toplevel: &zxdg_toplevel_v6::ZxdgToplevelV6,
        event: zxdg_toplevel_v6::Event,
        data: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            zxdg_toplevel_v6::Event::Configure {
                width,
                height,
                states,
            } => {
                trace!(window = ?data, width, height, "toplevel configure stashed");
                if let Some(window) = state.window_mut(*data) {
                    window.stash_configure(Configure {
                        size: Size {
                            w: width,
                            h: height,
                        },
                        flags: parse_states(&states),
                        serial: None,
                    });
                }
            }
            zxdg_toplevel_v6::Event::Close => {
                crate::window::handle_close(state, *data);
            }
        }
    }
}

impl Dispatch<zxdg_popup_v6::ZxdgPopupV6, WindowId> for ClientState {
    fn event(
        state: &mut Self,
        _popup: &zxdg_popup_v6::ZxdgPopupV6,
        event: zxdg_popup_v6::Event,
        data: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            zxdg_popup_v6::Event::Configure { width, height, .. } => {
                if let Some(window) = state.window_mut(*data) {
                    let flags = window.shell_flags();
                    window.stash_configure(Configure {
                        size: Size {
                            w: width,
                            h: height,
                        },
                        flags,
                        serial: None,
                    });
                }
            }
            zxdg_popup_v6::Event::PopupDone => {
                crate::window::handle_popup_done(state, *data);
            }
        }
    }
}
