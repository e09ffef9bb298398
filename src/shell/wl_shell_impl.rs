//! wl_shell event handling
//!
//! The legacy shell has no configure serials and no ack: a configure is purely a
//! size suggestion sent during interactive resize, and liveness is a per-surface
//! ping/pong. State flags never arrive on the wire, so a configure preserves
//! whatever flags the window last had.

use tracing::trace;
use wayland_client::protocol::{wl_shell, wl_shell_surface};
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle};

use crate::client::ClientState;
use crate::shell::Configure;
use crate::utils::Size;
use crate::window::WindowId;

impl Dispatch<wl_shell::WlShell, ()> for ClientState {
    fn event(
        _state: &mut Self,
        _shell: &wl_shell::WlShell,
        _event: <wl_shell::WlShell as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // wl_shell has no events
    }
}

impl Dispatch<wl_shell_surface::WlShellSurface, WindowId> for ClientState {
    fn event(
        state: &mut Self,
        surface: &wl_shell_surface::WlShellSurface,
        event: wl_shell_surface::Event,
        data: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_shell_surface::Event::Ping { serial } => {
                surface.pong(serial);
            }
            wl_shell_surface::Event::Configure { width, height, .. } => {
                let Some(window) = state.window(*data) else {
                    return;
                };
                let flags = window.shell_flags();
                trace!(window = ?data, width, height, "wl_shell configure");
                crate::window::handle_configure(
                    state,
                    *data,
                    Configure {
                        size: Size {
                            w: width,
                            h: height,
                        },
                        flags,
                        serial: None,
                    },
                );
            }
            wl_shell_surface::Event::PopupDone => {
                crate::window::handle_popup_done(state, *data);
            }
            _ => {}
        }
    }
}
