//! xdg-shell unstable v5 event handling
//!
//! In v5 the toplevel role and the configure carrier are the same object:
//! `xdg_surface.configure` arrives with size, states and serial in one event, so
//! it applies immediately and is acked right away. Ping/pong lives on the global.

use wayland_client::{Connection, Dispatch, QueueHandle};

use crate::client::ClientState;
use crate::protocols::xdg_v5::{xdg_popup, xdg_shell, xdg_surface};
use crate::shell::{parse_states, Configure};
use crate::utils::Size;
use crate::window::WindowId;

impl Dispatch<xdg_shell::XdgShell, ()> for ClientState {
    fn event(
        _state: &mut Self,
        shell: &xdg_shell::XdgShell,
        event: xdg_shell::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // ping is the only event on the global
        let xdg_shell::Event::Ping { serial } = event;
        shell.pong(serial);
    }
}

impl Dispatch<xdg_surface::XdgSurface, WindowId> for ClientState {
    fn event(
        state: &mut Self,
        _surface: &xdg_surface::XdgSurface,
        event: xdg_surface::Event,
        data: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            xdg_surface::Event::Configure {
                width,
                height,
                states,
                serial,
            } => {
                crate::window::handle_configure(
                    state,
                    *data,
                    Configure {
                        size: Size {
                            w: width,
                            h: height,
                        },
                        flags: parse_states(&states),
                        serial: Some(serial),
                    },
                );
            }
            xdg_surface::Event::Close => {
                crate::window::handle_close(state, *data);
            }
        }
    }
}

impl Dispatch<xdg_popup::XdgPopup, WindowId> for ClientState {
    fn event(
        state: &mut Self,
        _popup: &xdg_popup::XdgPopup,
        event: xdg_popup::Event,
        data: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let xdg_popup::Event::PopupDone = event;
        crate::window::handle_popup_done(state, *data);
    }
}
