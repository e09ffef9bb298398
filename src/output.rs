//! Screen tracking
//!
//! Compositors advertise one `wl_output` global per screen. The engine keeps a
//! [`Screen`] per output, latches the geometry/mode/scale triple on the `done` event
//! (partial state is never surfaced), and informs the windowing layer when screens
//! come and go.

use tracing::{debug, trace};
use wayland_client::protocol::wl_output;
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle, WEnum};

use crate::client::ClientState;
use crate::utils::{Point, Size};
use crate::window::WindowEvent;

/// Identifier of a screen, stable for the lifetime of the output global
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(pub(crate) u32);

/// A screen advertised by the compositor
#[derive(Debug)]
pub struct Screen {
    global_name: u32,
    output: wl_output::WlOutput,
    /// Position in the compositor's global space
    position: Point<i32>,
    /// Size of the current mode, in pixels
    mode_size: Size<i32>,
    /// Vertical refresh of the current mode, in mHz
    refresh: i32,
    scale: i32,
    transform: wl_output::Transform,
    make: String,
    model: String,
    /// Properties received since the last `done`, not yet latched
    pending: PendingScreen,
    done: bool,
}

#[derive(Debug, Default)]
struct PendingScreen {
    position: Option<Point<i32>>,
    mode_size: Option<Size<i32>>,
    refresh: Option<i32>,
    scale: Option<i32>,
    transform: Option<wl_output::Transform>,
    make: Option<String>,
    model: Option<String>,
}

impl Screen {
    pub(crate) fn new(global_name: u32, output: wl_output::WlOutput) -> Screen {
        Screen {
            global_name,
            output,
            position: Point::new(0, 0),
            mode_size: Size::default(),
            refresh: 0,
            scale: 1,
            transform: wl_output::Transform::Normal,
            make: String::new(),
            model: String::new(),
            pending: PendingScreen::default(),
            done: false,
        }
    }

    /// Identifier of this screen
    pub fn id(&self) -> OutputId {
        OutputId(self.global_name)
    }

    pub(crate) fn global_name(&self) -> u32 {
        self.global_name
    }

    /// The underlying output proxy
    pub fn wl_output(&self) -> &wl_output::WlOutput {
        &self.output
    }

    /// Position of this screen in the compositor's global space
    pub fn position(&self) -> Point<i32> {
        self.position
    }

    /// Pixel size of the current mode
    pub fn size(&self) -> Size<i32> {
        self.mode_size
    }

    /// Refresh rate of the current mode, in mHz
    pub fn refresh(&self) -> i32 {
        self.refresh
    }

    /// Scale factor of this screen
    pub fn scale(&self) -> i32 {
        self.scale
    }

    /// Output transform applied by the compositor (rotation or flip)
    pub fn transform(&self) -> wl_output::Transform {
        self.transform
    }

    /// Manufacturer and model strings
    pub fn description(&self) -> (&str, &str) {
        (&self.make, &self.model)
    }

    /// Whether the initial property burst has been latched by a `done`
    pub(crate) fn received_done(&self) -> bool {
        self.done
    }

    pub(crate) fn release(self) {
        // The release request only exists from version 3 on; older outputs are
        // simply dropped client-side.
        if self.output.version() >= 3 {
            self.output.release();
        }
    }

    /// Latch pending properties. Returns whether anything changed.
    fn latch(&mut self) -> bool {
        let mut changed = false;
        if let Some(position) = self.pending.position.take() {
            changed |= position != self.position;
            self.position = position;
        }
        if let Some(size) = self.pending.mode_size.take() {
            changed |= size != self.mode_size;
            self.mode_size = size;
        }
        if let Some(refresh) = self.pending.refresh.take() {
            changed |= refresh != self.refresh;
            self.refresh = refresh;
        }
        if let Some(scale) = self.pending.scale.take() {
            changed |= scale != self.scale;
            self.scale = scale;
        }
        if let Some(transform) = self.pending.transform.take() {
            changed |= transform != self.transform;
            self.transform = transform;
        }
        if let Some(make) = self.pending.make.take() {
            changed |= make != self.make;
            self.make = make;
        }
        if let Some(model) = self.pending.model.take() {
            changed |= model != self.model;
            self.model = model;
        }
        changed
    }
}

impl Dispatch<wl_output::WlOutput, OutputId> for ClientState {
    fn event(
        state: &mut Self,
        _output: &wl_output::WlOutput,
        event: wl_output::Event,
        data: &OutputId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let Some(screen) = state.screens.iter_mut().find(|s| s.global_name == data.0) else {
            trace!(output = data.0, "event for removed output ignored");
            return;
        };
        match event {
            wl_output::Event::Geometry {
                x,
                y,
                make,
                model,
                transform,
                ..
            } => {
                screen.pending.position = Some(Point::new(x, y));
                screen.pending.make = Some(make);
                screen.pending.model = Some(model);
                if let WEnum::Value(transform) = transform {
                    screen.pending.transform = Some(transform);
                }
            }
            wl_output::Event::Mode {
                flags,
                width,
                height,
                refresh,
            } => {
                // Only the current mode matters for window placement
                if matches!(flags, WEnum::Value(f) if f.contains(wl_output::Mode::Current)) {
                    screen.pending.mode_size = Some(Size::new(width, height));
                    screen.pending.refresh = Some(refresh);
                }
            }
            wl_output::Event::Scale { factor } => {
                screen.pending.scale = Some(factor);
            }
            wl_output::Event::Done => {
                let first = !screen.done;
                let changed = screen.latch();
                screen.done = true;
                let id = screen.id();
                if first {
                    debug!(output = data.0, size = ?screen.mode_size, "screen available");
                    state.push_event(WindowEvent::ScreenAdded { output: id });
                } else if changed {
                    state.push_event(WindowEvent::ScreenChanged { output: id });
                }
                if changed {
                    // A scale change on this screen may move windows overlapping
                    // it to a different buffer scale.
                    crate::window::refresh_scales(state);
                }
            }
            _ => {}
        }
    }
}
