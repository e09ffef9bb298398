//! Windows and the upward event stream
//!
//! A [`Window`] ties together one surface, its shell role, its configure state
//! machine and its shared-memory backing store. Windows live in an arena keyed by
//! [`WindowId`]; every cross-module reference (input focus, frame callbacks,
//! dispatch user data) is an id resolved through the arena, so a destroyed window
//! turns in-flight references into no-ops instead of dangling handles.
//!
//! Everything the compositor tells us surfaces to the embedder as a
//! [`WindowEvent`] on a single queue, drained each iteration. The engine never
//! calls back into the embedder.

use tracing::{debug, trace, warn};
use wayland_client::protocol::wl_callback;
use wayland_client::protocol::wl_shm;
use wayland_client::QueueHandle;

use crate::client::ClientState;
use crate::display::EngineError;
use crate::input::{AxisFrame, ModifiersState, TouchPoint};
use crate::output::OutputId;
use crate::shell::{
    self, Configure, ConfigureMachine, PopupParams, ResizeEdge, ShellError, ShellRole, StateFlags,
    WindowState,
};
use crate::shm::ShmPool;
use crate::surface::Surface;
use crate::utils::{Point, Rectangle, Size};

/// Arena handle of one window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub(crate) u32);

/// Toplevel or popup, fixed at creation
#[derive(Debug, Clone, Copy)]
pub enum WindowKind {
    /// A regular window, optionally stacked above a parent
    Toplevel {
        /// Stacking parent, kept above it by the compositor
        parent: Option<WindowId>,
    },
    /// A transient child that grabs input and dismisses on click-outside
    Popup {
        /// Window the popup is anchored to
        parent: WindowId,
        /// Position relative to the parent surface
        position: Point<i32>,
    },
}

/// Creation-time window description
#[derive(Debug, Clone)]
pub struct WindowAttributes {
    /// Title shown in server-side decorations
    pub title: String,
    /// Application identifier, matched against desktop entries
    pub app_id: String,
    /// Initial content size in surface coordinates
    pub size: Size<i32>,
    /// Toplevel or popup, with the respective parent linkage
    pub kind: WindowKind,
    /// ARGB backing instead of XRGB
    pub transparent: bool,
    /// Minimum content size advertised to the compositor
    pub min_size: Option<Size<i32>>,
    /// Maximum content size advertised to the compositor
    pub max_size: Option<Size<i32>>,
}

impl Default for WindowAttributes {
    fn default() -> WindowAttributes {
        WindowAttributes {
            title: String::new(),
            app_id: String::new(),
            size: Size { w: 640, h: 480 },
            kind: WindowKind::Toplevel { parent: None },
            transparent: false,
            min_size: None,
            max_size: None,
        }
    }
}

/// Everything the engine reports upward, drained by the embedder
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    /// First configure landed; the window may be painted
    Exposed { window: WindowId },
    /// The embedder should repaint the given region
    RedrawRequested {
        window: WindowId,
        region: Rectangle<i32>,
    },
    /// The compositor settled on a new content size
    GeometryChanged {
        window: WindowId,
        size: Size<i32>,
    },
    /// The buffer scale changed because the window moved between screens
    ScaleChanged {
        window: WindowId,
        scale: i32,
    },
    /// The window moved between normal, maximized and fullscreen
    StateChanged {
        window: WindowId,
        state: WindowState,
    },
    /// The user asked for the window to close
    CloseRequested { window: WindowId },
    /// The compositor dismissed a popup on its own
    PopupDismissed { window: WindowId },
    /// A new output was announced
    ScreenAdded { output: OutputId },
    /// An output disappeared
    ScreenRemoved { output: OutputId },
    /// An output changed mode, position or scale
    ScreenChanged { output: OutputId },
    /// Keyboard focus entered or left the window
    KeyboardFocus {
        window: WindowId,
        focused: bool,
    },
    /// A key press, release or repeat on the focused window
    Key {
        window: WindowId,
        key: u32,
        keysym: u32,
        text: String,
        pressed: bool,
        repeated: bool,
        modifiers: ModifiersState,
        time: u32,
    },
    /// The effective modifier set changed
    Modifiers {
        window: WindowId,
        modifiers: ModifiersState,
    },
    /// The pointer entered the window at the given position
    PointerEntered {
        window: WindowId,
        position: Point<f64>,
    },
    /// The pointer left the window
    PointerLeft { window: WindowId },
    /// The pointer moved within the window
    PointerMotion {
        window: WindowId,
        position: Point<f64>,
        time: u32,
    },
    /// A pointer button changed state
    PointerButton {
        window: WindowId,
        button: u32,
        pressed: bool,
        position: Point<f64>,
        serial: u32,
        time: u32,
    },
    /// One coherent scroll frame
    PointerAxis {
        window: WindowId,
        frame: AxisFrame,
    },
    /// One batched frame of touch point updates
    Touch {
        window: WindowId,
        points: Vec<TouchPoint>,
    },
    /// The compositor took over the touch sequence
    TouchCancelled { window: WindowId },
}

/// One window: surface, role, configure machine and backing store
#[derive(Debug)]
pub struct Window {
    id: WindowId,
    surface: Surface,
    shell: Option<ShellRole>,
    machine: ConfigureMachine,
    /// v6 role configure waiting for the closing surface configure
    stashed: Option<Configure>,
    backing: ShmPool,
    attrs: WindowAttributes,
    exposed: bool,
    /// Damage accumulated while a frame callback is outstanding
    deferred_damage: Option<Rectangle<i32>>,
    /// Content offset applied to damage at present time
    content_margin: Point<i32>,
    /// Edge of an in-progress interactive resize
    resize_edge: Option<ResizeEdge>,
}

impl Window {
    /// Handle of this window
    pub fn id(&self) -> WindowId {
        self.id
    }

    /// Current applied size
    pub fn size(&self) -> Size<i32> {
        self.machine.size()
    }

    /// Current logical state
    pub fn window_state(&self) -> WindowState {
        self.machine.state()
    }

    /// Whether the first configure has landed
    pub fn is_exposed(&self) -> bool {
        self.exposed
    }

    /// Whether a frame callback is outstanding
    pub fn frame_pending(&self) -> bool {
        self.surface.frame_pending()
    }

    /// Buffer scale of the window's surface
    ///
    /// Buffers painted for this window should be `scale` times the logical size;
    /// the compositor divides on display.
    pub fn scale(&self) -> i32 {
        self.surface.scale()
    }

    /// Current title
    pub fn title(&self) -> &str {
        &self.attrs.title
    }

    pub(crate) fn surface(&self) -> &Surface {
        &self.surface
    }

    pub(crate) fn surface_mut(&mut self) -> &mut Surface {
        &mut self.surface
    }

    /// Mutable pool access for painting into an acquired buffer
    pub fn backing_mut(&mut self) -> &mut ShmPool {
        &mut self.backing
    }

    /// Pool access for inspecting the backing buffers
    pub fn backing(&self) -> &ShmPool {
        &self.backing
    }

    pub(crate) fn shell_flags(&self) -> StateFlags {
        self.machine.flags()
    }

    pub(crate) fn stash_configure(&mut self, cfg: Configure) {
        // only the last role event of a sequence counts
        self.stashed = Some(cfg);
    }

    pub(crate) fn take_stashed_configure(&mut self) -> Option<Configure> {
        self.stashed.take()
    }

    /// Update the title, forwarding it to the role if one is live
    pub fn set_title(&mut self, title: &str) {
        if self.attrs.title != title {
            self.attrs.title = title.to_owned();
            if let Some(role) = &self.shell {
                role.set_title(title);
            }
        }
    }

    /// Update the application id, forwarding it to the role if one is live
    pub fn set_app_id(&mut self, app_id: &str) {
        if self.attrs.app_id != app_id {
            self.attrs.app_id = app_id.to_owned();
            if let Some(role) = &self.shell {
                role.set_app_id(app_id);
            }
        }
    }

    /// Offset between buffer pixels and the window geometry origin
    pub fn set_content_margin(&mut self, margin: Point<i32>) {
        self.content_margin = margin;
    }

    /// Resize client-side while in normal state
    ///
    /// Outside normal state the compositor owns the size and the request is
    /// ignored.
    pub fn resize(&mut self, size: Size<i32>) -> bool {
        if self.machine.state() != WindowState::Normal || !size.is_positive() {
            return false;
        }
        self.machine.note_resized(size);
        if let Some(role) = &self.shell {
            role.set_window_geometry(Rectangle::from_size(size));
        }
        true
    }

    /// Attach the pool buffer at `idx` with the given damage and commit
    ///
    /// Without a shell role the window cannot be mapped yet and the commit is a
    /// silent no-op.
    pub(crate) fn present(
        &mut self,
        idx: usize,
        damage: &[Rectangle<i32>],
        qh: &QueueHandle<ClientState>,
    ) {
        if self.shell.is_none() {
            trace!(window = ?self.id, "commit without a role skipped");
            return;
        }
        let id = self.id;
        let margin = self.content_margin;
        let translated: Vec<Rectangle<i32>> =
            damage.iter().map(|r| r.translated(margin)).collect();
        let Window {
            surface, backing, ..
        } = self;
        if let Some(buffer) = backing.buffer(idx) {
            surface.commit_buffer(buffer, &translated, qh, id);
            backing.note_committed(idx);
        }
    }
}

/// Merge a repaint request into the deferred damage slot
fn coalesce_damage(deferred: Option<Rectangle<i32>>, region: Rectangle<i32>) -> Rectangle<i32> {
    match deferred {
        Some(existing) => existing.merge(region),
        None => region,
    }
}

/// Attach offset keeping the grabbed edge visually anchored during a resize
fn resize_attach_offset(old: Size<i32>, new: Size<i32>, edge: ResizeEdge) -> Point<i32> {
    Point::new(
        if edge.includes_left() { old.w - new.w } else { 0 },
        if edge.includes_top() { old.h - new.h } else { 0 },
    )
}

pub(crate) fn create_window(
    state: &mut ClientState,
    attrs: WindowAttributes,
) -> Result<WindowId, EngineError> {
    let compositor = state
        .compositor
        .clone()
        .ok_or(EngineError::NoCompositor)?;
    let qh = state.qh.clone();
    let id = state.alloc_window_id();
    let surface = Surface::new(&compositor, &qh, id);

    let role = build_role(state, &qh, id, &surface, &attrs);
    let role = match role {
        Ok(role) => Some(role),
        // the window exists but will never expose; the embedder sees no Exposed
        Err(err) => {
            warn!(window = ?id, error = %err, "window created without a shell role");
            None
        }
    };
    if let Some(role) = &role {
        if !attrs.title.is_empty() {
            role.set_title(&attrs.title);
        }
        if !attrs.app_id.is_empty() {
            role.set_app_id(&attrs.app_id);
        }
        apply_size_bounds(role, &attrs);
        // xdg roles require an unattached commit to solicit the first configure
        surface.commit();
    }

    let format = if attrs.transparent {
        wl_shm::Format::Argb8888
    } else {
        wl_shm::Format::Xrgb8888
    };
    let window = Window {
        id,
        surface,
        shell: role,
        machine: ConfigureMachine::new(attrs.size),
        stashed: None,
        backing: ShmPool::new(format),
        attrs,
        exposed: false,
        deferred_damage: None,
        content_margin: Point::new(0, 0),
        resize_edge: None,
    };
    state.windows.insert(id, window);
    debug!(window = ?id, "window created");
    Ok(id)
}

fn build_role(
    state: &ClientState,
    qh: &QueueHandle<ClientState>,
    id: WindowId,
    surface: &Surface,
    attrs: &WindowAttributes,
) -> Result<ShellRole, ShellError> {
    match attrs.kind {
        WindowKind::Toplevel { parent } => {
            let parent_role = parent
                .and_then(|pid| state.windows.get(&pid))
                .and_then(|w| w.shell.as_ref());
            shell::create_toplevel(&state.shells, qh, id, surface.wl_surface(), parent_role)
        }
        WindowKind::Popup { parent, position } => {
            let parent_window = state
                .windows
                .get(&parent)
                .ok_or(ShellError::ShellUnavailable)?;
            let last = state.last_input.ok_or(ShellError::NoPopupTrigger)?;
            let seat = state
                .seats
                .iter()
                .find(|s| s.id() == last.seat)
                .ok_or(ShellError::NoPopupTrigger)?;
            shell::create_popup(
                &state.shells,
                qh,
                id,
                surface.wl_surface(),
                PopupParams {
                    parent_surface: parent_window.surface.wl_surface(),
                    parent_role: parent_window.shell.as_ref(),
                    position,
                    size: attrs.size,
                    seat: seat.wl_seat(),
                    serial: last.serial,
                },
            )
        }
    }
}

fn apply_size_bounds(role: &ShellRole, attrs: &WindowAttributes) {
    if let ShellRole::XdgV6Toplevel { toplevel, .. } = role {
        if let Some(min) = attrs.min_size {
            toplevel.set_min_size(min.w, min.h);
        }
        if let Some(max) = attrs.max_size {
            toplevel.set_max_size(max.w, max.h);
        }
    }
}

/// Fold a normalized configure into the window and emit the resulting events
pub(crate) fn handle_configure(state: &mut ClientState, id: WindowId, cfg: Configure) {
    let mut events: Vec<WindowEvent> = Vec::new();
    {
        let Some(window) = state.windows.get_mut(&id) else {
            return;
        };
        let old_size = window.machine.size();
        let applied = window.machine.apply(cfg);
        if let (Some(serial), Some(role)) = (applied.ack, &window.shell) {
            role.ack(serial);
        }
        if applied.size_changed {
            if let Some(edge) = window.resize_edge {
                window
                    .surface
                    .add_attach_offset(resize_attach_offset(old_size, applied.size, edge));
            }
        }
        if !applied.flags.contains(StateFlags::RESIZING) {
            window.resize_edge = None;
        }
        let first = !window.exposed;
        window.exposed = true;
        if first {
            events.push(WindowEvent::Exposed { window: id });
        }
        if applied.size_changed {
            events.push(WindowEvent::GeometryChanged {
                window: id,
                size: applied.size,
            });
        }
        if applied.state_changed {
            events.push(WindowEvent::StateChanged {
                window: id,
                state: applied.state,
            });
        }
        if first || applied.size_changed {
            let region = Rectangle::from_size(applied.size);
            if window.surface.frame_pending() {
                window.deferred_damage = Some(coalesce_damage(window.deferred_damage, region));
            } else {
                events.push(WindowEvent::RedrawRequested { window: id, region });
            }
        }
    }
    for event in events {
        state.push_event(event);
    }
}

pub(crate) fn handle_close(state: &mut ClientState, id: WindowId) {
    if state.windows.contains_key(&id) {
        state.push_event(WindowEvent::CloseRequested { window: id });
    }
}

/// The compositor dismissed a popup; drop the role and report it
pub(crate) fn handle_popup_done(state: &mut ClientState, id: WindowId) {
    let mut dismissed = false;
    if let Some(window) = state.windows.get_mut(&id) {
        if let Some(role) = window.shell.take() {
            role.destroy();
        }
        window.surface.attach_none();
        window.exposed = false;
        dismissed = true;
    }
    if dismissed {
        state.push_event(WindowEvent::PopupDismissed { window: id });
    }
}

/// Completion of the window's frame callback; surfaces deferred repaints
pub(crate) fn frame_done(state: &mut ClientState, id: WindowId, callback: &wl_callback::WlCallback) {
    let mut deferred = None;
    if let Some(window) = state.windows.get_mut(&id) {
        if window.surface.frame_done(callback) {
            deferred = window.deferred_damage.take();
        }
    }
    if let Some(region) = deferred {
        state.push_event(WindowEvent::RedrawRequested { window: id, region });
    }
}

/// Recompute every window's buffer scale after a screen changed
pub(crate) fn refresh_scales(state: &mut ClientState) {
    let ClientState {
        windows,
        screens,
        events,
        ..
    } = state;
    for (id, window) in windows.iter_mut() {
        if let Some(scale) = window.surface.refresh_scale(screens) {
            events.push_back(WindowEvent::ScaleChanged {
                window: *id,
                scale,
            });
        }
    }
}

/// Ask for a repaint; coalesces while a frame is in flight
pub(crate) fn request_repaint(
    state: &mut ClientState,
    id: WindowId,
    region: Option<Rectangle<i32>>,
) {
    let mut emit = None;
    if let Some(window) = state.windows.get_mut(&id) {
        if !window.exposed {
            return;
        }
        let region = region.unwrap_or_else(|| Rectangle::from_size(window.machine.size()));
        if window.surface.frame_pending() {
            window.deferred_damage = Some(coalesce_damage(window.deferred_damage, region));
        } else {
            emit = Some(region);
        }
    }
    if let Some(region) = emit {
        state.push_event(WindowEvent::RedrawRequested { window: id, region });
    }
}

/// Request a logical state change, diffed against what was already asked
pub(crate) fn set_window_state(state: &mut ClientState, id: WindowId, target: WindowState) {
    let mut synthetic = None;
    if let Some(window) = state.windows.get_mut(&id) {
        let Some(role) = &window.shell else { return };
        if role.is_popup() {
            return;
        }
        let plan = window.machine.request(target);
        for request in &plan {
            role.send_state_request(*request, None);
        }
        // wl_shell never echoes state back, so the machine advances locally
        if !plan.is_empty() && !role.has_serials() && target != WindowState::Minimized {
            let mut flags = window.machine.flags()
                & !(StateFlags::MAXIMIZED | StateFlags::FULLSCREEN);
            flags |= match target {
                WindowState::Maximized => StateFlags::MAXIMIZED,
                WindowState::Fullscreen => StateFlags::FULLSCREEN,
                _ => StateFlags::empty(),
            };
            synthetic = Some(Configure {
                size: Size { w: 0, h: 0 },
                flags,
                serial: None,
            });
        }
    }
    if let Some(cfg) = synthetic {
        handle_configure(state, id, cfg);
    }
}

/// Start a compositor-driven move using the last input serial
pub(crate) fn start_interactive_move(state: &mut ClientState, id: WindowId) {
    let Some(last) = state.last_input else { return };
    let Some(seat) = state.seats.iter().find(|s| s.id() == last.seat) else {
        return;
    };
    if let Some(window) = state.windows.get(&id) {
        if let Some(role) = &window.shell {
            role.start_move(seat.wl_seat(), last.serial);
        }
    }
}

/// Start a compositor-driven resize from `edge` using the last input serial
pub(crate) fn start_interactive_resize(state: &mut ClientState, id: WindowId, edge: ResizeEdge) {
    let Some(last) = state.last_input else { return };
    let Some(seat) = state.seats.iter().find(|s| s.id() == last.seat) else {
        return;
    };
    let seat = seat.wl_seat().clone();
    if let Some(window) = state.windows.get_mut(&id) {
        if let Some(role) = &window.shell {
            window.resize_edge = Some(edge);
            role.start_resize(&seat, last.serial, edge);
        }
    }
}

/// Pop up the compositor's window menu at a surface-local position
pub(crate) fn show_window_menu(state: &mut ClientState, id: WindowId, position: Point<i32>) {
    let Some(last) = state.last_input else { return };
    let Some(seat) = state.seats.iter().find(|s| s.id() == last.seat) else {
        return;
    };
    if let Some(window) = state.windows.get(&id) {
        if let Some(role) = &window.shell {
            role.show_window_menu(seat.wl_seat(), last.serial, position);
        }
    }
}

/// Map a hidden window again
///
/// Shell roles are one-shot per protocol lifetime, so showing after a hide
/// creates fresh role objects over the same surface.
pub(crate) fn show(state: &mut ClientState, id: WindowId) {
    let role = {
        let Some(window) = state.windows.get(&id) else { return };
        if window.shell.is_some() {
            return;
        }
        let qh = state.qh.clone();
        match build_role(state, &qh, id, &window.surface, &window.attrs) {
            Ok(role) => role,
            Err(err) => {
                warn!(window = ?id, error = %err, "window could not be re-mapped");
                return;
            }
        }
    };
    if let Some(window) = state.windows.get_mut(&id) {
        if !window.attrs.title.is_empty() {
            role.set_title(&window.attrs.title);
        }
        if !window.attrs.app_id.is_empty() {
            role.set_app_id(&window.attrs.app_id);
        }
        apply_size_bounds(&role, &window.attrs);
        window.shell = Some(role);
        window.surface.commit();
        debug!(window = ?id, "window re-mapped");
    }
}

/// Unmap a window, keeping the surface and backing store for a later show
pub(crate) fn hide(state: &mut ClientState, id: WindowId) {
    if let Some(window) = state.windows.get_mut(&id) {
        if let Some(role) = window.shell.take() {
            role.destroy();
        }
        window.surface.attach_none();
        window.exposed = false;
        window.deferred_damage = None;
        debug!(window = ?id, "window hidden");
    }
}

/// Destroy a window and everything it owns
pub(crate) fn destroy_window(state: &mut ClientState, id: WindowId) {
    let Some(mut window) = state.windows.shift_remove(&id) else {
        return;
    };
    crate::input::clear_window_focus(state, id);
    if let Some(role) = window.shell.take() {
        role.destroy();
    }
    window.backing.destroy();
    window.surface.destroy();
    debug!(window = ?id, "window destroyed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32> {
        Rectangle {
            loc: Point::new(x, y),
            size: Size { w, h },
        }
    }

    #[test]
    fn damage_coalesces_into_bounding_rect() {
        let first = coalesce_damage(None, rect(0, 0, 10, 10));
        assert_eq!(first, rect(0, 0, 10, 10));
        let merged = coalesce_damage(Some(first), rect(20, 20, 10, 10));
        assert_eq!(merged, rect(0, 0, 30, 30));
    }

    #[test]
    fn left_edge_resize_offsets_horizontally() {
        let offset = resize_attach_offset(
            Size { w: 100, h: 100 },
            Size { w: 80, h: 100 },
            ResizeEdge::Left,
        );
        assert_eq!(offset, Point::new(20, 0));
    }

    #[test]
    fn top_left_resize_offsets_both_axes() {
        let offset = resize_attach_offset(
            Size { w: 100, h: 100 },
            Size { w: 90, h: 70 },
            ResizeEdge::TopLeft,
        );
        assert_eq!(offset, Point::new(10, 30));
    }

    #[test]
    fn bottom_right_resize_keeps_origin() {
        let offset = resize_attach_offset(
            Size { w: 100, h: 100 },
            Size { w: 150, h: 150 },
            ResizeEdge::BottomRight,
        );
        assert_eq!(offset, Point::new(0, 0));
    }

    #[test]
    fn successive_configures_sum_to_the_total_offset() {
        // two configures land between commits during a left-edge resize; the
        // accumulated offset must equal the one-step delta
        let full = Size { w: 100, h: 100 };
        let mid = Size { w: 90, h: 100 };
        let last = Size { w: 70, h: 100 };
        let a = resize_attach_offset(full, mid, ResizeEdge::Left);
        let b = resize_attach_offset(mid, last, ResizeEdge::Left);
        assert_eq!(a + b, resize_attach_offset(full, last, ResizeEdge::Left));
        assert_eq!(a + b, Point::new(30, 0));
    }

    #[test]
    fn default_attributes_are_a_plain_toplevel() {
        let attrs = WindowAttributes::default();
        assert!(matches!(attrs.kind, WindowKind::Toplevel { parent: None }));
        assert_eq!(attrs.size, Size { w: 640, h: 480 });
        assert!(!attrs.transparent);
    }
}
