//! Keyboard input and key repeat
//!
//! The compositor ships the keymap as a shared-memory fd; keycodes are resolved
//! to keysyms and text through xkbcommon, and the modifier state is driven
//! entirely by the compositor's `modifiers` events rather than tracked locally.
//!
//! Wayland has no wire-level key repeat. Holding a key produces a single press,
//! and the repeat cadence is the client's job: a local timer synthesizes
//! release/press pairs once the delay elapses, stopped by the release of the
//! repeating key or by focus loss. The default cadence (400 ms delay, 25 ms
//! interval) applies until a seat v4 compositor overrides it with `repeat_info`.

use std::os::fd::OwnedFd;
use std::ptr;
use std::slice;
use std::time::{Duration, Instant};

use rustix::mm::{MapFlags, ProtFlags};
use tracing::{trace, warn};
use wayland_client::protocol::wl_keyboard;
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle, WEnum};
use xkbcommon::xkb;

use crate::client::ClientState;
use crate::input::{DeviceKind, LastInput, SeatId};
use crate::window::{WindowEvent, WindowId};

const DEFAULT_REPEAT_DELAY: Duration = Duration::from_millis(400);
const DEFAULT_REPEAT_INTERVAL: Duration = Duration::from_millis(25);

/// Evdev-to-xkb keycode offset
const KEYCODE_OFFSET: u32 = 8;

/// Effective modifier state, recomputed after every `modifiers` event
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ModifiersState {
    /// The "control" key
    pub ctrl: bool,
    /// The "alt" key
    pub alt: bool,
    /// The "shift" key
    pub shift: bool,
    /// The "Caps lock" key
    pub caps_lock: bool,
    /// The "logo" key
    ///
    /// Also known as the "windows" key on most keyboards
    pub logo: bool,
    /// The "Num lock" key
    pub num_lock: bool,
}

impl ModifiersState {
    fn from_xkb(state: &xkb::State) -> ModifiersState {
        let active =
            |name: &str| state.mod_name_is_active(name, xkb::STATE_MODS_EFFECTIVE);
        ModifiersState {
            ctrl: active(xkb::MOD_NAME_CTRL),
            alt: active(xkb::MOD_NAME_ALT),
            shift: active(xkb::MOD_NAME_SHIFT),
            caps_lock: active(xkb::MOD_NAME_CAPS),
            logo: active(xkb::MOD_NAME_LOGO),
            num_lock: active(xkb::MOD_NAME_NUM),
        }
    }
}

/// Repeat cadence, compositor-overridable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RepeatSchedule {
    delay: Duration,
    /// `None` disables repeat entirely (rate 0)
    interval: Option<Duration>,
}

impl Default for RepeatSchedule {
    fn default() -> RepeatSchedule {
        RepeatSchedule {
            delay: DEFAULT_REPEAT_DELAY,
            interval: Some(DEFAULT_REPEAT_INTERVAL),
        }
    }
}

impl RepeatSchedule {
    /// Translate a `repeat_info` event (rate in chars per second)
    pub(crate) fn from_repeat_info(rate: i32, delay: i32) -> RepeatSchedule {
        let interval = if rate > 0 {
            Some(Duration::from_millis((1000 / rate as u64).max(1)))
        } else {
            None
        };
        RepeatSchedule {
            delay: Duration::from_millis(delay.max(0) as u64),
            interval,
        }
    }

    /// Deadline of the first repeat after a press at `now`
    pub(crate) fn first_deadline(&self, now: Instant) -> Option<Instant> {
        self.interval.map(|_| now + self.delay)
    }
}

#[derive(Debug)]
struct RepeatKey {
    key: u32,
    keysym: u32,
    text: String,
    window: WindowId,
    time: u32,
    next: Instant,
}

/// Repeat timer state, kept apart from the wire device
#[derive(Debug, Default)]
struct RepeatState {
    schedule: RepeatSchedule,
    repeating: Option<RepeatKey>,
}

impl RepeatState {
    fn set_schedule(&mut self, schedule: RepeatSchedule) {
        self.schedule = schedule;
        // A cadence change invalidates the armed deadline; the next press
        // re-arms under the new schedule. A disabled cadence in particular
        // must not leave a past deadline armed forever.
        self.repeating = None;
    }

    fn deadline(&self) -> Option<Instant> {
        self.repeating.as_ref().map(|r| r.next)
    }

    fn stop(&mut self) {
        self.repeating = None;
    }

    fn press(
        &mut self,
        now: Instant,
        key: u32,
        keysym: u32,
        text: String,
        window: WindowId,
        time: u32,
    ) {
        if let Some(next) = self.schedule.first_deadline(now) {
            self.repeating = Some(RepeatKey {
                key,
                keysym,
                text,
                window,
                time,
                next,
            });
        }
    }

    fn release(&mut self, key: u32) {
        if self.repeating.as_ref().map(|r| r.key) == Some(key) {
            self.repeating = None;
        }
    }

    /// Emit release/press pairs for every repeat slot that elapsed before `now`
    fn collect(&mut self, now: Instant, modifiers: ModifiersState, out: &mut Vec<WindowEvent>) {
        let Some(interval) = self.schedule.interval else {
            // repeat was disabled while a key was held
            self.repeating = None;
            return;
        };
        let Some(rep) = self.repeating.as_mut() else {
            return;
        };
        while rep.next <= now {
            for pressed in [false, true] {
                out.push(WindowEvent::Key {
                    window: rep.window,
                    key: rep.key,
                    keysym: rep.keysym,
                    text: if pressed { rep.text.clone() } else { String::new() },
                    pressed,
                    repeated: true,
                    modifiers,
                    time: rep.time,
                });
            }
            rep.next += interval;
        }
    }
}

/// One seat's keyboard device
pub struct Keyboard {
    wl: wl_keyboard::WlKeyboard,
    version: u32,
    context: xkb::Context,
    keymap: Option<xkb::Keymap>,
    xkb_state: Option<xkb::State>,
    focus: Option<WindowId>,
    enter_serial: u32,
    modifiers: ModifiersState,
    repeat: RepeatState,
}

impl std::fmt::Debug for Keyboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyboard")
            .field("focus", &self.focus)
            .field("modifiers", &self.modifiers)
            .field("schedule", &self.repeat.schedule)
            .field("repeating", &self.repeat.repeating.as_ref().map(|r| r.key))
            .finish_non_exhaustive()
    }
}

impl Keyboard {
    pub(crate) fn new(wl: wl_keyboard::WlKeyboard, version: u32) -> Keyboard {
        Keyboard {
            wl,
            version,
            context: xkb::Context::new(xkb::CONTEXT_NO_FLAGS),
            keymap: None,
            xkb_state: None,
            focus: None,
            enter_serial: 0,
            modifiers: ModifiersState::default(),
            repeat: RepeatState::default(),
        }
    }

    /// The window holding keyboard focus, if any
    pub fn focus(&self) -> Option<WindowId> {
        self.focus
    }

    /// Current effective modifiers
    pub fn modifiers(&self) -> ModifiersState {
        self.modifiers
    }

    /// Serial of the most recent enter, quoted by e.g. cursor requests
    pub fn enter_serial(&self) -> u32 {
        self.enter_serial
    }

    /// When the next repeat is due, if a key is repeating
    pub(crate) fn repeat_deadline(&self) -> Option<Instant> {
        self.repeat.deadline()
    }

    pub(crate) fn clear_focus_on(&mut self, window: WindowId) {
        if self.focus == Some(window) {
            self.focus = None;
            self.repeat.stop();
        }
    }

    pub(crate) fn release(self) {
        if self.version >= 3 {
            self.wl.release();
        }
    }

    fn stop_repeat(&mut self) {
        self.repeat.stop();
    }

    fn collect_repeats(&mut self, now: Instant, out: &mut Vec<WindowEvent>) {
        self.repeat.collect(now, self.modifiers, out);
    }

    fn load_keymap(&mut self, fd: OwnedFd, size: u32) {
        let keymap = map_keymap_fd(fd, size as usize)
            .and_then(|text| {
                xkb::Keymap::new_from_string(
                    &self.context,
                    text,
                    xkb::KEYMAP_FORMAT_TEXT_V1,
                    xkb::KEYMAP_COMPILE_NO_FLAGS,
                )
            })
            .or_else(|| {
                // Fall back to the rules-based default so key events still carry
                // symbols on the most common layouts.
                warn!("compositor keymap unusable, falling back to the default layout");
                xkb::Keymap::new_from_names(
                    &self.context,
                    "",
                    "",
                    "",
                    "",
                    None,
                    xkb::KEYMAP_COMPILE_NO_FLAGS,
                )
            });
        match keymap {
            Some(keymap) => {
                self.xkb_state = Some(xkb::State::new(&keymap));
                self.keymap = Some(keymap);
                trace!("keymap compiled");
            }
            None => warn!("keymap failed to compile"),
        }
    }

    /// Resolve a raw key to its keysym and (for presses) committed text
    fn lookup_key(&self, key: u32, pressed: bool) -> (u32, String) {
        let keycode = xkb::Keycode::new(key + KEYCODE_OFFSET);
        match &self.xkb_state {
            Some(xs) => (
                xs.key_get_one_sym(keycode).raw(),
                if pressed {
                    xs.key_get_utf8(keycode)
                } else {
                    String::new()
                },
            ),
            None => (0, String::new()),
        }
    }
}

/// Read the null-terminated keymap text out of the compositor's fd
fn map_keymap_fd(fd: OwnedFd, size: usize) -> Option<String> {
    if size == 0 {
        return None;
    }
    let ptr = unsafe {
        rustix::mm::mmap(
            ptr::null_mut(),
            size,
            ProtFlags::READ,
            MapFlags::PRIVATE,
            &fd,
            0,
        )
    }
    .ok()?;
    let bytes = unsafe { slice::from_raw_parts(ptr as *const u8, size) };
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(size);
    let text = std::str::from_utf8(&bytes[..end]).map(str::to_owned).ok();
    let _ = unsafe { rustix::mm::munmap(ptr, size) };
    text
}

/// Fire all elapsed repeat timers across every seat
pub(crate) fn dispatch_repeats(state: &mut ClientState, now: Instant) {
    let mut fired = Vec::new();
    for seat in &mut state.seats {
        if let Some(kbd) = seat.keyboard.as_mut() {
            kbd.collect_repeats(now, &mut fired);
        }
    }
    for event in fired {
        state.push_event(event);
    }
}

fn keyboard_mut(state: &mut ClientState, id: SeatId) -> Option<&mut Keyboard> {
    state.seat_mut(id).and_then(|s| s.keyboard.as_mut())
}

impl Dispatch<wl_keyboard::WlKeyboard, SeatId> for ClientState {
    fn event(
        state: &mut Self,
        _keyboard: &wl_keyboard::WlKeyboard,
        event: wl_keyboard::Event,
        data: &SeatId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_keyboard::Event::Keymap { format, fd, size } => {
                if format != WEnum::Value(wl_keyboard::KeymapFormat::XkbV1) {
                    warn!(?format, "unsupported keymap format");
                    return;
                }
                if let Some(kbd) = keyboard_mut(state, *data) {
                    kbd.load_keymap(fd, size);
                }
            }
            wl_keyboard::Event::Enter {
                serial,
                surface,
                keys,
            } => {
                let window = surface.data::<WindowId>().copied();
                let Some(window) = window else { return };
                let mut emitted = vec![WindowEvent::KeyboardFocus {
                    window,
                    focused: true,
                }];
                if let Some(kbd) = keyboard_mut(state, *data) {
                    kbd.focus = Some(window);
                    kbd.enter_serial = serial;
                    // Keys already held when focus arrives are reported as ordinary
                    // presses so the embedder's key state matches the compositor's.
                    for chunk in keys.chunks_exact(4) {
                        let key = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                        let (keysym, text) = kbd.lookup_key(key, true);
                        emitted.push(WindowEvent::Key {
                            window,
                            key,
                            keysym,
                            text,
                            pressed: true,
                            repeated: false,
                            modifiers: kbd.modifiers,
                            time: 0,
                        });
                    }
                }
                for event in emitted {
                    state.push_event(event);
                }
            }
            wl_keyboard::Event::Leave { surface, .. } => {
                let window = surface.data::<WindowId>().copied();
                if let Some(kbd) = keyboard_mut(state, *data) {
                    kbd.focus = None;
                    kbd.stop_repeat();
                }
                if let Some(window) = window {
                    state.push_event(WindowEvent::KeyboardFocus {
                        window,
                        focused: false,
                    });
                }
            }
            wl_keyboard::Event::Key {
                serial,
                time,
                key,
                state: key_state,
            } => {
                let pressed =
                    matches!(key_state, WEnum::Value(wl_keyboard::KeyState::Pressed));
                let mut emitted = None;
                let mut target = None;
                if let Some(kbd) = keyboard_mut(state, *data) {
                    let Some(window) = kbd.focus else { return };
                    target = Some(window);
                    let (keysym, text) = kbd.lookup_key(key, pressed);
                    if pressed {
                        let keycode = xkb::Keycode::new(key + KEYCODE_OFFSET);
                        let repeats = kbd
                            .keymap
                            .as_ref()
                            .map(|km| km.key_repeats(keycode))
                            .unwrap_or(false);
                        if repeats {
                            kbd.repeat
                                .press(Instant::now(), key, keysym, text.clone(), window, time);
                        }
                    } else {
                        kbd.repeat.release(key);
                    }
                    emitted = Some(WindowEvent::Key {
                        window,
                        key,
                        keysym,
                        text,
                        pressed,
                        repeated: false,
                        modifiers: kbd.modifiers,
                        time,
                    });
                }
                if pressed {
                    if let Some(window) = target {
                        state.last_input = Some(LastInput {
                            seat: *data,
                            serial,
                            kind: DeviceKind::Keyboard,
                            window,
                        });
                    }
                }
                if let Some(event) = emitted {
                    state.push_event(event);
                }
            }
            wl_keyboard::Event::Modifiers {
                mods_depressed,
                mods_latched,
                mods_locked,
                group,
                ..
            } => {
                let mut emitted = None;
                if let Some(kbd) = keyboard_mut(state, *data) {
                    if let Some(xs) = kbd.xkb_state.as_mut() {
                        xs.update_mask(mods_depressed, mods_latched, mods_locked, 0, 0, group);
                        kbd.modifiers = ModifiersState::from_xkb(xs);
                    }
                    if let Some(window) = kbd.focus {
                        emitted = Some(WindowEvent::Modifiers {
                            window,
                            modifiers: kbd.modifiers,
                        });
                    }
                }
                if let Some(event) = emitted {
                    state.push_event(event);
                }
            }
            wl_keyboard::Event::RepeatInfo { rate, delay } => {
                if let Some(kbd) = keyboard_mut(state, *data) {
                    kbd.repeat
                        .set_schedule(RepeatSchedule::from_repeat_info(rate, delay));
                    trace!(rate, delay, "repeat cadence updated");
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cadence_is_400_then_25() {
        let schedule = RepeatSchedule::default();
        assert_eq!(schedule.delay, Duration::from_millis(400));
        assert_eq!(schedule.interval, Some(Duration::from_millis(25)));
    }

    #[test]
    fn first_repeat_fires_after_the_delay() {
        let schedule = RepeatSchedule::default();
        let now = Instant::now();
        assert_eq!(schedule.first_deadline(now), Some(now + Duration::from_millis(400)));
    }

    #[test]
    fn repeat_info_overrides_cadence() {
        let schedule = RepeatSchedule::from_repeat_info(40, 600);
        assert_eq!(schedule.delay, Duration::from_millis(600));
        assert_eq!(schedule.interval, Some(Duration::from_millis(25)));
    }

    #[test]
    fn zero_rate_disables_repeat() {
        let schedule = RepeatSchedule::from_repeat_info(0, 600);
        assert_eq!(schedule.interval, None);
        assert_eq!(schedule.first_deadline(Instant::now()), None);
    }

    #[test]
    fn negative_delay_is_clamped() {
        let schedule = RepeatSchedule::from_repeat_info(25, -5);
        assert_eq!(schedule.delay, Duration::ZERO);
        assert_eq!(schedule.interval, Some(Duration::from_millis(40)));
    }

    const W: WindowId = WindowId(1);

    fn hold_a(repeat: &mut RepeatState, t0: Instant) {
        repeat.press(t0, 30, 97, "a".to_owned(), W, 1000);
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn held_key_repeats_as_release_press_pairs() {
        let mut repeat = RepeatState::default();
        let t0 = Instant::now();
        hold_a(&mut repeat, t0);
        let mut out = Vec::new();
        repeat.collect(t0 + ms(399), ModifiersState::default(), &mut out);
        assert!(out.is_empty());
        // deadlines at 400, 425 and 450 ms have all elapsed by now
        repeat.collect(t0 + ms(450), ModifiersState::default(), &mut out);
        assert_eq!(out.len(), 6);
        for pair in out.chunks_exact(2) {
            match (&pair[0], &pair[1]) {
                (
                    WindowEvent::Key {
                        pressed: false,
                        repeated: true,
                        text: released,
                        ..
                    },
                    WindowEvent::Key {
                        pressed: true,
                        repeated: true,
                        text: retyped,
                        key: 30,
                        keysym: 97,
                        window: W,
                        ..
                    },
                ) => {
                    assert!(released.is_empty());
                    assert_eq!(retyped, "a");
                }
                other => panic!("unexpected repeat pair: {other:?}"),
            }
        }
        assert_eq!(repeat.deadline(), Some(t0 + ms(475)));
    }

    #[test]
    fn releasing_the_held_key_stops_the_repeat() {
        let mut repeat = RepeatState::default();
        let t0 = Instant::now();
        hold_a(&mut repeat, t0);
        // lifting an unrelated key leaves the timer armed
        repeat.release(31);
        assert!(repeat.deadline().is_some());
        repeat.release(30);
        assert_eq!(repeat.deadline(), None);
        let mut out = Vec::new();
        repeat.collect(t0 + ms(500), ModifiersState::default(), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn disabling_repeat_mid_hold_cancels_the_deadline() {
        let mut repeat = RepeatState::default();
        let t0 = Instant::now();
        hold_a(&mut repeat, t0);
        repeat.set_schedule(RepeatSchedule::from_repeat_info(0, 600));
        assert_eq!(repeat.deadline(), None);
        let mut out = Vec::new();
        repeat.collect(t0 + ms(1000), ModifiersState::default(), &mut out);
        assert!(out.is_empty());
        // the next press does not arm a timer either
        hold_a(&mut repeat, t0 + ms(1000));
        assert_eq!(repeat.deadline(), None);
    }

    #[test]
    fn cadence_change_mid_hold_waits_for_the_next_press() {
        let mut repeat = RepeatState::default();
        let t0 = Instant::now();
        hold_a(&mut repeat, t0);
        repeat.set_schedule(RepeatSchedule::from_repeat_info(10, 200));
        assert_eq!(repeat.deadline(), None);
        hold_a(&mut repeat, t0 + ms(50));
        assert_eq!(repeat.deadline(), Some(t0 + ms(250)));
    }
}
