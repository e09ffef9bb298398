//! A resizable software-rendered checkerboard.
//!
//! Demonstrates the full client loop: window creation, configure handling,
//! repaints throttled by frame callbacks, key repeat and interactive move and
//! resize started from pointer input.
//!
//! Keys: Escape quits, F toggles fullscreen, M toggles maximized. Dragging with
//! the left button moves the window; the right button opens the window menu.

use std::time::Instant;

use bellows::display::Display;
use bellows::shell::WindowState;
use bellows::utils::Size;
use bellows::window::{WindowAttributes, WindowEvent, WindowId};

const KEY_ESC: u32 = 1;
const KEY_F: u32 = 33;
const KEY_M: u32 = 50;
const BTN_LEFT: u32 = 0x110;
const BTN_RIGHT: u32 = 0x111;

const TILE: i32 = 32;

fn paint(display: &mut Display, window: WindowId, size: Size<i32>) {
    let idx = match display.acquire_buffer(window, size) {
        Ok(idx) => idx,
        Err(err) => {
            eprintln!("buffer acquisition failed: {err}");
            return;
        }
    };
    {
        let win = display.state().window_mut(window).unwrap();
        let buffer = win.backing_mut().buffer_mut(idx).unwrap();
        let stride = buffer.stride() as usize;
        let canvas = buffer.canvas();
        for y in 0..size.h {
            let row = &mut canvas[y as usize * stride..][..size.w as usize * 4];
            for x in 0..size.w {
                let dark = ((x / TILE) + (y / TILE)) % 2 == 0;
                let px = if dark { 0xff202020u32 } else { 0xffe0e0e0u32 };
                row[x as usize * 4..][..4].copy_from_slice(&px.to_ne_bytes());
            }
        }
    }
    if let Err(err) = display.present(window, idx, &[]) {
        eprintln!("present failed: {err}");
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let mut display = Display::connect();
    let window = display
        .create_window(WindowAttributes {
            title: "checkerboard".into(),
            app_id: "bellows.checkerboard".into(),
            size: Size { w: 512, h: 384 },
            min_size: Some(Size { w: 128, h: 128 }),
            ..Default::default()
        })
        .expect("window creation");

    let mut size = Size { w: 512, h: 384 };
    let mut state = WindowState::Normal;

    loop {
        // Fire due key repeats before blocking again.
        if let Some(deadline) = display.next_repeat_deadline() {
            if deadline <= Instant::now() {
                display.dispatch_key_repeats(Instant::now());
            }
        }
        display.blocking_dispatch().expect("dispatch");
        for event in display.drain_events() {
            match event {
                WindowEvent::Exposed { .. } => paint(&mut display, window, size),
                WindowEvent::RedrawRequested { .. } => paint(&mut display, window, size),
                WindowEvent::GeometryChanged { size: new_size, .. } => {
                    size = new_size;
                    paint(&mut display, window, size);
                }
                WindowEvent::StateChanged {
                    state: new_state, ..
                } => {
                    state = new_state;
                }
                WindowEvent::ScaleChanged { scale, .. } => {
                    println!("buffer scale is now {scale}");
                }
                WindowEvent::Key { key, pressed, .. } if pressed => match key {
                    KEY_ESC => return,
                    KEY_F => {
                        let target = if state == WindowState::Fullscreen {
                            WindowState::Normal
                        } else {
                            WindowState::Fullscreen
                        };
                        display.set_window_state(window, target);
                    }
                    KEY_M => {
                        let target = if state == WindowState::Maximized {
                            WindowState::Normal
                        } else {
                            WindowState::Maximized
                        };
                        display.set_window_state(window, target);
                    }
                    _ => {}
                },
                WindowEvent::PointerButton {
                    button, pressed, ..
                } if pressed => match button {
                    BTN_LEFT => display.start_interactive_move(window),
                    BTN_RIGHT => {
                        let pos = display
                            .state()
                            .window(window)
                            .map(|w| w.size())
                            .unwrap_or(size);
                        display.show_window_menu(
                            window,
                            bellows::utils::Point::new(pos.w / 2, pos.h / 2),
                        );
                    }
                    _ => {}
                },
                WindowEvent::CloseRequested { .. } => return,
                _ => {}
            }
        }
    }
}
