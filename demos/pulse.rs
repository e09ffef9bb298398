//! Continuous animation paced by frame callbacks.
//!
//! Fills the window with a pulsing color and asks for the next repaint right
//! after presenting each frame. The repaint request coalesces behind the
//! outstanding frame callback, so the animation runs at the compositor's pace
//! instead of a busy loop.

use bellows::display::Display;
use bellows::utils::Size;
use bellows::window::{WindowAttributes, WindowEvent, WindowId};

fn shade(frame: u32) -> u32 {
    // triangle wave over the blue channel
    let t = frame % 512;
    let b = if t < 256 { t } else { 511 - t };
    0xff000040 | (b << 16)
}

fn paint(display: &mut Display, window: WindowId, size: Size<i32>, frame: u32) {
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
        let px = shade(frame).to_ne_bytes();
        for chunk in buffer.canvas().chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }
    if let Err(err) = display.present(window, idx, &[]) {
        eprintln!("present failed: {err}");
    }
    // Queue the next frame; it surfaces as RedrawRequested once the
    // compositor is done with this one.
    display.request_repaint(window, None);
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
            title: "pulse".into(),
            app_id: "bellows.pulse".into(),
            size: Size { w: 400, h: 300 },
            ..Default::default()
        })
        .expect("window creation");

    let mut size = Size { w: 400, h: 300 };
    let mut frame = 0u32;

    loop {
        display.blocking_dispatch().expect("dispatch");
        for event in display.drain_events() {
            match event {
                WindowEvent::Exposed { .. } | WindowEvent::RedrawRequested { .. } => {
                    frame = frame.wrapping_add(4);
                    paint(&mut display, window, size, frame);
                }
                WindowEvent::GeometryChanged { size: new_size, .. } => {
                    size = new_size;
                }
                WindowEvent::CloseRequested { .. } => return,
                _ => {}
            }
        }
    }
}
