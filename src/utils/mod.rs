//! Various utility functions and types shared by the rest of the crate

mod geometry;
mod serial;

pub use self::geometry::{Point, Rectangle, Size};
pub use self::serial::{Serial, SerialCounter};
