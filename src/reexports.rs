//! Reexports of crates, that are part of the public api, for convenience

pub use calloop;
pub use wayland_backend;
pub use wayland_client;
pub use xkbcommon;
