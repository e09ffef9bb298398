//! Generated client bindings for the legacy xdg-shell revisions.
//!
//! The pre-stable xdg-shell protocols are no longer shipped by the
//! `wayland-protocols` crate, but plenty of compositors of that era only
//! speak one of them. The XML definitions are vendored under `protocols/`
//! and run through `wayland-scanner` at compile time, the same way
//! `wayland-protocols` generates its own modules.

#![allow(missing_docs)]
#![allow(non_upper_case_globals)]

/// `xdg_shell` unstable v5, the last revision before the `z` prefix.
///
/// The shell global is named `xdg_shell` on the wire and requires the
/// `use_unstable_version(5)` handshake before any surface may be created.
pub mod xdg_v5 {
    #![allow(clippy::too_many_arguments)]

    use wayland_client;
    use wayland_client::protocol::*;

    pub mod __interfaces {
        use wayland_client::protocol::__interfaces::*;
        wayland_scanner::generate_interfaces!("./protocols/xdg-shell-unstable-v5.xml");
    }
    use self::__interfaces::*;

    wayland_scanner::generate_client_code!("./protocols/xdg-shell-unstable-v5.xml");
}

/// `zxdg_shell_v6`, the two-step (role object + latched configure) revision.
pub mod xdg_v6 {
    #![allow(clippy::too_many_arguments)]

    use wayland_client;
    use wayland_client::protocol::*;

    pub mod __interfaces {
        use wayland_client::protocol::__interfaces::*;
        wayland_scanner::generate_interfaces!("./protocols/xdg-shell-unstable-v6.xml");
    }
    use self::__interfaces::*;

    wayland_scanner::generate_client_code!("./protocols/xdg-shell-unstable-v6.xml");
}
