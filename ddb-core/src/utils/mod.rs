//! Utility re-exports and helper macros for the Diff-Drive Bot.
//!
//! - `config`: pin map, PWM settings and network defaults
//! - `connection`: WebSocket server, message codec and heartbeat
//! - `controllers`: motor actuation, soft-start, safety interlock and the
//!   command processor tying them together
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts.

pub mod config;
pub mod connection;
pub mod controllers;

pub use config::DriveConfig;
pub use connection::heartbeat::run as heartbeat;
pub use connection::server::run as wss;
pub use controllers::{DriveController, SharedController};
pub use embassy_time::*;
#[doc(hidden)]
pub use static_cell::StaticCell;

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: $crate::utils::StaticCell<$t> = $crate::utils::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}
