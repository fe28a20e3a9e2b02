//! Core drive control for the Diff-Drive Bot on no-std embedded platforms.
//!
//! A WebSocket command channel sets left/right wheel velocities which are
//! turned into PH/EN signals for two brushed-motor drivers, guarded by an
//! emergency-stop latch and a soft-start ramp.
//!
//! For a runnable host build, see `ddb-app/mock-mcu`.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod utils;
