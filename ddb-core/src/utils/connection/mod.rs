//! Module Exports
//!
//! This file exports the modules that make up the drive channel.
//!
//! # Modules
//! - `channel`: outbound routing (send-to-one / broadcast) and client ids.
//! - `heartbeat`: periodic status broadcast.
//! - `messages`: JSON command decoding and reply encoding.
//! - `server`: Manages the WebSocket server and connection handling.

pub mod channel;
pub mod heartbeat;
pub mod messages;
/// Module for managing the WebSocket server and connection handling.
pub mod server;
