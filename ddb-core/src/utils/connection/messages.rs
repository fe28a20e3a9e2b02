//! JSON wire format for the drive channel.
//!
//! Inbound frames are objects with an optional `cmd` string and per-command
//! fields. Fields are read leniently: unknown ones are ignored and a field of
//! the wrong type reads as if it were absent.

use alloc::string::String;

use serde::Serialize;
use serde_json::Value;

/// Error code sent back for undecodable frames.
pub const BAD_JSON: &str = "bad_json";

/// A decoded inbound command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Set wheel velocities, normalized to `[-1, 1]`.
    Drive { left: f32, right: f32 },
    /// Engage (`true`) or release the emergency stop.
    Estop { on: bool },
    /// Release the latch and zero the command.
    Reset,
    /// `ping` or `hello`: status query, no state change.
    Ping,
    /// Any other or missing `cmd`: acknowledged without effect.
    Unknown,
}

fn command_from(doc: &Value) -> Command {
    let number = |key: &str| doc.get(key).and_then(Value::as_f64).unwrap_or(0.0) as f32;
    match doc.get("cmd").and_then(Value::as_str).unwrap_or("") {
        "drive" => Command::Drive {
            left: number("L"),
            right: number("R"),
        },
        "estop" => Command::Estop {
            on: doc.get("on").and_then(Value::as_bool).unwrap_or(true),
        },
        "reset" => Command::Reset,
        "ping" | "hello" => Command::Ping,
        _ => Command::Unknown,
    }
}

/// Decode one inbound frame.
///
/// Only a body that is not valid JSON is an error. A missing or wrongly typed
/// field falls back to its default, and a document that is not an object
/// carries no `cmd` at all.
pub fn decode(payload: &[u8]) -> Result<Command, serde_json::Error> {
    let doc: Value = serde_json::from_slice(payload)?;
    Ok(command_from(&doc))
}

/// Status reply, sent for every processed command and as heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Status {
    pub ok: bool,
    pub ts: u64,
    #[serde(rename = "L")]
    pub left: f32,
    #[serde(rename = "R")]
    pub right: f32,
    pub estop: bool,
}

/// Greeting sent once when a client connects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hello {
    pub ok: bool,
    pub hello: bool,
    pub ts: u64,
    pub estop: bool,
}

/// Rejection sent for undecodable frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rejection {
    pub ok: bool,
    pub err: &'static str,
}

/// Any outbound message body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Status(Status),
    Hello(Hello),
    Rejection(Rejection),
}

impl Reply {
    pub fn hello(
        ts: u64,
        estop: bool,
    ) -> Self {
        Reply::Hello(Hello {
            ok: true,
            hello: true,
            ts,
            estop,
        })
    }

    pub fn bad_json() -> Self {
        Reply::Rejection(Rejection {
            ok: false,
            err: BAD_JSON,
        })
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
