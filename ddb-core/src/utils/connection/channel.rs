//! Outbound message routing.
//!
//! The drive controller only knows how to "send to one client" and
//! "broadcast to everyone". `MessageChannel` captures that; the WebSocket
//! server implements it on top of a pub/sub channel that every open
//! connection subscribes to and filters by target.

use alloc::string::String;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    pubsub::{PubSubChannel, Subscriber},
};

/// Maximum number of simultaneously connected clients.
pub const MAX_CLIENTS: usize = 4;
/// Outbound messages buffered per subscriber before the oldest is dropped.
pub const OUTBOUND_DEPTH: usize = 8;

/// Identity of one WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u32);

static NEXT_CLIENT: AtomicU32 = AtomicU32::new(1);

impl ClientId {
    /// Hand out a fresh id for a new connection.
    pub fn next() -> Self {
        ClientId(NEXT_CLIENT.fetch_add(1, Ordering::Relaxed))
    }
}

impl core::fmt::Display for ClientId {
    fn fmt(
        &self,
        f: &mut core::fmt::Formatter<'_>,
    ) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Send-side capabilities the controller needs from a transport.
pub trait MessageChannel {
    /// Queue `body` for a single client.
    fn send_to(
        &mut self,
        client: ClientId,
        body: &str,
    );

    /// Queue `body` for every connected client.
    fn broadcast(
        &mut self,
        body: &str,
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Client(ClientId),
    All,
}

/// One queued text frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub target: Target,
    pub body: String,
}

impl Outbound {
    /// Whether `client` should receive this frame.
    pub fn is_for(
        &self,
        client: ClientId,
    ) -> bool {
        match self.target {
            Target::All => true,
            Target::Client(id) => id == client,
        }
    }
}

pub type OutboundChannel =
    PubSubChannel<CriticalSectionRawMutex, Outbound, OUTBOUND_DEPTH, MAX_CLIENTS, 1>;

pub type OutboundSubscriber<'a> =
    Subscriber<'a, CriticalSectionRawMutex, Outbound, OUTBOUND_DEPTH, MAX_CLIENTS, 1>;

/// Frames waiting to be written by the connection tasks.
pub static OUTBOUND: OutboundChannel = PubSubChannel::new();

/// `MessageChannel` backed by an `OutboundChannel`.
///
/// Publishing never waits: when a subscriber falls behind, its oldest
/// pending frame is dropped.
pub struct PubSubTransport<'a> {
    channel: &'a OutboundChannel,
}

impl<'a> PubSubTransport<'a> {
    pub fn new(channel: &'a OutboundChannel) -> Self {
        Self { channel }
    }

    fn publish(
        &self,
        target: Target,
        body: &str,
    ) {
        self.channel.immediate_publisher().publish_immediate(Outbound {
            target,
            body: String::from(body),
        });
    }
}

impl MessageChannel for PubSubTransport<'_> {
    fn send_to(
        &mut self,
        client: ClientId,
        body: &str,
    ) {
        self.publish(Target::Client(client), body);
    }

    fn broadcast(
        &mut self,
        body: &str,
    ) {
        self.publish(Target::All, body);
    }
}
