//! WebSocket Server Module
//!
//! Serves the drive channel using the `picoserve` framework. Every connection
//! gets a client id and a subscription to the outbound channel; inbound text
//! frames are handed to the shared `DriveController`, and anything the
//! controller queues for this client (replies, heartbeats) is written back.
//!
//! Reading and writing run as two futures joined for the lifetime of the
//! connection. A frame read is never abandoned halfway: picoserve reads header,
//! mask and payload with separate calls, so a dropped read would desync the
//! stream.

use alloc::vec::Vec;

use embassy_futures::{
    join::join,
    select::{select, select3, Either, Either3},
};
use embassy_net::Stack;
use embassy_sync::{blocking_mutex::raw::NoopRawMutex, signal::Signal};
use embassy_time::{Duration, Instant};
use embedded_hal::{delay::DelayNs, digital::OutputPin, pwm::SetDutyCycle};
use picoserve::{
    io::embedded_io_async as embedded_aio,
    response::ws::{
        Message, ReadFrameError, ReadMessageError, SocketRx, SocketTx, WebSocketCallback,
        WebSocketUpgrade,
    },
    Router,
};

use crate::utils::{
    connection::channel::{ClientId, OutboundChannel, OutboundSubscriber, PubSubTransport},
    controllers::SharedController,
};

/// Largest inbound frame accepted.
const FRAME_BUFFER: usize = 1024;

/// Close code for frames larger than `FRAME_BUFFER`.
const CLOSE_TOO_BIG: u16 = 1009;

type CloseReason = Option<(u16, &'static str)>;

fn now_ms() -> u64 {
    Instant::now().as_millis()
}

/// Read half of a WebSocket connection.
pub(crate) trait FrameSource {
    type Error: core::fmt::Debug;

    async fn read_message<'a>(
        &mut self,
        buffer: &'a mut [u8],
    ) -> Result<Message<'a>, ReadMessageError<Self::Error>>;
}

impl<R: embedded_aio::Read> FrameSource for SocketRx<R> {
    type Error = R::Error;

    async fn read_message<'a>(
        &mut self,
        buffer: &'a mut [u8],
    ) -> Result<Message<'a>, ReadMessageError<R::Error>> {
        self.next_message(buffer).await
    }
}

/// Write half of a WebSocket connection.
pub(crate) trait FrameSink {
    type Error;

    async fn send_text(
        &mut self,
        body: &str,
    ) -> Result<(), Self::Error>;

    async fn send_pong(
        &mut self,
        data: &[u8],
    ) -> Result<(), Self::Error>;
}

impl<W: embedded_aio::Write> FrameSink for SocketTx<W> {
    type Error = W::Error;

    async fn send_text(
        &mut self,
        body: &str,
    ) -> Result<(), W::Error> {
        SocketTx::send_text(self, body).await
    }

    async fn send_pong(
        &mut self,
        data: &[u8],
    ) -> Result<(), W::Error> {
        SocketTx::send_pong(self, data).await
    }
}

/// What the read side does with decoded frames.
pub(crate) trait FrameHandler {
    /// A complete text or binary payload from `client`.
    async fn on_frame(
        &self,
        client: ClientId,
        payload: &[u8],
    );

    /// `client` sent a frame that does not fit the receive buffer.
    async fn on_oversized(
        &self,
        client: ClientId,
    );
}

enum ReadFailure<E> {
    Oversized,
    Close(u16),
    Io(E),
}

fn classify<E>(error: ReadMessageError<E>) -> ReadFailure<E> {
    match error {
        ReadMessageError::ReadFrameError(
            ReadFrameError::OutOfSpace | ReadFrameError::MessageIsTooLong(_),
        ) => ReadFailure::Oversized,
        ReadMessageError::Io(err) | ReadMessageError::ReadFrameError(ReadFrameError::Io(err)) => {
            ReadFailure::Io(err)
        }
        ReadMessageError::TextIsNotUtf8 => ReadFailure::Close(1007),
        ReadMessageError::ReservedOpcode(_) => ReadFailure::Close(1003),
        ReadMessageError::ReadFrameError(ReadFrameError::UnexpectedEof)
        | ReadMessageError::UnexpectedMessageStart
        | ReadMessageError::MessageStartsWithContinuation => ReadFailure::Close(1002),
    }
}

async fn read_frames<S, H>(
    client: ClientId,
    handler: &H,
    source: &mut S,
    pong: &Signal<NoopRawMutex, Vec<u8>>,
) -> Result<CloseReason, S::Error>
where
    S: FrameSource,
    H: FrameHandler,
{
    let mut buffer = [0; FRAME_BUFFER];

    loop {
        match source.read_message(&mut buffer).await {
            Ok(Message::Text(data)) => handler.on_frame(client, data.as_bytes()).await,
            Ok(Message::Binary(data)) => handler.on_frame(client, data).await,
            Ok(Message::Ping(data)) => pong.signal(data.to_vec()),
            Ok(Message::Pong(_)) => {}
            Ok(Message::Close(reason)) => {
                tracing::info!(%client, ?reason, "websocket closed");
                return Ok(None);
            }
            Err(error) => {
                tracing::error!(%client, ?error, "websocket error");
                return match classify(error) {
                    ReadFailure::Oversized => {
                        handler.on_oversized(client).await;
                        Ok(Some((CLOSE_TOO_BIG, "Message Too Big")))
                    }
                    ReadFailure::Close(code) => Ok(Some((code, "Websocket Error"))),
                    ReadFailure::Io(err) => Err(err),
                };
            }
        }
    }
}

async fn write_frames<K: FrameSink>(
    client: ClientId,
    sink: &mut K,
    outbox: &mut OutboundSubscriber<'_>,
    pong: &Signal<NoopRawMutex, Vec<u8>>,
    stop: &Signal<NoopRawMutex, ()>,
) -> Result<(), K::Error> {
    loop {
        match select3(outbox.next_message_pure(), pong.wait(), stop.wait()).await {
            Either3::First(frame) => {
                if frame.is_for(client) {
                    sink.send_text(&frame.body).await?;
                }
            }
            Either3::Second(data) => sink.send_pong(&data).await?,
            Either3::Third(()) => break,
        }
    }

    // Whatever the read side queued last (a rejection) still goes out.
    while let Some(frame) = outbox.try_next_message_pure() {
        if frame.is_for(client) {
            sink.send_text(&frame.body).await?;
        }
    }
    Ok(())
}

/// Run one connection until the peer closes it or the socket fails.
async fn pump<S, K, H>(
    client: ClientId,
    handler: &H,
    source: &mut S,
    sink: &mut K,
    outbox: &mut OutboundSubscriber<'_>,
) -> Result<CloseReason, S::Error>
where
    S: FrameSource,
    K: FrameSink<Error = S::Error>,
    H: FrameHandler,
{
    let pong = Signal::<NoopRawMutex, Vec<u8>>::new();
    let stop = Signal::<NoopRawMutex, ()>::new();
    let writer_failed = Signal::<NoopRawMutex, ()>::new();

    let reading = async {
        // Only a dead writer may interrupt a read; the socket is gone then.
        let result = match select(
            read_frames(client, handler, &mut *source, &pong),
            writer_failed.wait(),
        )
        .await
        {
            Either::First(result) => result,
            Either::Second(()) => Ok(None),
        };
        stop.signal(());
        result
    };

    let writing = async {
        let result = write_frames(client, &mut *sink, &mut *outbox, &pong, &stop).await;
        if result.is_err() {
            writer_failed.signal(());
        }
        result
    };

    let (read_result, write_result) = join(reading, writing).await;
    write_result?;
    read_result
}

/// Connection handler for one drive client.
pub struct DriveSocket<Dir: 'static, Pwm: 'static, D: 'static> {
    controller: &'static SharedController<Dir, Pwm, D>,
    outbound: &'static OutboundChannel,
}

impl<Dir: 'static, Pwm: 'static, D: 'static> DriveSocket<Dir, Pwm, D> {
    pub fn new(
        controller: &'static SharedController<Dir, Pwm, D>,
        outbound: &'static OutboundChannel,
    ) -> Self {
        Self {
            controller,
            outbound,
        }
    }
}

impl<Dir, Pwm, D> FrameHandler for DriveSocket<Dir, Pwm, D>
where
    Dir: OutputPin + 'static,
    Pwm: SetDutyCycle + 'static,
    D: DelayNs + 'static,
{
    async fn on_frame(
        &self,
        client: ClientId,
        payload: &[u8],
    ) {
        let mut transport = PubSubTransport::new(self.outbound);
        self.controller
            .lock()
            .await
            .on_message(client, payload, now_ms(), &mut transport);
    }

    async fn on_oversized(
        &self,
        client: ClientId,
    ) {
        tracing::warn!(%client, limit = FRAME_BUFFER, "frame too large");
        let mut transport = PubSubTransport::new(self.outbound);
        self.controller
            .lock()
            .await
            .on_oversized(client, &mut transport);
    }
}

/// Handles incoming WebSocket connections.
impl<Dir, Pwm, D> WebSocketCallback for DriveSocket<Dir, Pwm, D>
where
    Dir: OutputPin + 'static,
    Pwm: SetDutyCycle + 'static,
    D: DelayNs + 'static,
{
    async fn run<Reader, Writer>(
        self,
        mut rx: SocketRx<Reader>,
        mut tx: SocketTx<Writer>,
    ) -> Result<(), Writer::Error>
    where
        Reader: embedded_aio::Read,
        Writer: embedded_aio::Write<Error = Reader::Error>,
    {
        let client = ClientId::next();

        // Subscribe before greeting so the hello is not missed.
        let mut outbox = match self.outbound.subscriber() {
            Ok(sub) => sub,
            Err(_) => {
                tracing::warn!(%client, "too many clients, refusing connection");
                return tx.close(Some((1013, "Try Again Later"))).await;
            }
        };

        {
            let mut transport = PubSubTransport::new(self.outbound);
            self.controller
                .lock()
                .await
                .on_connect(client, now_ms(), &mut transport);
        }

        let close_reason = pump(client, &self, &mut rx, &mut tx, &mut outbox).await?;

        tracing::info!(%client, "client disconnected");
        tx.close(close_reason).await
    }
}

/// Serve the drive channel on `port` forever.
///
/// Run one instance per concurrent connection, each with its own `id`.
pub async fn run<Dir, Pwm, D>(
    id: usize,
    port: u16,
    stack: Stack<'static>,
    config: Option<&'static picoserve::Config<Duration>>,
    controller: &'static SharedController<Dir, Pwm, D>,
    outbound: &'static OutboundChannel,
) -> !
where
    Dir: OutputPin + 'static,
    Pwm: SetDutyCycle + 'static,
    D: DelayNs + 'static,
{
    let default_config = picoserve::Config::new(picoserve::Timeouts {
        start_read_request: Some(Duration::from_secs(5)),
        persistent_start_read_request: None,
        read_request: Some(Duration::from_secs(1)),
        write: Some(Duration::from_secs(5)),
    });

    let config = config.unwrap_or(&default_config);

    // Controller UIs connect to the bare host, some builds use /ws.
    let upgrade = move |upgrade: WebSocketUpgrade| async move {
        upgrade.on_upgrade(DriveSocket::new(controller, outbound))
    };

    let router = Router::new()
        .route("/", picoserve::routing::get(upgrade))
        .route("/ws", picoserve::routing::get(upgrade));

    if let Some(ip_cfg) = stack.config_v4() {
        tracing::info!("Starting drive server at {}:{}", ip_cfg.address, port);
    } else {
        tracing::warn!(
            "Starting drive server on port {port}, but no IPv4 address is assigned yet!"
        );
    }

    let (mut rx_buffer, mut tx_buffer, mut http_buffer) = ([0; 1024], [0; 1024], [0; 4096]);

    picoserve::listen_and_serve_with_state(
        id,
        &router,
        config,
        stack,
        port,
        &mut rx_buffer,
        &mut tx_buffer,
        &mut http_buffer,
        &(),
    )
    .await
}
