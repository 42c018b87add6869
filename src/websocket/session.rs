//! WebSocket sessions.
//!
//! A session pairs the handler-facing [`WebSocketSession`] with an actor that
//! owns the connection's channels. The actor multiplexes shutdown, outbound
//! frames, keepalive ticks and inbound bytes with a `biased` `tokio::select!`
//! and answers control frames itself; only data frames reach the handler.
//!
//! The actor never waits on the handler while holding a decoded frame: a data
//! frame that does not fit the inbound queue is parked and reads pause until
//! the handler makes room, while outbound frames keep flowing. Writes race the
//! keepalive deadline so a peer that stops reading cannot wedge the actor.

use std::{
    future::Future,
    sync::{Arc, OnceLock},
    time::Duration,
};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::{
    sync::{mpsc, mpsc::error::TrySendError},
    time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{
    CloseCode,
    CloseReason,
    Frame,
    FrameError,
    FrameType,
    Serializer,
    WebSocketsConfig,
    codec::check_control,
    read_frame,
};
use crate::{
    call::{ApplicationCall, CallId},
    channel::{ChannelError, ReadChannel, WriteChannel},
    error::CallError,
    metrics::{self, Direction},
};

const READ_CHUNK: usize = 4096;
const WRITE_CHUNK: usize = 8192;

/// Handler-facing end of a WebSocket connection.
///
/// [`receive`](Self::receive) yields text and binary frames; pings, pongs and
/// the closing handshake are handled by the session. Dropping the session
/// closes the connection with `1000 Normal`.
pub struct WebSocketSession {
    call: Arc<ApplicationCall>,
    incoming: mpsc::Receiver<Frame>,
    outgoing: mpsc::Sender<Frame>,
    close_reason: Arc<OnceLock<CloseReason>>,
}

impl WebSocketSession {
    /// The call that was upgraded.
    #[must_use]
    pub fn call(&self) -> &Arc<ApplicationCall> { &self.call }

    /// Next data frame, or `None` once the connection is closing.
    pub async fn receive(&mut self) -> Option<Frame> { self.incoming.recv().await }

    /// Queue `frame` for sending.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidControlFrame`] for a fragmented or
    /// oversized control frame, and [`ChannelError::Closed`] once the
    /// connection has closed.
    pub async fn send(&self, frame: Frame) -> Result<(), CallError> {
        check_control(&frame)?;
        self.outgoing
            .send(frame)
            .await
            .map_err(|_| CallError::from(ChannelError::Closed))
    }

    /// Start the closing handshake with `reason`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the connection already closed.
    pub async fn close(&self, reason: CloseReason) -> Result<(), CallError> {
        self.send(Frame::close_with(&reason)).await
    }

    /// Sender for queueing frames from other tasks.
    ///
    /// The connection stays open while any clone is alive.
    #[must_use]
    pub fn outgoing(&self) -> mpsc::Sender<Frame> { self.outgoing.clone() }

    /// Reason the connection closed with, once known.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> { self.close_reason.get().cloned() }
}

impl std::fmt::Debug for WebSocketSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketSession")
            .field("call_id", &self.call.id())
            .field("close_reason", &self.close_reason.get())
            .finish_non_exhaustive()
    }
}

/// Input selected by [`SessionActor::next_event`].
enum Event {
    Shutdown,
    Outbound(Option<Frame>),
    PingTick,
    /// The handler made room for the parked frame, or went away (`false`).
    Capacity(bool),
    Inbound(Result<usize, ChannelError>),
}

enum Flow {
    Continue,
    Finish,
}

struct SessionActor {
    call_id: CallId,
    reader: Arc<dyn ReadChannel>,
    writer: Arc<dyn WriteChannel>,
    inbound: Option<mpsc::Sender<Frame>>,
    undelivered: Option<Frame>,
    outbound: mpsc::Receiver<Frame>,
    shutdown: CancellationToken,
    serializer: Serializer,
    read_buf: BytesMut,
    chunk: Box<[u8]>,
    write_buf: BytesMut,
    ping: Option<Interval>,
    pending_ping: Option<(Bytes, Instant)>,
    pings_sent: u64,
    timeout: Duration,
    max_frame_size: usize,
    close_reason: Arc<OnceLock<CloseReason>>,
}

async fn next_tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Resolves once `inbound` has room for one more frame.
async fn inbound_capacity(inbound: Option<&mpsc::Sender<Frame>>) -> bool {
    match inbound {
        Some(inbound) => inbound.reserve().await.is_ok(),
        None => false,
    }
}

/// Resolves when the keepalive deadline passes.
///
/// With a ping in flight the deadline is `timeout` after it was sent;
/// otherwise it is `timeout` after the next tick, which could not send a ping
/// while the caller is stuck writing.
async fn keepalive_expiry(ping: Option<&mut Interval>, ping_sent: Option<Instant>, timeout: Duration) {
    let started = match (ping_sent, ping) {
        (Some(sent_at), _) => sent_at,
        (None, Some(interval)) => interval.tick().await,
        (None, None) => std::future::pending().await,
    };
    sleep_until(started + timeout).await;
}

impl SessionActor {
    /// Wait for the next input. Shutdown wins over outbound frames, which win
    /// over keepalive, which wins over inbound progress. Reads pause while a
    /// frame is parked.
    async fn next_event(&mut self) -> Event {
        let ping = self.ping.as_mut();
        let parked = self.undelivered.is_some();
        tokio::select! {
            biased;

            () = self.shutdown.cancelled() => Event::Shutdown,
            frame = self.outbound.recv() => Event::Outbound(frame),
            () = next_tick(ping) => Event::PingTick,
            ready = inbound_capacity(self.inbound.as_ref()), if parked => Event::Capacity(ready),
            res = self.reader.read(&mut self.chunk), if !parked => Event::Inbound(res),
        }
    }

    async fn run(mut self) -> Result<(), CallError> {
        loop {
            let event = self.next_event().await;
            if let Flow::Finish = self.handle(event).await? {
                return Ok(());
            }
        }
    }

    async fn handle(&mut self, event: Event) -> Result<Flow, CallError> {
        match event {
            Event::Shutdown => {
                self.send_close(CloseReason::new(CloseCode::GoingAway, "server shutting down"))
                    .await?;
                Ok(Flow::Finish)
            }
            Event::Outbound(Some(frame)) => {
                let closing = frame.frame_type() == FrameType::Close;
                if closing && let Ok(Some(reason)) = frame.read_reason() {
                    let _ = self.close_reason.set(reason);
                }
                let flow = self.write_frame(frame).await?;
                Ok(if closing { Flow::Finish } else { flow })
            }
            Event::Outbound(None) => {
                self.send_close(CloseReason::new(CloseCode::Normal, "")).await?;
                Ok(Flow::Finish)
            }
            Event::PingTick => self.on_ping_tick().await,
            Event::Capacity(ready) => {
                match self.undelivered.take() {
                    Some(frame) if ready => self.deliver(frame),
                    _ => self.inbound = None,
                }
                self.drain_inbound().await
            }
            Event::Inbound(Ok(0)) => {
                debug!(call_id = %self.call_id, "peer closed the connection without a close frame");
                Ok(Flow::Finish)
            }
            Event::Inbound(Ok(n)) => {
                self.read_buf.extend_from_slice(&self.chunk[..n]);
                self.drain_inbound().await
            }
            Event::Inbound(Err(error)) => Err(error.into()),
        }
    }

    async fn drain_inbound(&mut self) -> Result<Flow, CallError> {
        loop {
            if self.undelivered.is_some() {
                return Ok(Flow::Continue);
            }
            let frame = match read_frame(&mut self.read_buf, self.max_frame_size) {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(Flow::Continue),
                Err(error) => return self.fail_protocol(error).await,
            };
            metrics::inc_frames(Direction::Inbound);
            trace!(call_id = %self.call_id, frame_type = ?frame.frame_type(), len = frame.payload().len(), "received frame");

            match frame.frame_type() {
                FrameType::Ping => {
                    if let Flow::Finish = self.write_frame(Frame::pong(frame.into_payload())).await? {
                        return Ok(Flow::Finish);
                    }
                }
                FrameType::Pong => {
                    if self
                        .pending_ping
                        .as_ref()
                        .is_some_and(|(payload, _)| payload == frame.payload())
                    {
                        self.pending_ping = None;
                    }
                }
                FrameType::Close => {
                    let reason = match frame.read_reason() {
                        Ok(reason) => reason,
                        Err(error) => return self.fail_protocol(error).await,
                    };
                    debug!(call_id = %self.call_id, reason = ?reason, "peer started closing handshake");
                    let echo = match &reason {
                        Some(reason) => Frame::close_with(reason),
                        None => Frame::close(),
                    };
                    if let Some(reason) = reason {
                        let _ = self.close_reason.set(reason);
                    }
                    self.write_frame(echo).await?;
                    return Ok(Flow::Finish);
                }
                FrameType::Text | FrameType::Binary => self.deliver(frame),
            }
        }
    }

    /// Hand `frame` to the handler, parking it if the queue is full. Frames
    /// for a handler that stopped receiving are dropped.
    fn deliver(&mut self, frame: Frame) {
        let Some(inbound) = &self.inbound else {
            return;
        };
        match inbound.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => self.undelivered = Some(frame),
            Err(TrySendError::Closed(_)) => self.inbound = None,
        }
    }

    async fn fail_protocol(&mut self, error: FrameError) -> Result<Flow, CallError> {
        metrics::inc_protocol_errors();
        warn!(call_id = %self.call_id, error = %error, "malformed websocket frame");
        self.send_close(CloseReason::new(CloseCode::ProtocolError, error.to_string()))
            .await?;
        Err(error.into())
    }

    async fn on_ping_tick(&mut self) -> Result<Flow, CallError> {
        if let Some((_, sent_at)) = &self.pending_ping {
            if sent_at.elapsed() < self.timeout {
                return Ok(Flow::Continue);
            }
            warn!(call_id = %self.call_id, timeout = ?self.timeout, "ping timed out");
            // The close frame is bounded by `timeout` alone.
            self.pending_ping = None;
            self.ping = None;
            let reason = CloseReason::new(CloseCode::InternalError, "Ping timeout");
            if timeout(self.timeout, self.send_close(reason)).await.is_err() {
                debug!(call_id = %self.call_id, "close frame not flushed before timeout");
            }
            self.writer.close();
            return Ok(Flow::Finish);
        }

        self.pings_sent += 1;
        let payload = Bytes::from(format!("[ping {}]", self.pings_sent));
        self.pending_ping = Some((payload.clone(), Instant::now()));
        self.write_frame(Frame::ping(payload)).await
    }

    async fn send_close(&mut self, reason: CloseReason) -> Result<Flow, CallError> {
        let frame = Frame::close_with(&reason);
        let _ = self.close_reason.set(reason);
        self.write_frame(frame).await
    }

    /// Serialize `frame` through the scratch buffer and write it out,
    /// flushing once no further frames are queued.
    ///
    /// Returns [`Flow::Finish`] if the keepalive deadline passed while the
    /// peer was not accepting bytes; the write channel is closed by then.
    async fn write_frame(&mut self, frame: Frame) -> Result<Flow, CallError> {
        metrics::inc_frames(Direction::Outbound);
        trace!(call_id = %self.call_id, frame_type = ?frame.frame_type(), len = frame.payload().len(), "sending frame");
        self.serializer.enqueue(frame);

        let Self {
            serializer,
            write_buf,
            writer,
            outbound,
            ping,
            pending_ping,
            timeout,
            ..
        } = self;
        let io = async {
            while serializer.has_outstanding() {
                write_buf.clear();
                serializer.serialize(&mut (&mut *write_buf).limit(WRITE_CHUNK));
                let mut bytes = &write_buf[..];
                writer.write(&mut bytes).await?;
            }
            if outbound.is_empty() {
                writer.flush().await?;
            }
            Ok::<(), ChannelError>(())
        };
        let ping_sent = pending_ping.as_ref().map(|(_, sent_at)| *sent_at);
        let expired = tokio::select! {
            biased;

            res = io => {
                res?;
                false
            }
            () = keepalive_expiry(ping.as_mut(), ping_sent, *timeout) => true,
        };
        if !expired {
            return Ok(Flow::Continue);
        }

        warn!(call_id = %self.call_id, timeout = ?self.timeout, "peer stopped reading; keepalive expired");
        let _ = self
            .close_reason
            .set(CloseReason::new(CloseCode::InternalError, "Ping timeout"));
        self.writer.close();
        Ok(Flow::Finish)
    }
}

/// Run a session for `call` until both the handler and the connection finish.
pub(crate) async fn run_session<H, Fut>(
    call: Arc<ApplicationCall>,
    config: &WebSocketsConfig,
    shutdown: CancellationToken,
    handler: H,
) -> Result<(), CallError>
where
    H: FnOnce(WebSocketSession) -> Fut,
    Fut: Future<Output = Result<(), CallError>>,
{
    let (inbound_tx, inbound_rx) = mpsc::channel(config.channel_capacity.max(1));
    let (outbound_tx, outbound_rx) = mpsc::channel(config.channel_capacity.max(1));
    let close_reason = Arc::new(OnceLock::new());

    let ping = config
        .ping_interval
        .filter(|period| !period.is_zero())
        .map(|period| {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

    let actor = SessionActor {
        call_id: call.id(),
        reader: call.request_channel(),
        writer: call.response_channel(),
        inbound: Some(inbound_tx),
        undelivered: None,
        outbound: outbound_rx,
        shutdown,
        serializer: Serializer::new(),
        read_buf: BytesMut::new(),
        chunk: vec![0; READ_CHUNK].into_boxed_slice(),
        write_buf: BytesMut::with_capacity(WRITE_CHUNK),
        ping,
        pending_ping: None,
        pings_sent: 0,
        timeout: config.timeout,
        max_frame_size: config.max_frame_size,
        close_reason: Arc::clone(&close_reason),
    };
    let session = WebSocketSession {
        call: Arc::clone(&call),
        incoming: inbound_rx,
        outgoing: outbound_tx,
        close_reason: Arc::clone(&close_reason),
    };

    let (handler_result, actor_result) = tokio::join!(handler(session), actor.run());
    debug!(call_id = %call.id(), close_reason = ?close_reason.get(), "websocket session finished");
    actor_result?;
    handler_result
}
