//! The STOMP client: a protocol state machine layered over a [`Transport`],
//! owned by its own driver task so that user callbacks never run on the
//! same poll turn as the frame-receive loop.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::frame::{Command, Frame, FrameBuilder, HeaderName};
use crate::strand::Strand;
use crate::transport::Transport;

/// Opaque identifier for one subscription, unique within a client instance.
pub type SubscriptionId = String;

/// Where a [`StompClient`] instance currently sits in the connection
/// lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    WsConnecting,
    WsConnected,
    StompConnecting,
    StompConnected,
    Closing,
    Closed,
}

/// Outcome surfaced to a user callback. Never thrown as an error — always
/// delivered as a callback argument.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClientResult {
    Ok,
    ErrorConnectingWebSocket,
    ErrorConnectingStomp,
    WebSocketServerDisconnected,
    CouldNotSendSubscribeFrame,
    CouldNotCloseWebSocketConnection,
    ErrorNotConnected,
    UndefinedError,
}

type OnConnected = Box<dyn FnOnce(ClientResult) + Send>;
type OnDisconnected = Box<dyn FnOnce(ClientResult) + Send>;
type OnSubscribed = Box<dyn FnOnce(ClientResult, SubscriptionId) + Send>;
// `on_message` may fire many times over the life of a subscription and is
// always dispatched through the strand, so it is shared via `Arc` rather
// than taken by value like the once-only callbacks above.
type OnMessage = Arc<dyn Fn(ClientResult, Vec<u8>) + Send + Sync>;
type OnClosed = Box<dyn FnOnce(ClientResult) + Send>;

struct Subscription {
    destination: String,
    confirmed: bool,
    on_subscribed: Option<OnSubscribed>,
    on_message: OnMessage,
}

enum DriverCommand {
    Subscribe {
        destination: String,
        sid: SubscriptionId,
        on_subscribed: OnSubscribed,
        on_message: OnMessage,
    },
    Close {
        on_closed: OnClosed,
    },
}

/// A handle to a running STOMP client.
///
/// Cloning is not supported: one handle drives one driver task. `subscribe`
/// and `close` enqueue work onto that task and return immediately; every
/// outcome arrives later through the callback that was supplied.
pub struct StompClient {
    cmd_tx: mpsc::UnboundedSender<DriverCommand>,
}

impl StompClient {
    /// Starts connecting over `transport` and returns immediately.
    ///
    /// `on_connected` fires at most once, with `Ok` once the server's
    /// `CONNECTED` frame arrives, or an error result if the transport or the
    /// handshake fails. `on_disconnected` fires at most once if the link is
    /// lost after connecting (including a server-side authentication
    /// failure, which drops the transport without ever sending
    /// `CONNECTED`).
    pub fn connect<T>(
        transport: T,
        username: impl Into<String>,
        password: impl Into<String>,
        on_connected: impl FnOnce(ClientResult) + Send + 'static,
        on_disconnected: impl FnOnce(ClientResult) + Send + 'static,
    ) -> StompClient
    where
        T: Transport + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let driver = Driver {
            transport,
            state: ClientState::Idle,
            subscriptions: HashMap::new(),
            strand: Arc::new(Strand::new()),
            cmd_rx,
            username: username.into(),
            password: password.into(),
            on_connected: Some(Box::new(on_connected)),
            on_disconnected: Some(Box::new(on_disconnected)),
        };
        tokio::spawn(driver.run());
        StompClient { cmd_tx }
    }

    /// Subscribes to `destination`. Returns the freshly generated
    /// [`SubscriptionId`] immediately; `on_subscribed` fires at most once
    /// once the server's matching `RECEIPT` arrives (or sooner, with
    /// `CouldNotSendSubscribeFrame`, if the `SUBSCRIBE` frame could not be
    /// sent at all). `on_message` fires for every subsequent `MESSAGE` frame
    /// for this subscription, and may fire many times.
    pub fn subscribe(
        &self,
        destination: impl Into<String>,
        on_subscribed: impl FnOnce(ClientResult, SubscriptionId) + Send + 'static,
        on_message: impl Fn(ClientResult, Vec<u8>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let sid = Uuid::new_v4().to_string();
        let _ = self.cmd_tx.send(DriverCommand::Subscribe {
            destination: destination.into(),
            sid: sid.clone(),
            on_subscribed: Box::new(on_subscribed),
            on_message: Arc::new(on_message),
        });
        sid
    }

    /// Initiates a graceful close. `on_closed` fires at most once: with
    /// `ErrorNotConnected` immediately if the client was never connected,
    /// otherwise with the transport's close outcome.
    pub fn close(&self, on_closed: impl FnOnce(ClientResult) + Send + 'static) {
        let _ = self.cmd_tx.send(DriverCommand::Close {
            on_closed: Box::new(on_closed),
        });
    }
}

struct Driver<T> {
    transport: T,
    state: ClientState,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    strand: Arc<Strand>,
    cmd_rx: mpsc::UnboundedReceiver<DriverCommand>,
    username: String,
    password: String,
    on_connected: Option<OnConnected>,
    on_disconnected: Option<OnDisconnected>,
}

impl<T: Transport> Driver<T> {
    async fn run(mut self) {
        self.state = ClientState::WsConnecting;
        if let Err(e) = self.transport.connect().await {
            warn!(error = %e, "transport connect failed");
            self.state = ClientState::Closed;
            self.fire_on_connected(ClientResult::ErrorConnectingWebSocket);
        } else {
            self.state = ClientState::WsConnected;
            debug!("transport connected, starting STOMP handshake");

            self.state = ClientState::StompConnecting;
            let connect_frame = FrameBuilder::new(Command::Connect)
                .header(HeaderName::AcceptVersion, "1.2")
                .header(HeaderName::Host, self.transport.server_url().to_string())
                .header(HeaderName::Login, self.username.clone())
                .header(HeaderName::Passcode, self.password.clone())
                .build();

            if let Err(e) = self.transport.send(connect_frame).await {
                warn!(error = %e, "failed to send CONNECT frame");
                self.state = ClientState::Closed;
                self.fire_on_connected(ClientResult::ErrorConnectingStomp);
            }
        }

        // Even if the handshake above failed and left `state == Closed`, the
        // loop stays up: a `close()` (or `subscribe()`) issued right after a
        // failed `connect()` still must get its mandated callback, and the
        // `recv` branch's guard keeps a dead transport from being polled.
        loop {
            tokio::select! {
                incoming = self.transport.recv(), if self.state != ClientState::Closed => {
                    match incoming {
                        Some(Ok(bytes)) => self.handle_incoming(bytes),
                        Some(Err(e)) => {
                            warn!(error = %e, "transport read failed");
                            self.on_link_lost();
                        }
                        None => {
                            debug!("transport link closed");
                            self.on_link_lost();
                        }
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(DriverCommand::Subscribe { destination, sid, on_subscribed, on_message }) => {
                            self.handle_subscribe(destination, sid, on_subscribed, on_message).await;
                        }
                        Some(DriverCommand::Close { on_closed }) => {
                            self.handle_close(on_closed).await;
                        }
                        // The handle (and every clone of its sender) has been
                        // dropped; no further commands can ever arrive.
                        None => break,
                    }
                }
            }
        }
    }

    fn fire_on_connected(&mut self, result: ClientResult) {
        if let Some(cb) = self.on_connected.take() {
            self.strand.post(move || cb(result));
        }
    }

    fn fire_on_disconnected(&mut self, result: ClientResult) {
        if let Some(cb) = self.on_disconnected.take() {
            self.strand.post(move || cb(result));
        }
    }

    fn on_link_lost(&mut self) {
        if self.state == ClientState::Closed {
            return;
        }
        self.state = ClientState::Closed;
        self.fire_on_disconnected(ClientResult::WebSocketServerDisconnected);
    }

    fn handle_incoming(&mut self, bytes: Bytes) {
        let frame = Frame::parse(bytes);
        if frame.parse_status() != crate::frame::ParseError::Ok {
            warn!(status = ?frame.parse_status(), "dropping unparseable frame");
            return;
        }

        match frame.command() {
            Command::Connected => self.handle_connected(),
            Command::Receipt => self.handle_receipt(&frame),
            Command::Message => self.handle_message(&frame),
            Command::Error => {
                error!(
                    message = %String::from_utf8_lossy(frame.header_value(HeaderName::Message)),
                    "server sent ERROR frame"
                );
            }
            other => {
                warn!(command = ?other, "dropping unexpected frame");
            }
        }
    }

    fn handle_connected(&mut self) {
        if self.state != ClientState::StompConnecting {
            warn!(state = ?self.state, "dropping unexpected CONNECTED frame");
            return;
        }
        self.state = ClientState::StompConnected;
        self.fire_on_connected(ClientResult::Ok);
    }

    fn handle_receipt(&mut self, frame: &Frame) {
        let receipt_id = frame.header_value(HeaderName::ReceiptId);
        let sid = match std::str::from_utf8(receipt_id) {
            Ok(s) => s,
            Err(_) => {
                warn!("dropping RECEIPT frame with non-utf8 receipt-id");
                return;
            }
        };
        let Some(sub) = self.subscriptions.get_mut(sid) else {
            warn!(receipt_id = sid, "dropping RECEIPT frame with no matching subscription");
            return;
        };
        sub.confirmed = true;
        if let Some(cb) = sub.on_subscribed.take() {
            let sid = sid.to_string();
            self.strand.post(move || cb(ClientResult::Ok, sid));
        }
    }

    fn handle_message(&mut self, frame: &Frame) {
        let subscription_id = frame.header_value(HeaderName::Subscription);
        let sid = match std::str::from_utf8(subscription_id) {
            Ok(s) => s,
            Err(_) => {
                warn!("dropping MESSAGE frame with non-utf8 subscription header");
                return;
            }
        };
        let Some(sub) = self.subscriptions.get(sid) else {
            warn!(subscription = sid, "dropping MESSAGE frame for unknown subscription");
            return;
        };
        if !sub.confirmed {
            warn!(subscription = sid, "dropping MESSAGE frame for unconfirmed subscription");
            return;
        }
        let destination = frame.header_value(HeaderName::Destination);
        if destination != sub.destination.as_bytes() {
            warn!(subscription = sid, "dropping MESSAGE frame with mismatched destination");
            return;
        }
        let body = frame.body().to_vec();
        let cb = Arc::clone(&sub.on_message);
        self.strand.post(move || cb(ClientResult::Ok, body));
    }

    async fn handle_subscribe(
        &mut self,
        destination: String,
        sid: SubscriptionId,
        on_subscribed: OnSubscribed,
        on_message: OnMessage,
    ) {
        let frame = FrameBuilder::new(Command::Subscribe)
            .header(HeaderName::Destination, destination.clone())
            .header(HeaderName::Id, sid.clone())
            .header(HeaderName::Ack, "auto")
            .header(HeaderName::Receipt, sid.clone())
            .build();

        match self.transport.send(frame).await {
            Ok(()) => {
                self.subscriptions.insert(
                    sid,
                    Subscription {
                        destination,
                        confirmed: false,
                        on_subscribed: Some(on_subscribed),
                        on_message,
                    },
                );
            }
            Err(e) => {
                warn!(error = %e, "failed to send SUBSCRIBE frame");
                self.strand
                    .post(move || on_subscribed(ClientResult::CouldNotSendSubscribeFrame, String::new()));
            }
        }
    }

    async fn handle_close(&mut self, on_closed: OnClosed) {
        if self.state != ClientState::StompConnected {
            self.strand
                .post(move || on_closed(ClientResult::ErrorNotConnected));
            return;
        }

        self.state = ClientState::Closing;
        let result = match self.transport.close().await {
            Ok(()) => ClientResult::Ok,
            Err(e) => {
                warn!(error = %e, "transport close failed");
                ClientResult::CouldNotCloseWebSocketConnection
            }
        };
        self.state = ClientState::Closed;
        self.strand.post(move || on_closed(result));
    }
}
