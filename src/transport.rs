//! The abstract collaborator the STOMP client rides on: an async,
//! message-oriented channel. Concrete transports (WebSocket-over-TLS, a
//! scripted mock) implement [`Transport`]; the client itself never assumes
//! anything about framing below "one `recv` yields one complete message".

use bytes::Bytes;

/// An async message-oriented transport.
///
/// A `Transport` delivers whole messages, not a byte stream: the STOMP
/// client hands it complete outbound frames and expects complete inbound
/// frames back out of `recv`. A concrete implementation backed by a
/// WebSocket would yield one `recv` per text frame; this crate does not ship
/// one.
#[async_trait::async_trait]
pub trait Transport: Send {
    /// The error type returned by this transport's fallible operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Establish the connection. Resolves exactly once, success or failure.
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Wait for the next complete inbound message.
    ///
    /// Returns `Some(Ok(bytes))` for one received message, `Some(Err(_))`
    /// for a transport-level read failure, and `None` once the peer has
    /// closed or the link has dropped after a successful connect.
    async fn recv(&mut self) -> Option<Result<Bytes, Self::Error>>;

    /// Send one complete outbound message.
    ///
    /// Sending while not connected must fail.
    async fn send(&mut self, bytes: Bytes) -> Result<(), Self::Error>;

    /// Initiate a graceful close. Closing while not connected must fail.
    async fn close(&mut self) -> Result<(), Self::Error>;

    /// The host string used to populate the STOMP `host` header.
    fn server_url(&self) -> &str;
}

/// A scripted, in-memory [`Transport`] for tests.
///
/// Feeds a fixed sequence of inbound messages (or failures) to the client
/// and records every outbound message the client sends, so a test can
/// assert on both directions without a real network.
#[cfg(feature = "test-util")]
pub mod mock {
    use super::Transport;
    use crate::frame::{Command, Frame, FrameBuilder, HeaderName};
    use bytes::Bytes;
    use thiserror::Error;
    use tokio::sync::mpsc;

    #[derive(Debug, Error)]
    pub enum MockTransportError {
        #[error("mock transport: connect() was scripted to fail")]
        ConnectFailed,
        #[error("mock transport: send() was scripted to fail")]
        SendFailed,
        #[error("mock transport: close() was scripted to fail")]
        CloseFailed,
        #[error("mock transport: operation attempted before connect()")]
        NotConnected,
    }

    /// One step of a [`MockTransport`]'s inbound script.
    pub enum Scripted {
        /// Deliver this message to the client as if the peer sent it.
        Message(Bytes),
        /// Simulate a transport-level read failure.
        Err,
        /// Simulate the peer closing the link (ends the `recv` stream).
        Eof,
    }

    /// A transport whose behavior is fully determined up front: it connects
    /// (or fails to) as scripted, replays a queue of inbound events, and
    /// records every outbound `send`.
    ///
    /// Inbound events are delivered through an internal channel rather than
    /// a plain queue, so `recv` pends when the script has nothing left to
    /// say instead of reporting an immediate disconnect — the same way a
    /// real, still-open connection behaves when nothing has arrived yet.
    pub struct MockTransport {
        server_url: String,
        connect_fails: bool,
        send_fails: bool,
        close_fails: bool,
        auto_receipt: bool,
        connected: bool,
        inbound_tx: mpsc::UnboundedSender<Scripted>,
        inbound_rx: mpsc::UnboundedReceiver<Scripted>,
        pub sent: Vec<Bytes>,
    }

    impl MockTransport {
        pub fn new(server_url: impl Into<String>) -> Self {
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            MockTransport {
                server_url: server_url.into(),
                connect_fails: false,
                send_fails: false,
                close_fails: false,
                auto_receipt: true,
                connected: false,
                inbound_tx,
                inbound_rx,
                sent: Vec::new(),
            }
        }

        pub fn fail_connect(mut self) -> Self {
            self.connect_fails = true;
            self
        }

        pub fn fail_send(mut self) -> Self {
            self.send_fails = true;
            self
        }

        pub fn fail_close(mut self) -> Self {
            self.close_fails = true;
            self
        }

        /// By default, a scripted `SUBSCRIBE` frame is immediately answered
        /// with a matching `RECEIPT`, since the real server always does
        /// this and exercising the SUBSCRIBE/RECEIPT round trip would
        /// otherwise require the test to predict the client-generated
        /// subscription id. Call this to disable that and script receipts
        /// (or their absence) explicitly instead.
        pub fn no_auto_receipt(mut self) -> Self {
            self.auto_receipt = false;
            self
        }

        pub fn push_message(self, bytes: impl Into<Bytes>) -> Self {
            let _ = self.inbound_tx.send(Scripted::Message(bytes.into()));
            self
        }

        pub fn push_eof(self) -> Self {
            let _ = self.inbound_tx.send(Scripted::Eof);
            self
        }
    }

    #[async_trait::async_trait]
    impl Transport for MockTransport {
        type Error = MockTransportError;

        async fn connect(&mut self) -> Result<(), Self::Error> {
            if self.connect_fails {
                return Err(MockTransportError::ConnectFailed);
            }
            self.connected = true;
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<Bytes, Self::Error>> {
            match self.inbound_rx.recv().await? {
                Scripted::Message(b) => Some(Ok(b)),
                Scripted::Err => Some(Err(MockTransportError::NotConnected)),
                Scripted::Eof => None,
            }
        }

        async fn send(&mut self, bytes: Bytes) -> Result<(), Self::Error> {
            if !self.connected {
                return Err(MockTransportError::NotConnected);
            }
            if self.send_fails {
                return Err(MockTransportError::SendFailed);
            }
            if self.auto_receipt {
                let outgoing = Frame::parse(bytes.clone());
                if outgoing.command() == Command::Subscribe {
                    let receipt_id = outgoing.header_value(HeaderName::Receipt).to_vec();
                    let receipt = FrameBuilder::new(Command::Receipt)
                        .header(HeaderName::ReceiptId, receipt_id)
                        .build();
                    let _ = self.inbound_tx.send(Scripted::Message(receipt));
                }
            }
            self.sent.push(bytes);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), Self::Error> {
            if !self.connected {
                return Err(MockTransportError::NotConnected);
            }
            if self.close_fails {
                return Err(MockTransportError::CloseFailed);
            }
            self.connected = false;
            Ok(())
        }

        fn server_url(&self) -> &str {
            &self.server_url
        }
    }
}
