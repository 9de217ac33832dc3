//! A STOMP 1.2 frame codec and async client for a WebSocket-carried
//! network-events feed. The wire transport itself is not part of this
//! crate — embedders provide one by implementing [`Transport`].

pub mod client;
pub mod frame;
pub mod transport;

mod strand;

pub use client::{ClientResult, ClientState, StompClient, SubscriptionId};
pub use frame::{Command, Frame, FrameBuilder, HeaderName, ParseError};
pub use transport::Transport;
