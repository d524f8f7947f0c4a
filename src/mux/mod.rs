//! # Stream Multiplexing
//!
//! Framing, the multiplexed [`Session`] and the connection [`Broker`] that
//! hands out sub-connection IDs between host and plugin. A [`Channel`] can
//! also be viewed as a plain byte stream for protocols that bring their own
//! framing.

pub mod broker;
pub mod frame;
mod io;
pub mod session;

pub use broker::{Broker, ServeHandle, Side, BACKEND_STREAM_ID};
pub use frame::{Frame, FrameCodec, FrameKind};
pub use session::{Channel, ChannelReceiver, ChannelSender, Session};
