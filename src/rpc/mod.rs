//! # Stream RPC
//!
//! Request/reply and one-way messaging over a single broker stream, as the
//! legacy transport and its resource shims speak it. The envelope is JSON
//! and carries no deadlines.

pub mod client;
pub mod message;
pub mod server;

pub use client::RpcClient;
pub use message::{Message, RpcStatus, StatusCode};
pub use server::{answer, decode_body, encode_body, serve, Service};
