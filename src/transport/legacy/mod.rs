//! Legacy transport (protocol version 4).
//!
//! One RPC stream carries the Backend service. Storage is served on a fresh
//! broker stream for every request, and setup opens separate streams for the
//! Storage, Logger and SystemView shims. Deadlines and cancellation are not
//! forwarded; a call only ends early when the connection goes away.

pub mod client;
pub mod server;

pub use client::BackendClient;
pub use server::BackendServer;
