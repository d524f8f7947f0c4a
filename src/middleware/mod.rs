//! # Backend Middleware
//!
//! Wrappers layered over any [`Backend`](crate::logical::Backend) that add
//! behaviour without altering arguments, results or errors.

pub mod traced;

pub use traced::TracingBackend;
