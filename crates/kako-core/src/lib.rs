//! Domain core of the Kako dashboard client.
//!
//! Pure, transport-free logic: push-channel vocabulary, the reconnect
//! policy, stream reassembly, the pending-event queue, the session store and
//! model catalog normalization. Transports and I/O live in
//! `kako-infrastructure`.

pub mod auth;
pub mod backend;
pub mod catalog;
pub mod channel;
pub mod chat;
pub mod config;
pub mod error;
pub mod queue;
pub mod reconnect;
pub mod store;
pub mod task;

// Re-export common error type
pub use error::{KakoError, Result};
