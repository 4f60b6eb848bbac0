//! Application layer for Kako.
//!
//! Coordinates the domain core and the infrastructure: one [`SyncEngine`]
//! applies every channel frame to the session store, and [`SessionSync`]
//! drives it from the live push channels and the REST backend.

pub mod engine;
pub mod sync;

pub use engine::SyncEngine;
pub use sync::{SessionSync, SyncUpdate};
