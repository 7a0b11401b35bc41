//! natter - a single-threaded reactor core for a multi-client TCP chat server
//!
//! natter provides the connection-multiplexing and per-connection buffering
//! engine a chat server is built on: one thread blocks on readiness across a
//! listening socket and every accepted connection, accepts new peers, drains
//! inbound bytes into per-connection buffers, and reports everything as
//! [`ServerEvent`]s. No protocol semantics live here - framing, usernames,
//! and message relaying belong to the event consumer.

// Internal-only modules
pub(crate) mod config;
pub(crate) mod error;

// These are the intended public API
pub mod buffer;
pub mod registry;
pub mod server;

pub use buffer::RecvBuffer;
pub use error::Error;
pub use registry::{Registry, Sweep};
pub use server::{Server, ServerEvent};

/// Convenient re-exports of commonly used types.
pub mod prelude {
    pub use crate::buffer::RecvBuffer;
    pub use crate::error::Error;
    pub use crate::registry::{Registry, Sweep};
    pub use crate::server::{Server, ServerEvent};
}
