//! Reactor-based TCP server core.
//!
//! This module provides the [`Server`] struct: a single-threaded,
//! readiness-driven TCP server that accepts connections, tracks them in a
//! registry, and accumulates each connection's inbound byte stream into a
//! per-connection buffer. Consumers drive it by calling
//! [`Server::fetch_events`] in a loop and handling the returned
//! [`ServerEvent`]s — the hook point where chat semantics (rooms, relaying)
//! would attach.

mod listener;
mod reactor;

pub use listener::DEFAULT_LISTEN_BACKLOG;

use crate::config::get_namespaced_usize;
use crate::error::Error;
use reactor::Reactor;

use ::config::Config;
use std::net::SocketAddr;

// Token reserved for the listening socket.
const LISTENER_ID: usize = 1;

/// Default capacity of one poll-event batch.
pub const DEFAULT_POLL_CAPACITY: usize = 256;

/// Default size of the scratch chunk each `read` call fills before the bytes
/// are appended to the connection's receive buffer.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64;

/// Events produced by [`Server::fetch_events()`].
///
/// These events represent the lifecycle of connections and data transfer.
/// Handle each event to manage connection state and process incoming raw
/// bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// The server has no listener and no connections.
    Inactive,
    /// A new connection was accepted and registered.
    Connected { id: usize },
    /// Connection closed (peer hangup, zero-length read, or read/write
    /// error). Clean up state associated with this `id`.
    Disconnected { id: usize },
    /// One drain cycle's worth of raw bytes received from a connection.
    Data { id: usize, data: Vec<u8> },
}

/// Single-threaded, readiness-driven TCP server.
///
/// Not thread-safe: one thread owns the server and drives all I/O, so there
/// is no locking anywhere. A slow consumer of one connection's data delays
/// every other connection until it returns.
///
/// # Configuration Keys
///
/// - `listen_backlog`: pending-connection queue length (default 3)
/// - `read_chunk_size`: per-`read` scratch size in bytes (default 64)
/// - `recv_buffer_capacity`: initial receive-buffer capacity (default 64)
/// - `poll_capacity`: poll-event batch capacity (default 256)
#[derive(Debug)]
pub struct Server {
    inner: Reactor,
}

// ============================================================================
// Constructors
// ============================================================================

impl Server {
    /// Creates a new Server based on configuration.
    pub fn new(config: &Config) -> Result<Self, Error> {
        Self::new_named(config, "")
    }

    /// Creates a new named Server with configuration namespacing.
    ///
    /// Configuration lookup follows this priority:
    /// 1. `{name}.{key}` (e.g., `chat_server.listen_backlog`)
    /// 2. `{key}` (e.g., `listen_backlog`)
    /// 3. Hard-coded default
    pub fn new_named(config: &Config, name: &str) -> Result<Self, Error> {
        let poll_capacity =
            get_namespaced_usize(config, name, "poll_capacity").unwrap_or(DEFAULT_POLL_CAPACITY);
        let listen_backlog = get_namespaced_usize(config, name, "listen_backlog")
            .unwrap_or(DEFAULT_LISTEN_BACKLOG);
        let read_chunk_size = get_namespaced_usize(config, name, "read_chunk_size")
            .unwrap_or(DEFAULT_READ_CHUNK_SIZE);
        let recv_buffer_capacity = get_namespaced_usize(config, name, "recv_buffer_capacity")
            .unwrap_or(crate::buffer::DEFAULT_RECV_BUFFER_CAPACITY);

        Ok(Self {
            inner: Reactor::new(
                poll_capacity,
                listen_backlog,
                read_chunk_size,
                recv_buffer_capacity,
            )?,
        })
    }
}

// ============================================================================
// Connection Management
// ============================================================================

impl Server {
    /// Starts listening for incoming connections.
    ///
    /// `bind_address` must be a literal IPv4 address (e.g. `"127.0.0.1"`).
    /// Returns the actual bound address, useful when binding to port 0 for
    /// dynamic allocation.
    pub fn listen(&mut self, bind_address: &str, bind_port: u16) -> Result<SocketAddr, Error> {
        self.inner.listen(bind_address, bind_port)
    }

    /// The address the listener is bound to, if listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr()
    }

    /// The remote address of a live connection, captured at accept time.
    pub fn peer_addr(&self, id: usize) -> Option<SocketAddr> {
        self.inner.peer_addr(id)
    }

    /// Number of currently open connections.
    pub fn connection_count(&self) -> usize {
        self.inner.connection_count()
    }

    /// Closes a connection by its ID.
    ///
    /// Ignores non-existent connection ids, because the connection might have
    /// been closed already internally.
    ///
    /// **Note:** This does not trigger a [`ServerEvent::Disconnected`] event.
    pub fn close_connection(&mut self, id: usize) {
        self.inner.close_connection(id)
    }

    /// Closes all connections.
    ///
    /// **Note:** This does not trigger [`ServerEvent::Disconnected`] events.
    pub fn close_all_connections(&mut self) {
        self.inner.close_all_connections()
    }

    /// Stops listening for new connections. Existing connections stay open.
    pub fn close_listener(&mut self) {
        self.inner.close_listener()
    }

    // ============================================================================
    // Data Operations
    // ============================================================================

    /// Queues raw bytes to be sent to a specific connection.
    ///
    /// Ignores non-existent connection ids, because the connection might have
    /// been closed already internally. Write errors surface asynchronously as
    /// [`ServerEvent::Disconnected`].
    pub fn send_to(&mut self, id: usize, buf: Vec<u8>) {
        self.inner.send_to(id, buf)
    }

    // ============================================================================
    // Event Operations
    // ============================================================================

    /// Blocks until server events are available and returns them.
    ///
    /// Returns [`ServerEvent::Inactive`] if the server has no listener and no
    /// connections.
    ///
    /// Only returns unrecoverable errors (a broken poll, a hard listener
    /// failure). Recoverable per-connection conditions are reported through
    /// the returned events.
    pub fn fetch_events(&mut self) -> Result<Vec<ServerEvent>, Error> {
        self.inner.fetch_events()
    }
}
