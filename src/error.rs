use std::collections::TryReserveError;
use thiserror::Error;

/// The error type for natter operations.
///
/// Setup-phase errors (socket creation through listen) are unrecoverable and
/// should be handled by logging and shutting down. Per-connection failures
/// (a peer disconnecting, a failed read) are reported through
/// [`ServerEvent`](crate::ServerEvent)s rather than errors, so that one
/// misbehaving client never takes down the whole server.
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // I/O and Networking Errors
    // ============================================================================

    /// Low-level I/O error from the operating system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create the listening socket.
    #[error("Failed to create socket: {0}")]
    SocketCreate(#[source] std::io::Error),

    /// Failed to configure a socket option (reuse-address, non-blocking mode).
    #[error("Failed to set socket option: {0}")]
    SocketOption(#[source] std::io::Error),

    /// The bind address is not a valid IPv4 literal.
    #[error("Invalid IPv4 address '{addr}'")]
    AddressParse {
        /// The address string that failed to parse.
        addr: String,
    },

    /// Failed to bind the listening socket to the requested address.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    /// Failed to start listening on the bound socket.
    #[error("Failed to listen: {0}")]
    Listen(#[source] std::io::Error),

    /// Accepting a pending connection failed with an unrecoverable error.
    ///
    /// "Nothing pending" (`WouldBlock`) and per-attempt failures like a peer
    /// resetting before accept are handled internally and never surface here.
    #[error("Failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    // ============================================================================
    // Registry and Buffer Errors
    // ============================================================================

    /// Backing storage for a buffer or the registry could not be allocated.
    #[error("Allocation failed: {0}")]
    Allocation(#[from] TryReserveError),

    /// Attempted to operate on a connection ID that doesn't exist.
    #[error("Connection {id} not found")]
    ConnectionNotFound {
        /// The connection ID that was not found.
        id: usize,
    },

    /// Positional registry access past the end.
    #[error("Index {index} out of bounds for registry of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    // ============================================================================
    // Configuration Errors
    // ============================================================================

    /// Configuration file parsing or key lookup failed.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
