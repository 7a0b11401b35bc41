//! Single-threaded readiness reactor.
//!
//! Owns the listening socket, the connection registry, and the mio poll. Each
//! cycle blocks on readiness across all registered handles (no timeout, no
//! busy-spinning), services the listener before any existing connection, then
//! drives per-connection I/O. A connection accepted in one cycle is therefore
//! not visited for its own readiness until the next cycle.

use super::{ServerEvent, LISTENER_ID};
use crate::buffer::RecvBuffer;
use crate::error::Error;
use crate::registry::{Registry, Sweep};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::collections::HashSet;
use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;
use tracing::{debug, error, info, instrument, trace, warn};

// Connection IDs start well above the listener token so the two can never
// collide.
const CONNECTION_ID_RANGE_START: usize = 1000;

// Per-connection state. Dropping a Connection closes its socket, exactly
// once, because the Connection exclusively owns the stream.
#[derive(Debug)]
pub(super) struct Connection {
    stream: TcpStream,
    interest: Interest,
    peer_addr: SocketAddr,
    recv_buf: RecvBuffer,
    send_buf: Vec<u8>,
}

// Internal result type for read_connection
enum ReadOutcome {
    Open(Vec<u8>),
    Closed(Vec<u8>),
}

// Internal result type for write_connection
enum WriteOutcome {
    Open,
    Closed,
}

/// Non-blocking TCP reactor for a single listening server.
///
/// Not thread-safe: exactly one thread drives the listener and every
/// connection, so the registry needs no locking. Note: this struct is
/// internal. Users should use the [`Server`](super::Server) struct instead.
#[derive(Debug)]
pub(super) struct Reactor {
    registry: Registry<Connection>,
    listener: Option<TcpListener>,
    listener_addr: Option<SocketAddr>,
    next_id: usize,
    poll: Poll,
    poll_capacity: usize,
    listen_backlog: usize,
    read_chunk_size: usize,
    recv_buffer_capacity: usize,
    spurious_wakeups: usize,
}

// ============================================================================
// Constructors
// ============================================================================

impl Reactor {
    pub fn new(
        poll_capacity: usize,
        listen_backlog: usize,
        read_chunk_size: usize,
        recv_buffer_capacity: usize,
    ) -> Result<Self, Error> {
        let poll = Poll::new()?;

        Ok(Self {
            registry: Registry::new(),
            listener: None,
            listener_addr: None,
            next_id: CONNECTION_ID_RANGE_START,
            poll,
            poll_capacity,
            listen_backlog,
            read_chunk_size,
            recv_buffer_capacity,
            spurious_wakeups: 0,
        })
    }
}

// ============================================================================
// Connection Management
// ============================================================================

impl Reactor {
    /// Starts listening for incoming connections on the specified address.
    #[instrument(skip(self, bind_address))]
    pub fn listen(&mut self, bind_address: &str, bind_port: u16) -> Result<SocketAddr, Error> {
        assert!(
            self.listener.is_none(),
            "Reactor already has a listener - one listener per server"
        );

        let (mut listener, local_addr) =
            super::listener::bind(bind_address, bind_port, self.listen_backlog)?;
        self.poll
            .registry()
            .register(&mut listener, Token(LISTENER_ID), Interest::READABLE)
            .expect("Failed to register listener");
        info!(%local_addr, "Listening for connections");
        self.listener = Some(listener);
        self.listener_addr = Some(local_addr);

        Ok(local_addr)
    }

    /// The address the listener is bound to, if listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener_addr
    }

    /// The remote address of a live connection.
    pub fn peer_addr(&self, id: usize) -> Option<SocketAddr> {
        self.registry.get(id).map(|conn| conn.peer_addr)
    }

    /// Number of currently open connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Closes a connection by its ID.
    #[instrument(skip(self))]
    pub fn close_connection(&mut self, id: usize) {
        match self.registry.remove(id) {
            Ok(mut connection) => {
                self.poll
                    .registry()
                    .deregister(&mut connection.stream)
                    .expect("Failed to deregister connection");
                let peer_addr = &connection.peer_addr;
                info!(id, %peer_addr, "Closed connection");
            }
            Err(_) => {
                warn!(id, "Connection not found when closing connection");
            }
        }
    }

    /// Closes all connections.
    #[instrument(skip(self))]
    pub fn close_all_connections(&mut self) {
        let poller = self.poll.registry();
        self.registry.sweep(|id, connection| {
            poller
                .deregister(&mut connection.stream)
                .expect("Failed to deregister connection");
            let peer_addr = &connection.peer_addr;
            info!(id, %peer_addr, "Closed connection");
            Sweep::Remove
        });
    }

    /// Closes the listener. Existing connections stay open.
    #[instrument(skip(self))]
    pub fn close_listener(&mut self) {
        match self.listener.take() {
            Some(mut listener) => {
                self.poll
                    .registry()
                    .deregister(&mut listener)
                    .expect("Failed to deregister listener");
                let local_addr = self.listener_addr.take();
                info!(?local_addr, "Closed listener");
            }
            None => {
                warn!("Listener not found when closing listener");
            }
        }
    }
}

// ============================================================================
// Data Operations
// ============================================================================

impl Reactor {
    /// Queues data to be sent to a specific connection.
    #[instrument(skip(self, buf))]
    pub fn send_to(&mut self, id: usize, buf: Vec<u8>) {
        debug!(len = buf.len(), "Sending data");
        self.queue_data(id, buf);
    }
}

// ============================================================================
// Event Operations
// ============================================================================

impl Reactor {
    /// Blocks until server events are available and returns them.
    #[instrument(skip(self))]
    pub fn fetch_events(&mut self) -> Result<Vec<ServerEvent>, Error> {
        let mut dispatch_events = Vec::new();

        while dispatch_events.is_empty() {
            // Is there anything to do?
            if self.listener.is_none() && self.registry.is_empty() {
                dispatch_events.push(ServerEvent::Inactive);
                return Ok(dispatch_events);
            }

            let mut poll_events = Events::with_capacity(self.poll_capacity);
            self.poll.poll(&mut poll_events, None)?;

            // Service the listener before any existing connection, so that a
            // connection accepted in this cycle is not visited for its own
            // I/O until the next cycle.
            for event in poll_events.iter() {
                if event.token() == Token(LISTENER_ID) {
                    let new_conn_ids = self.accept_connections()?;
                    for id in new_conn_ids {
                        dispatch_events.push(ServerEvent::Connected { id });
                    }
                }
            }

            // Track connections closed in this poll cycle so their remaining
            // events are skipped instead of hitting a stale registry entry.
            let mut disconnected_ids = HashSet::new();

            for event in poll_events.iter() {
                let Token(id) = event.token();

                if id == LISTENER_ID || disconnected_ids.contains(&id) {
                    continue;
                }

                assert!(
                    self.registry.contains(id),
                    "Connection {} not found - was it properly removed after disconnect?",
                    id
                );

                assert!(event.is_readable() || event.is_writable());
                // mio reports errors alongside readable/writable bits, so the
                // actual read/write attempt surfaces specific failures.

                if event.is_readable() {
                    match self.read_connection(id) {
                        ReadOutcome::Open(data) => {
                            if !data.is_empty() {
                                dispatch_events.push(ServerEvent::Data { id, data });
                            }
                        }
                        ReadOutcome::Closed(data) => {
                            if !data.is_empty() {
                                dispatch_events.push(ServerEvent::Data { id, data });
                            }
                            dispatch_events.push(ServerEvent::Disconnected { id });
                            disconnected_ids.insert(id);
                            continue; // Skip writable check for closed connections
                        }
                    }
                }

                if event.is_writable() {
                    match self.write_connection(id) {
                        WriteOutcome::Open => (),
                        WriteOutcome::Closed => {
                            dispatch_events.push(ServerEvent::Disconnected { id });
                            disconnected_ids.insert(id);
                        }
                    }
                }
            }
        }

        debug!(count = dispatch_events.len(), "Fetched events");
        Ok(dispatch_events)
    }
}

// ============================================================================
// Internal Connection I/O
// ============================================================================

impl Reactor {
    #[instrument(skip(self))]
    fn accept_connections(&mut self) -> Result<Vec<usize>, Error> {
        let mut new_conn_ids = Vec::new();
        let local_addr = self.listener_addr;

        // Collect all pending streams first, then initialize and track them,
        // to keep the listener borrow short.
        let mut new_streams = Vec::new();
        let mut listener_error = None;
        {
            let listener = self
                .listener
                .as_mut()
                .expect("Listener should exist for accept event");

            loop {
                match listener.accept() {
                    Ok((stream, peer_addr)) => {
                        new_streams.push((stream, peer_addr));
                    }
                    Err(err) => match err.kind() {
                        ErrorKind::WouldBlock => {
                            // Nothing more pending, so we are done
                            break;
                        }
                        ErrorKind::Interrupted => continue,
                        ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset => {
                            // Peer gave up before accept (backlog overflow is
                            // one cause). Only this attempt fails.
                            warn!(?err, ?local_addr, "Transient accept error");
                            continue;
                        }
                        _ => {
                            listener_error = Some(err);
                            break;
                        }
                    },
                }
            }
        }

        if let Some(err) = listener_error {
            error!(?err, ?local_addr, "Error accepting connection");
            let mut listener = self
                .listener
                .take()
                .expect("Listener should exist for accept event");
            self.poll
                .registry()
                .deregister(&mut listener)
                .expect("Failed to deregister listener");
            self.listener_addr = None;
            return Err(Error::Accept(err));
        }

        let accepted_count = new_streams.len();

        // A connection is tracked only once it is fully initialized; any
        // failure here closes and discards that one connection.
        for (mut stream, peer_addr) in new_streams {
            if let Err(err) = stream.set_nodelay(true) {
                warn!(%peer_addr, ?err, "Failed to configure accepted connection, dropping it");
                continue;
            }

            let recv_buf = match RecvBuffer::with_capacity(self.recv_buffer_capacity) {
                Ok(buf) => buf,
                Err(err) => {
                    error!(%peer_addr, %err, "Failed to allocate receive buffer, dropping connection");
                    continue;
                }
            };

            let id = self.next_id;
            let interest = Interest::READABLE;
            let connection = Connection {
                stream,
                interest,
                peer_addr,
                recv_buf,
                send_buf: Vec::new(),
            };

            if let Err(err) = self.registry.insert(id, connection) {
                error!(id, %peer_addr, %err, "Failed to track accepted connection, dropping it");
                continue;
            }
            let connection = self
                .registry
                .get_mut(id)
                .expect("Connection was just inserted");
            if let Err(err) =
                self.poll
                    .registry()
                    .register(&mut connection.stream, Token(id), interest)
            {
                error!(id, %peer_addr, ?err, "Failed to register accepted connection, dropping it");
                let _ = self.registry.remove(id);
                continue;
            }

            info!(id, ?local_addr, %peer_addr, "Accepted connection");
            new_conn_ids.push(id);
            self.advance_connection_id();
        }

        // If no connections were accepted, we have a spurious wakeup
        self.track_spurious_wakeup(accepted_count == 0);

        Ok(new_conn_ids)
    }

    #[instrument(skip(self))]
    fn read_connection(&mut self, id: usize) -> ReadOutcome {
        let mut chunk = vec![0u8; self.read_chunk_size];
        let conn = self
            .registry
            .get_mut(id)
            .expect("Connection should exist for readable event");
        let peer_addr = conn.peer_addr;
        let mut closed = false;

        // Start of a new drain cycle for this connection.
        conn.recv_buf.clear();

        loop {
            match conn.stream.read(&mut chunk) {
                Ok(0) => {
                    // Zero read means the peer closed its write side, which
                    // is distinct from "no data right now" (WouldBlock).
                    info!(id, %peer_addr, "Connection closed by peer");
                    closed = true;
                    break;
                }
                Ok(sz) => {
                    trace!(id, len = sz, %peer_addr, "Read data from socket");
                    if let Err(err) = conn.recv_buf.append(&chunk[..sz]) {
                        // Out of memory for this connection's buffer drops
                        // only this connection, never the whole server.
                        error!(id, %peer_addr, %err, "Failed to buffer received data, dropping connection");
                        closed = true;
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    // Further reading would block, so we are done
                    break;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    if err.kind() == ErrorKind::BrokenPipe {
                        warn!(id, %peer_addr, "Broken pipe");
                    } else if err.kind() == ErrorKind::ConnectionReset {
                        warn!(id, %peer_addr, "Connection reset");
                    } else {
                        error!(id, %peer_addr, ?err, "Error reading from socket");
                    }
                    closed = true;
                    break;
                }
            }
        }

        let data = conn.recv_buf.contents().to_vec();
        if !data.is_empty() {
            debug!(id, len = data.len(), %peer_addr, "Received data");
        }

        if closed {
            self.poll
                .registry()
                .deregister(&mut conn.stream)
                .expect("Failed to deregister connection");
            self.registry
                .remove(id)
                .expect("Connection should still be registered");
            ReadOutcome::Closed(data)
        } else {
            // If we neither received data nor closed, it was a spurious
            // wakeup
            self.track_spurious_wakeup(data.is_empty());
            ReadOutcome::Open(data)
        }
    }

    #[instrument(skip(self))]
    fn write_connection(&mut self, id: usize) -> WriteOutcome {
        let conn = self
            .registry
            .get_mut(id)
            .expect("Connection should exist for writable event");
        let peer_addr = conn.peer_addr;
        let old_interest = conn.interest;

        let mut send_pos = 0;
        loop {
            if send_pos == conn.send_buf.len() {
                // Nothing left to write, so we are done writing
                conn.interest = Interest::READABLE;
                break;
            }

            match conn.stream.write(&conn.send_buf[send_pos..]) {
                Ok(0) => {
                    warn!(id, remaining = conn.send_buf.len() - send_pos, %peer_addr, "Write to socket returned 0");
                    break;
                }
                Ok(sz) => {
                    send_pos += sz;
                    trace!(id, len = sz, remaining = conn.send_buf.len() - send_pos, %peer_addr, "Wrote to socket");
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    // Further writing would block, so we are done
                    break;
                }
                Err(err) => {
                    if err.kind() == ErrorKind::BrokenPipe {
                        warn!(id, %peer_addr, "Broken pipe");
                    } else if err.kind() == ErrorKind::ConnectionReset {
                        warn!(id, %peer_addr, "Connection reset");
                    } else {
                        error!(id, %peer_addr, ?err, "Error writing to socket");
                    }
                    self.poll
                        .registry()
                        .deregister(&mut conn.stream)
                        .expect("Failed to deregister connection");
                    self.registry
                        .remove(id)
                        .expect("Connection should still be registered");
                    return WriteOutcome::Closed;
                }
            }
        }

        // Remove the data we wrote
        conn.send_buf.drain(..send_pos);

        // Update our registration, if necessary
        if old_interest != conn.interest {
            self.poll
                .registry()
                .reregister(&mut conn.stream, Token(id), conn.interest)
                .expect("Failed to reregister connection");
        }

        // If we didn't write any data, we have a spurious wakeup
        self.track_spurious_wakeup(send_pos == 0);
        WriteOutcome::Open
    }
}

// ============================================================================
// Internal Helpers
// ============================================================================

impl Reactor {
    // Queues data to a connection and enables writability.
    fn queue_data(&mut self, id: usize, buf: Vec<u8>) {
        let Some(conn) = self.registry.get_mut(id) else {
            warn!(id, "Connection not found when queuing data");
            return;
        };

        // If send_buf is empty, as it will be in most cases, send_buf
        // consumes buf to avoid an extra copy.
        if conn.send_buf.is_empty() {
            conn.send_buf = buf;
        } else {
            conn.send_buf.extend(buf);
        }

        // We need to be WRITABLE to send
        let old_interest = conn.interest;
        conn.interest = Interest::READABLE | Interest::WRITABLE;

        // Update our registration, if necessary
        if old_interest != conn.interest {
            self.poll
                .registry()
                .reregister(&mut conn.stream, Token(id), conn.interest)
                .expect("Failed to reregister connection");
        }
    }

    fn advance_connection_id(&mut self) {
        loop {
            self.next_id = self
                .next_id
                .checked_add(1)
                .unwrap_or(CONNECTION_ID_RANGE_START);
            if !self.registry.contains(self.next_id) {
                break;
            }
        }
    }

    fn track_spurious_wakeup(&mut self, is_spurious: bool) {
        if is_spurious {
            self.spurious_wakeups += 1;
            warn!(consecutive = self.spurious_wakeups, "Spurious wakeup");
        } else {
            self.spurious_wakeups = 0;
        }
    }
}
