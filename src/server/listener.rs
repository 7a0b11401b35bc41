//! Listening-socket factory.
//!
//! mio and std expose neither `SO_REUSEADDR` before bind nor an explicit
//! listen backlog, so the socket is built with socket2 and converted into a
//! mio listener through the std type.

use crate::error::Error;
use mio::net::TcpListener;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tracing::debug;

/// Default pending-connection queue length for the listening socket.
///
/// Deliberately small: more simultaneous un-accepted connections than this
/// are refused by the OS, which the accept path must tolerate per attempt.
pub const DEFAULT_LISTEN_BACKLOG: usize = 3;

/// Creates a bound, listening, non-blocking TCP socket.
///
/// `bind_address` must be a literal IPv4 address. Every setup step maps to
/// its own error variant carrying the OS error, except the address parse
/// which has a fixed message.
pub(crate) fn bind(
    bind_address: &str,
    bind_port: u16,
    backlog: usize,
) -> Result<(TcpListener, SocketAddr), Error> {
    let ip: Ipv4Addr = bind_address.parse().map_err(|_| Error::AddressParse {
        addr: bind_address.to_string(),
    })?;
    let addr = SocketAddr::V4(SocketAddrV4::new(ip, bind_port));

    let socket =
        Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).map_err(Error::SocketCreate)?;
    socket
        .set_reuse_address(true)
        .map_err(Error::SocketOption)?;
    socket
        .bind(&addr.into())
        .map_err(|source| Error::Bind { addr, source })?;
    socket
        .listen(i32::try_from(backlog).unwrap_or(i32::MAX))
        .map_err(Error::Listen)?;
    socket.set_nonblocking(true).map_err(Error::SocketOption)?;

    let listener = TcpListener::from_std(socket.into());
    let local_addr = listener.local_addr()?;
    debug!(%local_addr, backlog, "Bound listening socket");

    Ok((listener, local_addr))
}
