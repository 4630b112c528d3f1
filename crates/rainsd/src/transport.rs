//! UDP transport for framed JSON datagrams
//!
//! Thin wrapper around tokio's UdpSocket with configurable
//! send/receive buffer sizes, set through socket2 before binding.

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Largest datagram the receive loop accepts.
pub const MAX_DATAGRAM: usize = 65_535;

/// Bind a UDP socket with the given buffer sizes.
pub async fn bind(addr: SocketAddr, sndbuf: usize, rcvbuf: usize) -> anyhow::Result<UdpSocket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

    // Buffer sizes must be set before binding.
    socket.set_send_buffer_size(sndbuf)?;
    socket.set_recv_buffer_size(rcvbuf)?;
    socket.set_reuse_address(true)?;

    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    let tokio_socket = UdpSocket::from_std(std_socket)?;

    tracing::info!(
        "UDP transport bound to {} (sndbuf={}, rcvbuf={})",
        addr,
        sndbuf,
        rcvbuf
    );

    Ok(tokio_socket)
}
