//! UDP transport stream reception.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::TunerError;

/// Binds a UDP socket for TS reception, joining the group when `addr` is
/// multicast. IPv4 only.
pub fn create_udp_socket(addr: SocketAddr) -> Result<Socket, TunerError> {
    let ip = match addr.ip() {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(_) => return Err(TunerError::InvalidSource(format!("{addr}: only IPv4 is supported"))),
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    // large bursts of 7-packet datagrams
    socket.set_recv_buffer_size(4 * 1024 * 1024)?;
    socket.bind(&addr.into())?;

    if ip.is_multicast() {
        socket.join_multicast_v4(&ip, &Ipv4Addr::UNSPECIFIED)?;
        debug!(group = %ip, "joined multicast group");
    }

    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// [`create_udp_socket`] registered with the current tokio runtime.
pub fn bind_udp(addr: SocketAddr) -> Result<UdpSocket, TunerError> {
    let socket = create_udp_socket(addr)?;
    Ok(UdpSocket::from_std(socket.into())?)
}
