//! LAN discovery: UDP hello broadcast, hello listener, and socket setup.

pub mod broadcast;
pub mod listener;

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Bind the discovery socket: broadcast-enabled, address reuse on.
///
/// Must be called from inside a Tokio runtime.
pub fn bind_discovery_socket(addr: SocketAddrV4) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::V4(addr).into())?;

    UdpSocket::from_std(socket.into())
}

/// This host's IPv4 address as peers will see it.
///
/// An explicit address wins. Otherwise the address of the default route's
/// interface, then the first non-loopback IPv4 interface. `None` when the
/// host has no usable IPv4 address at all.
pub fn resolve_local_ipv4(configured: Option<Ipv4Addr>) -> Option<Ipv4Addr> {
    if let Some(addr) = configured {
        return Some(addr);
    }

    match local_ip_address::local_ip() {
        Ok(IpAddr::V4(v4)) if is_usable(v4) => return Some(v4),
        Ok(other) => tracing::debug!(addr = %other, "default interface has no usable IPv4"),
        Err(e) => tracing::debug!(error = %e, "default interface lookup failed"),
    }

    local_ip_address::list_afinet_netifas()
        .map_err(|e| tracing::debug!(error = %e, "interface enumeration failed"))
        .ok()?
        .into_iter()
        .find_map(|(_, ip)| match ip {
            IpAddr::V4(v4) if is_usable(v4) => Some(v4),
            _ => None,
        })
}

fn is_usable(addr: Ipv4Addr) -> bool {
    !addr.is_loopback() && !addr.is_unspecified()
}
