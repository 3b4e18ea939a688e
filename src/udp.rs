//! The UDP ingest endpoint: bind, optionally join a multicast group, and
//! read with a timeout. Deliberately thin: the worker consumes this as a
//! primitive rather than reimplementing socket setup itself.
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use anyhow::Result;
use tokio::net::UdpSocket;

use crate::ts::DATAGRAM_LEN;

/// Receive timeout before the caller falls back to synthesized filler.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Bind a socket for `addr`. Multicast addresses are joined on an
/// unspecified-address bind (the conventional way to receive multicast
/// regardless of which local interface the datagrams arrive on); unicast
/// addresses are bound directly, matching a source that expects to receive
/// on one specific local address:port.
pub async fn open(addr: SocketAddr) -> Result<UdpSocket> {
    if addr.ip().is_multicast() {
        let bind_addr = match addr {
            SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), addr.port()),
            SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), addr.port()),
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        join_multicast(&socket, addr.ip())?;
        Ok(socket)
    } else {
        UdpSocket::bind(addr).await
            .map_err(Into::into)
    }
}

/// Join the multicast group `group` on all interfaces.
pub fn join_multicast(socket: &UdpSocket, group: IpAddr) -> Result<()> {
    match group {
        IpAddr::V4(v4) => socket.join_multicast_v4(v4, Ipv4Addr::UNSPECIFIED)?,
        IpAddr::V6(v6) => socket.join_multicast_v6(&v6, 0)?,
    }
    Ok(())
}

/// Read up to `DATAGRAM_LEN` bytes with a timeout. `Ok(None)` means the
/// timeout elapsed (the caller synthesizes filler); `Ok(Some(n))` is the
/// number of bytes actually read.
pub async fn recv_timeout(socket: &UdpSocket, buf: &mut [u8; DATAGRAM_LEN]) -> Result<Option<usize>> {
    match tokio::time::timeout(RECV_TIMEOUT, socket.recv(buf)).await {
        Ok(Ok(n)) => Ok(Some(n)),
        Ok(Err(e)) => Err(e.into()),
        Err(_timed_out) => Ok(None),
    }
}
