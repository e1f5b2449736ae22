use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use log::{error, info, trace};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;

use super::decode_port;
use crate::error::DiscoveryError;
use crate::registry::Registry;

/// Receive buffer size. Anything that fills it is malformed anyway.
const MAX_DATAGRAM_SIZE: usize = 512;

/// Runs the discovery listener until the socket fails.
///
/// Every well-formed announcement received on `addr` adds
/// `<source ip>:<announced port>` to `registry`.  Malformed datagrams are
/// logged and skipped.  `ready`, when given, receives the bound local
/// address once the socket is listening and before the first read.
pub async fn run_discovery(
    addr: SocketAddr,
    registry: Registry,
    ready: Option<oneshot::Sender<SocketAddr>>,
) -> Result<(), DiscoveryError> {
    info!("starting discovery server on {}", addr);
    let socket = bind(addr).await?;
    let local_addr = socket.local_addr().map_err(DiscoveryError::LocalAddr)?;

    if let Some(ready) = ready {
        // The waiter may have given up; listening goes on regardless.
        let _ = ready.send(local_addr);
    }

    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    loop {
        let (len, src) = socket
            .recv_from(&mut buf)
            .await
            .map_err(|source| DiscoveryError::Recv { addr, source })?;

        let payload = &buf[..len];
        let port = match decode_port(payload) {
            Ok(port) => port,
            Err(e) => {
                error!(
                    "received malformed UDP with {} bytes from {}: {} ({:?})",
                    len, src, e, payload
                );
                continue;
            }
        };
        trace!("received {} bytes UDP from {}: {:?}", len, src, payload);

        registry.add(SocketAddr::new(src.ip(), port).into()).await;
    }
}

/// Binds the discovery socket.
///
/// Multicast groups are joined on a wildcard socket bound to the group's
/// port with address reuse enabled, so several listeners on one host can
/// share the group. Any other address is bound as-is.
async fn bind(addr: SocketAddr) -> Result<UdpSocket, DiscoveryError> {
    let ip = addr.ip();
    if !ip.is_multicast() {
        return UdpSocket::bind(addr)
            .await
            .map_err(|source| DiscoveryError::Bind { addr, source });
    }

    let wildcard: IpAddr = match ip {
        IpAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
        IpAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
    };
    let socket = reusable_socket(SocketAddr::new(wildcard, addr.port()))
        .and_then(UdpSocket::from_std)
        .map_err(|source| DiscoveryError::Bind { addr, source })?;

    match ip {
        IpAddr::V4(group) => socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(group) => socket.join_multicast_v6(&group, 0),
    }
    .map_err(|source| DiscoveryError::JoinGroup { addr, source })?;

    Ok(socket)
}

fn reusable_socket(bind_addr: SocketAddr) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(
        Domain::for_address(bind_addr),
        Type::DGRAM,
        Some(Protocol::UDP),
    )?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&bind_addr.into())?;
    Ok(socket.into())
}
