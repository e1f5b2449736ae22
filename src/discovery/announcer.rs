use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use log::{info, trace, warn};
use tokio::net::UdpSocket;

use super::encode_port;

/// Announcement period used when none (or a zero one) is given.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Sends one announcement for `port` to `target`.
pub async fn announce(target: SocketAddr, port: u16) -> io::Result<()> {
    trace!("sending multicast ping to {} with value {}", target, port);
    let local: IpAddr = match target {
        SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
        SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
    };
    let socket = UdpSocket::bind(SocketAddr::new(local, 0)).await?;
    socket.send_to(&encode_port(port), target).await?;
    Ok(())
}

/// Announces `port` to `target` immediately and then once per `interval`,
/// forever.
///
/// A failed send is logged and the next one happens on schedule.  A zero
/// `interval` is replaced by [`DEFAULT_INTERVAL`].
pub async fn run_announcer(target: SocketAddr, port: u16, interval: Duration) {
    let interval = if interval.is_zero() {
        warn!("zero announcement interval, using {:?}", DEFAULT_INTERVAL);
        DEFAULT_INTERVAL
    } else {
        interval
    };
    info!(
        "sending announcements to {} every {:?}",
        target, interval
    );
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if let Err(e) = announce(target, port).await {
            warn!("failed to send announcement to {}: {}", target, e);
        }
    }
}
