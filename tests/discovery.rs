//! Discovery listener and announcer tests over loopback UDP.

use std::net::SocketAddr;
use std::time::Duration;

use api_aggregator::discovery::{announce, run_announcer, run_discovery};
use api_aggregator::{Registry, UpstreamAddress};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

/// Starts a listener on an ephemeral loopback port and waits until it is bound.
async fn start_listener(
    registry: &Registry,
) -> (SocketAddr, JoinHandle<Result<(), api_aggregator::error::DiscoveryError>>) {
    let (ready_tx, ready_rx) = oneshot::channel();
    let handle = tokio::spawn(run_discovery(
        "127.0.0.1:0".parse().unwrap(),
        registry.clone(),
        Some(ready_tx),
    ));
    let addr = timeout(WAIT, ready_rx)
        .await
        .expect("listener never became ready")
        .expect("listener dropped the ready signal");
    (addr, handle)
}

async fn send_raw(target: SocketAddr, payload: &[u8]) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(payload, target).await.unwrap();
}

#[tokio::test]
async fn test_announcement_registers_upstream() {
    let registry = Registry::new();
    let notifications = registry.subscribe().await;
    let (addr, handle) = start_listener(&registry).await;

    announce(addr, 1111).await.unwrap();

    let discovered = timeout(WAIT, notifications.recv())
        .await
        .expect("no peer discovered")
        .unwrap();
    assert_eq!(discovered, UpstreamAddress::new("127.0.0.1:1111"));
    assert!(registry.contains(&discovered).await);

    handle.abort();
}

#[tokio::test]
async fn test_malformed_datagram_is_skipped() {
    let registry = Registry::new();
    let notifications = registry.subscribe().await;
    let (addr, handle) = start_listener(&registry).await;

    // A 4-byte port field, a zero port and an empty datagram.
    send_raw(addr, &1111u32.to_be_bytes()).await;
    send_raw(addr, &[0, 0]).await;
    send_raw(addr, &[]).await;
    send_raw(addr, &2222u16.to_be_bytes()).await;

    let discovered = timeout(WAIT, notifications.recv())
        .await
        .expect("listener stopped after malformed datagram")
        .unwrap();
    assert_eq!(discovered, UpstreamAddress::new("127.0.0.1:2222"));
    assert_eq!(registry.snapshot().await, vec![discovered]);
    assert!(!handle.is_finished());

    handle.abort();
}

#[tokio::test]
async fn test_repeated_announcements_deduplicated() {
    let registry = Registry::new();
    let notifications = registry.subscribe().await;
    let (addr, handle) = start_listener(&registry).await;

    for _ in 0..3 {
        announce(addr, 3333).await.unwrap();
        timeout(WAIT, notifications.recv()).await.unwrap();
    }

    assert_eq!(registry.len().await, 1);
    handle.abort();
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap();

    let result = run_discovery(addr, Registry::new(), None).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_announcer_sends_periodically() {
    let registry = Registry::new();
    let notifications = registry.subscribe().await;
    let (addr, listener) = start_listener(&registry).await;

    let announcer = tokio::spawn(run_announcer(addr, 4444, Duration::from_millis(50)));
    for _ in 0..2 {
        let discovered = timeout(WAIT, notifications.recv()).await.unwrap().unwrap();
        assert_eq!(discovered, UpstreamAddress::new("127.0.0.1:4444"));
    }

    announcer.abort();
    listener.abort();
}

#[tokio::test]
async fn test_announcer_zero_interval_falls_back() {
    let registry = Registry::new();
    let notifications = registry.subscribe().await;
    let (addr, listener) = start_listener(&registry).await;

    let announcer = tokio::spawn(run_announcer(addr, 5555, Duration::ZERO));
    let discovered = timeout(WAIT, notifications.recv()).await.unwrap().unwrap();
    assert_eq!(discovered, UpstreamAddress::new("127.0.0.1:5555"));
    assert!(!announcer.is_finished());

    announcer.abort();
    listener.abort();
}

#[tokio::test]
#[ignore = "requires a multicast-capable network interface"]
async fn test_multicast_group_round_trip() {
    let registry = Registry::new();
    let notifications = registry.subscribe().await;
    let (ready_tx, ready_rx) = oneshot::channel();
    let group: SocketAddr = "224.0.0.1:8889".parse().unwrap();
    let handle = tokio::spawn(run_discovery(group, registry.clone(), Some(ready_tx)));
    timeout(WAIT, ready_rx).await.unwrap().unwrap();

    announce(group, 1111).await.unwrap();

    let discovered = timeout(WAIT, notifications.recv()).await.unwrap().unwrap();
    assert!(discovered.as_str().ends_with(":1111"));
    handle.abort();
}

#[tokio::test]
#[ignore = "requires a multicast-capable network interface"]
async fn test_two_listeners_share_multicast_group() {
    let group: SocketAddr = "224.0.0.1:8890".parse().unwrap();
    let first = Registry::new();
    let second = Registry::new();
    let first_notifications = first.subscribe().await;
    let second_notifications = second.subscribe().await;

    let mut handles = Vec::new();
    for registry in [&first, &second] {
        let (ready_tx, ready_rx) = oneshot::channel();
        handles.push(tokio::spawn(run_discovery(group, registry.clone(), Some(ready_tx))));
        timeout(WAIT, ready_rx)
            .await
            .expect("listener never became ready")
            .expect("listener failed to bind the shared group");
    }

    announce(group, 1111).await.unwrap();

    for notifications in [&first_notifications, &second_notifications] {
        let discovered = timeout(WAIT, notifications.recv()).await.unwrap().unwrap();
        assert!(discovered.as_str().ends_with(":1111"));
    }
    for handle in handles {
        assert!(!handle.is_finished());
        handle.abort();
    }
}
