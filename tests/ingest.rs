//! End-to-end exercises of the registry + ingest worker + slot table
//! wired together over real loopback UDP sockets, without going through
//! the HTTP layer.
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use udp2http::entry::ProgramEntry;
use udp2http::limits::Limits;
use udp2http::registry::ProgramRegistry;
use udp2http::worker;

async fn spawn_entry(registry: &Arc<ProgramRegistry>, key: &str, shutdown: &CancellationToken) -> Arc<ProgramEntry> {
    registry.reserve(key).unwrap();
    let entry = Arc::new(ProgramEntry::init(key, registry.limits()).await.unwrap());
    registry.publish(key, entry.clone());
    tokio::spawn(worker::run(entry.clone(), registry.clone(), shutdown.clone()));
    entry
}

fn free_addr() -> std::net::SocketAddr {
    // Port 0 asks the OS to pick; bind once to learn the chosen port, then
    // drop the socket so the worker can rebind it.
    let sock = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    sock.local_addr().unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn single_client_receives_every_datagram_and_pid_counts_match() {
    let registry = Arc::new(ProgramRegistry::new(Limits::default()));
    let shutdown = CancellationToken::new();
    let addr = free_addr();
    let key = addr.to_string();

    let entry = spawn_entry(&registry, &key, &shutdown).await;

    let (_idx, mut rx) = {
        let mut state = entry.state.lock().await;
        state.slots.add_stream("127.0.0.1:9".parse().unwrap()).unwrap()
    };
    registry.put(&entry);

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut datagram = vec![0u8; 188 * 7];
    for packet in datagram.chunks_exact_mut(188) {
        packet[0] = 0x47;
        packet[1] = 0x01; // pid 256 high bits
        packet[2] = 0x00; // pid 256 low bits
    }

    for _ in 0..10 {
        sender.send_to(&datagram, addr).await.unwrap();
    }

    let mut received = 0usize;
    while received < 10 {
        let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a datagram")
            .expect("channel closed unexpectedly");
        assert_eq!(got.len(), 188 * 7);
        received += 1;
    }

    assert_eq!(entry.pid_table.pid(256).count(), 70);

    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn silent_source_produces_null_packet_filler() {
    let registry = Arc::new(ProgramRegistry::new(Limits::default()));
    let shutdown = CancellationToken::new();
    let addr = free_addr();
    let key = addr.to_string();

    let entry = spawn_entry(&registry, &key, &shutdown).await;

    let (_idx, mut rx) = {
        let mut state = entry.state.lock().await;
        state.slots.add_stream("127.0.0.1:9".parse().unwrap()).unwrap()
    };
    registry.put(&entry);

    let datagram = tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("timed out waiting for filler")
        .expect("channel closed unexpectedly");

    for packet in datagram.chunks_exact(188) {
        assert_eq!(&packet[0..4], &[0x47, 0x1F, 0xFF, 0x00]);
    }

    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn two_clients_on_the_same_source_both_see_the_same_datagram() {
    let registry = Arc::new(ProgramRegistry::new(Limits::default()));
    let shutdown = CancellationToken::new();
    let addr = free_addr();
    let key = addr.to_string();

    let entry = spawn_entry(&registry, &key, &shutdown).await;

    let (mut rx_a, mut rx_b) = {
        let mut state = entry.state.lock().await;
        let (_i1, rx1) = state.slots.add_stream("127.0.0.1:9".parse().unwrap()).unwrap();
        let (_i2, rx2) = state.slots.add_stream("127.0.0.1:10".parse().unwrap()).unwrap();
        (rx1, rx2)
    };
    registry.put(&entry);

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut datagram = vec![0xABu8; 188 * 7];
    datagram[0] = 0x47;
    sender.send_to(&datagram, addr).await.unwrap();

    let a = tokio::time::timeout(Duration::from_secs(2), rx_a.recv())
        .await
        .unwrap()
        .unwrap();
    let b = tokio::time::timeout(Duration::from_secs(2), rx_b.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a, b);

    shutdown.cancel();
}
