use crate::*;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use lanchatd::{ChatManager, ManagerState};

/// After stop both ports can be bound again by someone else.
#[tokio::test]
async fn test_stop_releases_sockets() -> Result<()> {
    let ports = free_ports();
    let a = ChatManager::new(host_config(HOST_A, HOST_A, ports));

    a.start().await?;
    assert_eq!(a.state(), ManagerState::Running);
    a.stop().await;
    assert_eq!(a.state(), ManagerState::Stopped);

    tokio::net::TcpListener::bind((HOST_A, ports.1))
        .await
        .context("message port still held")?;
    Ok(())
}

/// Two racing starts bring chat up once.
#[tokio::test]
async fn test_concurrent_start_runs_once() -> Result<()> {
    let ports = free_ports();
    let a = ChatManager::new(host_config(HOST_A, HOST_A, ports));
    let mut rx = a.subscribe();

    let (first, second) = tokio::join!(a.start(), a.start());
    first?;
    second?;
    assert_eq!(a.state(), ManagerState::Running);

    a.stop().await;
    let started = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, ChatEvent::StatusChanged(s) if s.contains("started")))
        .count();
    assert_eq!(started, 1);
    Ok(())
}

/// A peer holding a half-written connection open does not hold up stop.
#[tokio::test]
async fn test_stop_does_not_wait_on_stalled_peer() -> Result<()> {
    let ports = free_ports();
    let a = ChatManager::new(host_config(HOST_A, HOST_A, ports));
    a.start().await?;

    let mut stalled = TcpStream::connect((HOST_A, ports.1)).await?;
    stalled.write_all(b"{\"signature\":\"SOCHO").await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(2), a.stop())
        .await
        .context("stop hung on a stalled connection")?;
    assert_eq!(a.state(), ManagerState::Stopped);
    drop(stalled);
    Ok(())
}

/// Peers restored from history are known and offline, and starting chat
/// does not change that until they are actually heard from.
#[tokio::test]
async fn test_restored_peers_survive_start() -> Result<()> {
    let ports = free_ports();
    let a = ChatManager::new(host_config(HOST_A, HOST_A, ports));
    let remembered = Ipv4Addr::new(192, 168, 1, 20);

    a.restore_peer(remembered);
    a.start().await?;

    let peers = a.peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].address, remembered);
    assert!(peers[0].is_known);
    assert!(!peers[0].is_online);
    assert!(peers[0].last_online.is_none());

    a.stop().await;
    Ok(())
}
