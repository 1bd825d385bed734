use crate::*;

use lanchatd::ChatManager;

/// B is already up; A starts and announces. B registers A and replies, so A
/// learns about B without waiting for B's next broadcast.
#[tokio::test]
async fn test_two_hosts_discover_each_other() -> Result<()> {
    if !loopback_aliases_available() {
        eprintln!("SKIP: cannot bind {HOST_B}");
        return Ok(());
    }

    let ports = free_ports();
    let a = ChatManager::new(host_config(HOST_A, HOST_B, ports));
    let b = ChatManager::new(host_config(HOST_B, HOST_A, ports));
    let mut rx_a = a.subscribe();
    let mut rx_b = b.subscribe();

    b.start().await?;
    a.start().await?;

    wait_for(&mut rx_b, "B to see A online", peer_update(HOST_A, true)).await?;
    wait_for(&mut rx_a, "A to see B online", peer_update(HOST_B, true)).await?;

    let on_a = a.registry().get(&HOST_B).context("B missing on A")?;
    assert!(on_a.is_online && on_a.is_known);
    assert!(on_a.last_online.is_some());

    // Exactly one record per address, and never ourselves.
    assert_eq!(a.peers().len(), 1);
    assert_eq!(b.peers().len(), 1);
    assert!(a.registry().get(&HOST_A).is_none());

    a.stop().await;
    b.stop().await;
    Ok(())
}

/// Neither host's startup hello reaches the other; a manual discover does.
#[tokio::test]
async fn test_manual_discover_finds_quiet_peer() -> Result<()> {
    if !loopback_aliases_available() {
        eprintln!("SKIP: cannot bind {HOST_B}");
        return Ok(());
    }

    let ports = free_ports();
    let a = ChatManager::new(host_config(HOST_A, HOST_B, ports));
    let b = ChatManager::new(host_config(HOST_B, NOWHERE, ports));
    let mut rx_a = a.subscribe();

    // A announces into the void: B is not up yet.
    a.start().await?;
    b.start().await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(a.peers().is_empty());
    assert!(b.peers().is_empty());

    assert!(a.discover().await?);
    wait_for(&mut rx_a, "reply from B", peer_update(HOST_B, true)).await?;
    assert!(b.registry().get(&HOST_A).context("A missing on B")?.is_online);

    a.stop().await;
    b.stop().await;
    Ok(())
}

/// A peer that stops talking is demoted once the timeout passes, and stays
/// in the registry as known.
#[tokio::test]
async fn test_silent_peer_goes_offline() -> Result<()> {
    if !loopback_aliases_available() {
        eprintln!("SKIP: cannot bind {HOST_B}");
        return Ok(());
    }

    let ports = free_ports();
    let mut config_a = host_config(HOST_A, HOST_B, ports);
    config_a.timing.peer_timeout_secs = 1;
    let a = ChatManager::new(config_a);
    let b = ChatManager::new(host_config(HOST_B, HOST_A, ports));
    let mut rx_a = a.subscribe();

    b.start().await?;
    a.start().await?;
    wait_for(&mut rx_a, "A to see B online", peer_update(HOST_B, true)).await?;

    b.stop().await;
    wait_for(&mut rx_a, "B demoted", peer_update(HOST_B, false)).await?;

    let peer = a.registry().get(&HOST_B).context("B dropped from registry")?;
    assert!(!peer.is_online);
    assert!(peer.is_known);

    a.stop().await;
    Ok(())
}
