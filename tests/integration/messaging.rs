use crate::*;

use lanchat_services::ChatEvent;
use lanchatd::{ChatManager, SendError};

/// A sends "ping" to B: B receives it with A as sender and itself as
/// recipient, and A reports the same message as sent.
#[tokio::test]
async fn test_ping_is_delivered() -> Result<()> {
    if !loopback_aliases_available() {
        eprintln!("SKIP: cannot bind {HOST_B}");
        return Ok(());
    }

    let ports = free_ports();
    let a = ChatManager::new(host_config(HOST_A, NOWHERE, ports));
    let b = ChatManager::new(host_config(HOST_B, NOWHERE, ports));
    let mut rx_a = a.subscribe();
    let mut rx_b = b.subscribe();
    a.start().await?;
    b.start().await?;

    let sent = a
        .send(&HOST_B.to_string(), "ping")
        .await?
        .context("non-empty send returned nothing")?;

    let ChatEvent::MessageReceived { message, sender } =
        wait_for(&mut rx_b, "ping on B", |e| {
            matches!(e, ChatEvent::MessageReceived { .. })
        })
        .await?
    else {
        unreachable!()
    };
    assert_eq!(sender, HOST_A);
    assert_eq!(message.sender_address, HOST_A);
    assert_eq!(message.recipient_address, HOST_B);
    assert_eq!(message.content, "ping");
    assert_eq!(message.timestamp_utc, sent.timestamp_utc);

    wait_for(&mut rx_a, "MessageSent on A", |e| {
        matches!(e, ChatEvent::MessageSent { message, target }
            if *target == HOST_B && *message == sent)
    })
    .await?;

    // Both sides now count each other as online, without any discovery.
    assert!(a.registry().get(&HOST_B).context("B missing on A")?.is_online);
    assert!(b.registry().get(&HOST_A).context("A missing on B")?.is_online);

    a.stop().await;
    b.stop().await;
    Ok(())
}

/// Nothing listens at the target: the caller gets a connect failure, the
/// peer is marked offline, and no `MessageSent` is raised.
#[tokio::test]
async fn test_send_to_absent_peer_fails() -> Result<()> {
    if !loopback_aliases_available() {
        eprintln!("SKIP: cannot bind {NOWHERE}");
        return Ok(());
    }

    let ports = free_ports();
    let a = ChatManager::new(host_config(HOST_A, HOST_A, ports));
    a.start().await?;
    a.registry().upsert(NOWHERE, true);
    let mut rx = a.subscribe();

    let err = a
        .send(&NOWHERE.to_string(), "anyone there?")
        .await
        .expect_err("send to an empty port must fail");
    assert!(matches!(err, SendError::Connect { .. }), "got {err:?}");
    assert!(err.is_unreachable());

    let peer = a.registry().get(&NOWHERE).context("peer vanished")?;
    assert!(!peer.is_online);

    let events = drain(&mut rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, ChatEvent::MessageSent { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, ChatEvent::StatusChanged(s) if s.contains(&NOWHERE.to_string()))));

    a.stop().await;
    Ok(())
}

/// Bad input is rejected before any socket is touched, running or not.
#[tokio::test]
async fn test_send_input_checks() -> Result<()> {
    let ports = free_ports();
    let a = ChatManager::new(host_config(HOST_A, HOST_A, ports));
    let mut rx = a.subscribe();

    assert!(matches!(a.send("", "hello").await, Err(SendError::EmptyTarget)));
    assert!(a.send("10.0.0.5", "").await?.is_none());

    a.start().await?;
    let _ = drain(&mut rx);

    assert!(matches!(a.send("  ", "hello").await, Err(SendError::EmptyTarget)));
    assert!(a.send("10.0.0.5", "   ").await?.is_none());
    assert!(matches!(
        a.send("not-an-address", "hello").await,
        Err(SendError::InvalidTarget(_))
    ));

    assert!(a.peers().is_empty());
    assert!(drain(&mut rx).is_empty());

    a.stop().await;
    Ok(())
}
