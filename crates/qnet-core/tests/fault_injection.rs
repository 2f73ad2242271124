//! Channel fault injection tests
//!
//! Exercises the switchboard under delay, loss, concurrent acknowledged
//! sends and shutdown:
//! - FIFO delivery per (sender, receiver) pair with a link delay
//! - Ack correlation when many sends are in flight
//! - Lossy links never acknowledge
//! - Shutdown resolves in-flight waits

use std::time::Duration;

use qnet_core::{ChannelConfig, Lane, MessageKind, NodeId, Switchboard};
use tokio::time::Instant;

// ============================================================================
// Helpers
// ============================================================================

fn id(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

fn delayed() -> ChannelConfig {
    ChannelConfig::testing().with_delay(Duration::from_millis(100))
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fifo_per_sender_with_delay() {
    let board = Switchboard::new(delayed());
    let alice = board.register(id("Alice")).unwrap();
    let bob = board.register(id("Bob")).unwrap();

    for i in 0u8..10 {
        alice
            .send(&id("Bob"), vec![i], MessageKind::Data, false)
            .await
            .unwrap();
    }

    for expected in 0u8..10 {
        let msg = bob
            .receive(&id("Alice"), Some(Duration::from_secs(1)))
            .await
            .expect("message should arrive");
        assert_eq!(msg.payload.as_ref(), &[expected]);
    }
    assert!(bob.receive(&id("Alice"), None).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_delay_is_applied() {
    let board = Switchboard::new(delayed());
    let alice = board.register(id("Alice")).unwrap();
    let bob = board.register(id("Bob")).unwrap();

    let start = Instant::now();
    alice
        .send(&id("Bob"), b"late".to_vec(), MessageKind::Data, false)
        .await
        .unwrap();

    assert!(bob.receive(&id("Alice"), None).await.is_none());
    let msg = bob.receive(&id("Alice"), Some(Duration::from_secs(1))).await;
    assert!(msg.is_some());
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_senders_are_queued_separately() {
    let board = Switchboard::new(ChannelConfig::testing());
    let alice = board.register(id("Alice")).unwrap();
    let eve = board.register(id("Eve")).unwrap();
    let bob = board.register(id("Bob")).unwrap();

    alice
        .send(&id("Bob"), b"from alice".to_vec(), MessageKind::Data, false)
        .await
        .unwrap();
    eve.send(&id("Bob"), b"from eve".to_vec(), MessageKind::Data, false)
        .await
        .unwrap();

    let from_eve = bob.receive(&id("Eve"), None).await.unwrap();
    assert_eq!(from_eve.payload.as_ref(), b"from eve");
    assert_eq!(bob.pending(&id("Alice"), Lane::Classical), 1);
}

// ============================================================================
// Acknowledgments
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_acked_sends_correlate() {
    let board = Switchboard::new(delayed());
    let alice = board.register(id("Alice")).unwrap();
    board.register(id("Bob")).unwrap();

    let mut handles = Vec::new();
    for i in 0u8..16 {
        let alice = alice.clone();
        handles.push(tokio::spawn(async move {
            alice
                .send_on(Lane::Epr, &id("Bob"), vec![i], MessageKind::Control, true)
                .await
        }));
    }

    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        let receipt = handle.await.unwrap().unwrap();
        assert!(receipt.ack_received);
        assert!(ids.insert(receipt.id));
    }
}

#[tokio::test(start_paused = true)]
async fn test_lossy_link_times_out_ack() {
    let config = ChannelConfig::testing()
        .with_loss_probability(1.0)
        .with_ack_timeout(Duration::from_secs(2));
    let board = Switchboard::new(config);
    let alice = board.register(id("Alice")).unwrap();
    let bob = board.register(id("Bob")).unwrap();

    let start = Instant::now();
    let receipt = alice
        .send(&id("Bob"), b"lost".to_vec(), MessageKind::Data, true)
        .await
        .unwrap();

    assert!(!receipt.ack_received);
    assert!(start.elapsed() >= Duration::from_secs(2));
    assert!(bob.receive(&id("Alice"), None).await.is_none());
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_wakes_receiver() {
    let board = Switchboard::new(ChannelConfig::testing());
    board.register(id("Alice")).unwrap();
    let bob = board.register(id("Bob")).unwrap();

    let waiter = {
        let bob = bob.clone();
        tokio::spawn(async move {
            bob.receive(&id("Alice"), Some(Duration::from_secs(3600)))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    let start = Instant::now();
    bob.shutdown();

    assert!(waiter.await.unwrap().is_none());
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_resolves_pending_ack() {
    let config = ChannelConfig::testing()
        .with_delay(Duration::from_secs(30))
        .with_ack_timeout(Duration::from_secs(3600));
    let board = Switchboard::new(config);
    let alice = board.register(id("Alice")).unwrap();
    board.register(id("Bob")).unwrap();

    let sender = {
        let alice = alice.clone();
        tokio::spawn(async move {
            alice
                .send(&id("Bob"), b"x".to_vec(), MessageKind::Data, true)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    board.shutdown_all();

    let receipt = sender.await.unwrap().unwrap();
    assert!(!receipt.ack_received);
}

#[tokio::test]
async fn test_closed_receiver_drops_frames() {
    let board = Switchboard::new(ChannelConfig::testing());
    let alice = board.register(id("Alice")).unwrap();
    let bob = board.register(id("Bob")).unwrap();

    bob.shutdown();
    let receipt = alice
        .send(&id("Bob"), b"x".to_vec(), MessageKind::Data, false)
        .await
        .unwrap();
    assert!(!receipt.ack_received);
    assert_eq!(bob.pending(&id("Alice"), Lane::Classical), 0);
}
