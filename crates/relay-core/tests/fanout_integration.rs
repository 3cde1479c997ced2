//! End-to-end relay scenarios driven through the public API.
//!
//! # Purpose
//!
//! Each test wires a real [`RelayHub`] and [`RelayLoop`] together and drives
//! clients through [`handle_connection`], using [`MockConnection`] to play
//! the remote peers.  This is exactly what `relay-server` does per accepted
//! socket, minus the WebSocket framing.
//!
//! Covered:
//!
//! - payload fidelity across several subscribers (bytes and kind unchanged);
//! - late joiners only see payloads accepted after they registered;
//! - a subscriber vanishing mid-stream does not disturb the others;
//! - an invalid role is rejected and leaves the registry untouched;
//! - two publishers, each payload delivered exactly once;
//! - `both` clients and the subscriber-to-publisher forwarding variant.

use std::sync::Arc;
use std::time::Duration;

use relay_core::connection::mock::MockConnection;
use relay_core::{
    handle_connection, ClientRole, Connection, HubConfig, MessageKind, RelayError, RelayHub,
    RelayMessage, Role, SessionEnd, SessionSummary,
};
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(2);

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Starts a hub with its relay loop running in the background.
fn start_hub(config: HubConfig) -> (Arc<RelayHub>, JoinHandle<()>) {
    let (hub, relay_loop) = RelayHub::new(config);
    let worker = tokio::spawn(relay_loop.run());
    (hub, worker)
}

/// Runs `handle_connection` for `conn` in its own task and waits until the
/// client shows up in the registry under `expect_role`.
async fn connect(
    hub: &Arc<RelayHub>,
    conn: &Arc<MockConnection>,
    role_param: &'static str,
    expect_role: Role,
) -> JoinHandle<Result<SessionSummary, RelayError>> {
    let hub_task = Arc::clone(hub);
    let conn_task: Arc<dyn Connection> = Arc::clone(conn) as Arc<dyn Connection>;
    let session = tokio::spawn(async move {
        handle_connection(&hub_task, conn_task, Some(role_param)).await
    });

    for _ in 0..400 {
        if hub.registry().contains(conn.id(), expect_role) {
            return session;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("client {} never registered as {expect_role}", conn.id());
}

// ── Scenario tests ────────────────────────────────────────────────────────────

/// One publisher sends a 4-byte binary payload; both subscribers receive the
/// identical bytes as a binary message.
#[tokio::test]
async fn test_binary_payload_reaches_every_subscriber_unchanged() {
    // Arrange
    let (hub, _worker) = start_hub(HubConfig::default());
    let sub1 = MockConnection::new();
    let sub2 = MockConnection::new();
    let _s1 = connect(&hub, &sub1, "listen", Role::Subscriber).await;
    let _s2 = connect(&hub, &sub2, "listen", Role::Subscriber).await;
    let publisher = MockConnection::new();
    let pub_session = connect(&hub, &publisher, "broadcast", Role::Publisher).await;

    // Act
    publisher.push(RelayMessage::binary(vec![0xDE, 0xAD, 0xBE, 0xEF]));

    // Assert
    for sub in [&sub1, &sub2] {
        let got = sub.wait_for_sent(1, WAIT).await;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind, MessageKind::Binary);
        assert_eq!(got[0].payload, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }
    assert!(publisher.sent().is_empty(), "publishers never receive fan-out");

    publisher.hang_up();
    let summary = pub_session.await.unwrap().unwrap();
    assert_eq!(summary.messages_forwarded, 1);
}

/// A subscriber that joins between two payloads receives only the second.
#[tokio::test]
async fn test_late_subscriber_sees_only_later_payloads() {
    // Arrange
    let (hub, _worker) = start_hub(HubConfig::default());
    let early = MockConnection::new();
    let _early_session = connect(&hub, &early, "listen", Role::Subscriber).await;
    let publisher = MockConnection::new();
    let _pub_session = connect(&hub, &publisher, "broadcast", Role::Publisher).await;

    // Act: first payload is fully delivered before the late subscriber joins.
    publisher.push(RelayMessage::text("P1"));
    assert_eq!(early.wait_for_sent(1, WAIT).await.len(), 1);

    let late = MockConnection::new();
    let _late_session = connect(&hub, &late, "listen", Role::Subscriber).await;
    publisher.push(RelayMessage::text("P2"));

    // Assert
    assert_eq!(
        early.wait_for_sent(2, WAIT).await,
        vec![RelayMessage::text("P1"), RelayMessage::text("P2")]
    );
    assert_eq!(late.wait_for_sent(1, WAIT).await, vec![RelayMessage::text("P2")]);
}

/// One of three subscribers disappears; the other two keep receiving and the
/// dead one is removed from the registry.
#[tokio::test]
async fn test_subscriber_failure_is_isolated() {
    // Arrange
    let (hub, _worker) = start_hub(HubConfig::default());
    let subs: Vec<_> = (0..3).map(|_| MockConnection::new()).collect();
    let mut sessions = Vec::new();
    for sub in &subs {
        sessions.push(connect(&hub, sub, "listen", Role::Subscriber).await);
    }
    let publisher = MockConnection::new();
    let _pub_session = connect(&hub, &publisher, "broadcast", Role::Publisher).await;

    // Act: the middle subscriber's transport breaks before the payload.
    subs[1].set_fail_sends(true);
    publisher.push(RelayMessage::text("payload"));

    // Assert
    assert_eq!(subs[0].wait_for_sent(1, WAIT).await, vec![RelayMessage::text("payload")]);
    assert_eq!(subs[2].wait_for_sent(1, WAIT).await, vec![RelayMessage::text("payload")]);
    assert!(subs[1].wait_closed(WAIT).await);

    // The failed subscriber's own handler wakes up and finishes teardown.
    let broken_session = sessions.remove(1);
    let summary = tokio::time::timeout(WAIT, broken_session)
        .await
        .expect("handler of the failed subscriber must finish")
        .unwrap()
        .unwrap();
    assert_eq!(summary.end, SessionEnd::PeerClosed);
    assert!(!hub.registry().contains(subs[1].id(), Role::Subscriber));
    assert_eq!(hub.registry().subscriber_count(), 2);

    // Later payloads still reach the survivors.
    publisher.push(RelayMessage::text("after"));
    assert_eq!(subs[0].wait_for_sent(2, WAIT).await.len(), 2);
    assert_eq!(subs[2].wait_for_sent(2, WAIT).await.len(), 2);
}

/// A client asking for `mode=dance` is closed and never registered.
#[tokio::test]
async fn test_unrecognised_role_is_rejected() {
    let (hub, _worker) = start_hub(HubConfig::default());
    let conn = MockConnection::new();

    let result = handle_connection(&hub, conn.clone(), Some("dance")).await;

    assert_eq!(result, Err(RelayError::InvalidRole("dance".to_string())));
    assert!(conn.is_closed());
    assert_eq!(hub.registry().publisher_count(), 0);
    assert_eq!(hub.registry().subscriber_count(), 0);
}

/// Role values are matched exactly; `Broadcast` is not `broadcast`.
#[tokio::test]
async fn test_role_matching_is_case_sensitive() {
    let (hub, _worker) = start_hub(HubConfig::default());
    let conn = MockConnection::new();

    let result = handle_connection(&hub, conn.clone(), Some("Broadcast")).await;

    assert!(matches!(result, Err(RelayError::InvalidRole(_))));
    assert!(conn.is_closed());
}

/// Two publishers send "A" and "B"; the subscriber gets each exactly once.
#[tokio::test]
async fn test_two_publishers_each_payload_delivered_once() {
    // Arrange
    let (hub, _worker) = start_hub(HubConfig::default());
    let sub = MockConnection::new();
    let _sub_session = connect(&hub, &sub, "listen", Role::Subscriber).await;
    let pub_a = MockConnection::new();
    let pub_b = MockConnection::new();
    let _a = connect(&hub, &pub_a, "broadcast", Role::Publisher).await;
    let _b = connect(&hub, &pub_b, "broadcast", Role::Publisher).await;

    // Act
    pub_a.push(RelayMessage::text("A"));
    pub_b.push(RelayMessage::text("B"));

    // Assert: order between publishers is unspecified, so compare as a set.
    let mut got: Vec<_> = sub
        .wait_for_sent(2, WAIT)
        .await
        .into_iter()
        .map(|m| m.payload)
        .collect();
    got.sort();
    assert_eq!(got, vec![b"A".to_vec(), b"B".to_vec()]);

    // Nothing extra trickles in afterwards.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sub.sent().len(), 2);
}

/// Payloads from one publisher arrive in the order they were sent.
#[tokio::test]
async fn test_per_publisher_order_is_preserved() {
    let (hub, _worker) = start_hub(HubConfig::default());
    let sub = MockConnection::new();
    let _sub_session = connect(&hub, &sub, "subscriber", Role::Subscriber).await;
    let publisher = MockConnection::new();
    let _pub_session = connect(&hub, &publisher, "publisher", Role::Publisher).await;

    let expected: Vec<_> = (0..50).map(|i| RelayMessage::text(format!("m{i}"))).collect();
    for m in &expected {
        publisher.push(m.clone());
    }

    assert_eq!(sub.wait_for_sent(expected.len(), WAIT).await, expected);
}

/// A `both` client receives its own payloads and those of other publishers.
#[tokio::test]
async fn test_both_role_client_publishes_and_receives() {
    // Arrange
    let (hub, _worker) = start_hub(HubConfig::default());
    let both = MockConnection::new();
    let both_session = connect(&hub, &both, "both", Role::Publisher).await;
    assert!(hub.registry().contains(both.id(), Role::Subscriber));
    let sub = MockConnection::new();
    let _sub_session = connect(&hub, &sub, "listen", Role::Subscriber).await;

    // Act
    both.push(RelayMessage::text("echo"));

    // Assert
    assert_eq!(both.wait_for_sent(1, WAIT).await, vec![RelayMessage::text("echo")]);
    assert_eq!(sub.wait_for_sent(1, WAIT).await, vec![RelayMessage::text("echo")]);

    both.hang_up();
    let summary = both_session.await.unwrap().unwrap();
    assert_eq!(summary.role, ClientRole::Both);
    assert!(!hub.registry().contains(both.id(), Role::Publisher));
    assert!(!hub.registry().contains(both.id(), Role::Subscriber));
}

/// With forwarding enabled, subscriber payloads reach publishers only.
#[tokio::test]
async fn test_subscriber_messages_forwarded_to_publishers_when_enabled() {
    // Arrange
    let config = HubConfig {
        forward_subscriber_messages: true,
        ..HubConfig::default()
    };
    let (hub, _worker) = start_hub(config);
    let publisher = MockConnection::new();
    let _pub_session = connect(&hub, &publisher, "broadcast", Role::Publisher).await;
    let sub = MockConnection::new();
    let other_sub = MockConnection::new();
    let _sub_session = connect(&hub, &sub, "listen", Role::Subscriber).await;
    let _other_session = connect(&hub, &other_sub, "listen", Role::Subscriber).await;

    // Act
    sub.push(RelayMessage::binary(vec![7, 7]));

    // Assert
    assert_eq!(publisher.wait_for_sent(1, WAIT).await, vec![RelayMessage::binary(vec![7, 7])]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(other_sub.sent().is_empty());
    assert!(sub.sent().is_empty());
}

/// Dropping the hub and every handler lets the relay loop finish.
#[tokio::test]
async fn test_relay_loop_stops_when_hub_is_dropped() {
    let (hub, worker) = start_hub(HubConfig::default());
    let conn = MockConnection::new();
    conn.push(RelayMessage::text("x"));
    conn.hang_up();
    handle_connection(&hub, conn, Some("broadcast")).await.unwrap();

    drop(hub);

    tokio::time::timeout(WAIT, worker)
        .await
        .expect("relay loop must stop once the queue has no senders")
        .unwrap();
}
