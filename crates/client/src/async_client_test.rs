//! Async client tests
//!
//! The peer is an in-memory ACK server task: it reads windows with the
//! protocol codec and answers ACK frames, either immediately or when the
//! test releases them.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use lumber_protocol::{FrameReader, FrameWriter, Version};

use crate::{AsyncClient, Client, ClientConfig, ClientError};

/// Callback completions observed by a test, in invocation order
type Completions = mpsc::UnboundedReceiver<(usize, u32, Option<ClientError>)>;

fn observer() -> (
    mpsc::UnboundedSender<(usize, u32, Option<ClientError>)>,
    Completions,
) {
    mpsc::unbounded_channel()
}

fn callback(
    tx: &mpsc::UnboundedSender<(usize, u32, Option<ClientError>)>,
    id: usize,
) -> impl FnOnce(u32, Option<ClientError>) + Send + 'static {
    let tx = tx.clone();
    move |seq, err| {
        let _ = tx.send((id, seq, err));
    }
}

fn new_client(inflight: usize, config: ClientConfig) -> (AsyncClient, DuplexStream) {
    let (client_side, server_side) = tokio::io::duplex(256 * 1024);
    let client = AsyncClient::new(Client::new(client_side, config).unwrap(), inflight).unwrap();
    (client, server_side)
}

/// ACK server that confirms every window as soon as it arrives
fn auto_ack_server(server_side: DuplexStream) {
    tokio::spawn(async move {
        let (read, write) = tokio::io::split(server_side);
        let mut reader = FrameReader::new(read);
        let mut writer = FrameWriter::new(write);
        while let Ok(Some((version, count))) = reader.read_window_size().await {
            if count == 0 {
                continue;
            }
            let mut events = Vec::new();
            if reader.read_frames(&mut events, count as usize).await.is_err() {
                return;
            }
            if writer.write_ack(version, count).await.is_err() {
                return;
            }
            let _ = writer.flush().await;
        }
    });
}

/// ACK server that holds every confirmation until the test releases it
fn gated_ack_server(server_side: DuplexStream) -> mpsc::UnboundedSender<()> {
    let (gate_tx, mut gate_rx) = mpsc::unbounded_channel::<()>();
    tokio::spawn(async move {
        let (read, write) = tokio::io::split(server_side);
        let mut reader = FrameReader::new(read);
        let mut writer = FrameWriter::new(write);
        while let Ok(Some((version, count))) = reader.read_window_size().await {
            if count == 0 {
                continue;
            }
            let mut events = Vec::new();
            if reader.read_frames(&mut events, count as usize).await.is_err() {
                return;
            }
            if gate_rx.recv().await.is_none() {
                return;
            }
            if writer.write_ack(version, count).await.is_err() {
                return;
            }
            let _ = writer.flush().await;
        }
    });
    gate_tx
}

// ============================================================================
// Happy path and ordering
// ============================================================================

#[tokio::test]
async fn test_send_completes_with_acked_count() {
    let (mut client, server_side) = new_client(4, ClientConfig::default());
    auto_ack_server(server_side);
    let (tx, mut done) = observer();

    client
        .send(callback(&tx, 0), &[json!({"a": 1}), json!({"b": 2})])
        .await
        .unwrap();

    let (id, seq, err) = done.recv().await.unwrap();
    assert_eq!(id, 0);
    assert_eq!(seq, 2);
    assert!(err.is_none());

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_callbacks_fire_in_submission_order() {
    let (mut client, server_side) = new_client(8, ClientConfig::default());
    auto_ack_server(server_side);
    let (tx, mut done) = observer();

    for i in 0..5 {
        let events: Vec<_> = (0..=i).map(|n| json!({"n": n})).collect();
        client.send(callback(&tx, i), &events).await.unwrap();
    }

    for expected in 0..5 {
        let (id, seq, err) = done.recv().await.unwrap();
        assert_eq!(id, expected);
        assert_eq!(seq, (expected + 1) as u32);
        assert!(err.is_none());
    }

    client.close().await.unwrap();
}

// ============================================================================
// Backpressure
// ============================================================================

#[tokio::test]
async fn test_inflight_limit_blocks_next_send() {
    let (mut client, server_side) = new_client(2, ClientConfig::default());
    let gate = gated_ack_server(server_side);
    let (tx, mut done) = observer();

    client.send(callback(&tx, 0), &[json!({"n": 0})]).await.unwrap();
    client.send(callback(&tx, 1), &[json!({"n": 1})]).await.unwrap();

    // both slots taken: the third send must block
    let blocked = timeout(
        Duration::from_millis(100),
        client.send(callback(&tx, 2), &[json!({"n": 2})]),
    )
    .await;
    assert!(blocked.is_err(), "third send should block at inflight=2");

    // release one ACK: exactly one slot frees and the send goes through
    gate.send(()).unwrap();
    let (id, seq, err) = done.recv().await.unwrap();
    assert_eq!((id, seq), (0, 1));
    assert!(err.is_none());

    timeout(
        Duration::from_millis(1000),
        client.send(callback(&tx, 2), &[json!({"n": 2})]),
    )
    .await
    .expect("send should unblock after one ACK")
    .unwrap();

    gate.send(()).unwrap();
    gate.send(()).unwrap();
    let (id, _, _) = done.recv().await.unwrap();
    assert_eq!(id, 1);
    let (id, _, _) = done.recv().await.unwrap();
    assert_eq!(id, 2);

    client.close().await.unwrap();
}

// ============================================================================
// Close and failure fan-out
// ============================================================================

#[tokio::test]
async fn test_close_fails_every_pending_send_in_order() {
    let (mut client, server_side) = new_client(4, ClientConfig::default());
    // server reads but never ACKs
    let _gate = gated_ack_server(server_side);
    let (tx, mut done) = observer();

    for i in 0..3 {
        client.send(callback(&tx, i), &[json!({"n": i})]).await.unwrap();
    }

    client.close().await.unwrap();

    for expected in 0..3 {
        let (id, _, err) = done.recv().await.unwrap();
        assert_eq!(id, expected);
        assert!(err.is_some(), "pending send {expected} must fail on close");
    }

    // exactly three callbacks: no duplicates after the drain
    drop(tx);
    assert!(done.recv().await.is_none());
}

#[tokio::test]
async fn test_send_after_close_is_rejected() {
    let (mut client, server_side) = new_client(2, ClientConfig::default());
    auto_ack_server(server_side);

    client.close().await.unwrap();

    let (tx, _done) = observer();
    let err = client
        .send(callback(&tx, 0), &[json!({"n": 1})])
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Closed));
}

#[tokio::test]
async fn test_double_close_is_a_no_op() {
    let (mut client, server_side) = new_client(2, ClientConfig::default());
    auto_ack_server(server_side);

    client.close().await.unwrap();
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_peer_protocol_violation_poisons_the_client() {
    let (mut client, server_side) = new_client(2, ClientConfig::default());
    let (tx, mut done) = observer();

    // peer answers the ACK wait with a window frame
    tokio::spawn(async move {
        let (read, write) = tokio::io::split(server_side);
        let mut reader = FrameReader::new(read);
        let mut writer = FrameWriter::new(write);
        let (_, count) = reader.read_window_size().await.unwrap().unwrap();
        let mut events = Vec::new();
        reader.read_frames(&mut events, count as usize).await.unwrap();
        writer.write_window_size(Version::V2, 9).await.unwrap();
        writer.flush().await.unwrap();
        // keep the stream open while the client reacts
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    client.send(callback(&tx, 0), &[json!({"n": 1})]).await.unwrap();

    let (_, _, err) = done.recv().await.unwrap();
    assert!(matches!(err, Some(ClientError::Protocol(_))));

    // the failure is sticky: new sends are refused
    let err = client
        .send(callback(&tx, 1), &[json!({"n": 2})])
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Closed));

    client.close().await.unwrap();
}

// ============================================================================
// Serialization partialness
// ============================================================================

#[tokio::test]
async fn test_partial_serialization_counts_dropped_events_in_callback() {
    let encoder: crate::EventEncoder = Arc::new(|event| {
        if event.get("poison").is_some() {
            Err("poisoned event".into())
        } else {
            Ok(serde_json::to_vec(event)?)
        }
    });
    let (mut client, server_side) = new_client(
        2,
        ClientConfig {
            encoder,
            ..Default::default()
        },
    );
    auto_ack_server(server_side);
    let (tx, mut done) = observer();

    // 10 events, the 4th fails to serialize
    let events: Vec<_> = (0..10)
        .map(|i| {
            if i == 3 {
                json!({"poison": true})
            } else {
                json!({"n": i})
            }
        })
        .collect();

    let err = client.send(callback(&tx, 0), &events).await.unwrap_err();
    match err {
        ClientError::Serialization(err) => assert_eq!(err.index, 3),
        other => panic!("expected serialization error, got {other}"),
    }

    // 9 events were ACKed; the callback index includes the dropped one
    let (_, seq, err) = done.recv().await.unwrap();
    assert_eq!(seq, 10);
    assert!(err.is_none());

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_fully_dropped_batch_fails_fast_and_sticks() {
    let encoder: crate::EventEncoder = Arc::new(|event| {
        if event.get("poison").is_some() {
            Err("poisoned event".into())
        } else {
            Ok(serde_json::to_vec(event)?)
        }
    });
    let (mut client, server_side) = new_client(
        2,
        ClientConfig {
            encoder,
            ..Default::default()
        },
    );
    auto_ack_server(server_side);
    let (tx, mut done) = observer();

    let err = client
        .send(
            callback(&tx, 0),
            &[json!({"poison": 1}), json!({"poison": 2})],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Serialization(_)));

    // the callback reports the dropped count with the error attached
    let (_, seq, err) = done.recv().await.unwrap();
    assert_eq!(seq, 2);
    assert!(matches!(err, Some(ClientError::Serialization(_))));

    // the worker is now draining: a clean follow-up send completes with the
    // sticky error instead of waiting for an ACK
    client.send(callback(&tx, 1), &[json!({"c": 3})]).await.unwrap();
    let (id, _, err) = done.recv().await.unwrap();
    assert_eq!(id, 1);
    assert!(err.is_some());

    client.close().await.unwrap();
}
