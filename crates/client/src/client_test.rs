//! Synchronous client tests
//!
//! The peer side of every test is an in-memory duplex stream driven with the
//! protocol crate's frame codec.

use std::time::Duration;

use serde_json::json;
use tokio::io::DuplexStream;

use lumber_protocol::{FrameReader, FrameWriter, Version};

use crate::{Client, ClientConfig, ClientError};

fn pair(config: ClientConfig) -> (Client, DuplexStream) {
    let (client_side, server_side) = tokio::io::duplex(64 * 1024);
    let client = Client::new(client_side, config).unwrap();
    (client, server_side)
}

fn uncompressed() -> ClientConfig {
    ClientConfig {
        compression_level: 0,
        ..Default::default()
    }
}

/// Encoder that refuses any event carrying a `"poison"` key
fn poison_encoder() -> crate::EventEncoder {
    std::sync::Arc::new(|event| {
        if event.get("poison").is_some() {
            Err("poisoned event".into())
        } else {
            Ok(serde_json::to_vec(event)?)
        }
    })
}

// ============================================================================
// Send
// ============================================================================

#[tokio::test]
async fn test_send_writes_window_and_json_frames() {
    let (mut client, server_side) = pair(uncompressed());

    let events = vec![json!({"a": 1}), json!({"b": 2})];
    let outcome = client.send(&events).await.unwrap();
    assert_eq!(outcome.sent, 2);
    assert_eq!(outcome.dropped, 0);
    assert!(outcome.dropped_err.is_none());
    assert_eq!(client.window_size(), 2);

    let mut reader = FrameReader::new(server_side);
    let (version, count) = reader.read_window_size().await.unwrap().unwrap();
    assert_eq!(version, Version::V2);
    assert_eq!(count, 2);

    let mut received = Vec::new();
    let max_seq = reader.read_frames(&mut received, 2).await.unwrap();
    assert_eq!(max_seq, 2);
    assert_eq!(received[0].json().unwrap().as_ref(), br#"{"a":1}"#);
    assert_eq!(received[1].json().unwrap().as_ref(), br#"{"b":2}"#);
}

#[tokio::test]
async fn test_send_compressed_round_trips() {
    let (mut client, server_side) = pair(ClientConfig {
        compression_level: 6,
        ..Default::default()
    });

    let events: Vec<_> = (0..50).map(|i| json!({"n": i})).collect();
    let outcome = client.send(&events).await.unwrap();
    assert_eq!(outcome.sent, 50);

    let mut reader = FrameReader::new(server_side);
    let (_, count) = reader.read_window_size().await.unwrap().unwrap();
    assert_eq!(count, 50);

    let mut received = Vec::new();
    let max_seq = reader.read_frames(&mut received, 50).await.unwrap();
    assert_eq!(max_seq, 50);
    assert_eq!(received.len(), 50);
    assert_eq!(received[49].json().unwrap().as_ref(), br#"{"n":49}"#);
}

#[tokio::test]
async fn test_send_empty_batch_writes_nothing() {
    let (mut client, server_side) = pair(uncompressed());

    let outcome = client.send(&[]).await.unwrap();
    assert_eq!(outcome.sent, 0);
    assert_eq!(outcome.dropped, 0);

    // a subsequent batch is the first thing the peer sees
    client.send(&[json!({"a": 1})]).await.unwrap();
    let mut reader = FrameReader::new(server_side);
    let (_, count) = reader.read_window_size().await.unwrap().unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_send_drops_unserializable_events_without_aborting() {
    let (mut client, server_side) = pair(ClientConfig {
        compression_level: 0,
        encoder: poison_encoder(),
        ..Default::default()
    });

    let events = vec![
        json!({"n": 1}),
        json!({"poison": true}),
        json!({"n": 3}),
    ];
    let outcome = client.send(&events).await.unwrap();
    assert_eq!(outcome.sent, 2);
    assert_eq!(outcome.dropped, 1);
    let err = outcome.dropped_err.unwrap();
    assert_eq!(err.index, 1);
    assert_eq!(err.reason().to_string(), "poisoned event");

    // survivors travel with contiguous sequence numbers
    let mut reader = FrameReader::new(server_side);
    let (_, count) = reader.read_window_size().await.unwrap().unwrap();
    assert_eq!(count, 2);
    let mut received = Vec::new();
    let max_seq = reader.read_frames(&mut received, 2).await.unwrap();
    assert_eq!(max_seq, 2);
    assert_eq!(received[0].json().unwrap().as_ref(), br#"{"n":1}"#);
    assert_eq!(received[1].json().unwrap().as_ref(), br#"{"n":3}"#);
}

#[tokio::test]
async fn test_send_with_every_event_dropped_skips_the_wire() {
    let (mut client, server_side) = pair(ClientConfig {
        compression_level: 0,
        encoder: poison_encoder(),
        ..Default::default()
    });

    let events = vec![json!({"poison": 1}), json!({"poison": 2})];
    let outcome = client.send(&events).await.unwrap();
    assert_eq!(outcome.sent, 0);
    assert_eq!(outcome.dropped, 2);
    assert_eq!(outcome.dropped_err.as_ref().unwrap().index, 0);

    // the client is still usable and nothing stale sits in the stream
    client.send(&[json!({"ok": true})]).await.unwrap();
    let mut reader = FrameReader::new(server_side);
    let (_, count) = reader.read_window_size().await.unwrap().unwrap();
    assert_eq!(count, 1);
}

// ============================================================================
// ACK wait
// ============================================================================

#[tokio::test]
async fn test_await_ack_follows_interim_acks() {
    let (mut client, server_side) = pair(uncompressed());

    let mut writer = FrameWriter::new(server_side);
    for seq in [0, 5, 10] {
        writer.write_ack(Version::V2, seq).await.unwrap();
    }
    writer.flush().await.unwrap();

    assert_eq!(client.await_ack(10).await.unwrap(), 10);
    assert_eq!(client.acked_seq(), 10);
}

#[tokio::test]
async fn test_await_ack_reports_progress_on_connection_loss() {
    let (mut client, server_side) = pair(uncompressed());

    let mut writer = FrameWriter::new(server_side);
    writer.write_ack(Version::V2, 0).await.unwrap();
    writer.write_ack(Version::V2, 5).await.unwrap();
    writer.flush().await.unwrap();
    drop(writer); // peer closes

    let err = client.await_ack(10).await.unwrap_err();
    assert_eq!(err.acked, 5);
    assert!(matches!(err.source, ClientError::Io(_)));
    assert_eq!(client.acked_seq(), 5);
}

#[tokio::test]
async fn test_await_ack_rejects_non_ack_frames() {
    let (mut client, server_side) = pair(uncompressed());

    let mut writer = FrameWriter::new(server_side);
    writer.write_window_size(Version::V2, 1).await.unwrap();
    writer.flush().await.unwrap();

    let err = client.await_ack(1).await.unwrap_err();
    assert!(matches!(err.source, ClientError::Protocol(_)));
}

#[tokio::test]
async fn test_await_ack_rejects_sequence_beyond_window() {
    let (mut client, server_side) = pair(uncompressed());

    let mut writer = FrameWriter::new(server_side);
    writer.write_ack(Version::V2, 11).await.unwrap();
    writer.flush().await.unwrap();

    let err = client.await_ack(10).await.unwrap_err();
    assert!(matches!(
        err.source,
        ClientError::Protocol(lumber_protocol::ProtocolError::AckOutOfWindow {
            seq: 11,
            window: 10
        })
    ));
}

#[tokio::test]
async fn test_await_ack_rejects_backwards_sequence() {
    let (mut client, server_side) = pair(uncompressed());

    let mut writer = FrameWriter::new(server_side);
    writer.write_ack(Version::V2, 5).await.unwrap();
    writer.write_ack(Version::V2, 3).await.unwrap();
    writer.flush().await.unwrap();

    let err = client.await_ack(10).await.unwrap_err();
    assert_eq!(err.acked, 5);
    assert!(matches!(
        err.source,
        ClientError::Protocol(lumber_protocol::ProtocolError::NonMonotonicAck { .. })
    ));
}

#[tokio::test]
async fn test_await_ack_times_out_without_acks() {
    let (mut client, _server_side) = pair(ClientConfig {
        compression_level: 0,
        timeout: Duration::from_millis(50),
        ..Default::default()
    });

    let err = client.await_ack(1).await.unwrap_err();
    assert_eq!(err.acked, 0);
    assert!(matches!(err.source, ClientError::Timeout(_)));
}

// ============================================================================
// Construction
// ============================================================================

#[tokio::test]
async fn test_new_rejects_invalid_config() {
    let (client_side, _server_side) = tokio::io::duplex(1024);
    let result = Client::new(
        client_side,
        ClientConfig {
            compression_level: 12,
            ..Default::default()
        },
    );
    assert!(matches!(result, Err(ClientError::Config(_))));
}
