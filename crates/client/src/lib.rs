//! Lumberjack protocol client
//!
//! Two layers sit on top of one connection:
//!
//! - [`Client`] - the synchronous core. One batch at a time: [`Client::send`]
//!   serializes events and writes a window followed by data frames,
//!   [`Client::await_ack`] reads ACK frames until the window is confirmed.
//!   `&mut self` on both keeps the client non-reentrant by construction.
//! - [`AsyncClient`] - pipelining on top of the core. Up to `inflight`
//!   batches may be unacknowledged at once; the next send blocks until a
//!   slot frees (this is the backpressure mechanism). Completion callbacks
//!   fire strictly in submission order from a single ACK worker task.
//!
//! Events are [`serde_json::Value`]s encoded by a pluggable codec
//! ([`ClientConfig::encoder`], defaulting to `serde_json::to_vec`). An event
//! the codec rejects is dropped without consuming a sequence slot; the
//! surviving events still travel on the wire.
//!
//! # Example
//!
//! ```ignore
//! use lumber_client::{AsyncClient, ClientConfig};
//! use serde_json::json;
//!
//! let mut client = AsyncClient::connect("127.0.0.1:5044", 4, ClientConfig::default()).await?;
//! client
//!     .send(
//!         |seq, err| match err {
//!             None => println!("acked through {seq}"),
//!             Some(err) => eprintln!("publish failed: {err}"),
//!         },
//!         &[json!({"message": "hello"})],
//!     )
//!     .await?;
//! client.close().await?;
//! ```

mod async_client;
mod client;
mod config;
mod error;

pub use async_client::{AsyncClient, SendCallback};
pub use client::{Client, SendOutcome, Transport};
pub use config::{ClientConfig, EventEncoder, DEFAULT_COMPRESSION_LEVEL, DEFAULT_TIMEOUT};
pub use error::{AckError, BoxError, ClientError, SendError, SerializationError};

// Test modules - only compiled during testing
#[cfg(test)]
mod async_client_test;
#[cfg(test)]
mod client_test;
