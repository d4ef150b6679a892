//! Lumberjack protocol server
//!
//! Per-connection batch assembly and ACK propagation:
//!
//! - [`BatchReader`] turns one connection's frame stream into [`Batch`]es: a
//!   window header (awaited indefinitely) followed by data frames that must
//!   all arrive within one per-batch deadline
//! - [`Batch`] is the ACK-able unit handed to the application; calling
//!   [`Batch::ack`] exactly once releases the session to write the ACK frame
//!   back to the client
//! - [`Session`] runs the read -> deliver -> await-ACK -> write-ACK loop for
//!   one connection
//! - [`Server`] binds a TCP listener, spawns a session per connection, and
//!   surfaces batches on a bounded channel - a full channel backpressures
//!   the peers, since sessions stop reading new windows until the
//!   application catches up
//!
//! An application that never ACKs a batch stalls its session on purpose;
//! dropping a batch without ACKing it instead fails the session and closes
//! the connection.
//!
//! # Example
//!
//! ```ignore
//! use lumber_server::{Server, ServerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let (server, mut batches) = Server::new(ServerConfig::with_port(5044));
//! tokio::spawn(server.run(CancellationToken::new()));
//!
//! while let Some(batch) = batches.recv().await {
//!     process(batch.events());
//!     batch.ack();
//! }
//! ```

mod batch;
mod error;
mod reader;
mod server;
mod session;

pub use batch::{AckWaiter, Batch, ConnectionInfo, TlsInfo};
pub use error::ServerError;
pub use reader::{BatchReader, ReaderConfig, DEFAULT_BATCH_TIMEOUT};
pub use server::{Server, ServerConfig};
pub use session::{Session, SessionConfig, DEFAULT_KEEPALIVE};

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;
