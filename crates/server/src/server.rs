//! TCP accept loop
//!
//! Binds a listener, spawns a [`Session`] task per connection, and hands
//! every batch to the application through one bounded channel.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lumber_protocol::DEFAULT_MAX_FIELD_LEN;

use crate::batch::{Batch, ConnectionInfo};
use crate::error::ServerError;
use crate::reader::DEFAULT_BATCH_TIMEOUT;
use crate::session::{Session, SessionConfig, DEFAULT_KEEPALIVE};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (e.g. "0.0.0.0")
    pub address: String,

    /// Listen port
    pub port: u16,

    /// Per-batch read deadline
    pub timeout: Duration,

    /// Keep-alive interval while the application holds a batch
    pub keepalive: Duration,

    /// Per-field length cap handed to the frame codec
    pub max_field_len: usize,

    /// Capacity of the batch channel handed to the application; a full
    /// channel backpressures every connection
    pub queue_size: usize,

    /// TCP nodelay (disable Nagle's algorithm)
    pub nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".into(),
            port: 5044,
            timeout: DEFAULT_BATCH_TIMEOUT,
            keepalive: DEFAULT_KEEPALIVE,
            max_field_len: DEFAULT_MAX_FIELD_LEN,
            queue_size: 128,
            nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Create a config with a custom port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// The socket address to bind to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            timeout: self.timeout,
            keepalive: self.keepalive,
            max_field_len: self.max_field_len,
        }
    }
}

/// Lumberjack TCP server
pub struct Server {
    config: ServerConfig,
    batches: mpsc::Sender<Batch>,
}

impl Server {
    /// Create a server and the channel the application consumes batches from
    pub fn new(config: ServerConfig) -> (Self, mpsc::Receiver<Batch>) {
        let (batches, receiver) = mpsc::channel(config.queue_size);
        (Self { config, batches }, receiver)
    }

    /// Bind and accept connections until cancelled
    ///
    /// Each connection runs as its own session task. Session failures are
    /// logged and close only that connection.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ServerError> {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: bind_addr.clone(),
                source,
            })?;

        tracing::info!(address = %bind_addr, "lumberjack server listening");
        self.accept_loop(listener, cancel).await;
        tracing::info!(address = %bind_addr, "lumberjack server stopped");
        Ok(())
    }

    /// Bind to the configured address and return the bound socket address
    /// together with the accept future; useful when the port is 0
    pub async fn bind(
        self,
        cancel: CancellationToken,
    ) -> Result<(std::net::SocketAddr, impl std::future::Future<Output = ()>), ServerError> {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        tracing::info!(address = %local_addr, "lumberjack server listening");
        Ok((local_addr, self.accept_loop(listener, cancel)))
    }

    async fn accept_loop(self, listener: TcpListener, cancel: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    if self.config.nodelay {
                        let _ = stream.set_nodelay(true);
                    }

                    let session = Session::new(
                        stream,
                        ConnectionInfo::new(peer_addr),
                        self.batches.clone(),
                        self.config.session_config(),
                        cancel.child_token(),
                    );
                    tokio::spawn(async move {
                        tracing::debug!(peer = %peer_addr, "connection opened");
                        match session.run().await {
                            Ok(()) => tracing::debug!(peer = %peer_addr, "connection closed"),
                            Err(err) => {
                                tracing::debug!(peer = %peer_addr, error = %err, "session error");
                            }
                        }
                    });
                }
                Err(err) => {
                    // transient accept errors - log and continue
                    tracing::warn!(error = %err, "accept error");
                }
            }
        }
    }
}
