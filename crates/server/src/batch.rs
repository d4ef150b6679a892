//! ACK-able batches
//!
//! A [`Batch`] is the server-side materialization of one window. The
//! application receives it, processes the events, and calls [`Batch::ack`]
//! exactly once; the session holds an [`AckWaiter`] and writes the ACK frame
//! back to the client when the signal fires.
//!
//! The signal is a `watch` channel: `ack` is idempotent, any number of
//! waiters can observe it, and a waiter created after the ACK resolves
//! immediately. Dropping the batch without ACKing resolves waiters with an
//! error instead of hanging the session forever.

use std::net::SocketAddr;

use tokio::sync::watch;

use lumber_protocol::{Event, Version};

use crate::error::ServerError;

/// TLS metadata for connections fronted by a TLS terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsInfo {
    /// SNI server name presented by the peer
    pub server_name: Option<String>,
    /// Negotiated protocol version, e.g. "TLSv1.3"
    pub protocol: Option<String>,
}

/// Where a connection came from
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Remote address of the connection
    pub remote_addr: SocketAddr,
    /// TLS metadata, `None` for plaintext connections
    pub tls: Option<TlsInfo>,
}

impl ConnectionInfo {
    /// Describe a plaintext connection
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            tls: None,
        }
    }

    /// Describe a TLS-fronted connection
    pub fn with_tls(remote_addr: SocketAddr, tls: TlsInfo) -> Self {
        Self {
            remote_addr,
            tls: Some(tls),
        }
    }
}

/// An ACK-able batch of events read from one window
#[derive(Debug)]
pub struct Batch {
    events: Vec<Event>,
    seq: u32,
    version: Version,
    conn: ConnectionInfo,
    ack: watch::Sender<bool>,
}

impl Batch {
    pub(crate) fn new(events: Vec<Event>, seq: u32, version: Version, conn: ConnectionInfo) -> Self {
        Self {
            events,
            seq,
            version,
            conn,
            ack: watch::Sender::new(false),
        }
    }

    /// The events of this window, in arrival order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Take ownership of the events, leaving the batch ACK-able
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Sequence the ACK frame will carry: the highest sequence observed for
    /// v1 windows, the event count for v2 windows
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Protocol version of the window frame
    pub fn version(&self) -> Version {
        self.version
    }

    /// Remote address of the originating connection
    pub fn remote_addr(&self) -> SocketAddr {
        self.conn.remote_addr
    }

    /// TLS metadata of the originating connection, if any
    pub fn tls(&self) -> Option<&TlsInfo> {
        self.conn.tls.as_ref()
    }

    /// Number of events in the batch
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the batch holds no events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Acknowledge the batch, releasing every waiter
    ///
    /// Idempotent: acknowledging twice is a no-op.
    pub fn ack(&self) {
        self.ack.send_replace(true);
    }

    /// Create a waiter usable after the batch moves to the application
    pub fn acked(&self) -> AckWaiter {
        AckWaiter {
            rx: self.ack.subscribe(),
        }
    }
}

/// One-shot ACK signal observable by many waiters
#[derive(Debug, Clone)]
pub struct AckWaiter {
    rx: watch::Receiver<bool>,
}

impl AckWaiter {
    /// Wait until the batch is acknowledged
    ///
    /// Resolves immediately when the ACK already happened. Fails with
    /// [`ServerError::BatchDropped`] when the batch is dropped unACKed.
    pub async fn wait(&mut self) -> Result<(), ServerError> {
        self.rx
            .wait_for(|acked| *acked)
            .await
            .map(|_| ())
            .map_err(|_| ServerError::BatchDropped)
    }
}
