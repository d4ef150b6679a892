//! Asynchronous client with bounded in-flight pipelining
//!
//! Wraps the synchronous [`Client`]: sends run on the caller's task, a
//! single ACK worker task awaits confirmations and fires completion
//! callbacks in submission order. A semaphore bounds the number of
//! unacknowledged batches; once `inflight` batches are pending, the next
//! `send` blocks until the worker completes one.
//!
//! The first terminal error is sticky: the worker stops awaiting ACKs and
//! drains every queued record with that error. Closing the client cancels
//! the in-flight ACK wait, shuts the connection down, and drains the same
//! way with [`ClientError::Closed`].

use std::sync::Arc;

use serde_json::Value;
use tokio::net::ToSocketAddrs;
use tokio::sync::mpsc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{AckHalf, Client, SendHalf};
use crate::config::ClientConfig;
use crate::error::{ClientError, SendError};

/// Completion callback for one async send
///
/// `seq` is the last acknowledged event index counting from 1 across the
/// submitted batch, including dropped events: a batch of 10 with 2 dropped
/// and 8 acknowledged completes with `seq == 10`.
///
/// Callbacks must not call [`AsyncClient::send`] synchronously on the same
/// client; doing so can deadlock against the in-flight bound.
pub type SendCallback = Box<dyn FnOnce(u32, Option<ClientError>) + Send + 'static>;

/// One queued ACK expectation
struct AckRecord {
    cb: SendCallback,
    /// Sequence the final ACK must reach; 0 when nothing reached the wire
    seq: u32,
    /// Events the codec refused, folded into the callback index
    dropped: u32,
    /// Error already known at send time
    err: Option<ClientError>,
    /// In-flight slot, released once the callback has run
    permit: OwnedSemaphorePermit,
}

/// Asynchronous lumberjack client
pub struct AsyncClient {
    send: SendHalf,
    queue: Option<mpsc::UnboundedSender<AckRecord>>,
    limit: Arc<Semaphore>,
    worker: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl AsyncClient {
    /// Wrap an existing synchronous client
    ///
    /// `inflight` is the maximum number of unacknowledged batches; it must
    /// be at least 1.
    pub fn new(client: Client, inflight: usize) -> Result<Self, ClientError> {
        if inflight == 0 {
            return Err(ClientError::Config("inflight must be at least 1"));
        }

        let (send, ack) = client.into_split();
        let (queue, records) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(ack_loop(ack, records, cancel.clone()));

        Ok(Self {
            send,
            queue: Some(queue),
            limit: Arc::new(Semaphore::new(inflight)),
            worker: Some(worker),
            cancel,
        })
    }

    /// Connect to a lumberjack endpoint over TCP
    pub async fn connect(
        addr: impl ToSocketAddrs,
        inflight: usize,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let client = Client::connect(addr, config).await?;
        Self::new(client, inflight)
    }

    /// Publish a batch, completing through `cb` once the peer ACKs it
    ///
    /// Blocks while `inflight` batches are already pending. The callback
    /// fires exactly once, in submission order relative to other sends.
    /// Send-time errors are returned immediately and still produce a
    /// callback; a partial serialization failure is returned as an error
    /// even though the surviving events are on the wire.
    pub async fn send<F>(&mut self, cb: F, events: &[Value]) -> Result<(), ClientError>
    where
        F: FnOnce(u32, Option<ClientError>) + Send + 'static,
    {
        let Some(queue) = self.queue.as_ref() else {
            return Err(ClientError::Closed);
        };
        if self.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }

        // backpressure: wait for an in-flight slot
        let permit = Arc::clone(&self.limit)
            .acquire_owned()
            .await
            .map_err(|_| ClientError::Closed)?;

        match self.send.send(events).await {
            Err(SendError { dropped, source }) => {
                let record = AckRecord {
                    cb: Box::new(cb),
                    seq: 0,
                    dropped: dropped as u32,
                    err: Some(source.clone()),
                    permit,
                };
                let _ = queue.send(record);
                Err(source)
            }
            Ok(outcome) => {
                let send_err = outcome.dropped_err.map(ClientError::Serialization);
                let record = AckRecord {
                    cb: Box::new(cb),
                    seq: outcome.sent,
                    dropped: outcome.dropped as u32,
                    // a fully dropped batch owes no ACK and completes with
                    // its serialization error; a partial one still waits
                    err: if outcome.sent == 0 {
                        send_err.clone()
                    } else {
                        None
                    },
                    permit,
                };
                let _ = queue.send(record);
                match send_err {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
        }
    }

    /// Close the client
    ///
    /// Unblocks the in-flight ACK wait, shuts the connection down, then
    /// waits for the worker to drain every pending record (each callback
    /// fires with an error). Subsequent closes are no-ops.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        let Some(queue) = self.queue.take() else {
            return Ok(());
        };

        self.cancel.cancel();
        self.limit.close();
        let result = self.send.shutdown().await;

        drop(queue);
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
        result
    }
}

impl Drop for AsyncClient {
    fn drop(&mut self) {
        // without this a dropped client would leave the worker parked on a
        // connection that nobody will close
        self.cancel.cancel();
        self.limit.close();
    }
}

/// Single worker: dequeues records in FIFO order and resolves them
async fn ack_loop(
    mut ack: AckHalf,
    mut records: mpsc::UnboundedReceiver<AckRecord>,
    cancel: CancellationToken,
) {
    let mut sticky: Option<ClientError> = None;

    while let Some(record) = records.recv().await {
        let AckRecord {
            cb,
            seq,
            dropped,
            err,
            permit,
        } = record;

        if err.is_some() || seq == 0 {
            cb(dropped, err.clone());
            drop(permit);
            if let Some(err) = err {
                sticky = Some(err);
                break;
            }
            continue;
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => None,
            result = ack.await_ack(seq) => Some(result),
        };

        match result {
            None => {
                // closed mid-wait; report progress made so far
                cb(ack.last_acked() + dropped, Some(ClientError::Closed));
                drop(permit);
                sticky = Some(ClientError::Closed);
                break;
            }
            Some(Ok(acked)) => {
                cb(acked + dropped, None);
                drop(permit);
            }
            Some(Err(ack_err)) => {
                // mark the client closed before completing the callback so
                // nothing new slips in between
                cancel.cancel();
                cb(ack_err.acked + dropped, Some(ack_err.source.clone()));
                drop(permit);
                sticky = Some(ack_err.source);
                break;
            }
        }
    }

    // drain pass: every remaining record completes with the sticky error,
    // end-of-stream if none
    let mut err = sticky.unwrap_or(ClientError::Closed);
    while let Some(record) = records.recv().await {
        if let Some(record_err) = record.err {
            err = record_err;
        }
        (record.cb)(0, Some(err.clone()));
    }
}
