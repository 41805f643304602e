//! Chunked binary (VST) transport connection.
//!
//! One connection owns one TCP channel. Submission is marshalled through a
//! single async mutex so connect, handshake, and frame writes never
//! interleave, and a dedicated reader task exclusively owns the read half
//! together with the chunk reassembly state. Requests are pipelined: each is
//! assigned the next monotonic message id and parked in the pending table
//! until the reader reassembles the response with the matching id — arrival
//! order is irrelevant.
//!
//! Any I/O error or protocol violation funnels into one idempotent teardown
//! routine: discard reassembly state, fail every pending slot, reset the id
//! counter, and flip the state to disconnected.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use futures::StreamExt;
use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, tcp::{OwnedReadHalf, OwnedWriteHalf}},
    sync::{Mutex, oneshot},
    time,
};
use tokio_util::{codec::{Encoder, FramedRead}, sync::CancellationToken};
use tracing::{debug, trace, warn};

use super::Connection;
use crate::{
    codec::{ChunkCodec, Chunker, MessageAssembler, PROTOCOL_MARKER},
    config::Authentication,
    error::TransportError,
    host::HostDescription,
    message,
    request::{Method, Request},
    response::Response,
};

type PendingTable = DashMap<u64, oneshot::Sender<Result<Response, TransportError>>>;

struct Writer {
    write: OwnedWriteHalf,
    shutdown: CancellationToken,
}

/// Transport connection speaking the chunked binary protocol.
pub struct VstConnection {
    host: HostDescription,
    auth: Authentication,
    chunk_size: usize,
    timeout: Duration,
    chunker: Chunker,
    pending: Arc<PendingTable>,
    connected: Arc<AtomicBool>,
    /// `None` while disconnected. Lock holders observe `CONNECTING` as
    /// waiting on the mutex; the in-flight connect completes before they run.
    writer: Mutex<Option<Writer>>,
}

impl VstConnection {
    /// Create a disconnected connection to `host`. The socket is opened
    /// lazily on first use or eagerly via [`VstConnection::establish`].
    #[must_use]
    pub fn new(
        host: HostDescription,
        auth: Authentication,
        chunk_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            host,
            auth,
            chunk_size,
            timeout,
            chunker: Chunker::new(chunk_size),
            pending: Arc::new(PendingTable::new()),
            connected: Arc::new(AtomicBool::new(false)),
            writer: Mutex::new(None),
        }
    }

    /// Connect and complete the handshake without sending a caller request.
    ///
    /// # Errors
    ///
    /// Returns any connect, protocol, or authentication error; partially
    /// acquired resources are released before surfacing it.
    pub async fn establish(&self) -> Result<(), TransportError> {
        let mut slot = self.writer.lock().await;
        self.connect_locked(&mut slot).await
    }

    async fn connect_locked(
        &self,
        slot: &mut Option<Writer>,
    ) -> Result<(), TransportError> {
        if slot.is_some() && self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        // A reader-observed failure leaves a stale writer behind; clear it
        // before opening the replacement session.
        if let Some(stale) = slot.take() {
            stale.shutdown.cancel();
        }
        self.chunker.reset();

        debug!(host = %self.host, "connecting");
        let stream = TcpStream::connect((self.host.host(), self.host.port())).await?;
        stream.set_nodelay(true)?;
        let (read, mut write) = stream.into_split();
        write.write_all(PROTOCOL_MARKER).await?;

        let shutdown = CancellationToken::new();
        tokio::spawn(read_loop(
            FramedRead::new(read, ChunkCodec::default()),
            Arc::clone(&self.pending),
            Arc::clone(&self.connected),
            shutdown.clone(),
        ));
        *slot = Some(Writer { write, shutdown });
        self.connected.store(true, Ordering::Release);

        if let Err(err) = self.handshake_locked(slot).await {
            self.teardown_locked(slot, Some("handshake failed"));
            return Err(err);
        }
        debug!(host = %self.host, "connected");
        Ok(())
    }

    /// Authenticate the fresh session, or confirm the server is equally
    /// unauthenticated via a harmless probe. Skipping both would leave an
    /// ambiguous state.
    async fn handshake_locked(
        &self,
        slot: &mut Option<Writer>,
    ) -> Result<(), TransportError> {
        let payload = match message::encode_authentication(&self.auth)? {
            Some(frame) => frame,
            None => message::encode_request(&probe_request())?,
        };
        let (message_id, rx) = self.send_locked(slot, payload).await?;
        let response = match time::timeout(self.timeout, rx).await {
            Err(_) => {
                self.pending.remove(&message_id);
                return Err(TransportError::Timeout {
                    timeout: self.timeout,
                });
            }
            Ok(Err(_)) => return Err(TransportError::ConnectionClosed),
            Ok(Ok(result)) => result?,
        };
        if response.is_success() {
            Ok(())
        } else {
            Err(TransportError::ConnectionFailed {
                reason: format!(
                    "handshake rejected with status {}",
                    response.response_code()
                ),
            })
        }
    }

    async fn send_locked(
        &self,
        slot: &mut Option<Writer>,
        payload: Bytes,
    ) -> Result<(u64, oneshot::Receiver<Result<Response, TransportError>>), TransportError> {
        let message_id = self.chunker.next_message_id();
        // Build the wire bytes before registering the pending slot: a framing
        // error here must not leave a stranded entry in the table.
        let chunks = self.chunker.chunk_message(message_id, &payload)?;
        let mut codec = ChunkCodec::new(self.chunk_size);
        let mut wire = BytesMut::new();
        for chunk in chunks {
            codec.encode(chunk, &mut wire)?;
        }

        let (tx, rx) = oneshot::channel();
        match self.pending.entry(message_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(TransportError::MessageIdInUse { message_id });
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(tx);
            }
        }

        let write_result = match slot.as_mut() {
            None => {
                self.pending.remove(&message_id);
                return Err(TransportError::ConnectionClosed);
            }
            Some(writer) => writer.write.write_all(&wire).await,
        };
        if let Err(err) = write_result {
            self.pending.remove(&message_id);
            self.teardown_locked(slot, Some("write failed"));
            return Err(err.into());
        }
        trace!(message_id, bytes = wire.len(), "message written");
        Ok((message_id, rx))
    }

    /// Idempotent per disconnect event: repeated calls observe the same
    /// terminal state.
    fn teardown_locked(&self, slot: &mut Option<Writer>, reason: Option<&str>) {
        if let Some(writer) = slot.take() {
            writer.shutdown.cancel();
        }
        self.connected.store(false, Ordering::Release);
        self.chunker.reset();
        match reason {
            Some(reason) => fail_pending(&self.pending, reason),
            None => close_pending(&self.pending),
        }
    }

    async fn disconnect(&self, reason: &str) {
        let mut slot = self.writer.lock().await;
        self.teardown_locked(&mut slot, Some(reason));
    }
}

#[async_trait]
impl Connection for VstConnection {
    async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        let payload = message::encode_request(&request)?;
        let (message_id, rx) = {
            let mut slot = self.writer.lock().await;
            self.connect_locked(&mut slot).await?;
            self.send_locked(&mut slot, payload).await?
        };

        match time::timeout(self.timeout, rx).await {
            Err(_) => {
                // The write stays in flight but the slot is abandoned; the
                // connection is treated as failed so the id is never awaited
                // by anyone else.
                self.pending.remove(&message_id);
                self.disconnect("request timed out").await;
                Err(TransportError::Timeout {
                    timeout: self.timeout,
                })
            }
            Ok(Err(_)) => Err(TransportError::ConnectionClosed),
            Ok(Ok(result)) => result,
        }
    }

    fn is_connected(&self) -> bool { self.connected.load(Ordering::Acquire) }

    async fn close(&self) {
        let mut slot = self.writer.lock().await;
        self.teardown_locked(&mut slot, None);
        debug!(host = %self.host, "connection closed");
    }
}

/// Lightweight authenticated request used when no credential is configured.
fn probe_request() -> Request {
    Request::builder("_system", Method::Get, "/_api/version").build()
}

fn fail_pending(pending: &PendingTable, reason: &str) {
    for message_id in pending.iter().map(|entry| *entry.key()).collect::<Vec<_>>() {
        if let Some((_, tx)) = pending.remove(&message_id) {
            let _ = tx.send(Err(TransportError::ConnectionFailed {
                reason: reason.to_owned(),
            }));
        }
    }
}

fn close_pending(pending: &PendingTable) {
    for message_id in pending.iter().map(|entry| *entry.key()).collect::<Vec<_>>() {
        if let Some((_, tx)) = pending.remove(&message_id) {
            let _ = tx.send(Err(TransportError::ConnectionClosed));
        }
    }
}


/// Reader task: exclusively owns the read half and all reassembly state for
/// one session, so chunk defragmentation is never concurrently mutated.
async fn read_loop(
    mut frames: FramedRead<OwnedReadHalf, ChunkCodec>,
    pending: Arc<PendingTable>,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    let mut assembler = MessageAssembler::with_default_limit();
    loop {
        let frame = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            frame = frames.next() => frame,
        };
        match frame {
            None => {
                debug!("connection closed by peer");
                connected.store(false, Ordering::Release);
                fail_pending(&pending, "connection closed by peer");
                break;
            }
            Some(Err(err)) => {
                warn!(error = %err, "read failed");
                connected.store(false, Ordering::Release);
                fail_pending(&pending, &err.to_string());
                break;
            }
            Some(Ok(chunk)) => match assembler.push(chunk) {
                Ok(None) => {}
                Ok(Some((message_id, payload))) => {
                    let Some((_, tx)) = pending.remove(&message_id) else {
                        // Abandoned by a timed-out caller, or unsolicited.
                        trace!(message_id, "no pending request for message");
                        continue;
                    };
                    let _ = tx.send(
                        message::decode_response(&payload).map_err(TransportError::from),
                    );
                }
                Err(err) => {
                    warn!(error = %err, "chunk reassembly failed");
                    connected.store(false, Ordering::Release);
                    fail_pending(&pending, &err.to_string());
                    break;
                }
            },
        }
    }
    assembler.discard();
}
