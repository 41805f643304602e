//! In-process mock VST server used by the integration tests.
//!
//! The server speaks just enough of the chunked binary protocol to exercise
//! the client end to end: it consumes the protocol marker, reassembles
//! inbound chunks, answers authentication frames with a bare success, and
//! hands every request to a test-supplied behaviour closure. Replies reuse
//! the request's message id, and a request carrying an `x-delay-ms` header
//! has its reply deferred by that many milliseconds, which lets tests force
//! out-of-order completion.

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc, Once,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, tcp::OwnedWriteHalf},
    sync::Mutex,
    time,
};
use tokio_util::{codec::{Encoder, FramedRead}, sync::CancellationToken};

use velostream::{
    HostDescription, Response,
    codec::{ChunkCodec, Chunker, MessageAssembler, PROTOCOL_MARKER},
    message::{
        self, MESSAGE_TYPE_AUTHENTICATION, MESSAGE_TYPE_REQUEST, RequestHead,
    },
};

/// Header whose value (milliseconds) defers the reply to the request.
pub const DELAY_HEADER: &str = "x-delay-ms";

type Behaviour = Arc<dyn Fn(&RequestHead, &Bytes) -> Option<Response> + Send + Sync>;

/// A mock server bound to an ephemeral localhost port.
pub struct MockVstServer {
    addr: SocketAddr,
    active: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

/// Route the library's tracing output through the test harness once per
/// process.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

impl MockVstServer {
    /// Bind and start serving. `behaviour` maps each request to a response;
    /// returning `None` swallows the request, leaving the client waiting.
    pub async fn spawn<F>(behaviour: F) -> Self
    where
        F: Fn(&RequestHead, &Bytes) -> Option<Response> + Send + Sync + 'static,
    {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("bound address");
        let active = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();
        let behaviour: Behaviour = Arc::new(behaviour);

        let accept_active = Arc::clone(&active);
        let accept_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let accepted = tokio::select! {
                    () = accept_shutdown.cancelled() => break,
                    accepted = listener.accept() => accepted,
                };
                let Ok((stream, _)) = accepted else { break };
                tokio::spawn(serve_connection(
                    stream,
                    Arc::clone(&behaviour),
                    Arc::clone(&accept_active),
                    accept_shutdown.clone(),
                ));
            }
        });

        Self {
            addr,
            active,
            shutdown,
        }
    }

    /// A server that answers every request with 200 and a body naming it.
    pub async fn spawn_identity(tag: &'static str) -> Self {
        Self::spawn(move |_, _| {
            Some(Response::new(
                200,
                std::collections::HashMap::new(),
                Bytes::from_static(tag.as_bytes()),
            ))
        })
        .await
    }

    /// The host description clients should connect to.
    pub fn host(&self) -> HostDescription {
        HostDescription::new("127.0.0.1", self.addr.port())
    }

    /// Number of currently open client connections.
    pub fn active_connections(&self) -> usize { self.active.load(Ordering::Acquire) }

    /// Stop accepting and drop all connection handlers.
    pub fn shutdown(&self) { self.shutdown.cancel(); }
}

impl Drop for MockVstServer {
    fn drop(&mut self) { self.shutdown.cancel(); }
}

struct ConnectionGuard(Arc<AtomicUsize>);

impl ConnectionGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) { self.0.fetch_sub(1, Ordering::AcqRel); }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    behaviour: Behaviour,
    active: Arc<AtomicUsize>,
    shutdown: CancellationToken,
) {
    let _guard = ConnectionGuard::enter(&active);
    let (read, write) = stream.into_split();
    let mut read = read;

    let mut marker = [0u8; PROTOCOL_MARKER.len()];
    if read.read_exact(&mut marker).await.is_err() || marker != *PROTOCOL_MARKER {
        return;
    }

    let writer = Arc::new(Mutex::new(write));
    let mut frames = FramedRead::new(read, ChunkCodec::default());
    let mut assembler = MessageAssembler::with_default_limit();

    loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => break,
            frame = frames.next() => frame,
        };
        let Some(Ok(chunk)) = frame else { break };
        let Ok(completed) = assembler.push(chunk) else { break };
        let Some((message_id, payload)) = completed else { continue };

        match message::peek_message_type(&payload) {
            Ok(MESSAGE_TYPE_AUTHENTICATION) => {
                let ok = Response::new(200, std::collections::HashMap::new(), Bytes::new());
                reply(&writer, message_id, &ok, None).await;
            }
            Ok(MESSAGE_TYPE_REQUEST) => {
                let Ok((head, body)) = message::decode_request(&payload) else { break };
                let delay = head
                    .header_params
                    .get(DELAY_HEADER)
                    .and_then(|value| value.parse::<u64>().ok())
                    .map(Duration::from_millis);
                let Some(response) = behaviour(&head, &body) else { continue };
                let writer = Arc::clone(&writer);
                tokio::spawn(async move {
                    reply(&writer, message_id, &response, delay).await;
                });
            }
            _ => break,
        }
    }
}

async fn reply(
    writer: &Arc<Mutex<OwnedWriteHalf>>,
    message_id: u64,
    response: &Response,
    delay: Option<Duration>,
) {
    if let Some(delay) = delay {
        time::sleep(delay).await;
    }
    let Ok(payload) = message::encode_response(response) else { return };
    let chunker = Chunker::new(30_000);
    let Ok(chunks) = chunker.chunk_message(message_id, &payload) else { return };
    let mut codec = ChunkCodec::default();
    let mut wire = BytesMut::new();
    for chunk in chunks {
        if codec.encode(chunk, &mut wire).is_err() {
            return;
        }
    }
    let _ = writer.lock().await.write_all(&wire).await;
}

/// Poll `condition` until it holds, panicking after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    let deadline = time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        time::sleep(Duration::from_millis(20)).await;
    }
}

/// A JSON endpoint-listing body naming the given hosts.
pub fn endpoints_body(hosts: &[&HostDescription]) -> Bytes {
    let entries: Vec<String> = hosts
        .iter()
        .map(|host| format!("{{\"endpoint\":\"tcp://{host}\"}}"))
        .collect();
    Bytes::from(format!("{{\"endpoints\":[{}]}}", entries.join(",")))
}

/// A 200 response with the given body and no metadata.
pub fn ok_body(body: impl Into<Bytes>) -> Response {
    Response::new(200, std::collections::HashMap::new(), body)
}
