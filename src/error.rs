//! Error taxonomy for the transport core.
//!
//! Every public operation resolves to either a value or one of the specific
//! kinds below; conditions covered by the taxonomy are never reported as an
//! undifferentiated generic error.
//!
//! # Categories
//!
//! - Routing errors ([`TransportError::NoHostsAvailable`],
//!   [`TransportError::HostNotAvailable`], [`TransportError::LeaderNotAvailable`])
//!   describe the pool's host set at selection time.
//! - Connection-level errors ([`TransportError::Io`], [`TransportError::Codec`],
//!   [`TransportError::Timeout`], [`TransportError::ConnectionClosed`],
//!   [`TransportError::ConnectionFailed`]) fail the in-flight request and flip
//!   the owning connection to disconnected.
//! - [`TransportError::Server`] wraps any non-2xx response into a structured
//!   [`ServerError`]; this layer never retries it.

use std::{io, time::Duration};

use thiserror::Error;

use crate::{codec::CodecError, host::HostDescription};

/// Errors surfaced by pools, connections, and the communication façade.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The pool's host set was empty at selection time.
    #[error("no hosts available")]
    NoHostsAvailable,

    /// A specifically requested host is not currently tracked by the pool.
    #[error("host {host} is not part of the current host set")]
    HostNotAvailable {
        /// The host that was requested.
        host: HostDescription,
    },

    /// Active-failover leader discovery exhausted all hosts without an answer.
    #[error("no leader available")]
    LeaderNotAvailable,

    /// A host-set reconciliation was already in flight.
    #[error("host reconciliation already in progress")]
    ReconciliationInProgress,

    /// The connection was closed while a request was pending.
    #[error("connection closed")]
    ConnectionClosed,

    /// The connection failed; all of its pending requests observe this error.
    #[error("connection failed: {reason}")]
    ConnectionFailed {
        /// Description of the underlying transport failure.
        reason: String,
    },

    /// The request did not complete within the configured timeout.
    #[error("request timed out after {timeout:?}")]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// A message id was about to be reused while still pending.
    #[error("message id {message_id} already has a pending request")]
    MessageIdInUse {
        /// The colliding identifier.
        message_id: u64,
    },

    /// A negotiated authentication scheme was requested but is not implemented.
    #[error("authentication negotiation `{scheme}` is not yet supported")]
    UnsupportedAuthentication {
        /// The scheme that was requested.
        scheme: String,
    },

    /// An endpoint string from discovery or configuration could not be parsed.
    #[error("invalid endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint {
        /// The offending endpoint string.
        endpoint: String,
        /// Why parsing failed.
        reason: String,
    },

    /// The cluster endpoint list body could not be deserialised.
    #[error("malformed host list payload")]
    MalformedHostList(#[source] serde_json::Error),

    /// Transport-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Wire framing or message head violation.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Failure inside an HTTP protocol strategy.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Structured server-side error carrying the response status and the
/// server-provided error payload when one was present.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("server error {code}: {}", message.as_deref().unwrap_or("no error payload"))]
pub struct ServerError {
    /// HTTP-style response status code.
    pub code: u16,
    /// Server-specific error number, when the body carried one.
    pub error_num: Option<i64>,
    /// Server-provided error message, when the body carried one.
    pub message: Option<String>,
}
