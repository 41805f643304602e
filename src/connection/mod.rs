//! Transport connections: one physical channel to one host.
//!
//! Every protocol strategy implements the same [`Connection`] contract, so
//! pools and the communication façade never branch on strategy identity. The
//! strategy is a closed set selected once by the [`ConnectionFactory`]:
//! chunked binary VST ([`VstConnection`]), HTTP/1.1, or HTTP/2
//! ([`HttpConnection`]).

mod factory;
mod http;
mod vst;

pub use factory::ConnectionFactory;
pub use http::HttpConnection;
pub use vst::VstConnection;

use async_trait::async_trait;

use crate::{error::TransportError, request::Request, response::Response};

/// One physical channel to one host.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute one request, resolving when the matching response arrives.
    ///
    /// # Errors
    ///
    /// Returns a connection-level [`TransportError`] on I/O failure, protocol
    /// violation, or timeout. A transport error flips the connection to
    /// disconnected and fails its other pending requests.
    async fn execute(&self, request: Request) -> Result<Response, TransportError>;

    /// Cheap local check of the connection state.
    fn is_connected(&self) -> bool;

    /// Tear the connection down, failing any pending requests. Idempotent.
    async fn close(&self);
}
