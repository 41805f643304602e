//! Builds and initialises transport connections for a host.

use std::sync::Arc;

use tracing::warn;

use super::{Connection, HttpConnection, VstConnection};
use crate::{
    config::{Protocol, TransportConfig},
    error::TransportError,
    host::HostDescription,
};

/// Constructs connections of the configured protocol strategy.
#[derive(Clone)]
pub struct ConnectionFactory {
    config: Arc<TransportConfig>,
}

impl ConnectionFactory {
    /// Create a factory bound to `config`.
    #[must_use]
    pub const fn new(config: Arc<TransportConfig>) -> Self { Self { config } }

    /// The configuration this factory builds against.
    #[must_use]
    pub fn config(&self) -> &TransportConfig { &self.config }

    /// Build one connection to `host` and complete its handshake.
    ///
    /// # Errors
    ///
    /// Returns any connect, handshake, or authentication error; strategies
    /// release partially acquired resources before surfacing it.
    pub async fn create(
        &self,
        host: &HostDescription,
    ) -> Result<Arc<dyn Connection>, TransportError> {
        match self.config.protocol() {
            Protocol::Vst => {
                let connection = VstConnection::new(
                    host.clone(),
                    self.config.authentication().clone(),
                    self.config.chunk_size(),
                    self.config.timeout(),
                );
                connection.establish().await?;
                Ok(Arc::new(connection))
            }
            protocol @ (Protocol::Http1 | Protocol::Http2) => {
                let connection = HttpConnection::open(
                    host,
                    self.config.authentication(),
                    protocol,
                    self.config.timeout(),
                )
                .await?;
                Ok(Arc::new(connection))
            }
        }
    }

    /// Build a connection, retrying up to the configured budget.
    ///
    /// # Errors
    ///
    /// Surfaces the last creation error once the budget is exhausted.
    pub async fn create_with_retry(
        &self,
        host: &HostDescription,
    ) -> Result<Arc<dyn Connection>, TransportError> {
        let budget = self.config.connection_retries().max(1);
        let mut attempt = 0;
        loop {
            match self.create(host).await {
                Ok(connection) => return Ok(connection),
                Err(err) => {
                    attempt += 1;
                    if attempt >= budget {
                        return Err(err);
                    }
                    warn!(host = %host, attempt, error = %err, "connection attempt failed, retrying");
                }
            }
        }
    }
}
