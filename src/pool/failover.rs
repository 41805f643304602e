//! Leader-aware pool for active-failover deployments.
//!
//! Exactly one host (the leader) accepts writes; the rest reject them with a
//! leadership-unavailable status. This pool layers leader tracking on top of
//! the base [`ConnectionPool`]: non-dirty requests route to the remembered
//! leader, and any signal that leadership moved (a 503 response, a transport
//! error, or no leader being known) triggers a background rediscovery probe
//! across all hosts. The remembered leader is only ever replaced by a
//! confirmed new one, so a transient probe outage keeps the last known
//! leader rather than erasing it.

use std::sync::{Arc, Mutex, Weak};

use futures::{StreamExt, stream::FuturesUnordered};
use tracing::{debug, info, warn};

use super::{ConnectionPool, Gate};
use crate::{
    conversation::{Conversation, ConversationLevel},
    error::TransportError,
    host::HostDescription,
    request::{Method, Request},
    response::Response,
};

/// Marker header permitting a follower to answer a read.
pub const DIRTY_READ_HEADER: &str = "x-arango-allow-dirty-read";

const STATUS_LEADER_UNAVAILABLE: u16 = 503;

/// Pool specialisation that routes writes to the tracked leader.
pub struct ActiveFailoverPool {
    pool: ConnectionPool,
    leader: Mutex<Option<HostDescription>>,
    probing: Gate,
    dirty_reads: bool,
    /// Self-reference for fire-and-forget rediscovery tasks.
    this: Weak<Self>,
}

impl ActiveFailoverPool {
    /// Wrap a base pool with leader tracking.
    #[must_use]
    pub fn new(pool: ConnectionPool, dirty_reads: bool) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            pool,
            leader: Mutex::new(None),
            probing: Gate::default(),
            dirty_reads,
            this: this.clone(),
        })
    }

    /// The currently remembered leader, if any.
    #[must_use]
    pub fn leader(&self) -> Option<HostDescription> { self.leader_slot().clone() }

    fn leader_slot(&self) -> std::sync::MutexGuard<'_, Option<HostDescription>> {
        // The slot holds a plain Option and no guard crosses a panic point,
        // so a poisoned lock still carries a usable value.
        match self.leader.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Execute one request with leader routing.
    ///
    /// Eligible reads under dirty-read mode go to a uniformly random host
    /// stamped with [`DIRTY_READ_HEADER`]. Everything else goes to the
    /// remembered leader; evidence that leadership moved (a 503 response or a
    /// transport error from the leader) kicks off background rediscovery
    /// while the original outcome still propagates to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::LeaderNotAvailable`] when no leader is
    /// known, or any connection-level error from the routed host.
    pub async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        if self.dirty_reads && request.method().is_read() {
            return self
                .pool
                .execute(request.with_header(DIRTY_READ_HEADER, "true"))
                .await;
        }

        let Some(leader) = self.leader() else {
            self.spawn_rediscovery();
            return Err(TransportError::LeaderNotAvailable);
        };
        let outcome = self.pool.execute_on(request, &leader).await;
        match &outcome {
            Ok(response) if response.response_code() == STATUS_LEADER_UNAVAILABLE => {
                info!(host = %leader, "leader no longer accepts writes");
                self.spawn_rediscovery();
            }
            Err(err) => {
                warn!(host = %leader, error = %err, "leader request failed");
                self.spawn_rediscovery();
            }
            Ok(_) => {}
        }
        outcome
    }

    /// Execute against a specific host, bypassing leader routing.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::HostNotAvailable`] when `host` is not
    /// tracked, or any connection-level error.
    pub async fn execute_on(
        &self,
        request: Request,
        host: &HostDescription,
    ) -> Result<Response, TransportError> {
        self.pool.execute_on(request, host).await
    }

    /// Reconcile the host set, then re-elect the leader among the result.
    ///
    /// # Errors
    ///
    /// Propagates reconciliation errors from the base pool; probe failure
    /// surfaces as [`TransportError::LeaderNotAvailable`].
    pub async fn update_connections(
        &self,
        target: &[HostDescription],
    ) -> Result<(), TransportError> {
        self.pool.update_connections(target).await?;
        self.find_leader().await
    }

    /// Probe every tracked host and adopt the first that answers as leader.
    ///
    /// A follower in this deployment rejects the probe with a 503, so the
    /// first sub-300 answer identifies the leader. Concurrent invocations
    /// collapse into one: a held gate turns the call into a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::LeaderNotAvailable`] when no host confirms
    /// leadership; the previously remembered leader is left untouched.
    pub async fn find_leader(&self) -> Result<(), TransportError> {
        let Some(_guard) = self.probing.try_acquire() else {
            return Ok(());
        };

        let mut probes: FuturesUnordered<_> = self
            .pool
            .host_snapshot()
            .into_iter()
            .map(|host| async move {
                let probe = Request::builder("_system", Method::Get, "/_api/version").build();
                let outcome = self.pool.execute_on(probe, &host).await;
                (host, outcome)
            })
            .collect();

        while let Some((host, outcome)) = probes.next().await {
            match outcome {
                Ok(response) if response.is_success() => {
                    info!(host = %host, "leader elected");
                    *self.leader_slot() = Some(host);
                    return Ok(());
                }
                Ok(response) => {
                    debug!(host = %host, status = response.response_code(), "host declined leadership probe");
                }
                Err(err) => {
                    debug!(host = %host, error = %err, "leadership probe failed");
                }
            }
        }
        warn!("no host confirmed leadership");
        Err(TransportError::LeaderNotAvailable)
    }

    fn spawn_rediscovery(&self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(err) = this.find_leader().await {
                debug!(error = %err, "leader rediscovery unsuccessful");
            }
        });
    }

    /// Pin a uniformly random tracked host at the given affinity level.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NoHostsAvailable`] when the host set is
    /// empty.
    pub fn create_conversation(
        &self,
        level: ConversationLevel,
    ) -> Result<Conversation, TransportError> {
        self.pool.create_conversation(level)
    }

    /// Snapshot of the currently tracked hosts.
    #[must_use]
    pub fn host_snapshot(&self) -> Vec<HostDescription> { self.pool.host_snapshot() }

    /// Whether no host is currently tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.pool.is_empty() }

    /// Close every connection and forget the leader.
    pub async fn close(&self) {
        self.pool.close().await;
        *self.leader_slot() = None;
    }
}
