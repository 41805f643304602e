//! Connection pooling and host-set reconciliation.
//!
//! The pool owns every transport connection. The host map is the single
//! shared mutable resource: structural mutation goes through
//! [`ConnectionPool::update_connections`] behind a try-acquire gate, while
//! `execute` readers run concurrently on a snapshot-consistent view and
//! tolerate the map changing underneath them — a host vanishing mid-selection
//! surfaces as [`TransportError::HostNotAvailable`], not a crash.

pub mod failover;

pub use failover::ActiveFailoverPool;

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use dashmap::DashMap;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::{
    connection::{Connection, ConnectionFactory},
    conversation::{Conversation, ConversationLevel},
    error::TransportError,
    host::HostDescription,
    request::Request,
    response::Response,
};

/// Single-holder gate guarding a critical section.
///
/// Acquisition is a compare-and-swap; release happens in [`Drop`], so every
/// exit path including cancellation restores the gate.
#[derive(Debug, Default)]
pub(crate) struct Gate(AtomicBool);

pub(crate) struct GateGuard<'a>(&'a AtomicBool);

impl Gate {
    pub(crate) fn try_acquire(&self) -> Option<GateGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then_some(GateGuard(&self.0))
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

/// Owns a set of transport connections per host.
pub struct ConnectionPool {
    factory: ConnectionFactory,
    connections_per_host: usize,
    hosts: DashMap<HostDescription, Vec<Arc<dyn Connection>>>,
    reconciling: Gate,
}

impl ConnectionPool {
    /// Create an empty pool that opens `connections_per_host` connections for
    /// every tracked host.
    #[must_use]
    pub fn new(factory: ConnectionFactory, connections_per_host: usize) -> Self {
        Self {
            factory,
            connections_per_host: connections_per_host.max(1),
            hosts: DashMap::new(),
            reconciling: Gate::default(),
        }
    }

    /// Snapshot of the currently tracked hosts.
    #[must_use]
    pub fn host_snapshot(&self) -> Vec<HostDescription> {
        self.hosts.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Whether no host is currently tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.hosts.is_empty() }

    /// Number of connections currently held for `host`.
    #[must_use]
    pub fn connection_count(&self, host: &HostDescription) -> usize {
        self.hosts.get(host).map_or(0, |entry| entry.value().len())
    }

    fn random_host(&self) -> Result<HostDescription, TransportError> {
        self.host_snapshot()
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(TransportError::NoHostsAvailable)
    }

    fn connection_for(
        &self,
        host: &HostDescription,
    ) -> Result<Arc<dyn Connection>, TransportError> {
        let entry = self
            .hosts
            .get(host)
            .ok_or_else(|| TransportError::HostNotAvailable { host: host.clone() })?;
        entry
            .value()
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| TransportError::HostNotAvailable { host: host.clone() })
    }

    /// Execute against a uniformly random host and connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NoHostsAvailable`] when the host set is
    /// empty, or any connection-level error from the chosen connection.
    pub async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        let host = self.random_host()?;
        self.execute_on(request, &host).await
    }

    /// Execute against a specific host.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::HostNotAvailable`] when `host` is not
    /// currently tracked, or any connection-level error.
    pub async fn execute_on(
        &self,
        request: Request,
        host: &HostDescription,
    ) -> Result<Response, TransportError> {
        let connection = self.connection_for(host)?;
        connection.execute(request).await
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
        Ok(Conversation::new(self.random_host()?, level))
    }

    /// Reconcile the tracked host set to exactly `target`.
    ///
    /// New hosts get a full complement of connections (per-connection
    /// failures are tolerated; a host yielding zero connections is treated as
    /// unreachable and skipped). Hosts absent from the target are removed and
    /// all their connections closed. Finally, tracked hosts whose connections
    /// are all disconnected are pruned.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ReconciliationInProgress`] when another
    /// reconciliation holds the gate; two reconciliations never interleave.
    pub async fn update_connections(
        &self,
        target: &[HostDescription],
    ) -> Result<(), TransportError> {
        let Some(_guard) = self.reconciling.try_acquire() else {
            return Err(TransportError::ReconciliationInProgress);
        };

        // Open connections for new hosts; hosts are independent, so their
        // connection setup proceeds in parallel.
        let additions: Vec<HostDescription> = target
            .iter()
            .filter(|host| !self.hosts.contains_key(host))
            .cloned()
            .collect();
        let opened = futures::future::join_all(additions.into_iter().map(|host| {
            let factory = self.factory.clone();
            let count = self.connections_per_host;
            async move {
                let mut connections = Vec::with_capacity(count);
                for _ in 0..count {
                    match factory.create_with_retry(&host).await {
                        Ok(connection) => connections.push(connection),
                        Err(err) => {
                            warn!(host = %host, error = %err, "failed to open connection");
                        }
                    }
                }
                (host, connections)
            }
        }))
        .await;
        for (host, connections) in opened {
            if connections.is_empty() {
                warn!(host = %host, "host unreachable, not added");
            } else {
                debug!(host = %host, connections = connections.len(), "host added");
                self.hosts.insert(host, connections);
            }
        }

        // Drop hosts that left the target set.
        let target_set: HashSet<&HostDescription> = target.iter().collect();
        let removed: Vec<HostDescription> = self
            .hosts
            .iter()
            .filter(|entry| !target_set.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for host in removed {
            debug!(host = %host, "host removed");
            self.remove_host(&host).await;
        }

        // Self-healing pass: a tracked host with no live connection left is
        // unreachable for routing purposes.
        let dead: Vec<HostDescription> = self
            .hosts
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .iter()
                    .all(|connection| !connection.is_connected())
            })
            .map(|entry| entry.key().clone())
            .collect();
        for host in dead {
            warn!(host = %host, "pruning host with no live connections");
            self.remove_host(&host).await;
        }

        Ok(())
    }

    async fn remove_host(&self, host: &HostDescription) {
        if let Some((_, connections)) = self.hosts.remove(host) {
            for connection in connections {
                connection.close().await;
            }
        }
    }

    /// Close every connection and forget all hosts.
    pub async fn close(&self) {
        for host in self.host_snapshot() {
            self.remove_host(&host).await;
        }
    }
}
