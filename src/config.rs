//! Configuration surface consumed by the transport core.
//!
//! A [`TransportConfig`] is assembled by an external configuration loader and
//! handed to [`Communication`](crate::communication::Communication) once;
//! every field is immutable for the lifetime of the orchestrator.

use std::time::Duration;

use crate::host::HostDescription;

/// Default number of connections opened per host.
pub const DEFAULT_CONNECTIONS_PER_HOST: usize = 2;
/// Default maximum chunk length (header plus content) for the VST protocol.
pub const DEFAULT_CHUNK_SIZE: usize = 30_000;
/// Default global request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
/// Default retry budget for connection creation.
pub const DEFAULT_CONNECTION_RETRIES: u32 = 3;
/// Default retry budget for host-list fetches.
pub const DEFAULT_HOST_LIST_RETRIES: u32 = 3;
/// Default interval between background host-list refreshes.
pub const DEFAULT_ACQUIRE_HOST_LIST_INTERVAL: Duration = Duration::from_secs(3600);

/// Deployment shape governing routing policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    /// One database server.
    SingleServer,
    /// A cluster of coordinators; any host serves any request.
    Cluster,
    /// A leader/follower group; writes must reach the current leader.
    ActiveFailover,
}

/// Wire protocol strategy used for every connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    /// Chunked binary VelocyStream protocol.
    Vst,
    /// HTTP/1.1.
    Http1,
    /// HTTP/2 with prior knowledge.
    Http2,
}

/// Authentication method, treated as an opaque credential source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Authentication {
    /// No credential configured. Connection initialisation still issues an
    /// authenticated-looking probe to confirm the server is equally open.
    None,
    /// Username/password credentials.
    Basic {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// Pre-issued bearer token.
    Jwt {
        /// The token.
        token: String,
    },
    /// Placeholder for negotiated schemes; initialisation fails loudly rather
    /// than silently skipping authentication.
    Negotiate {
        /// Name of the requested scheme.
        scheme: String,
    },
}

/// Immutable transport configuration.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use velostream::{HostDescription, Protocol, Topology, TransportConfig};
///
/// let config = TransportConfig::new(vec![HostDescription::new("localhost", 8529)])
///     .with_topology(Topology::Cluster)
///     .with_protocol(Protocol::Vst)
///     .with_timeout(Duration::from_secs(30));
/// assert_eq!(config.topology(), Topology::Cluster);
/// ```
#[derive(Clone, Debug)]
pub struct TransportConfig {
    hosts: Vec<HostDescription>,
    topology: Topology,
    protocol: Protocol,
    authentication: Authentication,
    connections_per_host: usize,
    chunk_size: usize,
    timeout: Duration,
    connection_retries: u32,
    acquire_host_list: bool,
    acquire_host_list_interval: Duration,
    host_list_retries: u32,
    dirty_reads: bool,
}

impl TransportConfig {
    /// Create a configuration with the given seed hosts and defaults for
    /// everything else: single-server VST, no authentication, no host-list
    /// acquisition, dirty reads disabled.
    #[must_use]
    pub fn new(hosts: Vec<HostDescription>) -> Self {
        Self {
            hosts,
            topology: Topology::SingleServer,
            protocol: Protocol::Vst,
            authentication: Authentication::None,
            connections_per_host: DEFAULT_CONNECTIONS_PER_HOST,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: DEFAULT_TIMEOUT,
            connection_retries: DEFAULT_CONNECTION_RETRIES,
            acquire_host_list: false,
            acquire_host_list_interval: DEFAULT_ACQUIRE_HOST_LIST_INTERVAL,
            host_list_retries: DEFAULT_HOST_LIST_RETRIES,
            dirty_reads: false,
        }
    }

    /// Replace the deployment topology.
    #[must_use]
    pub const fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Replace the wire protocol.
    #[must_use]
    pub const fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Replace the authentication method.
    #[must_use]
    pub fn with_authentication(mut self, authentication: Authentication) -> Self {
        self.authentication = authentication;
        self
    }

    /// Replace the per-host connection count.
    #[must_use]
    pub const fn with_connections_per_host(mut self, count: usize) -> Self {
        self.connections_per_host = count;
        self
    }

    /// Replace the maximum chunk length (header plus content).
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Replace the global request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the connection-creation retry budget.
    #[must_use]
    pub const fn with_connection_retries(mut self, retries: u32) -> Self {
        self.connection_retries = retries;
        self
    }

    /// Enable or disable host-list acquisition from the cluster.
    #[must_use]
    pub const fn with_acquire_host_list(mut self, enabled: bool) -> Self {
        self.acquire_host_list = enabled;
        self
    }

    /// Replace the background host-list refresh interval.
    #[must_use]
    pub const fn with_acquire_host_list_interval(mut self, interval: Duration) -> Self {
        self.acquire_host_list_interval = interval;
        self
    }

    /// Replace the host-list fetch retry budget.
    #[must_use]
    pub const fn with_host_list_retries(mut self, retries: u32) -> Self {
        self.host_list_retries = retries;
        self
    }

    /// Enable or disable dirty reads (active failover only).
    #[must_use]
    pub const fn with_dirty_reads(mut self, enabled: bool) -> Self {
        self.dirty_reads = enabled;
        self
    }

    /// Statically configured seed hosts.
    #[must_use]
    pub fn hosts(&self) -> &[HostDescription] { &self.hosts }

    /// Deployment topology.
    #[must_use]
    pub const fn topology(&self) -> Topology { self.topology }

    /// Wire protocol.
    #[must_use]
    pub const fn protocol(&self) -> Protocol { self.protocol }

    /// Authentication method.
    #[must_use]
    pub const fn authentication(&self) -> &Authentication { &self.authentication }

    /// Connections opened per host.
    #[must_use]
    pub const fn connections_per_host(&self) -> usize { self.connections_per_host }

    /// Maximum chunk length (header plus content).
    #[must_use]
    pub const fn chunk_size(&self) -> usize { self.chunk_size }

    /// Global request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration { self.timeout }

    /// Connection-creation retry budget.
    #[must_use]
    pub const fn connection_retries(&self) -> u32 { self.connection_retries }

    /// Whether the live host set is fetched from the cluster.
    #[must_use]
    pub const fn acquire_host_list(&self) -> bool { self.acquire_host_list }

    /// Background host-list refresh interval.
    #[must_use]
    pub const fn acquire_host_list_interval(&self) -> Duration { self.acquire_host_list_interval }

    /// Host-list fetch retry budget.
    #[must_use]
    pub const fn host_list_retries(&self) -> u32 { self.host_list_retries }

    /// Whether reads may hit any host in active failover.
    #[must_use]
    pub const fn dirty_reads(&self) -> bool { self.dirty_reads }
}
