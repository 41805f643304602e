//! Communication façade orchestrating the transport core.
//!
//! [`Communication`] is the single entry point clients use: it validates the
//! configured authentication, builds the topology-appropriate pool, optionally
//! discovers the live host set from the cluster and keeps it refreshed in the
//! background, resolves per-request host affinity via [`Conversation`],
//! applies the global timeout, and classifies non-success responses into
//! typed server errors.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use serde::Deserialize;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    config::{Authentication, Topology, TransportConfig},
    connection::ConnectionFactory,
    conversation::{Conversation, ConversationLevel},
    error::{ServerError, TransportError},
    host::HostDescription,
    pool::{ActiveFailoverPool, ConnectionPool},
    request::{Method, Request},
    response::Response,
};

/// Cluster endpoint-listing path used for host-list acquisition.
pub const ENDPOINTS_PATH: &str = "/_api/cluster/endpoints";

/// The pool variant selected by the configured topology.
#[derive(Clone)]
enum TopologyPool {
    /// Random routing over all hosts (single server and cluster).
    Base(Arc<ConnectionPool>),
    /// Leader routing with rediscovery (active failover).
    Failover(Arc<ActiveFailoverPool>),
}

impl TopologyPool {
    async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        match self {
            Self::Base(pool) => pool.execute(request).await,
            Self::Failover(pool) => pool.execute(request).await,
        }
    }

    async fn execute_on(
        &self,
        request: Request,
        host: &HostDescription,
    ) -> Result<Response, TransportError> {
        match self {
            Self::Base(pool) => pool.execute_on(request, host).await,
            Self::Failover(pool) => pool.execute_on(request, host).await,
        }
    }

    async fn update_connections(
        &self,
        target: &[HostDescription],
    ) -> Result<(), TransportError> {
        match self {
            Self::Base(pool) => pool.update_connections(target).await,
            Self::Failover(pool) => pool.update_connections(target).await,
        }
    }

    fn create_conversation(
        &self,
        level: ConversationLevel,
    ) -> Result<Conversation, TransportError> {
        match self {
            Self::Base(pool) => pool.create_conversation(level),
            Self::Failover(pool) => pool.create_conversation(level),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Base(pool) => pool.is_empty(),
            Self::Failover(pool) => pool.is_empty(),
        }
    }

    fn host_snapshot(&self) -> Vec<HostDescription> {
        match self {
            Self::Base(pool) => pool.host_snapshot(),
            Self::Failover(pool) => pool.host_snapshot(),
        }
    }

    async fn close(&self) {
        match self {
            Self::Base(pool) => pool.close().await,
            Self::Failover(pool) => pool.close().await,
        }
    }
}

/// Orchestrator and client entry point for the transport core.
pub struct Communication {
    config: Arc<TransportConfig>,
    pool: TopologyPool,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl std::fmt::Debug for Communication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communication")
            .field("config", &self.config)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Communication {
    /// Build and initialise the transport for `config`.
    ///
    /// Opens connections to the configured hosts (or, with host-list
    /// acquisition enabled, to the hosts the cluster reports), elects the
    /// leader for active-failover topologies, and starts the background
    /// host-list refresh task where configured.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnsupportedAuthentication`] for negotiated
    /// schemes, [`TransportError::NoHostsAvailable`] when no configured host
    /// is reachable, and host-list or leader-election errors as typed
    /// variants.
    pub async fn new(config: TransportConfig) -> Result<Self, TransportError> {
        if let Authentication::Negotiate { scheme } = config.authentication() {
            return Err(TransportError::UnsupportedAuthentication {
                scheme: scheme.clone(),
            });
        }

        let config = Arc::new(config);
        let factory = ConnectionFactory::new(Arc::clone(&config));
        let pool = match config.topology() {
            Topology::SingleServer | Topology::Cluster => TopologyPool::Base(Arc::new(
                ConnectionPool::new(factory, config.connections_per_host()),
            )),
            Topology::ActiveFailover => TopologyPool::Failover(ActiveFailoverPool::new(
                ConnectionPool::new(factory, config.connections_per_host()),
                config.dirty_reads(),
            )),
        };
        let communication = Self {
            config,
            pool,
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        };
        communication.initialize().await?;
        Ok(communication)
    }

    async fn initialize(&self) -> Result<(), TransportError> {
        let hosts = if self.config.acquire_host_list() {
            let discovered = self.fetch_host_list_via_seed().await?;
            info!(hosts = discovered.len(), "host list acquired from cluster");
            discovered
        } else {
            self.config.hosts().to_vec()
        };
        self.pool.update_connections(&hosts).await?;
        if self.pool.is_empty() {
            return Err(TransportError::NoHostsAvailable);
        }

        if self.config.acquire_host_list() {
            self.spawn_host_list_refresh();
        }
        Ok(())
    }

    /// Fetch the live host list through a throwaway single-connection pool
    /// over the configured seed hosts. The real pool is only built from the
    /// list the cluster itself reports.
    async fn fetch_host_list_via_seed(
        &self,
    ) -> Result<Vec<HostDescription>, TransportError> {
        let factory = ConnectionFactory::new(Arc::clone(&self.config));
        let seed = TopologyPool::Base(Arc::new(ConnectionPool::new(factory, 1)));
        seed.update_connections(self.config.hosts()).await?;
        let outcome = fetch_host_list(&seed, self.config.host_list_retries()).await;
        seed.close().await;
        outcome
    }

    fn spawn_host_list_refresh(&self) {
        let pool = self.pool.clone();
        let interval = self.config.acquire_host_list_interval();
        let retries = self.config.host_list_retries();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of an interval fires immediately; initialisation
            // has just fetched the list, so skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match refresh_host_list(&pool, retries).await {
                    Ok(()) => debug!("host list refreshed"),
                    Err(err) => warn!(error = %err, "host list refresh failed"),
                }
            }
        });
    }

    /// Execute one request, optionally scoped to a conversation.
    ///
    /// A [`ConversationLevel::Required`] conversation fails when its host is
    /// gone; a [`ConversationLevel::Preferred`] one falls back to normal
    /// routing. The configured global timeout bounds the whole operation, and
    /// non-success responses surface as [`TransportError::Server`].
    ///
    /// # Errors
    ///
    /// Returns routing, connection, timeout, or classified server errors.
    pub async fn execute(
        &self,
        request: Request,
        conversation: Option<&Conversation>,
    ) -> Result<Response, TransportError> {
        trace!(
            method = request.method().as_str(),
            database = request.database(),
            path = request.path(),
            body_len = request.body().len(),
            "executing request"
        );
        let response = time::timeout(
            self.config.timeout(),
            self.execute_routed(request, conversation),
        )
        .await
        .map_err(|_| TransportError::Timeout {
            timeout: self.config.timeout(),
        })??;

        trace!(
            status = response.response_code(),
            body_len = response.body().len(),
            "response received"
        );
        if response.is_success() {
            Ok(response)
        } else {
            Err(TransportError::Server(classify_response(&response)))
        }
    }

    async fn execute_routed(
        &self,
        request: Request,
        conversation: Option<&Conversation>,
    ) -> Result<Response, TransportError> {
        let Some(conversation) = conversation else {
            return self.pool.execute(request).await;
        };
        match conversation.level() {
            ConversationLevel::Required => {
                self.pool.execute_on(request, conversation.host()).await
            }
            ConversationLevel::Preferred => {
                match self
                    .pool
                    .execute_on(request.clone(), conversation.host())
                    .await
                {
                    Err(TransportError::HostNotAvailable { host }) => {
                        debug!(host = %host, "preferred host gone, falling back");
                        self.pool.execute(request).await
                    }
                    outcome => outcome,
                }
            }
        }
    }

    /// Pin a random live host for a sequence of related requests.
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

    /// Stop background tasks and close every connection. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();
        self.pool.close().await;
        info!("communication closed");
    }
}

async fn refresh_host_list(pool: &TopologyPool, retries: u32) -> Result<(), TransportError> {
    let hosts = fetch_host_list(pool, retries).await?;
    pool.update_connections(&hosts).await
}

async fn fetch_host_list(
    pool: &TopologyPool,
    retries: u32,
) -> Result<Vec<HostDescription>, TransportError> {
    let budget = retries.max(1);
    let mut attempt = 0;
    loop {
        match pool.execute(endpoints_request()).await {
            Ok(response) if response.is_success() => {
                return parse_endpoints(response.body());
            }
            Ok(response) => {
                attempt += 1;
                if attempt >= budget {
                    return Err(TransportError::Server(classify_response(&response)));
                }
                warn!(attempt, status = response.response_code(), "host list fetch rejected, retrying");
            }
            Err(err) => {
                attempt += 1;
                if attempt >= budget {
                    return Err(err);
                }
                warn!(attempt, error = %err, "host list fetch failed, retrying");
            }
        }
    }
}

fn endpoints_request() -> Request {
    Request::builder("_system", Method::Get, ENDPOINTS_PATH).build()
}

#[derive(Deserialize)]
struct EndpointsDocument {
    endpoints: Vec<EndpointEntry>,
}

#[derive(Deserialize)]
struct EndpointEntry {
    endpoint: String,
}

/// Parse the cluster endpoint listing into host descriptions.
fn parse_endpoints(body: &[u8]) -> Result<Vec<HostDescription>, TransportError> {
    let document: EndpointsDocument =
        serde_json::from_slice(body).map_err(TransportError::MalformedHostList)?;
    document
        .endpoints
        .into_iter()
        .map(|entry| HostDescription::from_endpoint(&entry.endpoint))
        .collect()
}

/// Extract the structured server error from a non-success response body.
///
/// The body is expected to carry a JSON error document; absence or malformed
/// content degrades to a bare status-code error rather than failing.
fn classify_response(response: &Response) -> ServerError {
    #[derive(Deserialize)]
    struct ErrorDocument {
        #[serde(rename = "errorNum")]
        error_num: Option<i64>,
        #[serde(rename = "errorMessage")]
        error_message: Option<String>,
    }

    let document: Option<ErrorDocument> = serde_json::from_slice(response.body()).ok();
    ServerError {
        code: response.response_code(),
        error_num: document.as_ref().and_then(|doc| doc.error_num),
        message: document.and_then(|doc| doc.error_message),
    }
}
