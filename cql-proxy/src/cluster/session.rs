use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use cql_protocol::frame::{Frame, Version};
use derivative::Derivative;
use futures::future::join_all;
use fxhash::FxHashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::*;

use crate::cluster::connection_pool::{ConnectionPool, ConnectionPoolConfig};
use crate::cluster::topology::{ClusterEvent, Host};
use crate::cluster::{
    ClusterConfig, ClusterTopology, ConnectionManager, Endpoint, EndpointResolver,
    RequestConnectionManager,
};
use crate::future::with_timeout;
use crate::load_balancing::{
    LoadBalancingStrategy, QueryPlan, Request, RoundRobinLoadBalancingStrategy,
    TokenAwareLoadBalancingStrategy,
};
use crate::retry::{DefaultRetryPolicy, QueryInfo, RetryDecision, RetryPolicy};
use crate::transport::{CqlTransport, RequestConnection};
use crate::{Error, Result};

type PoolMap<T> = FxHashMap<String, Arc<ConnectionPool<T>>>;

/// Load balancing used by a [`Session`].
#[derive(Clone, Default, Derivative)]
#[derivative(Debug)]
pub enum LoadBalancing {
    RoundRobin,
    /// Replicas of the request token first. Requires the cluster token map, so it is created
    /// once the topology is known.
    #[default]
    TokenAware,
    Custom(#[derivative(Debug = "ignore")] Arc<dyn LoadBalancingStrategy>),
}

impl LoadBalancing {
    fn build(self, topology: &ClusterTopology) -> Arc<dyn LoadBalancingStrategy> {
        match self {
            LoadBalancing::RoundRobin => Arc::new(RoundRobinLoadBalancingStrategy::new()),
            LoadBalancing::TokenAware => Arc::new(TokenAwareLoadBalancingStrategy::new(
                topology.token_map().clone(),
            )),
            LoadBalancing::Custom(strategy) => strategy,
        }
    }
}

/// Connection pools to every known host of a cluster.
///
/// The session follows [`ClusterTopology`]: pools are created for added hosts and shut down for
/// removed ones. Requests go either to a chosen host with [`Session::send`], or through the load
/// balancing query plan with [`Session::execute`].
pub struct Session<T: CqlTransport + 'static> {
    pools: Arc<ArcSwap<PoolMap<T>>>,
    topology: ClusterTopology,
    load_balancing: Arc<dyn LoadBalancingStrategy>,
    retry_policy: Arc<dyn RetryPolicy + Send + Sync>,
    request_timeout: Option<Duration>,
    supervisor: JoinHandle<()>,
}

impl<T: CqlTransport + 'static> Session<T> {
    /// Discovers the cluster and connects to every host. Resolves once each initial pool
    /// finished its first connection attempt, whether it succeeded or not.
    pub async fn connect<CM>(
        config: &ClusterConfig,
        connection_manager: Arc<CM>,
        endpoint_resolver: Arc<dyn EndpointResolver>,
        load_balancing: LoadBalancing,
        retry_policy: Arc<dyn RetryPolicy + Send + Sync>,
    ) -> Result<Self>
    where
        CM: ConnectionManager<T> + ?Sized + 'static,
    {
        let topology =
            ClusterTopology::connect(config, connection_manager.clone(), endpoint_resolver).await?;

        let load_balancing = load_balancing.build(&topology);
        let pool_config = ConnectionPoolConfig::new(
            config.connections_per_host,
            topology.version(),
            config.keyspace.clone(),
            config.reconnection_policy.clone(),
        );

        let mut events = topology.listen().await?;
        let pools = Arc::new(ArcSwap::from_pointee(PoolMap::default()));

        let mut maintainer = PoolMaintainer {
            pools: pools.clone(),
            pool_config,
            connection_manager,
            load_balancing: load_balancing.clone(),
        };

        match events.recv().await {
            Some(event) => maintainer.handle(event).await,
            None => {
                return Err(Error::General(
                    "Cluster topology stopped before bootstrap".into(),
                ))
            }
        }

        let initial_pools = pools.load_full();
        join_all(initial_pools.values().map(|pool| pool.initialized())).await;
        debug!(hosts = initial_pools.len(), "Session connected.");

        let supervisor = tokio::spawn(maintainer.run(events));

        Ok(Session {
            pools,
            topology,
            load_balancing,
            retry_policy,
            request_timeout: config.request_timeout,
            supervisor,
        })
    }

    /// Sends a frame to given host, using the least busy connection of its pool.
    pub async fn send(&self, endpoint: &Endpoint, frame: Frame) -> Result<Frame> {
        let pool = self
            .pool(endpoint)
            .ok_or_else(|| Error::NoConnection(endpoint.to_string()))?;

        let connection = pool
            .least_busy_connection()
            .await
            .ok_or_else(|| Error::NoConnection(endpoint.to_string()))?;

        with_timeout(
            self.request_timeout,
            || format!("Timeout waiting for response from: {endpoint}"),
            connection.send_and_receive(frame),
        )
        .await
    }

    /// Executes a request on hosts from the load balancing query plan, retrying according to
    /// the retry policy. Non-idempotent requests are retried only when they could not have
    /// reached a server.
    pub async fn execute(&self, request: Request<'_>, frame: Frame) -> Result<Frame> {
        let is_idempotent = request.is_idempotent;
        let plan = self.load_balancing.query_plan(Some(request));

        let session = self;
        execute_plan(
            plan,
            frame,
            is_idempotent,
            self.retry_policy.as_ref(),
            move |host, frame| async move { session.send(host.endpoint(), frame).await },
        )
        .await
    }

    /// Pool of given host, if the host is known.
    pub fn pool(&self, endpoint: &Endpoint) -> Option<Arc<ConnectionPool<T>>> {
        self.pools.load().get(endpoint.key()).cloned()
    }

    pub fn pools(&self) -> Vec<Arc<ConnectionPool<T>>> {
        self.pools.load().values().cloned().collect()
    }

    #[inline]
    pub fn topology(&self) -> &ClusterTopology {
        &self.topology
    }

    /// Protocol version used by all connections. Frames passed to the session must use it.
    #[inline]
    pub fn version(&self) -> Version {
        self.topology.version()
    }
}

impl<T: CqlTransport + 'static> Drop for Session<T> {
    fn drop(&mut self) {
        self.supervisor.abort();
    }
}

async fn execute_plan<F, Fut>(
    plan: QueryPlan,
    frame: Frame,
    is_idempotent: bool,
    retry_policy: &(dyn RetryPolicy + Send + Sync),
    mut send: F,
) -> Result<Frame>
where
    F: FnMut(Arc<Host>, Frame) -> Fut,
    Fut: Future<Output = Result<Frame>>,
{
    let mut hosts = plan.into_iter();
    let mut host = hosts.next();
    let mut retry_count = 0;
    let mut last_error = None;

    while let Some(current) = host.clone() {
        let error = match send(current.clone(), frame.clone()).await {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };

        if matches!(error, Error::NoConnection(_) | Error::StreamIdsExhausted) {
            // the request never left this process
            debug!(endpoint = %current.endpoint(), %error, "Trying next host.");
            last_error = Some(error);
            host = hosts.next();
            continue;
        }

        if !is_idempotent {
            return Err(error);
        }

        let decision = retry_policy.decide(QueryInfo {
            error: &error,
            retry_count,
        });

        debug!(endpoint = %current.endpoint(), %error, %decision, retry_count, "Request failed.");
        retry_count += 1;

        match decision {
            RetryDecision::RetrySameNode => {}
            RetryDecision::RetryNextNode => host = hosts.next(),
            RetryDecision::DontRetry => return Err(error),
        }

        last_error = Some(error);
    }

    Err(last_error.unwrap_or_else(|| Error::NoConnection("empty query plan".into())))
}

struct PoolMaintainer<T: CqlTransport + 'static, CM: ConnectionManager<T> + ?Sized + 'static> {
    pools: Arc<ArcSwap<PoolMap<T>>>,
    pool_config: ConnectionPoolConfig,
    connection_manager: Arc<CM>,
    load_balancing: Arc<dyn LoadBalancingStrategy>,
}

impl<T: CqlTransport + 'static, CM: ConnectionManager<T> + ?Sized + 'static> PoolMaintainer<T, CM> {
    async fn run(mut self, mut events: mpsc::Receiver<ClusterEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }

        debug!("Cluster events finished - stopping pool maintenance.");
    }

    async fn handle(&mut self, event: ClusterEvent) {
        match &event {
            ClusterEvent::Bootstrap(hosts) => {
                for host in hosts {
                    self.add_pool(host.endpoint());
                }

                let known = self
                    .pools
                    .load()
                    .values()
                    .map(|pool| pool.endpoint().clone())
                    .filter(|endpoint| !hosts.iter().any(|host| host.endpoint() == endpoint))
                    .collect::<Vec<_>>();

                for endpoint in known {
                    self.remove_pool(&endpoint).await;
                }

                self.load_balancing.on_event(&event);
            }
            ClusterEvent::Added(host) => {
                self.add_pool(host.endpoint());
                self.load_balancing.on_event(&event);
            }
            ClusterEvent::Removed(host) => {
                self.load_balancing.on_event(&event);
                self.remove_pool(host.endpoint()).await;
            }
        }
    }

    fn add_pool(&self, endpoint: &Endpoint) {
        if self.pools.load().contains_key(endpoint.key()) {
            return;
        }

        debug!(%endpoint, "Creating connection pool.");

        let pool = Arc::new(ConnectionPool::new(
            endpoint.clone(),
            &self.pool_config,
            self.connection_manager.clone(),
        ));

        self.pools.rcu(|pools| {
            let mut pools = PoolMap::clone(pools);
            pools.insert(endpoint.key().to_string(), pool.clone());
            pools
        });
    }

    async fn remove_pool(&self, endpoint: &Endpoint) {
        let Some(pool) = self.pools.load().get(endpoint.key()).cloned() else {
            return;
        };

        debug!(%endpoint, "Removing connection pool.");

        self.pools.rcu(|pools| {
            let mut pools = PoolMap::clone(pools);
            pools.remove(endpoint.key());
            pools
        });

        pool.shutdown().await;
    }
}

/// Builder for sessions over [`RequestConnection`]s or custom transports.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct SessionBuilder {
    config: ClusterConfig,
    load_balancing: LoadBalancing,
    #[derivative(Debug = "ignore")]
    retry_policy: Arc<dyn RetryPolicy + Send + Sync>,
    #[derivative(Debug = "ignore")]
    endpoint_resolver: Option<Arc<dyn EndpointResolver>>,
}

impl SessionBuilder {
    pub fn new(config: ClusterConfig) -> Self {
        SessionBuilder {
            config,
            load_balancing: LoadBalancing::default(),
            retry_policy: Arc::new(DefaultRetryPolicy),
            endpoint_resolver: None,
        }
    }

    pub fn with_load_balancing(mut self, load_balancing: LoadBalancing) -> Self {
        self.load_balancing = load_balancing;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: Arc<dyn RetryPolicy + Send + Sync>) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Replaces the default contact point resolution and system row interpretation.
    pub fn with_endpoint_resolver(mut self, endpoint_resolver: Arc<dyn EndpointResolver>) -> Self {
        self.endpoint_resolver = Some(endpoint_resolver);
        self
    }

    /// Builds a session over TCP (or TLS) connections.
    pub async fn build(self) -> Result<Session<RequestConnection>> {
        let connection_manager = Arc::new(RequestConnectionManager::new(
            self.config.authenticator_provider.clone(),
            self.config.connect_timeout,
        ));

        self.build_with_manager(connection_manager).await
    }

    /// Builds a session with connections created by given manager.
    pub async fn build_with_manager<T, CM>(self, connection_manager: Arc<CM>) -> Result<Session<T>>
    where
        T: CqlTransport + 'static,
        CM: ConnectionManager<T> + ?Sized + 'static,
    {
        let endpoint_resolver = self
            .endpoint_resolver
            .unwrap_or_else(|| Arc::new(self.config.endpoint_resolver()));

        Session::connect(
            &self.config,
            connection_manager,
            endpoint_resolver,
            self.load_balancing,
            self.retry_policy,
        )
        .await
    }
}
