use std::sync::Arc;
use std::time::Duration;

use cql_protocol::authenticators::SaslAuthenticatorProvider;
use cql_protocol::frame::Version;
use derivative::Derivative;

#[cfg(feature = "rust-tls")]
use crate::cluster::endpoint::TlsSettings;
use crate::cluster::{DefaultEndpointResolver, NodeAddress};
use crate::retry::{ExponentialReconnectionPolicy, ReconnectionPolicy};

pub const DEFAULT_PORT: u16 = 9042;
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 32;
const DEFAULT_REFRESH_WINDOW: Duration = Duration::from_millis(500);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Cluster connection configuration. Use [`ClusterConfigBuilder`] to create one.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct ClusterConfig {
    pub contact_points: Vec<NodeAddress>,
    pub default_port: u16,
    /// Highest protocol version to try.
    pub max_version: Version,
    /// Fail instead of downgrading when the cluster does not support `max_version`.
    pub forced_version: bool,
    pub connections_per_host: usize,
    #[derivative(Debug = "ignore")]
    pub reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
    #[derivative(Debug = "ignore")]
    pub authenticator_provider: Option<Arc<dyn SaslAuthenticatorProvider + Send + Sync>>,
    /// Keyspace set with `USE` on every pooled connection.
    pub keyspace: Option<String>,
    pub connect_timeout: Option<Duration>,
    pub request_timeout: Option<Duration>,
    /// Topology refreshes requested within this window are merged into one.
    pub refresh_window: Duration,
    pub event_channel_capacity: usize,
    #[cfg(feature = "rust-tls")]
    pub tls: Option<TlsSettings>,
}

impl ClusterConfig {
    /// Endpoint resolver for the configured contact points.
    pub fn endpoint_resolver(&self) -> DefaultEndpointResolver {
        let resolver = DefaultEndpointResolver::new(self.contact_points.clone(), self.default_port);

        #[cfg(feature = "rust-tls")]
        let resolver = resolver.with_tls(self.tls.clone());

        resolver
    }
}

/// Builder structure that helps to configure cluster connections.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ClusterConfigBuilder {
    contact_points: Vec<NodeAddress>,
    default_port: u16,
    max_version: Version,
    forced_version: bool,
    connections_per_host: usize,
    #[derivative(Debug = "ignore")]
    reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
    #[derivative(Debug = "ignore")]
    authenticator_provider: Option<Arc<dyn SaslAuthenticatorProvider + Send + Sync>>,
    keyspace: Option<String>,
    connect_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    refresh_window: Duration,
    event_channel_capacity: usize,
    #[cfg(feature = "rust-tls")]
    tls: Option<TlsSettings>,
}

impl Default for ClusterConfigBuilder {
    fn default() -> Self {
        ClusterConfigBuilder {
            contact_points: vec![],
            default_port: DEFAULT_PORT,
            max_version: Version::V4,
            forced_version: false,
            connections_per_host: 1,
            reconnection_policy: Arc::new(ExponentialReconnectionPolicy::default()),
            authenticator_provider: None,
            keyspace: None,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            request_timeout: None,
            refresh_window: DEFAULT_REFRESH_WINDOW,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            #[cfg(feature = "rust-tls")]
            tls: None,
        }
    }
}

impl ClusterConfigBuilder {
    pub fn new() -> ClusterConfigBuilder {
        Default::default()
    }

    /// Adds a contact point.
    pub fn with_contact_point(mut self, addr: NodeAddress) -> Self {
        self.contact_points.push(addr);
        self
    }

    /// Port used for contact points and peers which do not specify one.
    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// Highest protocol version to negotiate. Lower versions are tried when the cluster rejects
    /// it, unless the version is forced.
    pub fn with_version(mut self, version: Version) -> Self {
        self.max_version = version;
        self
    }

    pub fn with_forced_version(mut self, version: Version) -> Self {
        self.max_version = version;
        self.forced_version = true;
        self
    }

    /// Number of connections to each host.
    pub fn with_connections_per_host(mut self, connections_per_host: usize) -> Self {
        self.connections_per_host = connections_per_host.max(1);
        self
    }

    pub fn with_reconnection_policy(
        mut self,
        reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
    ) -> Self {
        self.reconnection_policy = reconnection_policy;
        self
    }

    /// Exponential reconnection with given base and maximum delay.
    pub fn with_reconnection_delays(self, base_delay: Duration, max_delay: Duration) -> Self {
        self.with_reconnection_policy(Arc::new(ExponentialReconnectionPolicy::new(
            base_delay, max_delay,
        )))
    }

    /// Sets new authenticator.
    pub fn with_authenticator_provider(
        mut self,
        authenticator_provider: Arc<dyn SaslAuthenticatorProvider + Send + Sync>,
    ) -> Self {
        self.authenticator_provider = Some(authenticator_provider);
        self
    }

    pub fn with_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Option<Duration>) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Option<Duration>) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_refresh_window(mut self, refresh_window: Duration) -> Self {
        self.refresh_window = refresh_window;
        self
    }

    /// Sets the capacity of server event and cluster event channels.
    pub fn with_event_channel_capacity(mut self, event_channel_capacity: usize) -> Self {
        self.event_channel_capacity = event_channel_capacity.max(1);
        self
    }

    #[cfg(feature = "rust-tls")]
    pub fn with_tls(mut self, tls: TlsSettings) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Finalizes building process
    pub fn build(self) -> ClusterConfig {
        ClusterConfig {
            contact_points: self.contact_points,
            default_port: self.default_port,
            max_version: self.max_version,
            forced_version: self.forced_version,
            connections_per_host: self.connections_per_host,
            reconnection_policy: self.reconnection_policy,
            authenticator_provider: self.authenticator_provider,
            keyspace: self.keyspace,
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            refresh_window: self.refresh_window,
            event_channel_capacity: self.event_channel_capacity,
            #[cfg(feature = "rust-tls")]
            tls: self.tls,
        }
    }
}
