use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use cql_protocol::frame::events::{
    SchemaChangeTarget, ServerEvent, SimpleServerEvent, StatusChangeType,
};
use cql_protocol::frame::{Frame, Version};
use fxhash::FxHashSet;
use itertools::Itertools;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::*;

use crate::cluster::connection_manager::negotiate_connection;
use crate::cluster::metadata_builder::{diff_hosts, query_metadata, ClusterMetadata};
use crate::cluster::token_map::TokenMap;
use crate::cluster::topology::{ClusterEvent, Host};
use crate::cluster::{ClusterConfig, ConnectionManager, Endpoint, EndpointResolver};
use crate::future::with_timeout;
use crate::retry::{ReconnectionPolicy, ReconnectionSchedule};
use crate::transport::CqlTransport;
use crate::{Error, Result};

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(10);

enum TopologyCommand {
    Listen(oneshot::Sender<mpsc::Receiver<ClusterEvent>>),
}

/// Tracks cluster membership through a control connection.
///
/// The control connection subscribes to server events and re-reads system tables when the
/// topology or a keyspace changes, publishing differences as [`ClusterEvent`]s to every
/// listener. When the control connection breaks, a new one is established to any known host or
/// contact point.
pub struct ClusterTopology {
    commands: mpsc::Sender<TopologyCommand>,
    token_map: Arc<TokenMap>,
    hosts: Arc<ArcSwap<Vec<Arc<Host>>>>,
    version: Version,
    supervisor: JoinHandle<()>,
}

impl ClusterTopology {
    /// Connects to the first reachable contact point, negotiating the protocol version, and
    /// reads the initial topology.
    pub async fn connect<T, CM>(
        config: &ClusterConfig,
        connection_manager: Arc<CM>,
        endpoint_resolver: Arc<dyn EndpointResolver>,
    ) -> Result<Self>
    where
        T: CqlTransport + 'static,
        CM: ConnectionManager<T> + ?Sized + 'static,
    {
        let (event_sender, event_receiver) = mpsc::channel(config.event_channel_capacity.max(1));
        let contact_points = endpoint_resolver.resolve().await?;

        let mut last_error = None;
        for endpoint in contact_points {
            let result = Self::bootstrap(
                config,
                connection_manager.as_ref(),
                endpoint_resolver.as_ref(),
                &endpoint,
                event_sender.clone(),
            )
            .await;

            match result {
                Ok((connection, metadata)) => {
                    debug!(%endpoint, version = %connection.version(), "Established control connection.");

                    let token_map = Arc::new(TokenMap::new(metadata.partitioner));
                    let hosts = Arc::new(ArcSwap::from_pointee(vec![]));
                    let version = connection.version();

                    let mut supervisor = TopologySupervisor {
                        connection_manager,
                        endpoint_resolver,
                        reconnection_policy: config.reconnection_policy.clone(),
                        control: Some((endpoint, connection)),
                        version,
                        default_port: config.default_port,
                        request_timeout: config.request_timeout,
                        refresh_window: config.refresh_window,
                        listener_capacity: config.event_channel_capacity.max(1),
                        token_map: token_map.clone(),
                        hosts: hosts.clone(),
                        listeners: vec![],
                        event_sender,
                        next_candidate: 0,
                        refresh_schedule: None,
                    };

                    supervisor.apply(metadata).await;

                    let (commands, command_receiver) = mpsc::channel(1);
                    let supervisor = tokio::spawn(supervisor.run(command_receiver, event_receiver));

                    return Ok(ClusterTopology {
                        commands,
                        token_map,
                        hosts,
                        version,
                        supervisor,
                    });
                }
                Err(error) if error.is_configuration_error() => {
                    error!(%endpoint, %error, "Configuration error connecting to contact point!");
                    return Err(error);
                }
                Err(error) => {
                    warn!(%endpoint, %error, "Error connecting to contact point.");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::NoConnection("no contact points".into())))
    }

    /// Subscribes to cluster events. The first event is always [`ClusterEvent::Bootstrap`] with
    /// all currently known hosts.
    pub async fn listen(&self) -> Result<mpsc::Receiver<ClusterEvent>> {
        let (reply, receiver) = oneshot::channel();
        self.commands
            .send(TopologyCommand::Listen(reply))
            .await
            .map_err(|_| Error::General("Cluster topology supervisor stopped".into()))?;

        receiver
            .await
            .map_err(|_| Error::General("Cluster topology supervisor stopped".into()))
    }

    /// Currently known hosts.
    #[inline]
    pub fn hosts(&self) -> Arc<Vec<Arc<Host>>> {
        self.hosts.load_full()
    }

    #[inline]
    pub fn token_map(&self) -> &Arc<TokenMap> {
        &self.token_map
    }

    /// Protocol version negotiated with the cluster. Every other connection must use it.
    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    async fn bootstrap<T, CM>(
        config: &ClusterConfig,
        connection_manager: &CM,
        endpoint_resolver: &dyn EndpointResolver,
        endpoint: &Endpoint,
        event_sender: mpsc::Sender<ServerEvent>,
    ) -> Result<(T, ClusterMetadata)>
    where
        T: CqlTransport,
        CM: ConnectionManager<T> + ?Sized,
    {
        let connection = if config.forced_version {
            connection_manager
                .connection(endpoint, config.max_version, Some(event_sender))
                .await
                .map_err(|error| match error {
                    Error::UnsupportedVersion(_) => Error::InvalidProtocol(endpoint.address()),
                    error => error,
                })?
        } else {
            negotiate_connection(
                connection_manager,
                endpoint,
                config.max_version,
                Some(event_sender),
            )
            .await?
        };

        register(&connection).await?;

        let metadata = with_timeout(
            config.request_timeout,
            || format!("Timeout reading topology from {endpoint}"),
            query_metadata(&connection, endpoint, endpoint_resolver, config.default_port),
        )
        .await?;

        Ok((connection, metadata))
    }
}

impl Drop for ClusterTopology {
    fn drop(&mut self) {
        self.supervisor.abort();
    }
}

async fn register<T: CqlTransport + ?Sized>(transport: &T) -> Result<()> {
    let frame = Frame::new_req_register(
        vec![
            SimpleServerEvent::TopologyChange,
            SimpleServerEvent::StatusChange,
            SimpleServerEvent::SchemaChange,
        ],
        transport.version(),
    );

    transport.send_and_receive(frame).await.map(|_| ())
}

fn should_refresh(event: &ServerEvent) -> bool {
    match event {
        ServerEvent::TopologyChange(_) => true,
        ServerEvent::StatusChange(change) => change.change_type == StatusChangeType::Up,
        ServerEvent::SchemaChange(change) => change.target == SchemaChangeTarget::Keyspace,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn wait_closed<T: CqlTransport>(control: Option<&(Endpoint, T)>) {
    match control {
        Some((_, connection)) => connection.closed().await,
        None => pending().await,
    }
}

struct TopologySupervisor<T: CqlTransport + 'static, CM: ConnectionManager<T> + ?Sized + 'static> {
    connection_manager: Arc<CM>,
    endpoint_resolver: Arc<dyn EndpointResolver>,
    reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
    control: Option<(Endpoint, T)>,
    version: Version,
    default_port: u16,
    request_timeout: Option<Duration>,
    refresh_window: Duration,
    listener_capacity: usize,
    token_map: Arc<TokenMap>,
    hosts: Arc<ArcSwap<Vec<Arc<Host>>>>,
    listeners: Vec<mpsc::Sender<ClusterEvent>>,
    event_sender: mpsc::Sender<ServerEvent>,
    next_candidate: usize,
    refresh_schedule: Option<Box<dyn ReconnectionSchedule + Send + Sync>>,
}

impl<T: CqlTransport + 'static, CM: ConnectionManager<T> + ?Sized + 'static> TopologySupervisor<T, CM> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<TopologyCommand>,
        mut events: mpsc::Receiver<ServerEvent>,
    ) {
        let mut refresh_deadline: Option<Instant> = None;
        let mut reconnect_deadline: Option<Instant> = None;
        let mut schedule: Option<Box<dyn ReconnectionSchedule + Send + Sync>> = None;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(TopologyCommand::Listen(reply)) => self.add_listener(reply),
                    None => {
                        debug!("Cluster topology dropped - stopping supervisor.");
                        return;
                    }
                },
                Some(event) = events.recv() => {
                    trace!(?event, "Received server event.");
                    if should_refresh(&event) && self.control.is_some() {
                        // a single pending refresh covers all events within the window
                        let deadline = Instant::now() + self.refresh_window;
                        refresh_deadline = Some(
                            refresh_deadline.map_or(deadline, |pending| pending.min(deadline)),
                        );
                    }
                }
                _ = wait_until(refresh_deadline) => {
                    refresh_deadline = self.refresh().await;
                }
                _ = wait_closed(self.control.as_ref()) => {
                    if let Some((endpoint, connection)) = self.control.take() {
                        warn!(%endpoint, "Control connection closed! Trying to reconnect.");
                        drop(connection);
                    }

                    refresh_deadline = None;
                    self.refresh_schedule = None;
                    schedule = Some(self.reconnection_policy.new_node_schedule());
                    reconnect_deadline = Some(Instant::now());
                }
                _ = wait_until(reconnect_deadline) => {
                    if self.reconnect().await {
                        reconnect_deadline = None;
                        schedule = None;
                        refresh_deadline = self.refresh().await;
                    } else {
                        let delay = schedule
                            .as_mut()
                            .and_then(|schedule| schedule.next_delay())
                            .unwrap_or(DEFAULT_RECONNECT_DELAY);
                        reconnect_deadline = Some(Instant::now() + delay);
                    }
                }
            }
        }
    }

    fn add_listener(&mut self, reply: oneshot::Sender<mpsc::Receiver<ClusterEvent>>) {
        let (sender, receiver) = mpsc::channel(self.listener_capacity);
        if sender
            .try_send(ClusterEvent::Bootstrap(self.hosts.load().as_ref().clone()))
            .is_err()
        {
            return;
        }

        if reply.send(receiver).is_ok() {
            self.listeners.push(sender);
        }
    }

    /// Makes a single pass over all candidates. Returns true when a new control connection is
    /// established.
    async fn reconnect(&mut self) -> bool {
        let candidates = self.candidates().await;
        if candidates.is_empty() {
            warn!("No nodes found for control connection!");
            return false;
        }

        let start = self.next_candidate % candidates.len();
        self.next_candidate = self.next_candidate.wrapping_add(1);

        for endpoint in candidates[start..].iter().chain(&candidates[..start]) {
            let result = self
                .connection_manager
                .connection(endpoint, self.version, Some(self.event_sender.clone()))
                .await;

            let connection = match result {
                Ok(connection) => connection,
                Err(error) => {
                    debug!(%endpoint, %error, "Error establishing control connection.");
                    continue;
                }
            };

            if let Err(error) = register(&connection).await {
                debug!(%endpoint, %error, "Error subscribing to events.");
                continue;
            }

            debug!(%endpoint, "Established new control connection.");
            self.control = Some((endpoint.clone(), connection));
            return true;
        }

        false
    }

    /// Known hosts first, then contact points, without duplicates.
    async fn candidates(&self) -> Vec<Endpoint> {
        let known = self
            .hosts
            .load()
            .iter()
            .map(|host| host.endpoint().clone())
            .collect_vec();

        let contact_points = match self.endpoint_resolver.resolve().await {
            Ok(contact_points) => contact_points,
            Err(error) => {
                warn!(%error, "Error resolving contact points.");
                vec![]
            }
        };

        let mut seen = FxHashSet::default();
        known
            .into_iter()
            .chain(contact_points)
            .filter(|endpoint| seen.insert(endpoint.key().to_string()))
            .collect()
    }

    /// Re-reads the topology. On failure returns when to try again, backing off with the
    /// reconnection policy while the control connection stays open.
    async fn refresh(&mut self) -> Option<Instant> {
        let Some((endpoint, connection)) = &self.control else {
            return None;
        };

        let result = with_timeout(
            self.request_timeout,
            || format!("Timeout reading topology from {endpoint}"),
            query_metadata(
                connection,
                endpoint,
                self.endpoint_resolver.as_ref(),
                self.default_port,
            ),
        )
        .await;

        match result {
            Ok(metadata) => {
                self.refresh_schedule = None;
                self.apply(metadata).await;
                None
            }
            Err(error) => {
                let delay = self
                    .refresh_schedule
                    .get_or_insert_with(|| self.reconnection_policy.new_node_schedule())
                    .next_delay()
                    .unwrap_or(DEFAULT_RECONNECT_DELAY);

                // a broken connection will be replaced once it reports being closed
                error!(%endpoint, %error, ?delay, "Error refreshing cluster topology! Retrying later.");
                Some(Instant::now() + delay)
            }
        }
    }

    async fn apply(&mut self, metadata: ClusterMetadata) {
        let old_hosts = self.hosts.load_full();
        let events = diff_hosts(&old_hosts, &metadata.hosts);

        self.token_map.set_partitioner(metadata.partitioner);

        for event in &events {
            if let ClusterEvent::Removed(host) = event {
                self.token_map.remove_host(host.endpoint());
            }
        }

        for host in &metadata.hosts {
            let unchanged = old_hosts.iter().any(|old_host| old_host == host);
            if !unchanged {
                self.token_map.add_host(host.clone());
            }
        }

        for keyspace in self.token_map.keyspaces() {
            if !metadata.keyspaces.contains_key(&keyspace) {
                self.token_map.remove_keyspace(&keyspace);
            }
        }

        for (keyspace, strategy) in metadata.keyspaces {
            self.token_map.add_keyspace(&keyspace, strategy);
        }

        self.hosts.store(Arc::new(metadata.hosts));

        for event in &events {
            match event {
                ClusterEvent::Added(host) => info!(endpoint = %host.endpoint(), "Host added."),
                ClusterEvent::Removed(host) => info!(endpoint = %host.endpoint(), "Host removed."),
                ClusterEvent::Bootstrap(_) => {}
            }
        }

        self.broadcast(events).await;
    }

    async fn broadcast(&mut self, events: Vec<ClusterEvent>) {
        if events.is_empty() {
            return;
        }

        for listener in std::mem::take(&mut self.listeners) {
            let mut open = true;
            for event in &events {
                if listener.send(event.clone()).await.is_err() {
                    open = false;
                    break;
                }
            }

            if open {
                self.listeners.push(listener);
            }
        }
    }
}
