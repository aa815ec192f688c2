use std::sync::atomic::Ordering;
use std::sync::Arc;

use atomic::Atomic;
use bytemuck::NoUninit;
use cql_protocol::frame::Version;
use derive_more::Display;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::*;

use crate::cluster::connection_manager::set_keyspace;
use crate::cluster::{ConnectionManager, Endpoint};
use crate::retry::{ReconnectionPolicy, ReconnectionSchedule};
use crate::transport::CqlTransport;
use crate::{Error, Result};

/// Lifecycle of a single pool slot.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, NoUninit)]
#[repr(u8)]
pub enum SlotState {
    Disconnected,
    Connecting,
    Connected,
    /// Gave up: either a configuration error or the reconnection policy said so.
    Failed,
}

/// Configuration for node connection pools.
#[derive(Clone)]
pub struct ConnectionPoolConfig {
    size: usize,
    version: Version,
    keyspace: Option<String>,
    reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
}

impl ConnectionPoolConfig {
    /// Creates a new configuration for pools of given size, with connections at exactly given
    /// protocol version.
    pub fn new(
        size: usize,
        version: Version,
        keyspace: Option<String>,
        reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
    ) -> Self {
        ConnectionPoolConfig {
            size: size.max(1),
            version,
            keyspace,
            reconnection_policy,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }
}

struct PoolShared<T> {
    endpoint: Endpoint,
    slots: RwLock<Vec<Option<Arc<T>>>>,
    states: Vec<Atomic<SlotState>>,
    first_attempts: watch::Sender<usize>,
}

impl<T> PoolShared<T> {
    #[inline]
    fn set_state(&self, index: usize, state: SlotState) {
        self.states[index].store(state, Ordering::Relaxed);
    }

    fn first_attempt_finished(&self, first_attempt: &mut bool) {
        if std::mem::take(first_attempt) {
            self.first_attempts.send_modify(|count| *count += 1);
        }
    }
}

/// Fixed number of connections to a single host. Each slot connects, serves and reconnects on
/// its own, so a broken connection never affects the others.
pub struct ConnectionPool<T: CqlTransport + 'static> {
    shared: Arc<PoolShared<T>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<T: CqlTransport + 'static> ConnectionPool<T> {
    pub fn new<CM: ConnectionManager<T> + ?Sized + 'static>(
        endpoint: Endpoint,
        config: &ConnectionPoolConfig,
        connection_manager: Arc<CM>,
    ) -> Self {
        let shared = Arc::new(PoolShared {
            endpoint,
            slots: RwLock::new(vec![None; config.size]),
            states: (0..config.size)
                .map(|_| Atomic::new(SlotState::Disconnected))
                .collect(),
            first_attempts: watch::channel(0).0,
        });

        let tasks = (0..config.size)
            .map(|index| {
                tokio::spawn(Self::maintain_slot(
                    index,
                    shared.clone(),
                    connection_manager.clone(),
                    config.version,
                    config.keyspace.clone(),
                    config.reconnection_policy.new_node_schedule(),
                ))
            })
            .collect();

        ConnectionPool { shared, tasks }
    }

    #[inline]
    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    /// Resolves once every slot finished its first connection attempt, successful or not.
    pub async fn initialized(&self) {
        let size = self.tasks.len();
        let mut first_attempts = self.shared.first_attempts.subscribe();
        let _ = first_attempts.wait_for(|count| *count >= size).await;
    }

    /// Returns the live connection with the least requests in flight.
    pub async fn least_busy_connection(&self) -> Option<Arc<T>> {
        self.shared
            .slots
            .read()
            .await
            .iter()
            .flatten()
            .filter(|connection| !connection.is_closed())
            .min_by_key(|connection| connection.inflight())
            .cloned()
    }

    pub async fn live_connections(&self) -> usize {
        self.shared
            .slots
            .read()
            .await
            .iter()
            .flatten()
            .filter(|connection| !connection.is_closed())
            .count()
    }

    pub fn slot_states(&self) -> Vec<SlotState> {
        self.shared
            .states
            .iter()
            .map(|state| state.load(Ordering::Relaxed))
            .collect()
    }

    /// Stops all slots and closes their connections. Requests in flight fail with a closed
    /// connection error.
    pub async fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }

        let mut slots = self.shared.slots.write().await;
        for (index, slot) in slots.iter_mut().enumerate() {
            if let Some(connection) = slot.take() {
                let _ = connection.close();
            }

            self.shared.set_state(index, SlotState::Disconnected);
        }
    }

    async fn maintain_slot<CM: ConnectionManager<T> + ?Sized>(
        index: usize,
        shared: Arc<PoolShared<T>>,
        connection_manager: Arc<CM>,
        version: Version,
        keyspace: Option<String>,
        mut schedule: Box<dyn ReconnectionSchedule + Send + Sync>,
    ) {
        let mut first_attempt = true;

        loop {
            shared.set_state(index, SlotState::Connecting);

            match Self::connect(
                connection_manager.as_ref(),
                &shared.endpoint,
                version,
                keyspace.as_deref(),
            )
            .await
            {
                Ok(connection) => {
                    schedule.reset();

                    let connection = Arc::new(connection);
                    shared.slots.write().await[index] = Some(connection.clone());
                    shared.set_state(index, SlotState::Connected);
                    shared.first_attempt_finished(&mut first_attempt);

                    connection.closed().await;
                    debug!(endpoint = %shared.endpoint, slot = index, "Pooled connection closed.");

                    shared.slots.write().await[index] = None;
                    shared.set_state(index, SlotState::Disconnected);
                }
                Err(error) if error.is_configuration_error() => {
                    error!(endpoint = %shared.endpoint, slot = index, %error, "Permanent error connecting to node!");
                    shared.set_state(index, SlotState::Failed);
                    shared.first_attempt_finished(&mut first_attempt);
                    return;
                }
                Err(error) => {
                    warn!(endpoint = %shared.endpoint, slot = index, %error, "Error connecting to node.");
                    shared.set_state(index, SlotState::Disconnected);
                    shared.first_attempt_finished(&mut first_attempt);
                }
            }

            match schedule.next_delay() {
                Some(delay) => sleep(delay).await,
                None => {
                    debug!(endpoint = %shared.endpoint, slot = index, "Giving up reconnecting.");
                    shared.set_state(index, SlotState::Failed);
                    return;
                }
            }
        }
    }

    async fn connect<CM: ConnectionManager<T> + ?Sized>(
        connection_manager: &CM,
        endpoint: &Endpoint,
        version: Version,
        keyspace: Option<&str>,
    ) -> Result<T> {
        let connection = connection_manager
            .connection(endpoint, version, None)
            .await
            .map_err(|error| match error {
                // the cluster was negotiated at this version, so it's not a transient failure
                Error::UnsupportedVersion(_) => Error::InvalidProtocol(endpoint.address()),
                error => error,
            })?;

        if connection.version() != version {
            let _ = connection.close();
            return Err(Error::InvalidProtocol(endpoint.address()));
        }

        if let Some(keyspace) = keyspace {
            if let Err(error) = set_keyspace(&connection, keyspace).await {
                let _ = connection.close();
                return Err(error);
            }
        }

        Ok(connection)
    }
}

impl<T: CqlTransport + 'static> Drop for ConnectionPool<T> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
