use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use cql_protocol::token::Token;
use fxhash::FxHashMap;
use itertools::Itertools;
use tracing::*;

use crate::cluster::topology::{DatacenterMetadata, Host, ReplicationStrategy};
use crate::cluster::{Endpoint, Partitioner};
use crate::{Error, Result};

/// Single position on the ring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenHost {
    pub token: Token,
    pub host: Arc<Host>,
}

#[derive(Debug, Default)]
struct TokenMapState {
    hosts: FxHashMap<String, Arc<Host>>,
    ring: Vec<TokenHost>,
    datacenters: FxHashMap<String, DatacenterMetadata>,
    keyspaces: FxHashMap<String, ReplicationStrategy>,
    // keyspaces sharing a strategy share the table
    replicas: FxHashMap<ReplicationStrategy, Arc<Vec<Vec<Arc<Host>>>>>,
    partitioner: Partitioner,
}

impl TokenMapState {
    fn with_hosts(&self, hosts: FxHashMap<String, Arc<Host>>) -> Self {
        let ring = hosts
            .values()
            .flat_map(|host| {
                host.tokens().iter().map(move |token| TokenHost {
                    token: token.clone(),
                    host: host.clone(),
                })
            })
            .sorted_by(|a, b| a.token.cmp(&b.token))
            .collect_vec();

        let datacenters = DatacenterMetadata::from_hosts(hosts.values().map(|host| host.as_ref()));

        let replicas = self
            .keyspaces
            .values()
            .unique()
            .map(|strategy| {
                (
                    strategy.clone(),
                    Arc::new(strategy.build_replica_table(&ring, &datacenters)),
                )
            })
            .collect();

        TokenMapState {
            hosts,
            ring,
            datacenters,
            keyspaces: self.keyspaces.clone(),
            replicas,
            partitioner: self.partitioner,
        }
    }
}

/// Ring of tokens with precomputed replica sets per replication strategy.
///
/// Readers always see a complete snapshot, since every change builds a new state which is then
/// swapped in. Writers are serialized.
#[derive(Debug, Default)]
pub struct TokenMap {
    state: ArcSwap<TokenMapState>,
    writer: Mutex<()>,
}

impl TokenMap {
    pub fn new(partitioner: Partitioner) -> Self {
        TokenMap {
            state: ArcSwap::from_pointee(TokenMapState {
                partitioner,
                ..Default::default()
            }),
            writer: Mutex::new(()),
        }
    }

    #[inline]
    pub fn partitioner(&self) -> Partitioner {
        self.state.load().partitioner
    }

    /// Changes the partitioner. Tokens of existing hosts are not reinterpreted.
    pub fn set_partitioner(&self, partitioner: Partitioner) {
        let _writer = self.lock_writer();
        let state = self.state.load();
        if state.partitioner == partitioner {
            return;
        }

        let mut new_state = state.with_hosts(state.hosts.clone());
        new_state.partitioner = partitioner;
        self.state.store(Arc::new(new_state));
    }

    /// Token of given routing key, according to current partitioner.
    #[inline]
    pub fn token_for_key(&self, routing_key: &[u8]) -> Token {
        self.partitioner().hash(routing_key)
    }

    /// Adds a host or replaces one with the same endpoint.
    pub fn add_host(&self, host: Arc<Host>) {
        let _writer = self.lock_writer();
        let state = self.state.load();

        let mut hosts = state.hosts.clone();
        hosts.insert(host.endpoint().key().into(), host);

        self.state.store(Arc::new(state.with_hosts(hosts)));
    }

    pub fn remove_host(&self, endpoint: &Endpoint) -> Option<Arc<Host>> {
        let _writer = self.lock_writer();
        let state = self.state.load();

        let mut hosts = state.hosts.clone();
        let removed = hosts.remove(endpoint.key())?;

        self.state.store(Arc::new(state.with_hosts(hosts)));
        Some(removed)
    }

    /// Registers a keyspace. Replica table is only computed if no other keyspace uses the same
    /// strategy.
    pub fn add_keyspace(&self, keyspace: &str, strategy: ReplicationStrategy) {
        let _writer = self.lock_writer();
        let state = self.state.load();

        if state.keyspaces.get(keyspace) == Some(&strategy) {
            return;
        }

        debug!(keyspace, ?strategy, "Adding keyspace to token map.");

        let mut keyspaces = state.keyspaces.clone();
        keyspaces.insert(keyspace.into(), strategy.clone());

        let mut replicas = retain_used(&state.replicas, &keyspaces);
        replicas.entry(strategy).or_insert_with_key(|strategy| {
            Arc::new(strategy.build_replica_table(&state.ring, &state.datacenters))
        });

        self.state.store(Arc::new(TokenMapState {
            hosts: state.hosts.clone(),
            ring: state.ring.clone(),
            datacenters: state.datacenters.clone(),
            keyspaces,
            replicas,
            partitioner: state.partitioner,
        }));
    }

    pub fn remove_keyspace(&self, keyspace: &str) {
        let _writer = self.lock_writer();
        let state = self.state.load();

        if !state.keyspaces.contains_key(keyspace) {
            return;
        }

        let mut keyspaces = state.keyspaces.clone();
        keyspaces.remove(keyspace);

        let replicas = retain_used(&state.replicas, &keyspaces);

        self.state.store(Arc::new(TokenMapState {
            hosts: state.hosts.clone(),
            ring: state.ring.clone(),
            datacenters: state.datacenters.clone(),
            keyspaces,
            replicas,
            partitioner: state.partitioner,
        }));
    }

    /// Replicas for given token in given keyspace. The first replica owns the token. An empty
    /// ring yields no replicas.
    pub fn replicas(&self, keyspace: &str, token: &Token) -> Result<Vec<Arc<Host>>> {
        let state = self.state.load();
        let strategy = state
            .keyspaces
            .get(keyspace)
            .ok_or_else(|| Error::UnknownKeyspace(keyspace.into()))?;

        if state.ring.is_empty() {
            return Ok(vec![]);
        }

        let index = state.ring.partition_point(|token_host| token_host.token < *token);
        let index = if index == state.ring.len() { 0 } else { index };

        Ok(state
            .replicas
            .get(strategy)
            .and_then(|table| table.get(index))
            .cloned()
            .unwrap_or_default())
    }

    pub fn hosts(&self) -> Vec<Arc<Host>> {
        self.state.load().hosts.values().cloned().collect()
    }

    pub fn keyspaces(&self) -> Vec<String> {
        self.state.load().keyspaces.keys().cloned().collect()
    }

    #[inline]
    pub fn has_keyspace(&self, keyspace: &str) -> bool {
        self.state.load().keyspaces.contains_key(keyspace)
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn retain_used(
    replicas: &FxHashMap<ReplicationStrategy, Arc<Vec<Vec<Arc<Host>>>>>,
    keyspaces: &FxHashMap<String, ReplicationStrategy>,
) -> FxHashMap<ReplicationStrategy, Arc<Vec<Vec<Arc<Host>>>>> {
    replicas
        .iter()
        .filter(|(strategy, _)| keyspaces.values().any(|used| used == *strategy))
        .map(|(strategy, table)| (strategy.clone(), table.clone()))
        .collect()
}
