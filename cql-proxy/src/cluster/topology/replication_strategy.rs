use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use fxhash::{FxHashMap, FxHashSet};

use crate::cluster::token_map::TokenHost;
use crate::cluster::topology::{DatacenterMetadata, Host};
use crate::{Error, Result};

const CLASS: &str = "class";
const REPLICATION_FACTOR: &str = "replication_factor";

/// A replication strategy determines the nodes where replicas are placed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReplicationStrategy {
    SimpleStrategy {
        replication_factor: usize,
    },
    NetworkTopologyStrategy {
        datacenter_replication_factor: BTreeMap<String, usize>,
    },
}

impl ReplicationStrategy {
    /// Parses a keyspace replication map, as found in `system_schema.keyspaces.replication`.
    pub fn parse(keyspace: &str, replication: &HashMap<String, String>) -> Result<Self> {
        let class = replication
            .get(CLASS)
            .ok_or_else(|| Error::InvalidReplicationFormat {
                keyspace: keyspace.into(),
            })?;

        match class.rsplit('.').next().unwrap_or(class) {
            "SimpleStrategy" => {
                let replication_factor = replication
                    .get(REPLICATION_FACTOR)
                    .and_then(|factor| parse_replication_factor(factor))
                    .ok_or_else(|| Error::InvalidReplicationFormat {
                        keyspace: keyspace.into(),
                    })?;

                Ok(ReplicationStrategy::SimpleStrategy { replication_factor })
            }
            "NetworkTopologyStrategy" => replication
                .iter()
                .filter(|(key, _)| key.as_str() != CLASS && key.as_str() != REPLICATION_FACTOR)
                .map(|(datacenter, factor)| {
                    parse_replication_factor(factor)
                        .map(|factor| (datacenter.clone(), factor))
                        .ok_or_else(|| Error::InvalidReplicationFormat {
                            keyspace: keyspace.into(),
                        })
                })
                .collect::<Result<BTreeMap<_, _>>>()
                .map(|datacenter_replication_factor| {
                    ReplicationStrategy::NetworkTopologyStrategy {
                        datacenter_replication_factor,
                    }
                }),
            _ => Err(Error::UnsupportedReplicationStrategy(class.clone())),
        }
    }

    /// Computes replicas for every position of the ring. The result is index-aligned with
    /// `ring`, and the first replica of each entry is always the owner of that position.
    pub(crate) fn build_replica_table(
        &self,
        ring: &[TokenHost],
        datacenters: &FxHashMap<String, DatacenterMetadata>,
    ) -> Vec<Vec<Arc<Host>>> {
        (0..ring.len())
            .map(|start| match self {
                ReplicationStrategy::SimpleStrategy { replication_factor } => {
                    simple_strategy_replicas(ring, start, *replication_factor)
                }
                ReplicationStrategy::NetworkTopologyStrategy {
                    datacenter_replication_factor,
                } => network_topology_strategy_replicas(
                    ring,
                    start,
                    datacenter_replication_factor,
                    datacenters,
                ),
            })
            .collect()
    }
}

// "3/1" denotes 3 replicas, 1 of which is transient
fn parse_replication_factor(value: &str) -> Option<usize> {
    value.split('/').next()?.trim().parse().ok()
}

fn ring_from(ring: &[TokenHost], start: usize) -> impl Iterator<Item = &Arc<Host>> {
    ring[start..]
        .iter()
        .chain(ring[..start].iter())
        .map(|token_host| &token_host.host)
}

fn simple_strategy_replicas(
    ring: &[TokenHost],
    start: usize,
    replication_factor: usize,
) -> Vec<Arc<Host>> {
    let mut replicas: Vec<Arc<Host>> = Vec::with_capacity(replication_factor);
    for host in ring_from(ring, start) {
        if replicas.len() >= replication_factor {
            break;
        }

        if !replicas.iter().any(|replica| replica.endpoint() == host.endpoint()) {
            replicas.push(host.clone());
        }
    }

    replicas
}

struct DatacenterReplicas<'a> {
    target: usize,
    rack_count: usize,
    count: usize,
    seen_racks: FxHashSet<&'a str>,
    skipped: Vec<&'a Arc<Host>>,
}

impl DatacenterReplicas<'_> {
    #[inline]
    fn is_done(&self) -> bool {
        self.count >= self.target
    }
}

struct Replicas<'a> {
    hosts: Vec<Arc<Host>>,
    keys: FxHashSet<&'a str>,
}

impl<'a> Replicas<'a> {
    fn contains(&self, host: &Host) -> bool {
        self.keys.contains(host.endpoint().key())
    }

    fn add(&mut self, host: &'a Arc<Host>, datacenter: &mut DatacenterReplicas) {
        if self.keys.insert(host.endpoint().key()) {
            self.hosts.push(host.clone());
            datacenter.count += 1;
        }
    }
}

fn network_topology_strategy_replicas(
    ring: &[TokenHost],
    start: usize,
    datacenter_replication_factor: &BTreeMap<String, usize>,
    datacenters: &FxHashMap<String, DatacenterMetadata>,
) -> Vec<Arc<Host>> {
    let mut datacenter_replicas: FxHashMap<&str, DatacenterReplicas> = datacenter_replication_factor
        .iter()
        .filter_map(|(name, factor)| {
            let metadata = datacenters.get(name)?;
            let target = (*factor).min(metadata.node_count);
            (target > 0).then(|| {
                (
                    name.as_str(),
                    DatacenterReplicas {
                        target,
                        rack_count: metadata.rack_count(),
                        count: 0,
                        seen_racks: Default::default(),
                        skipped: vec![],
                    },
                )
            })
        })
        .collect();

    let mut replicas = Replicas {
        hosts: Vec::with_capacity(datacenter_replicas.values().map(|dc| dc.target).sum()),
        keys: Default::default(),
    };

    let mut pending = datacenter_replicas.len();

    for host in ring_from(ring, start) {
        if pending == 0 {
            break;
        }

        if host.rack().is_empty() {
            continue;
        }

        let Some(datacenter) = datacenter_replicas.get_mut(host.datacenter()) else {
            continue;
        };

        if datacenter.is_done() || replicas.contains(host) {
            continue;
        }

        if datacenter.seen_racks.len() == datacenter.rack_count {
            // every rack is used already, so any node will do
            replicas.add(host, datacenter);
        } else if datacenter.seen_racks.contains(host.rack()) {
            datacenter.skipped.push(host);
        } else {
            replicas.add(host, datacenter);
            datacenter.seen_racks.insert(host.rack());

            if datacenter.seen_racks.len() == datacenter.rack_count {
                for skipped in std::mem::take(&mut datacenter.skipped) {
                    if datacenter.is_done() {
                        break;
                    }

                    replicas.add(skipped, datacenter);
                }
            }
        }

        if datacenter.is_done() {
            pending -= 1;
        }
    }

    replicas.hosts
}

#[cfg(test)]
mod tests {
    use cql_protocol::token::Token;
    use maplit::hashmap;
    use uuid::Uuid;

    use super::*;
    use crate::cluster::Endpoint;

    fn host(port: u16, datacenter: &str, rack: &str, token: i64) -> Arc<Host> {
        Arc::new(Host::new(
            Endpoint::resolved(format!("127.0.0.1:{port}").parse().unwrap()),
            datacenter.into(),
            rack.into(),
            vec![Token::Murmur3(token)],
            Uuid::new_v4(),
        ))
    }

    fn ring(hosts: &[Arc<Host>]) -> Vec<TokenHost> {
        let mut ring = hosts
            .iter()
            .flat_map(|host| {
                host.tokens().iter().map(|token| TokenHost {
                    token: token.clone(),
                    host: host.clone(),
                })
            })
            .collect::<Vec<_>>();
        ring.sort_by(|a, b| a.token.cmp(&b.token));
        ring
    }

    fn ports(replicas: &[Arc<Host>]) -> Vec<u16> {
        replicas
            .iter()
            .map(|host| host.endpoint().address().port())
            .collect()
    }

    #[test]
    fn should_parse_simple_strategy() {
        let strategy = ReplicationStrategy::parse(
            "ks",
            &hashmap! {
                "class".into() => "org.apache.cassandra.locator.SimpleStrategy".into(),
                "replication_factor".into() => "3".into(),
            },
        )
        .unwrap();

        assert_eq!(
            strategy,
            ReplicationStrategy::SimpleStrategy {
                replication_factor: 3
            }
        );
    }

    #[test]
    fn should_parse_network_topology_strategy() {
        let strategy = ReplicationStrategy::parse(
            "ks",
            &hashmap! {
                "class".into() => "NetworkTopologyStrategy".into(),
                "dc1".into() => "3".into(),
                "dc2".into() => "2/1".into(),
            },
        )
        .unwrap();

        assert_eq!(
            strategy,
            ReplicationStrategy::NetworkTopologyStrategy {
                datacenter_replication_factor: BTreeMap::from([
                    ("dc1".into(), 3),
                    ("dc2".into(), 2)
                ])
            }
        );
    }

    #[test]
    fn should_reject_invalid_replication() {
        assert!(matches!(
            ReplicationStrategy::parse(
                "ks",
                &hashmap! {
                    "class".into() => "SimpleStrategy".into(),
                    "replication_factor".into() => "three".into(),
                }
            ),
            Err(Error::InvalidReplicationFormat { keyspace }) if keyspace == "ks"
        ));

        assert!(matches!(
            ReplicationStrategy::parse("ks", &hashmap! {}),
            Err(Error::InvalidReplicationFormat { .. })
        ));

        assert!(matches!(
            ReplicationStrategy::parse(
                "system",
                &hashmap! { "class".into() => "org.apache.cassandra.locator.LocalStrategy".into() }
            ),
            Err(Error::UnsupportedReplicationStrategy(class)) if class.ends_with("LocalStrategy")
        ));
    }

    #[test]
    fn should_walk_ring_for_simple_strategy() {
        let hosts = [
            host(1, "dc1", "r1", 0),
            host(2, "dc1", "r1", 10),
            host(3, "dc1", "r1", 20),
        ];
        let ring = ring(&hosts);

        let table = ReplicationStrategy::SimpleStrategy {
            replication_factor: 2,
        }
        .build_replica_table(&ring, &DatacenterMetadata::from_hosts(hosts.iter().map(|h| h.as_ref())));

        assert_eq!(ports(&table[0]), vec![1, 2]);
        assert_eq!(ports(&table[2]), vec![3, 1]);

        let table = ReplicationStrategy::SimpleStrategy {
            replication_factor: 5,
        }
        .build_replica_table(&ring, &Default::default());

        assert_eq!(ports(&table[1]), vec![2, 3, 1]);
    }

    #[test]
    fn should_place_replicas_across_racks() {
        let hosts = [
            host(1, "dc1", "r1", 0),
            host(2, "dc1", "r1", 10),
            host(5, "dc2", "r1", 20),
            host(3, "dc1", "r2", 30),
            host(6, "dc2", "r1", 40),
            host(4, "dc1", "r2", 50),
        ];
        let ring = ring(&hosts);
        let datacenters = DatacenterMetadata::from_hosts(hosts.iter().map(|h| h.as_ref()));

        let table = ReplicationStrategy::NetworkTopologyStrategy {
            datacenter_replication_factor: BTreeMap::from([("dc1".into(), 3), ("dc2".into(), 1)]),
        }
        .build_replica_table(&ring, &datacenters);

        assert_eq!(table.len(), ring.len());
        assert_eq!(ports(&table[0]), vec![1, 5, 3, 2]);

        for (index, replicas) in table.iter().enumerate() {
            assert_eq!(replicas[0].endpoint(), ring[index].host.endpoint());

            let dc1 = replicas
                .iter()
                .filter(|host| host.datacenter() == "dc1")
                .collect::<Vec<_>>();
            assert_eq!(dc1.len(), 3);
            assert!(dc1.iter().any(|host| host.rack() == "r1"));
            assert!(dc1.iter().any(|host| host.rack() == "r2"));

            assert_eq!(
                replicas
                    .iter()
                    .filter(|host| host.datacenter() == "dc2")
                    .count(),
                1
            );
        }
    }

    #[test]
    fn should_cap_by_datacenter_size_and_skip_unknown() {
        let hosts = [
            host(1, "dc1", "r1", 0),
            host(2, "dc1", "r2", 10),
            host(3, "dc3", "r1", 20),
            host(4, "dc1", "", 30),
        ];
        let ring = ring(&hosts);
        let datacenters = DatacenterMetadata::from_hosts(hosts.iter().map(|h| h.as_ref()));

        let table = ReplicationStrategy::NetworkTopologyStrategy {
            datacenter_replication_factor: BTreeMap::from([("dc1".into(), 5), ("dc2".into(), 2)]),
        }
        .build_replica_table(&ring, &datacenters);

        // the rackless node is never a replica
        assert_eq!(ports(&table[0]), vec![1, 2]);
        assert_eq!(ports(&table[3]), vec![1, 2]);
    }
}
